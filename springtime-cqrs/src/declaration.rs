//! Declarations of application components: routes, HTTP middleware, bus middleware, bus handlers
//! and content formatters. Declarations can be built in code or deserialized from configuration,
//! and are validated when an application is assembled.

use axum::http::Method;
use derive_more::{Constructor, Display};
use serde::Deserialize;
use springtime_bus::handler::DEFAULT_METHOD;

/// Path prefix of middleware applied to all requests.
pub const ROOT_PATH: &str = "/";

fn root_path() -> String {
    ROOT_PATH.to_string()
}

fn default_method() -> String {
    DEFAULT_METHOD.to_string()
}

/// Name of the strategy mapping a route to bus actions.
#[derive(Copy, Clone, Debug, Display, Eq, PartialEq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BehaviorKind {
    #[display(fmt = "fetch")]
    Fetch,
    #[display(fmt = "create")]
    Create,
    #[serde(rename = "create_fetch")]
    #[display(fmt = "create_fetch")]
    CreateAndFetch,
    #[display(fmt = "execute")]
    Execute,
    #[serde(rename = "execute_fetch")]
    #[display(fmt = "execute_fetch")]
    ExecuteAndFetch,
    #[display(fmt = "none")]
    None,
}

impl BehaviorKind {
    /// HTTP methods a route gets when it doesn't specify any explicitly.
    pub fn default_methods(&self) -> Vec<Method> {
        match self {
            Self::Fetch | Self::None => vec![Method::GET],
            Self::Create | Self::CreateAndFetch => vec![Method::POST],
            Self::Execute => vec![Method::PATCH, Method::PUT, Method::DELETE],
            Self::ExecuteAndFetch => vec![Method::PATCH, Method::PUT],
        }
    }
}

/// A validated behavior, carrying the data it needs.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Behavior {
    Fetch {
        query: String,
    },
    Create {
        command: String,
        redirect_to: String,
    },
    CreateAndFetch {
        command: String,
        query: String,
        redirect_to: String,
    },
    Execute {
        command: String,
    },
    ExecuteAndFetch {
        command: String,
        query: String,
    },
    /// The route is handled directly by the declaring service.
    None,
}

impl Behavior {
    pub fn kind(&self) -> BehaviorKind {
        match self {
            Self::Fetch { .. } => BehaviorKind::Fetch,
            Self::Create { .. } => BehaviorKind::Create,
            Self::CreateAndFetch { .. } => BehaviorKind::CreateAndFetch,
            Self::Execute { .. } => BehaviorKind::Execute,
            Self::ExecuteAndFetch { .. } => BehaviorKind::ExecuteAndFetch,
            Self::None => BehaviorKind::None,
        }
    }

    pub fn command(&self) -> Option<&str> {
        match self {
            Self::Create { command, .. }
            | Self::CreateAndFetch { command, .. }
            | Self::Execute { command }
            | Self::ExecuteAndFetch { command, .. } => Some(command),
            _ => None,
        }
    }

    pub fn query(&self) -> Option<&str> {
        match self {
            Self::Fetch { query }
            | Self::CreateAndFetch { query, .. }
            | Self::ExecuteAndFetch { query, .. } => Some(query),
            _ => None,
        }
    }

    pub fn redirect_to(&self) -> Option<&str> {
        match self {
            Self::Create { redirect_to, .. } | Self::CreateAndFetch { redirect_to, .. } => {
                Some(redirect_to)
            }
            _ => None,
        }
    }
}

/// Raw route declaration, as attached to a service. Gets validated into a
/// [RouteSpec](crate::assembly::routes::RouteSpec) during assembly.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
pub struct RouteDeclaration {
    /// Id of the declaring service. Routes with [BehaviorKind::None] are handled by this service.
    pub service_id: String,
    pub name: Option<String>,
    pub path: Option<String>,
    pub behavior: Option<BehaviorKind>,
    pub methods: Option<Vec<String>>,
    #[serde(default, rename = "async")]
    pub is_async: bool,
    pub command: Option<String>,
    pub query: Option<String>,
    pub redirect_to: Option<String>,
}

impl RouteDeclaration {
    pub fn new(service_id: impl Into<String>) -> Self {
        Self {
            service_id: service_id.into(),
            ..Default::default()
        }
    }

    /// Route fetching data with a query.
    pub fn fetch(
        service_id: impl Into<String>,
        name: impl Into<String>,
        path: impl Into<String>,
        query: impl Into<String>,
    ) -> Self {
        Self::new(service_id)
            .name(name)
            .path(path)
            .behavior(BehaviorKind::Fetch)
            .query(query)
    }

    /// Route creating a resource with a command and redirecting to `redirect_to`.
    pub fn create(
        service_id: impl Into<String>,
        name: impl Into<String>,
        path: impl Into<String>,
        command: impl Into<String>,
        redirect_to: impl Into<String>,
    ) -> Self {
        Self::new(service_id)
            .name(name)
            .path(path)
            .behavior(BehaviorKind::Create)
            .command(command)
            .redirect_to(redirect_to)
    }

    /// Route creating a resource and returning its representation.
    pub fn create_and_fetch(
        service_id: impl Into<String>,
        name: impl Into<String>,
        path: impl Into<String>,
        command: impl Into<String>,
        query: impl Into<String>,
        redirect_to: impl Into<String>,
    ) -> Self {
        Self::create(service_id, name, path, command, redirect_to)
            .behavior(BehaviorKind::CreateAndFetch)
            .query(query)
    }

    /// Route executing a command without returning content.
    pub fn execute(
        service_id: impl Into<String>,
        name: impl Into<String>,
        path: impl Into<String>,
        command: impl Into<String>,
    ) -> Self {
        Self::new(service_id)
            .name(name)
            .path(path)
            .behavior(BehaviorKind::Execute)
            .command(command)
    }

    /// Route executing a command and returning the resulting representation.
    pub fn execute_and_fetch(
        service_id: impl Into<String>,
        name: impl Into<String>,
        path: impl Into<String>,
        command: impl Into<String>,
        query: impl Into<String>,
    ) -> Self {
        Self::execute(service_id, name, path, command)
            .behavior(BehaviorKind::ExecuteAndFetch)
            .query(query)
    }

    /// Route handled directly by the declaring service.
    pub fn simple(
        service_id: impl Into<String>,
        name: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self::new(service_id)
            .name(name)
            .path(path)
            .behavior(BehaviorKind::None)
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn behavior(mut self, behavior: BehaviorKind) -> Self {
        self.behavior = Some(behavior);
        self
    }

    /// Overrides the default methods of the behavior.
    pub fn methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.methods = Some(methods.into_iter().map(Into::into).collect());
        self
    }

    /// Marks the route as processed asynchronously (responding with 202).
    pub fn asynchronous(mut self) -> Self {
        self.is_async = true;
        self
    }

    pub fn command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn redirect_to(mut self, redirect_to: impl Into<String>) -> Self {
        self.redirect_to = Some(redirect_to.into());
        self
    }
}

/// HTTP middleware declaration. Higher priority middleware runs earlier.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct MiddlewareDeclaration {
    pub service_id: String,
    #[serde(default)]
    pub priority: i32,
    /// Only requests under this path prefix are passed to the middleware.
    #[serde(default = "root_path")]
    pub path: String,
}

impl MiddlewareDeclaration {
    pub fn new(service_id: impl Into<String>) -> Self {
        Self {
            service_id: service_id.into(),
            priority: 0,
            path: root_path(),
        }
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }
}

/// Kind of a service bus.
#[derive(Copy, Clone, Debug, Display, Eq, PartialEq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusKind {
    #[display(fmt = "command")]
    Command,
    #[display(fmt = "query")]
    Query,
}

/// Buses a bus middleware applies to.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusTarget {
    Command,
    Query,
    #[default]
    Both,
}

impl BusTarget {
    #[inline]
    pub fn applies_to(&self, bus: BusKind) -> bool {
        matches!(
            (self, bus),
            (Self::Both, _) | (Self::Command, BusKind::Command) | (Self::Query, BusKind::Query)
        )
    }
}

/// Bus middleware declaration. Higher priority middleware runs earlier.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct BusMiddlewareDeclaration {
    pub service_id: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub bus: BusTarget,
}

impl BusMiddlewareDeclaration {
    pub fn new(service_id: impl Into<String>) -> Self {
        Self {
            service_id: service_id.into(),
            priority: 0,
            bus: BusTarget::Both,
        }
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn bus(mut self, bus: BusTarget) -> Self {
        self.bus = bus;
        self
    }
}

/// Declares a service as the handler of a message type on a bus.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct HandlerDeclaration {
    pub service_id: String,
    pub bus: BusKind,
    /// Handled message type.
    pub handles: Option<String>,
    /// Handler method to invoke.
    #[serde(default = "default_method")]
    pub method: String,
}

impl HandlerDeclaration {
    pub fn new(service_id: impl Into<String>, bus: BusKind) -> Self {
        Self {
            service_id: service_id.into(),
            bus,
            handles: None,
            method: default_method(),
        }
    }

    pub fn command(service_id: impl Into<String>, handles: impl Into<String>) -> Self {
        Self::new(service_id, BusKind::Command).handles(handles)
    }

    pub fn query(service_id: impl Into<String>, handles: impl Into<String>) -> Self {
        Self::new(service_id, BusKind::Query).handles(handles)
    }

    pub fn handles(mut self, handles: impl Into<String>) -> Self {
        self.handles = Some(handles.into());
        self
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }
}

/// Validated handler registration - one per message type per bus.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Constructor)]
pub struct HandlerBinding {
    pub message_type: String,
    pub service_id: String,
    pub method: String,
}

/// Registers a formatter service for a response format.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Constructor)]
pub struct FormatterDeclaration {
    pub service_id: String,
    pub format: String,
}

/// All declarations making up an application.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct Declarations {
    pub routes: Vec<RouteDeclaration>,
    pub middleware: Vec<MiddlewareDeclaration>,
    pub bus_middleware: Vec<BusMiddlewareDeclaration>,
    pub handlers: Vec<HandlerDeclaration>,
    pub formatters: Vec<FormatterDeclaration>,
}

impl Declarations {
    /// Appends all declarations from `other`, preserving their order.
    pub fn extend(&mut self, other: Declarations) {
        self.routes.extend(other.routes);
        self.middleware.extend(other.middleware);
        self.bus_middleware.extend(other.bus_middleware);
        self.handlers.extend(other.handlers);
        self.formatters.extend(other.formatters);
    }
}
