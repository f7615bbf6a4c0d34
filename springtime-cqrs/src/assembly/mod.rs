//! Application assembly - turning declarations into an [ApplicationGraph] registered in a
//! [Container].
//!
//! Assembly validates all declarations, orders middleware by priority, resolves bus handlers and
//! registers every component as a lazily constructed service. All registrations are staged on a
//! copy of the container, which replaces the original only when the whole pass succeeds, so a
//! failed assembly leaves the container untouched.

pub mod bus;
pub mod handlers;
pub mod pipeline;
pub mod priorities;
pub mod routes;

use crate::assembly::bus::{register_bus, resolve_bus};
use crate::assembly::handlers::compile_routes;
use crate::assembly::pipeline::{assemble_pipeline, negotiation_descriptor};
use crate::assembly::routes::extract_routes;
use crate::config::AssemblyConfig;
use crate::container::Container;
use crate::declaration::{
    BusKind, BusMiddlewareDeclaration, Declarations, FormatterDeclaration, HandlerDeclaration,
    MiddlewareDeclaration, RouteDeclaration,
};
use crate::defaults::register_defaults;
use crate::error::AssemblyError;
use crate::graph::{ApplicationGraph, ApplicationLayout};
use crate::validation::ValidateApplicationComponents;
use springtime_bus::message::{FromInput, NamedConstructor};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Ids of the services of a single application. Every id is prefixed with the application name,
/// so multiple applications can share a container.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ServiceIds {
    application: String,
}

impl ServiceIds {
    pub fn new(application: impl Into<String>) -> Self {
        Self {
            application: application.into(),
        }
    }

    #[inline]
    pub fn application_name(&self) -> &str {
        &self.application
    }

    /// The application graph - the public entrypoint of the application.
    pub fn application(&self) -> String {
        format!("{}.application", self.application)
    }

    /// Public alias of the application graph.
    pub fn http(&self) -> String {
        format!("{}.http", self.application)
    }

    pub fn command_bus(&self) -> String {
        format!("{}.command_bus", self.application)
    }

    pub fn query_bus(&self) -> String {
        format!("{}.query_bus", self.application)
    }

    pub fn message_creator(&self) -> String {
        format!("{}.message_creator", self.application)
    }

    pub fn router(&self) -> String {
        format!("{}.http.router", self.application)
    }

    pub fn uri_generator(&self) -> String {
        format!("{}.http.uri_generator", self.application)
    }

    /// Request handler of a route.
    pub fn route(&self, route_name: &str) -> String {
        format!("{}.http.route.{route_name}", self.application)
    }

    /// Built-in middleware.
    pub fn middleware(&self, name: &str) -> String {
        format!("{}.http.middleware.{name}", self.application)
    }
}

fn install_tracing_logger() {
    // fails when a global subscriber is already set, which is fine
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

/// Assembles an application from its declarations.
///
/// ```
/// use springtime_cqrs::assembly::ApplicationAssembler;
/// use springtime_cqrs::container::Container;
/// use springtime_cqrs::declaration::{HandlerDeclaration, RouteDeclaration};
///
/// let assembler = ApplicationAssembler::new("shop")
///     .route(RouteDeclaration::fetch("orders", "orders.list", "/orders", "ListOrders"))
///     .handler(HandlerDeclaration::query("orders.list_handler", "ListOrders"));
///
/// let mut container = Container::default();
/// let graph = assembler.process(&mut container).unwrap();
///
/// assert_eq!(graph.route_collector().len(), 1);
/// assert!(container.is_public("shop.application"));
/// ```
#[derive(Clone, Debug)]
pub struct ApplicationAssembler {
    name: String,
    config: AssemblyConfig,
    declarations: Declarations,
    messages: NamedConstructor,
}

impl ApplicationAssembler {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: Default::default(),
            declarations: Default::default(),
            messages: Default::default(),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn declarations(&self) -> &Declarations {
        &self.declarations
    }

    pub fn with_config(mut self, config: AssemblyConfig) -> Self {
        self.config = config;
        self
    }

    /// Adds all given declarations to the already existing ones.
    pub fn with_declarations(mut self, declarations: Declarations) -> Self {
        self.declarations.extend(declarations);
        self
    }

    pub fn route(mut self, route: RouteDeclaration) -> Self {
        self.declarations.routes.push(route);
        self
    }

    pub fn middleware(mut self, middleware: MiddlewareDeclaration) -> Self {
        self.declarations.middleware.push(middleware);
        self
    }

    pub fn bus_middleware(mut self, middleware: BusMiddlewareDeclaration) -> Self {
        self.declarations.bus_middleware.push(middleware);
        self
    }

    pub fn handler(mut self, handler: HandlerDeclaration) -> Self {
        self.declarations.handlers.push(handler);
        self
    }

    pub fn formatter(mut self, formatter: FormatterDeclaration) -> Self {
        self.declarations.formatters.push(formatter);
        self
    }

    /// Registers `T` as the payload of messages named `message_type`, created by the default
    /// message creator of the application.
    pub fn message<T: FromInput + Send + Sync + 'static>(
        mut self,
        message_type: impl Into<String>,
    ) -> Self {
        self.messages.register::<T>(message_type);
        self
    }

    /// Validates the declarations and registers the application in `container`. Returns the
    /// assembled graph, which is also available as the public `"{name}.application"` service.
    pub fn process(
        &self,
        container: &mut Container,
    ) -> Result<Arc<ApplicationGraph>, AssemblyError> {
        if self.config.install_tracing_logger {
            install_tracing_logger();
        }

        let ids = ServiceIds::new(&self.name);
        if container.has(&ids.application()) {
            return Err(AssemblyError::MultipleApplicationRegistration {
                application: self.name.clone(),
            });
        }

        info!(application = %self.name, "Assembling application...");

        let routes = extract_routes(&self.declarations.routes)?;
        let command_bus = resolve_bus(
            ids.command_bus(),
            BusKind::Command,
            &self.declarations.handlers,
            &self.declarations.bus_middleware,
        )?;
        let query_bus = resolve_bus(
            ids.query_bus(),
            BusKind::Query,
            &self.declarations.handlers,
            &self.declarations.bus_middleware,
        )?;

        let mut staged = container.clone();
        register_defaults(&mut staged, &ids, &self.messages)?;
        register_bus(&mut staged, &command_bus)?;
        register_bus(&mut staged, &query_bus)?;

        let route_collector = compile_routes(&mut staged, &ids, &routes)?;

        let content_negotiation =
            negotiation_descriptor(&self.config, &self.declarations.formatters);
        let (middleware, middleware_by_path) = assemble_pipeline(
            &mut staged,
            &ids,
            &self.declarations.middleware,
            &content_negotiation,
        )?;

        let layout = ApplicationLayout {
            name: self.name.clone(),
            route_collector,
            middleware,
            middleware_by_path,
            command_bus,
            query_bus,
            content_negotiation,
        };

        staged.register::<ApplicationGraph, _>(ids.application(), move |locator| {
            Ok(Arc::new(ApplicationGraph::new(layout.clone(), locator.clone())))
        })?;
        staged.set_public(&ids.application(), true)?;
        staged.set_alias(ids.http(), ids.application(), true)?;

        ValidateApplicationComponents::new(self.name.clone()).process(&staged)?;

        *container = staged;
        let graph = container.resolve::<ApplicationGraph>(&ids.application())?;

        info!(
            application = %self.name,
            routes = graph.route_collector().len(),
            middleware = graph.middleware().len(),
            "Application assembled."
        );

        Ok(graph)
    }
}
