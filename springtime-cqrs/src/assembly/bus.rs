//! Resolution of command and query buses: handler maps, middleware stages and the bus services
//! built from them.

use crate::assembly::priorities::Prioritized;
use crate::container::{Container, ServiceLocator};
use crate::declaration::{BusKind, BusMiddlewareDeclaration, HandlerBinding, HandlerDeclaration};
use crate::error::{AssemblyError, ContainerError};
use indexmap::IndexMap;
use springtime_bus::bus::{BusMiddleware, ServiceBus};
use springtime_bus::error::BusError;
use springtime_bus::handler::{HandlerLocator, LocatedHandler, MessageHandler};
use springtime_bus::read_model::ReadModelConverter;
use std::sync::Arc;
use tracing::debug;

/// Service id of the default read model converter.
pub const READ_MODEL_CONVERTER: &str = "read_model_converter";

/// A step of a bus chain.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum BusStage {
    /// User middleware service.
    Middleware(String),
    /// Dispatch to the handler of the message.
    HandlerDispatch,
    /// Conversion of handler results into read models (query buses only).
    ReadModelConversion,
}

/// Resolved shape of a bus.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BusDescriptor {
    /// Service id of the bus.
    pub id: String,
    pub kind: BusKind,
    /// Handlers keyed by message type, in order of registration.
    pub handlers: IndexMap<String, HandlerBinding>,
    /// Bus chain, always terminated by [BusStage::HandlerDispatch] and, for query buses,
    /// [BusStage::ReadModelConversion].
    pub stages: Vec<BusStage>,
}

impl BusDescriptor {
    /// Ids of user middleware, in invocation order.
    pub fn middleware(&self) -> impl Iterator<Item = &str> {
        self.stages.iter().filter_map(|stage| match stage {
            BusStage::Middleware(id) => Some(id.as_str()),
            _ => None,
        })
    }
}

/// Resolves the bus of given kind from handler and middleware declarations.
pub fn resolve_bus(
    id: String,
    kind: BusKind,
    handlers: &[HandlerDeclaration],
    middleware: &[BusMiddlewareDeclaration],
) -> Result<BusDescriptor, AssemblyError> {
    let mut bindings = IndexMap::new();
    for handler in handlers.iter().filter(|handler| handler.bus == kind) {
        let message_type =
            handler
                .handles
                .clone()
                .ok_or_else(|| AssemblyError::IncompleteHandlerSpec {
                    service_id: handler.service_id.clone(),
                    bus: kind.to_string(),
                })?;

        // last registration wins, but keeps the original position
        bindings.insert(
            message_type.clone(),
            HandlerBinding::new(
                message_type,
                handler.service_id.clone(),
                handler.method.clone(),
            ),
        );
    }

    let mut stages: Vec<_> = middleware
        .iter()
        .filter(|middleware| middleware.bus.applies_to(kind))
        .map(|middleware| {
            (
                middleware.priority,
                BusStage::Middleware(middleware.service_id.clone()),
            )
        })
        .collect::<Prioritized<_>>()
        .into_sorted();

    stages.push(BusStage::HandlerDispatch);
    if kind == BusKind::Query {
        stages.push(BusStage::ReadModelConversion);
    }

    debug!(bus = %id, handlers = bindings.len(), stages = stages.len(), "Resolved bus.");

    Ok(BusDescriptor {
        id,
        kind,
        handlers: bindings,
        stages,
    })
}

/// [HandlerLocator] resolving handler services from the container on dispatch.
#[derive(Debug)]
struct ContainerHandlerLocator {
    handlers: IndexMap<String, HandlerBinding>,
    locator: ServiceLocator,
}

impl HandlerLocator for ContainerHandlerLocator {
    fn locate(&self, message_type: &str) -> Result<LocatedHandler, BusError> {
        let binding = self
            .handlers
            .get(message_type)
            .ok_or_else(|| BusError::MissingHandler(message_type.to_string()))?;

        self.locator
            .resolve::<dyn MessageHandler + Send + Sync>(&binding.service_id)
            .map(|handler| LocatedHandler {
                handler,
                method: binding.method.clone(),
            })
            .map_err(|error| BusError::Unavailable(Arc::new(error)))
    }
}

/// Registers the bus service described by `descriptor`. The bus and its middleware are created on
/// first use; handlers are resolved on each dispatch.
pub fn register_bus(
    container: &mut Container,
    descriptor: &BusDescriptor,
) -> Result<(), ContainerError> {
    let descriptor = descriptor.clone();
    let id = descriptor.id.clone();

    container.register::<ServiceBus, _>(id, move |locator| {
        let mut builder = ServiceBus::builder(Arc::new(ContainerHandlerLocator {
            handlers: descriptor.handlers.clone(),
            locator: locator.clone(),
        }));

        for stage in &descriptor.stages {
            builder = match stage {
                BusStage::Middleware(id) => {
                    builder.middleware(locator.resolve::<dyn BusMiddleware + Send + Sync>(id)?)
                }
                BusStage::HandlerDispatch => builder,
                BusStage::ReadModelConversion => builder.read_model_conversion(
                    locator.resolve::<dyn ReadModelConverter + Send + Sync>(READ_MODEL_CONVERTER)?,
                ),
            };
        }

        Ok(Arc::new(builder.build()))
    })
}

#[cfg(test)]
mod tests {
    use crate::assembly::bus::{register_bus, resolve_bus, BusStage, READ_MODEL_CONVERTER};
    use crate::container::Container;
    use crate::declaration::{BusKind, BusMiddlewareDeclaration, BusTarget, HandlerDeclaration};
    use crate::error::AssemblyError;
    use springtime_bus::bus::ServiceBus;
    use springtime_bus::error::BusError;
    use springtime_bus::future::{BoxFuture, FutureExt};
    use springtime_bus::handler::MessageHandler;
    use springtime_bus::message::Message;
    use springtime_bus::read_model::{ReadModelConverter, Reply, SerializingConverter};
    use std::sync::Arc;

    fn middleware() -> Vec<BusMiddlewareDeclaration> {
        vec![
            BusMiddlewareDeclaration::new("both"),
            BusMiddlewareDeclaration::new("command.only")
                .bus(BusTarget::Command)
                .priority(10),
            BusMiddlewareDeclaration::new("query.only")
                .bus(BusTarget::Query)
                .priority(-10),
            BusMiddlewareDeclaration::new("both.late"),
        ]
    }

    #[test]
    fn should_terminate_command_bus_with_dispatch() {
        let bus = resolve_bus("app.command_bus".to_string(), BusKind::Command, &[], &middleware())
            .unwrap();

        assert_eq!(
            bus.stages,
            vec![
                BusStage::Middleware("command.only".to_string()),
                BusStage::Middleware("both".to_string()),
                BusStage::Middleware("both.late".to_string()),
                BusStage::HandlerDispatch,
            ]
        );
    }

    #[test]
    fn should_terminate_query_bus_with_conversion() {
        let bus = resolve_bus("app.query_bus".to_string(), BusKind::Query, &[], &middleware())
            .unwrap();

        assert_eq!(
            bus.middleware().collect::<Vec<_>>(),
            vec!["both", "both.late", "query.only"]
        );
        assert_eq!(
            &bus.stages[bus.stages.len() - 2..],
            &[BusStage::HandlerDispatch, BusStage::ReadModelConversion]
        );
    }

    #[test]
    fn should_keep_last_handler_registration() {
        let bus = resolve_bus(
            "app.query_bus".to_string(),
            BusKind::Query,
            &[
                HandlerDeclaration::query("first", "FetchThing"),
                HandlerDeclaration::command("command", "CreateThing"),
                HandlerDeclaration::query("list", "ListThings"),
                HandlerDeclaration::query("second", "FetchThing").method("fetch"),
            ],
            &[],
        )
        .unwrap();

        assert_eq!(bus.handlers.len(), 2);
        assert_eq!(bus.handlers["FetchThing"].service_id, "second");
        assert_eq!(bus.handlers["FetchThing"].method, "fetch");
        assert_eq!(
            bus.handlers.keys().collect::<Vec<_>>(),
            vec!["FetchThing", "ListThings"]
        );
    }

    #[test]
    fn should_reject_handler_without_message_type() {
        let error = resolve_bus(
            "app.command_bus".to_string(),
            BusKind::Command,
            &[HandlerDeclaration::new("incomplete", BusKind::Command)],
            &[],
        )
        .unwrap_err();

        assert!(matches!(
            error,
            AssemblyError::IncompleteHandlerSpec { service_id, bus }
                if service_id == "incomplete" && bus == "command"
        ));
    }

    struct Constant;

    impl MessageHandler for Constant {
        fn handle(&self, _message: Message) -> BoxFuture<'_, Result<Reply, BusError>> {
            async { Ok(Reply::domain(42)) }.boxed()
        }
    }

    #[tokio::test]
    async fn should_register_lazy_bus_service() {
        let descriptor = resolve_bus(
            "app.query_bus".to_string(),
            BusKind::Query,
            &[HandlerDeclaration::query("constant", "Answer")],
            &[],
        )
        .unwrap();

        let mut container = Container::default();
        register_bus(&mut container, &descriptor).unwrap();
        container
            .register_instance::<dyn ReadModelConverter + Send + Sync>(
                READ_MODEL_CONVERTER,
                Arc::new(SerializingConverter),
            )
            .unwrap();
        container
            .register_instance::<dyn MessageHandler + Send + Sync>("constant", Arc::new(Constant))
            .unwrap();

        let bus = container.resolve::<ServiceBus>("app.query_bus").unwrap();
        assert!(bus.converts_read_models());

        let reply = bus.handle(Message::new("Answer", ())).await.unwrap();
        assert!(matches!(reply, Reply::Converted(value) if value == 42));

        assert!(matches!(
            bus.handle(Message::new("Unknown", ())).await,
            Err(BusError::MissingHandler(_))
        ));
    }
}
