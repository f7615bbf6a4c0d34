//! Service bus - an ordered middleware chain terminated by handler dispatch.

use crate::error::BusError;
use crate::future::{BoxFuture, FutureExt};
use crate::handler::HandlerLocator;
use crate::message::Message;
use crate::read_model::{ReadModelConverter, Reply};
use derivative::Derivative;
use std::sync::Arc;
use tracing::debug;

pub type BusMiddlewarePtr = Arc<dyn BusMiddleware + Send + Sync>;
pub type HandlerLocatorPtr = Arc<dyn HandlerLocator + Send + Sync>;
pub type ReadModelConverterPtr = Arc<dyn ReadModelConverter + Send + Sync>;

/// Intercepts messages passing through a bus. Call [Next::run] to continue the chain; the result
/// can be inspected or replaced before returning.
pub trait BusMiddleware {
    fn handle<'a>(
        &'a self,
        message: Message,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Reply, BusError>>;
}

/// Remainder of a bus chain.
pub struct Next<'a> {
    middleware: &'a [BusMiddlewarePtr],
    core: &'a BusCore,
}

impl<'a> Next<'a> {
    pub fn run(self, message: Message) -> BoxFuture<'a, Result<Reply, BusError>> {
        match self.middleware.split_first() {
            Some((current, rest)) => current.handle(
                message,
                Next {
                    middleware: rest,
                    core: self.core,
                },
            ),
            None => self.core.dispatch(message),
        }
    }
}

struct BusCore {
    locator: HandlerLocatorPtr,
    converter: Option<ReadModelConverterPtr>,
}

impl BusCore {
    fn dispatch(&self, message: Message) -> BoxFuture<'_, Result<Reply, BusError>> {
        async move {
            let message_type = message.name().to_string();
            let located = self.locator.locate(&message_type)?;

            debug!(%message_type, method = %located.method, "Dispatching message.");

            let reply = located.handler.invoke(&located.method, message).await?;
            match &self.converter {
                Some(converter) => converter.convert(&message_type, reply),
                None => Ok(reply),
            }
        }
        .boxed()
    }
}

/// A bus passing messages through its middleware and dispatching them to exactly one handler.
/// Buses with read model conversion (query buses) convert the handler result before it flows back
/// through the middleware.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct ServiceBus {
    #[derivative(Debug = "ignore")]
    middleware: Vec<BusMiddlewarePtr>,
    #[derivative(Debug = "ignore")]
    core: BusCore,
}

impl ServiceBus {
    pub fn builder(locator: HandlerLocatorPtr) -> ServiceBusBuilder {
        ServiceBusBuilder {
            locator,
            middleware: vec![],
            converter: None,
        }
    }

    pub fn handle(&self, message: Message) -> BoxFuture<'_, Result<Reply, BusError>> {
        Next {
            middleware: &self.middleware,
            core: &self.core,
        }
        .run(message)
    }

    #[inline]
    pub fn middleware_count(&self) -> usize {
        self.middleware.len()
    }

    #[inline]
    pub fn converts_read_models(&self) -> bool {
        self.core.converter.is_some()
    }
}

pub struct ServiceBusBuilder {
    locator: HandlerLocatorPtr,
    middleware: Vec<BusMiddlewarePtr>,
    converter: Option<ReadModelConverterPtr>,
}

impl ServiceBusBuilder {
    /// Appends middleware to the chain. Middleware is invoked in the order of addition.
    pub fn middleware(mut self, middleware: BusMiddlewarePtr) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Enables read model conversion after handler dispatch.
    pub fn read_model_conversion(mut self, converter: ReadModelConverterPtr) -> Self {
        self.converter = Some(converter);
        self
    }

    pub fn build(self) -> ServiceBus {
        ServiceBus {
            middleware: self.middleware,
            core: BusCore {
                locator: self.locator,
                converter: self.converter,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::bus::{BusMiddleware, Next, ServiceBus};
    use crate::error::BusError;
    use crate::future::{BoxFuture, FutureExt};
    use crate::handler::{InMemoryHandlerLocator, MessageHandler};
    use crate::message::Message;
    use crate::read_model::{MockReadModelConverter, Reply};
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl BusMiddleware for Recorder {
        fn handle<'a>(
            &'a self,
            message: Message,
            next: Next<'a>,
        ) -> BoxFuture<'a, Result<Reply, BusError>> {
            async move {
                self.log.lock().unwrap().push(format!("{} before", self.name));
                let reply = next.run(message).await;
                let converted = matches!(reply, Ok(Reply::Converted(_)));
                self.log
                    .lock()
                    .unwrap()
                    .push(format!("{} after converted={converted}", self.name));
                reply
            }
            .boxed()
        }
    }

    struct Echo {
        log: Arc<Mutex<Vec<String>>>,
    }

    impl MessageHandler for Echo {
        fn handle(&self, message: Message) -> BoxFuture<'_, Result<Reply, BusError>> {
            async move {
                self.log.lock().unwrap().push("handler".to_string());
                Ok(Reply::domain(message.payload::<u8>().copied().unwrap_or_default()))
            }
            .boxed()
        }
    }

    fn locator(log: &Arc<Mutex<Vec<String>>>) -> Arc<InMemoryHandlerLocator> {
        let mut handlers = InMemoryHandlerLocator::default();
        handlers.register("Echo", Arc::new(Echo { log: log.clone() }));
        Arc::new(handlers)
    }

    #[tokio::test]
    async fn should_run_middleware_in_order_before_dispatch() {
        let log = Arc::new(Mutex::new(vec![]));
        let bus = ServiceBus::builder(locator(&log))
            .middleware(Arc::new(Recorder {
                name: "first",
                log: log.clone(),
            }))
            .middleware(Arc::new(Recorder {
                name: "second",
                log: log.clone(),
            }))
            .build();

        let reply = bus.handle(Message::new("Echo", 5_u8)).await.unwrap();

        assert!(matches!(reply, Reply::Domain(_)));
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "first before",
                "second before",
                "handler",
                "second after converted=false",
                "first after converted=false"
            ]
        );
    }

    #[tokio::test]
    async fn should_convert_before_middleware_sees_result() {
        let log = Arc::new(Mutex::new(vec![]));

        let mut converter = MockReadModelConverter::new();
        converter
            .expect_convert()
            .withf(|query, _| query.to_string() == "Echo")
            .times(1)
            .returning(|_, reply| Ok(Reply::Converted(json!({"value": reply.into_value().unwrap()}))));

        let bus = ServiceBus::builder(locator(&log))
            .middleware(Arc::new(Recorder {
                name: "outer",
                log: log.clone(),
            }))
            .read_model_conversion(Arc::new(converter))
            .build();

        let reply = bus.handle(Message::new("Echo", 7_u8)).await.unwrap();

        assert_eq!(reply.into_value().unwrap(), json!({"value": 7}));
        assert_eq!(
            log.lock().unwrap().last().cloned(),
            Some("outer after converted=true".to_string())
        );
    }

    #[tokio::test]
    async fn should_report_missing_handler() {
        let bus = ServiceBus::builder(Arc::new(InMemoryHandlerLocator::default())).build();

        assert!(matches!(
            bus.handle(Message::new("Unknown", Value::Null)).await,
            Err(BusError::MissingHandler(name)) if name == "Unknown"
        ));
    }

    #[tokio::test]
    async fn should_reject_unknown_method() {
        let log = Arc::new(Mutex::new(vec![]));
        let mut handlers = InMemoryHandlerLocator::default();
        handlers.register_method("Echo", Arc::new(Echo { log }), "other");

        let bus = ServiceBus::builder(Arc::new(handlers)).build();

        assert!(matches!(
            bus.handle(Message::new("Echo", 1_u8)).await,
            Err(BusError::UnknownMethod { method, .. }) if method == "other"
        ));
    }
}
