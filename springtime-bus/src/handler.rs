//! Message handlers and their lookup.

use crate::error::BusError;
use crate::future::{BoxFuture, FutureExt};
use crate::message::Message;
use crate::read_model::Reply;
use fxhash::FxHashMap;
use std::sync::Arc;

/// Name of the method invoked when a handler binding doesn't specify one.
pub const DEFAULT_METHOD: &str = "handle";

pub type MessageHandlerPtr = Arc<dyn MessageHandler + Send + Sync>;

/// Handles messages of one or more types. Every message type is handled by exactly one handler
/// per bus.
pub trait MessageHandler {
    fn handle(&self, message: Message) -> BoxFuture<'_, Result<Reply, BusError>>;

    /// Invokes a named entry point of this handler. Handlers bound with a method other than
    /// [DEFAULT_METHOD] need to override this.
    fn invoke(&self, method: &str, message: Message) -> BoxFuture<'_, Result<Reply, BusError>> {
        if method == DEFAULT_METHOD {
            return self.handle(message);
        }

        let error = BusError::UnknownMethod {
            message: message.name().to_string(),
            method: method.to_string(),
        };

        async move { Err(error) }.boxed()
    }
}

/// A handler located for a given message type, along with the method to invoke.
#[derive(Clone)]
pub struct LocatedHandler {
    pub handler: MessageHandlerPtr,
    pub method: String,
}

/// Finds handlers for message types.
pub trait HandlerLocator {
    fn locate(&self, message_type: &str) -> Result<LocatedHandler, BusError>;
}

/// [HandlerLocator] with handlers registered up-front.
#[derive(Clone, Default)]
pub struct InMemoryHandlerLocator {
    handlers: FxHashMap<String, LocatedHandler>,
}

impl InMemoryHandlerLocator {
    /// Registers a handler invoked with [DEFAULT_METHOD]. Last registration wins.
    pub fn register(&mut self, message_type: impl Into<String>, handler: MessageHandlerPtr) {
        self.register_method(message_type, handler, DEFAULT_METHOD);
    }

    pub fn register_method(
        &mut self,
        message_type: impl Into<String>,
        handler: MessageHandlerPtr,
        method: impl Into<String>,
    ) {
        self.handlers.insert(
            message_type.into(),
            LocatedHandler {
                handler,
                method: method.into(),
            },
        );
    }
}

impl HandlerLocator for InMemoryHandlerLocator {
    fn locate(&self, message_type: &str) -> Result<LocatedHandler, BusError> {
        self.handlers
            .get(message_type)
            .cloned()
            .ok_or_else(|| BusError::MissingHandler(message_type.to_string()))
    }
}
