//! Command and query bus primitives used by *Springtime* CQRS applications.
//!
//! A bus accepts a [Message](message::Message), passes it through an ordered list of
//! [BusMiddleware](bus::BusMiddleware) and finally dispatches it to exactly one
//! [MessageHandler](handler::MessageHandler). Query buses additionally convert the handler result
//! into a wire-ready read model with a [ReadModelConverter](read_model::ReadModelConverter).
//!
//! ### Simple usage example
//!
//! ```
//! use springtime_bus::bus::ServiceBus;
//! use springtime_bus::error::BusError;
//! use springtime_bus::future::{BoxFuture, FutureExt};
//! use springtime_bus::handler::{InMemoryHandlerLocator, MessageHandler};
//! use springtime_bus::message::Message;
//! use springtime_bus::read_model::Reply;
//! use std::sync::Arc;
//!
//! struct Greeter;
//!
//! impl MessageHandler for Greeter {
//!     fn handle(&self, message: Message) -> BoxFuture<'_, Result<Reply, BusError>> {
//!         async move {
//!             let name = message.payload::<String>().cloned().unwrap_or_default();
//!             Ok(Reply::domain(format!("Hello {name}!")))
//!         }
//!         .boxed()
//!     }
//! }
//!
//! let mut handlers = InMemoryHandlerLocator::default();
//! handlers.register("Greet", Arc::new(Greeter));
//!
//! let bus = ServiceBus::builder(Arc::new(handlers)).build();
//! let reply = futures::executor::block_on(bus.handle(Message::new("Greet", "world".to_string())));
//! assert!(reply.is_ok());
//! ```

pub mod bus;
pub mod error;
pub mod handler;
pub mod input;
pub mod message;
pub mod read_model;

pub use futures::future;

use std::error::Error;
use std::sync::Arc;

/// Type-erased error shared between the bus and its collaborators.
pub type ErrorPtr = Arc<dyn Error + Send + Sync>;
