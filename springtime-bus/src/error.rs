use crate::ErrorPtr;
use thiserror::Error;

/// Errors related to creating and dispatching messages.
#[derive(Error, Clone, Debug)]
pub enum BusError {
    #[error("Cannot create message \"{0}\" - no constructor has been registered for it.")]
    UnknownMessage(String),
    #[error("Cannot create message \"{message}\" from the given input: {source}")]
    InvalidInput {
        message: String,
        #[source]
        source: ErrorPtr,
    },
    #[error("No handler has been registered for message \"{0}\".")]
    MissingHandler(String),
    #[error("The handler of \"{message}\" does not expose method \"{method}\".")]
    UnknownMethod { message: String, method: String },
    #[error("Handler error: {0}")]
    Handler(#[source] ErrorPtr),
    #[error("Error converting read model of \"{message}\": {source}")]
    Conversion {
        message: String,
        #[source]
        source: ErrorPtr,
    },
    #[error("Bus component is not available: {0}")]
    Unavailable(#[source] ErrorPtr),
}
