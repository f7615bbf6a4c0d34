//! Handler results and their conversion into read models.
//!
//! Query handlers usually return domain objects, which are not meant to leave the application
//! as-is. The query bus always finishes with a conversion step, which turns such results into
//! wire-ready representations using the primary [ReadModelConverter].

use crate::error::BusError;
use crate::ErrorPtr;
#[cfg(test)]
use mockall::automock;
use serde::Serialize;
use serde_json::Value;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// A value which can be turned into a wire-ready read model.
pub trait ReadModel: Send + Sync {
    fn to_value(&self) -> Result<Value, ErrorPtr>;
}

impl<T: Serialize + Send + Sync> ReadModel for T {
    fn to_value(&self) -> Result<Value, ErrorPtr> {
        serde_json::to_value(self).map_err(|error| Arc::new(error) as ErrorPtr)
    }
}

/// Result of handling a message.
pub enum Reply {
    /// The handler produced no result - typical for commands.
    Empty,
    /// A domain result, not yet converted into a read model.
    Domain(Box<dyn ReadModel>),
    /// A wire-ready read model.
    Converted(Value),
}

impl Reply {
    pub fn domain<T: ReadModel + 'static>(value: T) -> Self {
        Self::Domain(Box::new(value))
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Returns the wire representation of this reply, converting domain results on the fly.
    pub fn into_value(self) -> Result<Value, ErrorPtr> {
        match self {
            Self::Empty => Ok(Value::Null),
            Self::Domain(value) => value.to_value(),
            Self::Converted(value) => Ok(value),
        }
    }
}

impl Debug for Reply {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Domain(_) => f.write_str("Domain(..)"),
            Self::Converted(value) => f.debug_tuple("Converted").field(value).finish(),
        }
    }
}

/// Converts query results into read models.
#[cfg_attr(test, automock)]
pub trait ReadModelConverter {
    /// Converts the `reply` produced for a query named `query`.
    fn convert(&self, query: &str, reply: Reply) -> Result<Reply, BusError>;
}

/// Default [ReadModelConverter] - serializes domain results with `serde`.
#[derive(Copy, Clone, Debug, Default)]
pub struct SerializingConverter;

impl ReadModelConverter for SerializingConverter {
    fn convert(&self, query: &str, reply: Reply) -> Result<Reply, BusError> {
        match reply {
            Reply::Domain(value) => {
                value
                    .to_value()
                    .map(Reply::Converted)
                    .map_err(|source| BusError::Conversion {
                        message: query.to_string(),
                        source,
                    })
            }
            reply => Ok(reply),
        }
    }
}
