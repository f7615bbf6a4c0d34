//! Default application components, registered only when the container doesn't already provide
//! them.

use crate::assembly::bus::READ_MODEL_CONVERTER;
use crate::assembly::ServiceIds;
use crate::config::JSON_FORMATTER;
use crate::container::Container;
use crate::error::ContainerError;
use crate::http::negotiation::{Formatter, JsonFormatter};
use crate::identifier::{IdentifierGenerator, UuidGenerator, IDENTIFIER_GENERATOR};
use springtime_bus::message::{MessageCreator, NamedConstructor};
use springtime_bus::read_model::{ReadModelConverter, SerializingConverter};
use std::sync::Arc;
use tracing::debug;

fn register_missing<T: ?Sized + Send + Sync + 'static>(
    container: &mut Container,
    id: &str,
    instance: Arc<T>,
) -> Result<(), ContainerError> {
    if container.has(id) {
        debug!(%id, "Keeping existing component.");
        return Ok(());
    }

    container.register_instance(id, instance)
}

/// Registers the identifier generator, read model converter and JSON formatter shared by all
/// applications, and the message creator of the application with given ids.
pub fn register_defaults(
    container: &mut Container,
    ids: &ServiceIds,
    messages: &NamedConstructor,
) -> Result<(), ContainerError> {
    register_missing::<dyn IdentifierGenerator + Send + Sync>(
        container,
        IDENTIFIER_GENERATOR,
        Arc::new(UuidGenerator),
    )?;
    register_missing::<dyn ReadModelConverter + Send + Sync>(
        container,
        READ_MODEL_CONVERTER,
        Arc::new(SerializingConverter),
    )?;
    register_missing::<dyn Formatter + Send + Sync>(
        container,
        JSON_FORMATTER,
        Arc::new(JsonFormatter),
    )?;
    register_missing::<dyn MessageCreator + Send + Sync>(
        container,
        &ids.message_creator(),
        Arc::new(messages.clone()),
    )
}
