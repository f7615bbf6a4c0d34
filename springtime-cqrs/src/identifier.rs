//! Identifier generation for resources created through `create` routes.

#[cfg(test)]
use mockall::automock;
use uuid::Uuid;

/// Service id of the default identifier generator.
pub const IDENTIFIER_GENERATOR: &str = "identifier_generator";

pub type IdentifierGeneratorPtr = std::sync::Arc<dyn IdentifierGenerator + Send + Sync>;

/// Generates identifiers for resources about to be created. The identifier is passed to the
/// command as the `generated_id` input attribute and used to compute the `Location` of the new
/// resource.
#[cfg_attr(test, automock)]
pub trait IdentifierGenerator {
    fn generate(&self) -> String;
}

/// Default generator - random (v4) UUIDs.
#[derive(Copy, Clone, Debug, Default)]
pub struct UuidGenerator;

impl IdentifierGenerator for UuidGenerator {
    fn generate(&self) -> String {
        Uuid::new_v4().to_string()
    }
}
