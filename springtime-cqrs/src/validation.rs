//! Validation of assembled applications.

use crate::assembly::ServiceIds;
use crate::container::Container;
use crate::error::AssemblyError;
use derive_more::Constructor;

/// Checks that the entrypoints of an application are public services, so they can be reached from
/// outside the container.
#[derive(Constructor, Clone, Debug)]
pub struct ValidateApplicationComponents {
    application: String,
}

impl ValidateApplicationComponents {
    pub fn process(&self, container: &Container) -> Result<(), AssemblyError> {
        let ids = ServiceIds::new(self.application.clone());

        for id in [ids.application(), ids.http()] {
            if !container.has(&id) || !container.is_public(&id) {
                return Err(AssemblyError::EntrypointNotPubliclyReachable {
                    application: self.application.clone(),
                });
            }
        }

        Ok(())
    }
}
