//! A minimal service container, keyed by service id.
//!
//! Services are registered as *definitions* - constructors which get invoked lazily, the first
//! time a service is resolved through a [ServiceLocator]. Constructed instances are cached in their
//! definitions, so every service is effectively a singleton. Definitions can be aliased and marked
//! as public, which signals that they are meant to be reached from outside the application (e.g.
//! by the HTTP runtime).

use crate::error::ContainerError;
use derivative::Derivative;
use fxhash::{FxHashMap, FxHashSet};
use once_cell::sync::OnceCell;
use std::any::{type_name, Any};
use std::cell::RefCell;
use std::sync::Arc;
use tracing::debug;

type ServiceAnyPtr = Box<dyn Any + Send + Sync>;

type Constructor =
    Arc<dyn Fn(&ServiceLocator) -> Result<ServiceAnyPtr, ContainerError> + Send + Sync>;

thread_local! {
    // ids of services being constructed on this thread
    static RESOLVING: RefCell<Vec<String>> = RefCell::new(vec![]);
}

struct ResolvingGuard;

impl ResolvingGuard {
    fn enter(id: &str) -> Result<Self, ContainerError> {
        RESOLVING.with(|resolving| {
            let mut resolving = resolving.borrow_mut();
            if resolving.iter().any(|current| current == id) {
                return Err(ContainerError::CircularReference(id.to_string()));
            }

            resolving.push(id.to_string());
            Ok(Self)
        })
    }
}

impl Drop for ResolvingGuard {
    fn drop(&mut self) {
        RESOLVING.with(|resolving| {
            resolving.borrow_mut().pop();
        });
    }
}

/// Definition of a service registered in a [Container].
#[derive(Derivative)]
#[derivative(Debug)]
pub struct ServiceDefinition {
    pub id: String,

    /// Name of the type the service is exposed as.
    pub type_name: &'static str,

    #[derivative(Debug = "ignore")]
    constructor: Constructor,

    // holds an Arc<T> for the registered T
    #[derivative(Debug = "ignore")]
    instance: OnceCell<ServiceAnyPtr>,
}

impl ServiceDefinition {
    #[inline]
    pub fn is_constructed(&self) -> bool {
        self.instance.get().is_some()
    }

    fn instance(&self, locator: &ServiceLocator) -> Result<&ServiceAnyPtr, ContainerError> {
        if let Some(instance) = self.instance.get() {
            return Ok(instance);
        }

        let _guard = ResolvingGuard::enter(&self.id)?;
        self.instance.get_or_try_init(|| {
            debug!(id = %self.id, "Constructing service.");
            (self.constructor)(locator)
        })
    }
}

#[derive(Clone, Debug)]
struct Alias {
    target: String,
    public: bool,
}

/// Registry of service definitions and aliases. Cloning a container is cheap and shares already
/// constructed instances with the clone.
#[derive(Clone, Debug, Default)]
pub struct Container {
    definitions: FxHashMap<String, Arc<ServiceDefinition>>,
    aliases: FxHashMap<String, Alias>,
    public: FxHashSet<String>,
}

impl Container {
    /// Registers a service constructed on first use. The service can later be resolved as `T`.
    pub fn register<T, F>(&mut self, id: impl Into<String>, constructor: F) -> Result<(), ContainerError>
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&ServiceLocator) -> Result<Arc<T>, ContainerError> + Send + Sync + 'static,
    {
        let id = id.into();
        self.check_free(&id)?;

        debug!(%id, type_name = type_name::<T>(), "Registering service.");

        let definition = ServiceDefinition {
            id: id.clone(),
            type_name: type_name::<T>(),
            constructor: Arc::new(move |locator| {
                constructor(locator).map(|instance| Box::new(instance) as ServiceAnyPtr)
            }),
            instance: OnceCell::new(),
        };

        self.definitions.insert(id, Arc::new(definition));
        Ok(())
    }

    /// Registers an already existing instance.
    pub fn register_instance<T: ?Sized + Send + Sync + 'static>(
        &mut self,
        id: impl Into<String>,
        instance: Arc<T>,
    ) -> Result<(), ContainerError> {
        self.register(id, move |_| Ok(instance.clone()))
    }

    /// Makes `target` reachable under the `alias` id.
    pub fn set_alias(
        &mut self,
        alias: impl Into<String>,
        target: impl Into<String>,
        public: bool,
    ) -> Result<(), ContainerError> {
        let alias = alias.into();
        let target = target.into();

        self.check_free(&alias)?;
        if !self.has(&target) {
            return Err(ContainerError::MissingService(target));
        }

        self.aliases.insert(alias, Alias { target, public });
        Ok(())
    }

    /// Changes the visibility of a service or an alias.
    pub fn set_public(&mut self, id: &str, public: bool) -> Result<(), ContainerError> {
        if let Some(alias) = self.aliases.get_mut(id) {
            alias.public = public;
            return Ok(());
        }

        if !self.definitions.contains_key(id) {
            return Err(ContainerError::MissingService(id.to_string()));
        }

        if public {
            self.public.insert(id.to_string());
        } else {
            self.public.remove(id);
        }

        Ok(())
    }

    /// Checks if there's a service or an alias with given id.
    #[inline]
    pub fn has(&self, id: &str) -> bool {
        self.definitions.contains_key(id) || self.aliases.contains_key(id)
    }

    #[inline]
    pub fn is_alias(&self, id: &str) -> bool {
        self.aliases.contains_key(id)
    }

    /// Checks if a service or an alias is public. Aliases have their own visibility, independent
    /// of their targets.
    pub fn is_public(&self, id: &str) -> bool {
        self.aliases
            .get(id)
            .map(|alias| alias.public)
            .unwrap_or_else(|| self.public.contains(id))
    }

    /// Returns the definition behind given id, following aliases.
    pub fn definition(&self, id: &str) -> Option<&Arc<ServiceDefinition>> {
        self.definitions.get(self.canonical_id(id))
    }

    /// Returns the ids of all registered services (without aliases).
    pub fn service_ids(&self) -> impl Iterator<Item = &str> {
        self.definitions.keys().map(String::as_str)
    }

    /// Creates a locator for resolving services from a snapshot of this container.
    pub fn locator(&self) -> ServiceLocator {
        ServiceLocator {
            container: Arc::new(self.clone()),
        }
    }

    /// Shortcut for resolving a single service - see [ServiceLocator::resolve].
    pub fn resolve<T: ?Sized + Send + Sync + 'static>(
        &self,
        id: &str,
    ) -> Result<Arc<T>, ContainerError> {
        self.locator().resolve(id)
    }

    fn canonical_id<'a>(&'a self, mut id: &'a str) -> &'a str {
        while let Some(alias) = self.aliases.get(id) {
            id = &alias.target;
        }

        id
    }

    fn check_free(&self, id: &str) -> Result<(), ContainerError> {
        if self.has(id) {
            Err(ContainerError::DuplicateServiceId(id.to_string()))
        } else {
            Ok(())
        }
    }
}

/// Resolves services from a [Container] snapshot, constructing them on first use.
#[derive(Clone, Debug)]
pub struct ServiceLocator {
    container: Arc<Container>,
}

impl ServiceLocator {
    /// Returns the service with given id (or alias) as `T`, which needs to be the same type the
    /// service has been registered with.
    pub fn resolve<T: ?Sized + Send + Sync + 'static>(
        &self,
        id: &str,
    ) -> Result<Arc<T>, ContainerError> {
        let definition = self
            .container
            .definition(id)
            .ok_or_else(|| ContainerError::MissingService(id.to_string()))?;

        definition
            .instance(self)?
            .downcast_ref::<Arc<T>>()
            .cloned()
            .ok_or_else(|| ContainerError::IncompatibleService {
                id: id.to_string(),
                expected: type_name::<T>(),
            })
    }

    #[inline]
    pub fn has(&self, id: &str) -> bool {
        self.container.has(id)
    }
}
