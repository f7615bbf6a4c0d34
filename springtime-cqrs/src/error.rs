use springtime_bus::ErrorPtr;
use thiserror::Error;

/// Errors related to registering and constructing services.
#[derive(Error, Clone, Debug)]
pub enum ContainerError {
    #[error("Attempted to register a duplicated service with id: {0}")]
    DuplicateServiceId(String),
    #[error("Cannot find service: {0}")]
    MissingService(String),
    #[error("Service \"{id}\" cannot be used as {expected}")]
    IncompatibleService { id: String, expected: &'static str },
    #[error("Circular reference detected while constructing service: {0}")]
    CircularReference(String),
    #[error("Error constructing service \"{id}\": {source}")]
    Construction {
        id: String,
        #[source]
        source: ErrorPtr,
    },
}

/// Errors aborting an application assembly pass. None of them are recoverable - they describe an
/// invalid application definition.
#[derive(Error, Clone, Debug)]
pub enum AssemblyError {
    #[error("The route declared by \"{service_id}\" is missing required arguments: {}.", .missing.join(", "))]
    IncompleteRouteSpec {
        service_id: String,
        missing: Vec<String>,
    },
    #[error("The route declared by \"{service_id}\" uses an invalid HTTP method: {method}")]
    InvalidRouteMethod { service_id: String, method: String },
    #[error("The service \"{second}\" is trying to declare a route with name \"{route_name}\" which has already been defined by the service \"{first}\".")]
    DuplicateRouteName {
        route_name: String,
        first: String,
        second: String,
    },
    #[error("You must specify the \"handles\" argument of the {bus} bus handler \"{service_id}\".")]
    IncompleteHandlerSpec { service_id: String, bus: String },
    #[error("The application \"{application}\" has already been registered in this container.")]
    MultipleApplicationRegistration { application: String },
    #[error("The HTTP interface for \"{application}\" is not a public service.")]
    EntrypointNotPubliclyReachable { application: String },
    #[error("Container error: {0}")]
    Container(#[from] ContainerError),
}
