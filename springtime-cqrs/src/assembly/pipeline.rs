//! HTTP middleware pipeline assembly: built-in middleware registration, priority merging with user
//! middleware and the content negotiation setup.

use crate::assembly::priorities::{flatten_middleware, MiddlewareRef, Prioritized, Priorities};
use crate::assembly::ServiceIds;
use crate::config::{AllowedFormat, AssemblyConfig};
use crate::container::{Container, ServiceLocator};
use crate::declaration::{FormatterDeclaration, MiddlewareDeclaration};
use crate::error::ContainerError;
use crate::http::body::BodyParams;
use crate::http::error::ErrorConversion;
use crate::http::middleware::{Middleware, MiddlewarePtr};
use crate::http::negotiation::{ContentNegotiation, ContentNegotiationDescriptor, Formatter};
use crate::http::routing::{
    Dispatch, ImplicitHead, ImplicitOptions, MethodNotAllowed, MissingRouteDispatching,
    RouteMatching, RouteParamsExtraction, Router,
};
use indexmap::IndexMap;
use std::sync::Arc;
use tracing::{debug, warn};

const DEFAULT_CHARSET: &str = "UTF-8";

type MiddlewareFactory = fn(&ServiceIds, &ServiceLocator) -> Result<MiddlewarePtr, ContainerError>;

fn router(ids: &ServiceIds, locator: &ServiceLocator) -> Result<Arc<Router>, ContainerError> {
    locator.resolve::<Router>(&ids.router())
}

// name, priority band, factory - in pipeline order within each band
const BUILT_IN: [(&str, i32, MiddlewareFactory); 9] = [
    ("error_conversion", Priorities::ERROR_CONVERSION, |_, _| {
        Ok(Arc::new(ErrorConversion) as MiddlewarePtr)
    }),
    ("route_matching", Priorities::BEFORE_CUSTOM, |ids, locator| {
        Ok(Arc::new(RouteMatching::new(router(ids, locator)?)) as MiddlewarePtr)
    }),
    ("body_params", Priorities::BEFORE_CUSTOM, |_, _| {
        Ok(Arc::new(BodyParams) as MiddlewarePtr)
    }),
    ("implicit_head", Priorities::AFTER_CUSTOM, |ids, locator| {
        Ok(Arc::new(ImplicitHead::new(router(ids, locator)?)) as MiddlewarePtr)
    }),
    ("implicit_options", Priorities::AFTER_CUSTOM, |_, _| {
        Ok(Arc::new(ImplicitOptions) as MiddlewarePtr)
    }),
    ("method_not_allowed", Priorities::AFTER_CUSTOM, |_, _| {
        Ok(Arc::new(MethodNotAllowed) as MiddlewarePtr)
    }),
    ("route_params", Priorities::AFTER_CUSTOM, |_, _| {
        Ok(Arc::new(RouteParamsExtraction) as MiddlewarePtr)
    }),
    ("dispatch", Priorities::AFTER_CUSTOM, |ids, locator| {
        Ok(Arc::new(Dispatch::new(router(ids, locator)?)) as MiddlewarePtr)
    }),
    ("missing_route", Priorities::AFTER_CUSTOM, |_, _| {
        Ok(Arc::new(MissingRouteDispatching) as MiddlewarePtr)
    }),
];

const CONTENT_NEGOTIATION: &str = "content_negotiation";

/// Builds the content negotiation setup. Declared formatters are used exclusively when there are
/// any; otherwise the configured default formatters apply. Formats with a formatter, but missing
/// from the allowed formats, become negotiable with the default charset.
pub fn negotiation_descriptor(
    config: &AssemblyConfig,
    formatters: &[FormatterDeclaration],
) -> ContentNegotiationDescriptor {
    let mapping: IndexMap<String, String> = if formatters.is_empty() {
        config
            .default_formatters
            .iter()
            .map(|mapping| (mapping.format.clone(), mapping.formatter.clone()))
            .collect()
    } else {
        formatters
            .iter()
            .map(|formatter| (formatter.format.clone(), formatter.service_id.clone()))
            .collect()
    };

    let mut formats: Vec<AllowedFormat> = vec![];
    for allowed in &config.allowed_formats {
        if mapping.contains_key(&allowed.format) {
            formats.push(allowed.clone());
        } else {
            warn!(format = %allowed.format, "Skipping allowed format without a formatter.");
        }
    }

    for format in mapping.keys() {
        if !formats.iter().any(|allowed| &allowed.format == format) {
            formats.push(AllowedFormat::new(format.clone(), DEFAULT_CHARSET));
        }
    }

    ContentNegotiationDescriptor {
        formats,
        formatters: mapping,
    }
}

fn register_middleware(
    container: &mut Container,
    id: String,
    factory: impl Fn(&ServiceLocator) -> Result<MiddlewarePtr, ContainerError> + Send + Sync + 'static,
) -> Result<String, ContainerError> {
    container.register::<dyn Middleware + Send + Sync, _>(id.clone(), factory)?;
    Ok(id)
}

/// Registers built-in middleware services and merges them with user middleware. Built-ins are
/// placed after user middleware of the same priority. Returns the global pipeline order and the
/// per-path view.
pub fn assemble_pipeline(
    container: &mut Container,
    ids: &ServiceIds,
    middleware: &[MiddlewareDeclaration],
    negotiation: &ContentNegotiationDescriptor,
) -> Result<(Vec<MiddlewareRef>, IndexMap<String, Vec<String>>), ContainerError> {
    let mut prioritized: Prioritized<MiddlewareRef> = middleware
        .iter()
        .map(|middleware| {
            (
                middleware.priority,
                MiddlewareRef::new(middleware.service_id.clone(), middleware.path.clone()),
            )
        })
        .collect();

    let descriptor = negotiation.clone();
    let id = register_middleware(container, ids.middleware(CONTENT_NEGOTIATION), move |locator| {
        let formats = descriptor
            .formats
            .iter()
            .filter_map(|allowed| {
                descriptor
                    .formatter(&allowed.format)
                    .map(|formatter| (allowed, formatter))
            })
            .map(|(allowed, formatter)| {
                locator
                    .resolve::<dyn Formatter + Send + Sync>(formatter)
                    .map(|formatter| (allowed.clone(), formatter))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Arc::new(ContentNegotiation::new(formats)) as MiddlewarePtr)
    })?;
    prioritized.push(Priorities::CONTENT_NEGOTIATION, MiddlewareRef::global(id));

    for (name, priority, factory) in BUILT_IN {
        let factory_ids = ids.clone();
        let id = register_middleware(container, ids.middleware(name), move |locator| {
            factory(&factory_ids, locator)
        })?;

        prioritized.push(priority, MiddlewareRef::global(id));
    }

    let (pipeline, by_path) = flatten_middleware(prioritized);
    debug!(
        middleware = pipeline.len(),
        paths = by_path.len(),
        "Assembled middleware pipeline."
    );

    Ok((pipeline, by_path))
}
