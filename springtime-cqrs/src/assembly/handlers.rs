//! Compilation of validated routes into request handler services, the router and URI generation.

use crate::assembly::routes::RouteSpec;
use crate::assembly::ServiceIds;
use crate::container::{Container, ServiceLocator};
use crate::declaration::Behavior;
use crate::error::ContainerError;
use crate::http::action::{ExecuteCommand, ExecuteQuery, MessageCreatorPtr};
use crate::http::handler::{
    CreateAndFetch, CreateOnly, ExecuteAndFetch, ExecuteOnly, FetchOnly, LazyRequestHandler,
    RequestHandler, RequestHandlerPtr,
};
use crate::http::routing::{Route, RouteCollector, Router, UriGenerator, UriGeneratorPtr};
use crate::identifier::{IdentifierGenerator, IdentifierGeneratorPtr, IDENTIFIER_GENERATOR};
use springtime_bus::bus::ServiceBus;
use springtime_bus::message::MessageCreator;
use std::sync::Arc;
use tracing::debug;

struct Actions<'a> {
    ids: &'a ServiceIds,
    locator: &'a ServiceLocator,
}

impl<'a> Actions<'a> {
    fn creator(&self) -> Result<MessageCreatorPtr, ContainerError> {
        self.locator
            .resolve::<dyn MessageCreator + Send + Sync>(&self.ids.message_creator())
    }

    fn write(&self, command: &str) -> Result<ExecuteCommand, ContainerError> {
        Ok(ExecuteCommand::new(
            self.locator.resolve::<ServiceBus>(&self.ids.command_bus())?,
            self.creator()?,
            command,
        ))
    }

    fn read(&self, query: &str) -> Result<ExecuteQuery, ContainerError> {
        Ok(ExecuteQuery::new(
            self.locator.resolve::<ServiceBus>(&self.ids.query_bus())?,
            self.creator()?,
            query,
        ))
    }

    fn uri(&self) -> Result<UriGeneratorPtr, ContainerError> {
        self.locator
            .resolve::<dyn UriGenerator + Send + Sync>(&self.ids.uri_generator())
    }

    fn identifier(&self) -> Result<IdentifierGeneratorPtr, ContainerError> {
        self.locator
            .resolve::<dyn IdentifierGenerator + Send + Sync>(IDENTIFIER_GENERATOR)
    }
}

type HandlerFactory =
    Box<dyn Fn(&ServiceLocator) -> Result<RequestHandlerPtr, ContainerError> + Send + Sync>;

fn factory<F>(ids: &ServiceIds, build: F) -> HandlerFactory
where
    F: Fn(&Actions) -> Result<RequestHandlerPtr, ContainerError> + Send + Sync + 'static,
{
    let ids = ids.clone();
    Box::new(move |locator: &ServiceLocator| build(&Actions { ids: &ids, locator }))
}

/// Returns the request handler factory of a route backed by the buses, or `None` for routes
/// handled by their declaring service.
fn handler_factory(ids: &ServiceIds, route: &RouteSpec) -> Option<HandlerFactory> {
    let is_async = route.is_async;

    let handler = match route.behavior.clone() {
        Behavior::Fetch { query } => factory(ids, move |actions| {
            Ok(Arc::new(FetchOnly::new(actions.read(&query)?)) as RequestHandlerPtr)
        }),
        Behavior::Create {
            command,
            redirect_to,
        } => factory(ids, move |actions| {
            Ok(Arc::new(CreateOnly::new(
                actions.write(&command)?,
                actions.uri()?,
                actions.identifier()?,
                redirect_to.clone(),
                is_async,
            )) as RequestHandlerPtr)
        }),
        Behavior::CreateAndFetch {
            command,
            query,
            redirect_to,
        } => factory(ids, move |actions| {
            Ok(Arc::new(CreateAndFetch::new(
                actions.write(&command)?,
                actions.read(&query)?,
                actions.uri()?,
                actions.identifier()?,
                redirect_to.clone(),
                is_async,
            )) as RequestHandlerPtr)
        }),
        Behavior::Execute { command } => factory(ids, move |actions| {
            Ok(Arc::new(ExecuteOnly::new(actions.write(&command)?, is_async)) as RequestHandlerPtr)
        }),
        Behavior::ExecuteAndFetch { command, query } => factory(ids, move |actions| {
            Ok(Arc::new(ExecuteAndFetch::new(
                actions.write(&command)?,
                actions.read(&query)?,
            )) as RequestHandlerPtr)
        }),
        Behavior::None => return None,
    };

    Some(handler)
}

/// Registers a request handler service per route, followed by the URI generator and the router.
/// Routes without a behavior are handled by the declaring service itself, which gets aliased under
/// the route handler id. Returns the routes in declaration order.
pub fn compile_routes(
    container: &mut Container,
    ids: &ServiceIds,
    routes: &[RouteSpec],
) -> Result<Arc<RouteCollector>, ContainerError> {
    let mut compiled = Vec::with_capacity(routes.len());

    for route in routes {
        let handler_id = ids.route(&route.name);

        match handler_factory(ids, route) {
            Some(handler) => {
                container
                    .register::<dyn RequestHandler + Send + Sync, _>(handler_id.clone(), handler)?;
            }
            None => container.set_alias(handler_id.clone(), route.service_id.clone(), false)?,
        }

        debug!(
            route = %route.name,
            path = %route.path,
            behavior = %route.behavior.kind(),
            handler = %handler_id,
            "Compiled route."
        );

        compiled.push(Route {
            name: route.name.clone(),
            path: route.path.clone(),
            methods: route.resolved_methods(),
            behavior: route.behavior.kind(),
            handler_id,
            service_id: route.service_id.clone(),
        });
    }

    let collector = Arc::new(RouteCollector::new(compiled));

    container.register_instance::<dyn UriGenerator + Send + Sync>(
        ids.uri_generator(),
        collector.clone(),
    )?;

    let router_routes = collector.clone();
    container.register::<Router, _>(ids.router(), move |locator| {
        let handlers = router_routes
            .routes()
            .iter()
            .map(|route| {
                Arc::new(LazyRequestHandler::new(
                    route.handler_id.clone(),
                    locator.clone(),
                )) as RequestHandlerPtr
            })
            .collect();

        Ok(Arc::new(Router::new(router_routes.clone(), handlers)))
    })?;

    Ok(collector)
}
