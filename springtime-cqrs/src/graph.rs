//! The assembled application.

use crate::assembly::bus::BusDescriptor;
use crate::assembly::priorities::MiddlewareRef;
use crate::container::ServiceLocator;
use crate::http::error::problem_response;
use crate::http::middleware::{LazyMiddleware, MiddlewarePipe, PathMiddlewareDecorator};
use crate::http::negotiation::{render_problem, ContentNegotiationDescriptor};
use crate::http::routing::RouteCollector;
use crate::http::{HttpRequest, HttpResponse};
use derivative::Derivative;
use indexmap::IndexMap;
use springtime_bus::bus::ServiceBus;
use springtime_bus::error::BusError;
use springtime_bus::message::Message;
use springtime_bus::read_model::Reply;
use std::sync::Arc;

/// Structure of an assembled application: routes, middleware order, buses and content
/// negotiation. Two assemblies of the same declarations produce equal layouts.
#[derive(Clone, Debug, PartialEq)]
pub struct ApplicationLayout {
    pub name: String,
    pub route_collector: Arc<RouteCollector>,
    /// Global pipeline order.
    pub middleware: Vec<MiddlewareRef>,
    /// Middleware service ids per path prefix, in pipeline order.
    pub middleware_by_path: IndexMap<String, Vec<String>>,
    pub command_bus: BusDescriptor,
    pub query_bus: BusDescriptor,
    pub content_negotiation: ContentNegotiationDescriptor,
}

/// An assembled application, ready to handle requests and submit messages. Components are
/// resolved from the container on first use.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct ApplicationGraph {
    layout: ApplicationLayout,
    #[derivative(Debug = "ignore")]
    pipe: MiddlewarePipe,
    #[derivative(Debug = "ignore")]
    locator: ServiceLocator,
}

impl ApplicationGraph {
    pub fn new(layout: ApplicationLayout, locator: ServiceLocator) -> Self {
        let pipe = MiddlewarePipe::new(
            layout
                .middleware
                .iter()
                .map(|middleware| {
                    PathMiddlewareDecorator::decorate(
                        &middleware.path,
                        Arc::new(LazyMiddleware::new(
                            middleware.service_id.clone(),
                            locator.clone(),
                        )),
                    )
                })
                .collect(),
        );

        Self {
            layout,
            pipe,
            locator,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.layout.name
    }

    #[inline]
    pub fn layout(&self) -> &ApplicationLayout {
        &self.layout
    }

    #[inline]
    pub fn route_collector(&self) -> &Arc<RouteCollector> {
        &self.layout.route_collector
    }

    #[inline]
    pub fn middleware(&self) -> &[MiddlewareRef] {
        &self.layout.middleware
    }

    #[inline]
    pub fn middleware_by_path(&self) -> &IndexMap<String, Vec<String>> {
        &self.layout.middleware_by_path
    }

    #[inline]
    pub fn command_bus(&self) -> &BusDescriptor {
        &self.layout.command_bus
    }

    #[inline]
    pub fn query_bus(&self) -> &BusDescriptor {
        &self.layout.query_bus
    }

    #[inline]
    pub fn content_negotiation(&self) -> &ContentNegotiationDescriptor {
        &self.layout.content_negotiation
    }

    /// Passes the request through the middleware pipeline. Errors escaping the pipeline become
    /// problem responses.
    pub async fn handle(&self, request: HttpRequest) -> HttpResponse {
        match self.pipe.handle(request).await {
            Ok(response) => response,
            Err(error) => render_problem(problem_response(&error)),
        }
    }

    /// Submits a command to the command bus.
    pub async fn submit_command(&self, message: Message) -> Result<Reply, BusError> {
        self.submit(&self.layout.command_bus, message).await
    }

    /// Submits a query to the query bus, returning the converted read model.
    pub async fn submit_query(&self, message: Message) -> Result<Reply, BusError> {
        self.submit(&self.layout.query_bus, message).await
    }

    async fn submit(&self, bus: &BusDescriptor, message: Message) -> Result<Reply, BusError> {
        let bus = self
            .locator
            .resolve::<ServiceBus>(&bus.id)
            .map_err(|error| BusError::Unavailable(Arc::new(error)))?;

        bus.handle(message).await
    }
}
