//! Named routes, URI generation and the routing middleware.
//!
//! Route paths consist of literal segments and `{name}` placeholders, each matching exactly one
//! non-empty path segment.

use crate::declaration::BehaviorKind;
use crate::http::error::HttpError;
use crate::http::handler::RequestHandlerPtr;
use crate::http::middleware::{Middleware, Next};
use crate::http::{empty_response, HttpRequest, HttpResponse, RouteParams, UnformattedContent};
use axum::body::Bytes;
use axum::http::header::ALLOW;
use axum::http::{HeaderValue, Method, StatusCode};
use derivative::Derivative;
use fxhash::FxHashMap;
use itertools::Itertools;
#[cfg(test)]
use mockall::automock;
use springtime_bus::future::{BoxFuture, FutureExt};
use std::sync::Arc;

/// A route registered in the router.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Route {
    pub name: String,
    pub path: String,
    pub methods: Vec<Method>,
    pub behavior: BehaviorKind,
    /// Id of the request handler service.
    pub handler_id: String,
    /// Id of the service which declared the route.
    pub service_id: String,
}

fn placeholder(segment: &str) -> Option<&str> {
    segment.strip_prefix('{')?.strip_suffix('}')
}

impl Route {
    /// Matches `path` against this route, returning extracted parameters on success.
    pub fn match_path(&self, path: &str) -> Option<FxHashMap<String, String>> {
        let mut params = FxHashMap::default();
        let mut pattern = self.path.split('/');
        let mut segments = path.split('/');

        loop {
            match (pattern.next(), segments.next()) {
                (None, None) => return Some(params),
                (Some(expected), Some(segment)) => match placeholder(expected) {
                    Some(name) if !segment.is_empty() => {
                        params.insert(name.to_string(), segment.to_string());
                    }
                    Some(_) => return None,
                    None if expected == segment => {}
                    None => return None,
                },
                _ => return None,
            }
        }
    }

    #[inline]
    pub fn allows(&self, method: &Method) -> bool {
        self.methods.contains(method)
    }
}

/// Generates paths of named routes.
#[cfg_attr(test, automock)]
pub trait UriGenerator {
    /// Generates the path of `route`, substituting its placeholders with `params`.
    fn generate_relative_path(
        &self,
        route: &str,
        params: &FxHashMap<String, String>,
    ) -> Result<String, HttpError>;
}

pub type UriGeneratorPtr = Arc<dyn UriGenerator + Send + Sync>;

/// Outcome of matching a request against the routes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RouteResult {
    Matched {
        /// Position of the route in the collector.
        index: usize,
        params: FxHashMap<String, String>,
    },
    /// The path matched, but none of the routes allows the method.
    MethodFailure { allowed: Vec<Method> },
    NotFound,
}

/// Ordered collection of all routes of an application.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RouteCollector {
    routes: Vec<Route>,
}

impl RouteCollector {
    pub fn new(routes: Vec<Route>) -> Self {
        Self { routes }
    }

    #[inline]
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn route(&self, name: &str) -> Option<&Route> {
        self.routes.iter().find(|route| route.name == name)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Finds the first route matching both the path and the method.
    pub fn match_request(&self, method: &Method, path: &str) -> RouteResult {
        let mut allowed = vec![];

        for (index, route) in self.routes.iter().enumerate() {
            if let Some(params) = route.match_path(path) {
                if route.allows(method) {
                    return RouteResult::Matched { index, params };
                }

                allowed.extend(route.methods.iter().cloned());
            }
        }

        if allowed.is_empty() {
            RouteResult::NotFound
        } else {
            RouteResult::MethodFailure {
                allowed: allowed.into_iter().unique().collect(),
            }
        }
    }
}

impl UriGenerator for RouteCollector {
    fn generate_relative_path(
        &self,
        route: &str,
        params: &FxHashMap<String, String>,
    ) -> Result<String, HttpError> {
        let definition = self.route(route).ok_or_else(|| HttpError::UriGeneration {
            route: route.to_string(),
            reason: "route not found".to_string(),
        })?;

        definition
            .path
            .split('/')
            .map(|segment| match placeholder(segment) {
                Some(name) => params.get(name).cloned().ok_or_else(|| {
                    HttpError::UriGeneration {
                        route: route.to_string(),
                        reason: format!("missing parameter \"{name}\""),
                    }
                }),
                None => Ok(segment.to_string()),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(|segments| segments.join("/"))
    }
}

/// Routes with their request handlers.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Router {
    routes: Arc<RouteCollector>,
    #[derivative(Debug = "ignore")]
    handlers: Vec<RequestHandlerPtr>,
}

impl Router {
    /// Creates a router with one handler per route, in route order.
    pub fn new(routes: Arc<RouteCollector>, handlers: Vec<RequestHandlerPtr>) -> Self {
        Self { routes, handlers }
    }

    #[inline]
    pub fn route_collector(&self) -> &Arc<RouteCollector> {
        &self.routes
    }

    #[inline]
    pub fn handler(&self, index: usize) -> Option<&RequestHandlerPtr> {
        self.handlers.get(index)
    }

    #[inline]
    pub fn match_request(&self, method: &Method, path: &str) -> RouteResult {
        self.routes.match_request(method, path)
    }
}

fn route_result(request: &HttpRequest) -> Option<&RouteResult> {
    request.extensions().get::<RouteResult>()
}

/// Matches requests against routes and stores the [RouteResult] in request extensions.
#[derive(Debug)]
pub struct RouteMatching {
    router: Arc<Router>,
}

impl RouteMatching {
    pub fn new(router: Arc<Router>) -> Self {
        Self { router }
    }
}

impl Middleware for RouteMatching {
    fn process<'a>(
        &'a self,
        mut request: HttpRequest,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<HttpResponse, HttpError>> {
        let result = self
            .router
            .match_request(request.method(), request.uri().path());
        request.extensions_mut().insert(result);
        next.run(request)
    }
}

/// Answers `HEAD` requests with the `GET` route of the same path, dropping the content.
#[derive(Debug)]
pub struct ImplicitHead {
    router: Arc<Router>,
}

impl ImplicitHead {
    pub fn new(router: Arc<Router>) -> Self {
        Self { router }
    }
}

impl Middleware for ImplicitHead {
    fn process<'a>(
        &'a self,
        mut request: HttpRequest,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<HttpResponse, HttpError>> {
        let head_via_get = request.method() == Method::HEAD
            && matches!(
                route_result(&request),
                Some(RouteResult::MethodFailure { allowed }) if allowed.contains(&Method::GET)
            );

        if !head_via_get {
            return next.run(request);
        }

        let result = self
            .router
            .match_request(&Method::GET, request.uri().path());
        request.extensions_mut().insert(result);

        async move {
            let mut response = next.run(request).await?;
            response.extensions_mut().remove::<UnformattedContent>();
            *response.body_mut() = Bytes::new();
            Ok(response)
        }
        .boxed()
    }
}

fn allow_header(allowed: &[Method]) -> Option<HeaderValue> {
    HeaderValue::from_str(&allowed.iter().join(", ")).ok()
}

/// Answers `OPTIONS` requests for known paths with the list of allowed methods.
#[derive(Copy, Clone, Debug, Default)]
pub struct ImplicitOptions;

impl Middleware for ImplicitOptions {
    fn process<'a>(
        &'a self,
        request: HttpRequest,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<HttpResponse, HttpError>> {
        let allowed = match route_result(&request) {
            Some(RouteResult::MethodFailure { allowed }) if request.method() == Method::OPTIONS => {
                allowed.clone()
            }
            _ => return next.run(request),
        };

        async move {
            let mut response = empty_response(StatusCode::OK);
            if let Some(allowed) = allow_header(&allowed) {
                response.headers_mut().insert(ALLOW, allowed);
            }

            Ok(response)
        }
        .boxed()
    }
}

/// Rejects requests for known paths using a method no route allows.
#[derive(Copy, Clone, Debug, Default)]
pub struct MethodNotAllowed;

impl Middleware for MethodNotAllowed {
    fn process<'a>(
        &'a self,
        request: HttpRequest,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<HttpResponse, HttpError>> {
        match route_result(&request) {
            Some(RouteResult::MethodFailure { allowed }) => {
                let error = HttpError::MethodNotAllowed {
                    method: request.method().clone(),
                    allowed: allowed.clone(),
                };

                async move { Err(error) }.boxed()
            }
            _ => next.run(request),
        }
    }
}

/// Exposes parameters of the matched route as [RouteParams].
#[derive(Copy, Clone, Debug, Default)]
pub struct RouteParamsExtraction;

impl Middleware for RouteParamsExtraction {
    fn process<'a>(
        &'a self,
        mut request: HttpRequest,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<HttpResponse, HttpError>> {
        if let Some(RouteResult::Matched { params, .. }) = route_result(&request) {
            let params = RouteParams(params.clone());
            request.extensions_mut().insert(params);
        }

        next.run(request)
    }
}

/// Passes matched requests to the handler of their route.
#[derive(Debug)]
pub struct Dispatch {
    router: Arc<Router>,
}

impl Dispatch {
    pub fn new(router: Arc<Router>) -> Self {
        Self { router }
    }
}

impl Middleware for Dispatch {
    fn process<'a>(
        &'a self,
        request: HttpRequest,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<HttpResponse, HttpError>> {
        let handler = match route_result(&request) {
            Some(RouteResult::Matched { index, .. }) => self.router.handler(*index),
            _ => None,
        };

        match handler {
            Some(handler) => handler.handle(request),
            None => next.run(request),
        }
    }
}

/// Terminates the pipeline for requests no route has handled.
#[derive(Copy, Clone, Debug, Default)]
pub struct MissingRouteDispatching;

impl Middleware for MissingRouteDispatching {
    fn process<'a>(
        &'a self,
        request: HttpRequest,
        _next: Next<'a>,
    ) -> BoxFuture<'a, Result<HttpResponse, HttpError>> {
        let error = HttpError::NotFound {
            method: request.method().clone(),
            path: request.uri().path().to_string(),
        };

        async move { Err(error) }.boxed()
    }
}

#[cfg(test)]
mod tests {
    use crate::declaration::BehaviorKind;
    use crate::http::error::HttpError;
    use crate::http::routing::{Route, RouteCollector, RouteResult, UriGenerator};
    use axum::http::Method;
    use fxhash::FxHashMap;

    fn route(name: &str, path: &str, methods: Vec<Method>) -> Route {
        Route {
            name: name.to_string(),
            path: path.to_string(),
            methods,
            behavior: BehaviorKind::None,
            handler_id: format!("handler.{name}"),
            service_id: "service".to_string(),
        }
    }

    fn collector() -> RouteCollector {
        RouteCollector::new(vec![
            route("things.list", "/things", vec![Method::GET]),
            route("things.create", "/things", vec![Method::POST]),
            route("things.fetch", "/things/{id}", vec![Method::GET]),
            route("things.remove", "/things/{id}", vec![Method::DELETE]),
        ])
    }

    #[test]
    fn should_match_routes_with_params() {
        let result = collector().match_request(&Method::DELETE, "/things/abc");

        assert_eq!(
            result,
            RouteResult::Matched {
                index: 3,
                params: [("id".to_string(), "abc".to_string())]
                    .into_iter()
                    .collect(),
            }
        );
    }

    #[test]
    fn should_report_allowed_methods() {
        assert_eq!(
            collector().match_request(&Method::PUT, "/things"),
            RouteResult::MethodFailure {
                allowed: vec![Method::GET, Method::POST]
            }
        );
    }

    #[test]
    fn should_not_match_unknown_paths() {
        let collector = collector();

        assert_eq!(
            collector.match_request(&Method::GET, "/things/abc/parts"),
            RouteResult::NotFound
        );
        assert_eq!(
            collector.match_request(&Method::GET, "/things/"),
            RouteResult::NotFound
        );
        assert_eq!(
            collector.match_request(&Method::GET, "/other"),
            RouteResult::NotFound
        );
    }

    #[test]
    fn should_generate_paths() {
        let params: FxHashMap<String, String> = [("id".to_string(), "42".to_string())]
            .into_iter()
            .collect();

        assert_eq!(
            collector()
                .generate_relative_path("things.fetch", &params)
                .unwrap(),
            "/things/42"
        );
        assert_eq!(
            collector()
                .generate_relative_path("things.list", &FxHashMap::default())
                .unwrap(),
            "/things"
        );
    }

    #[test]
    fn should_fail_generating_incomplete_paths() {
        assert!(matches!(
            collector().generate_relative_path("things.fetch", &FxHashMap::default()),
            Err(HttpError::UriGeneration { route, .. }) if route == "things.fetch"
        ));
        assert!(matches!(
            collector().generate_relative_path("missing", &FxHashMap::default()),
            Err(HttpError::UriGeneration { .. })
        ));
    }
}
