//! HTTP middleware and the pipeline executing it.

use crate::container::ServiceLocator;
use crate::declaration::ROOT_PATH;
use crate::http::error::HttpError;
use crate::http::{HttpRequest, HttpResponse};
use derivative::Derivative;
use once_cell::sync::OnceCell;
use springtime_bus::future::{BoxFuture, FutureExt};
use std::sync::Arc;

pub type MiddlewarePtr = Arc<dyn Middleware + Send + Sync>;

/// Intercepts requests passing through the pipeline. Middleware either produces a response on its
/// own, or passes the request further with [Next::run].
pub trait Middleware {
    fn process<'a>(
        &'a self,
        request: HttpRequest,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<HttpResponse, HttpError>>;
}

/// Remainder of the pipeline.
pub struct Next<'a> {
    middleware: &'a [MiddlewarePtr],
}

impl<'a> Next<'a> {
    pub fn run(self, request: HttpRequest) -> BoxFuture<'a, Result<HttpResponse, HttpError>> {
        match self.middleware.split_first() {
            Some((current, rest)) => current.process(request, Next { middleware: rest }),
            None => async { Err(HttpError::PipelineExhausted) }.boxed(),
        }
    }
}

/// Ordered middleware pipeline.
#[derive(Derivative, Clone, Default)]
#[derivative(Debug)]
pub struct MiddlewarePipe {
    #[derivative(Debug = "ignore")]
    middleware: Vec<MiddlewarePtr>,
}

impl MiddlewarePipe {
    pub fn new(middleware: Vec<MiddlewarePtr>) -> Self {
        Self { middleware }
    }

    pub fn handle(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, HttpError>> {
        Next {
            middleware: &self.middleware,
        }
        .run(request)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.middleware.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.middleware.is_empty()
    }
}

/// Middleware resolved from the container on first invocation.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct LazyMiddleware {
    id: String,
    #[derivative(Debug = "ignore")]
    locator: ServiceLocator,
    #[derivative(Debug = "ignore")]
    middleware: OnceCell<MiddlewarePtr>,
}

impl LazyMiddleware {
    pub fn new(id: impl Into<String>, locator: ServiceLocator) -> Self {
        Self {
            id: id.into(),
            locator,
            middleware: OnceCell::new(),
        }
    }

    fn middleware(&self) -> Result<&MiddlewarePtr, HttpError> {
        self.middleware
            .get_or_try_init(|| self.locator.resolve::<dyn Middleware + Send + Sync>(&self.id))
            .map_err(HttpError::from)
    }
}

impl Middleware for LazyMiddleware {
    fn process<'a>(
        &'a self,
        request: HttpRequest,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<HttpResponse, HttpError>> {
        match self.middleware() {
            Ok(middleware) => middleware.process(request, next),
            Err(error) => async move { Err(error) }.boxed(),
        }
    }
}

/// Checks if `path` is `prefix` or lies under it. Matching is case-sensitive and respects segment
/// boundaries, so `/admin` doesn't match `/administrator`.
pub fn path_matches_prefix(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return true;
    }

    path.strip_prefix(prefix)
        .map(|rest| rest.is_empty() || rest.starts_with('/'))
        .unwrap_or(false)
}

/// Invokes the decorated middleware only for requests under a path prefix; other requests go
/// straight to the rest of the pipeline.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct PathMiddlewareDecorator {
    prefix: String,
    #[derivative(Debug = "ignore")]
    middleware: MiddlewarePtr,
}

impl PathMiddlewareDecorator {
    pub fn new(prefix: impl Into<String>, middleware: MiddlewarePtr) -> Self {
        Self {
            prefix: prefix.into(),
            middleware,
        }
    }

    /// Wraps `middleware` when `prefix` is not the root path.
    pub fn decorate(prefix: &str, middleware: MiddlewarePtr) -> MiddlewarePtr {
        if prefix == ROOT_PATH {
            middleware
        } else {
            Arc::new(Self::new(prefix, middleware))
        }
    }
}

impl Middleware for PathMiddlewareDecorator {
    fn process<'a>(
        &'a self,
        request: HttpRequest,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<HttpResponse, HttpError>> {
        if path_matches_prefix(request.uri().path(), &self.prefix) {
            self.middleware.process(request, next)
        } else {
            next.run(request)
        }
    }
}
