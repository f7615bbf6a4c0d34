//! Route request handlers - one strategy per route behavior.

use crate::container::ServiceLocator;
use crate::http::action::{request_input, ExecuteCommand, ExecuteQuery};
use crate::http::error::HttpError;
use crate::http::routing::UriGeneratorPtr;
use crate::http::{content_response, empty_response, HttpRequest, HttpResponse, RouteParams};
use crate::identifier::IdentifierGeneratorPtr;
use axum::http::header::LOCATION;
use axum::http::{HeaderValue, StatusCode};
use derivative::Derivative;
use fxhash::FxHashMap;
use once_cell::sync::OnceCell;
use springtime_bus::future::{BoxFuture, FutureExt};
use std::sync::Arc;

/// Name of the route parameter receiving the identifier of a created resource.
pub const ID_PARAM: &str = "id";

pub type RequestHandlerPtr = Arc<dyn RequestHandler + Send + Sync>;

/// Handles requests matched to a route.
pub trait RequestHandler {
    fn handle(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, HttpError>>;
}

/// Request handler resolved from the container on first invocation.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct LazyRequestHandler {
    id: String,
    #[derivative(Debug = "ignore")]
    locator: ServiceLocator,
    #[derivative(Debug = "ignore")]
    handler: OnceCell<RequestHandlerPtr>,
}

impl LazyRequestHandler {
    pub fn new(id: impl Into<String>, locator: ServiceLocator) -> Self {
        Self {
            id: id.into(),
            locator,
            handler: OnceCell::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[inline]
    pub fn is_resolved(&self) -> bool {
        self.handler.get().is_some()
    }
}

impl RequestHandler for LazyRequestHandler {
    fn handle(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, HttpError>> {
        let handler = self
            .handler
            .get_or_try_init(|| self.locator.resolve::<dyn RequestHandler + Send + Sync>(&self.id));

        match handler {
            Ok(handler) => handler.handle(request),
            Err(error) => async move { Err(HttpError::from(error)) }.boxed(),
        }
    }
}

fn location_header(
    uri: &UriGeneratorPtr,
    redirect_to: &str,
    request: &HttpRequest,
    id: &str,
) -> Result<HeaderValue, HttpError> {
    let mut params: FxHashMap<String, String> = request
        .extensions()
        .get::<RouteParams>()
        .map(|params| params.0.clone())
        .unwrap_or_default();
    params.insert(ID_PARAM.to_string(), id.to_string());

    let location = uri.generate_relative_path(redirect_to, &params)?;
    HeaderValue::from_str(&location).map_err(|error| HttpError::UriGeneration {
        route: redirect_to.to_string(),
        reason: error.to_string(),
    })
}

#[inline]
fn status(is_async: bool, sync_status: StatusCode) -> StatusCode {
    if is_async {
        StatusCode::ACCEPTED
    } else {
        sync_status
    }
}

/// Executes a query and responds with its result.
#[derive(Debug)]
pub struct FetchOnly {
    read: ExecuteQuery,
}

impl FetchOnly {
    pub fn new(read: ExecuteQuery) -> Self {
        Self { read }
    }
}

impl RequestHandler for FetchOnly {
    fn handle(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, HttpError>> {
        async move {
            let content = self.read.fetch(&request_input(&request)).await?;
            Ok(content_response(StatusCode::OK, content))
        }
        .boxed()
    }
}

/// Executes a command creating a resource and points the client to it.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct CreateOnly {
    write: ExecuteCommand,
    #[derivative(Debug = "ignore")]
    uri: UriGeneratorPtr,
    #[derivative(Debug = "ignore")]
    identifier: IdentifierGeneratorPtr,
    redirect_to: String,
    is_async: bool,
}

impl CreateOnly {
    pub fn new(
        write: ExecuteCommand,
        uri: UriGeneratorPtr,
        identifier: IdentifierGeneratorPtr,
        redirect_to: impl Into<String>,
        is_async: bool,
    ) -> Self {
        Self {
            write,
            uri,
            identifier,
            redirect_to: redirect_to.into(),
            is_async,
        }
    }
}

impl RequestHandler for CreateOnly {
    fn handle(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, HttpError>> {
        async move {
            let id = self.identifier.generate();
            let input = request_input(&request).with_generated_id(id.clone());

            self.write.execute(&input).await?;

            let location = location_header(&self.uri, &self.redirect_to, &request, &id)?;
            let mut response = empty_response(status(self.is_async, StatusCode::CREATED));
            response.headers_mut().insert(LOCATION, location);

            Ok(response)
        }
        .boxed()
    }
}

/// Executes a command creating a resource and responds with its representation.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct CreateAndFetch {
    write: ExecuteCommand,
    read: ExecuteQuery,
    #[derivative(Debug = "ignore")]
    uri: UriGeneratorPtr,
    #[derivative(Debug = "ignore")]
    identifier: IdentifierGeneratorPtr,
    redirect_to: String,
    is_async: bool,
}

impl CreateAndFetch {
    pub fn new(
        write: ExecuteCommand,
        read: ExecuteQuery,
        uri: UriGeneratorPtr,
        identifier: IdentifierGeneratorPtr,
        redirect_to: impl Into<String>,
        is_async: bool,
    ) -> Self {
        Self {
            write,
            read,
            uri,
            identifier,
            redirect_to: redirect_to.into(),
            is_async,
        }
    }
}

impl RequestHandler for CreateAndFetch {
    fn handle(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, HttpError>> {
        async move {
            let id = self.identifier.generate();
            let input = request_input(&request).with_generated_id(id.clone());

            self.write.execute(&input).await?;

            let content = self
                .read
                .fetch(&input.with_attribute(ID_PARAM, id.clone()))
                .await?;

            let location = location_header(&self.uri, &self.redirect_to, &request, &id)?;
            let mut response = content_response(status(self.is_async, StatusCode::CREATED), content);
            response.headers_mut().insert(LOCATION, location);

            Ok(response)
        }
        .boxed()
    }
}

/// Executes a command without returning content.
#[derive(Debug)]
pub struct ExecuteOnly {
    write: ExecuteCommand,
    is_async: bool,
}

impl ExecuteOnly {
    pub fn new(write: ExecuteCommand, is_async: bool) -> Self {
        Self { write, is_async }
    }
}

impl RequestHandler for ExecuteOnly {
    fn handle(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, HttpError>> {
        async move {
            self.write.execute(&request_input(&request)).await?;
            Ok(empty_response(status(self.is_async, StatusCode::NO_CONTENT)))
        }
        .boxed()
    }
}

/// Executes a command and responds with the resulting representation.
#[derive(Debug)]
pub struct ExecuteAndFetch {
    write: ExecuteCommand,
    read: ExecuteQuery,
}

impl ExecuteAndFetch {
    pub fn new(write: ExecuteCommand, read: ExecuteQuery) -> Self {
        Self { write, read }
    }
}

impl RequestHandler for ExecuteAndFetch {
    fn handle(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, HttpError>> {
        async move {
            let input = request_input(&request);
            self.write.execute(&input).await?;

            let content = self.read.fetch(&input).await?;
            Ok(content_response(StatusCode::OK, content))
        }
        .boxed()
    }
}
