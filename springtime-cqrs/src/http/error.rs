//! Runtime HTTP errors and their conversion into `application/problem+json` responses.

use crate::config::PROBLEM_JSON_FORMAT;
use crate::error::ContainerError;
use crate::http::middleware::{Middleware, Next};
use crate::http::{content_response, ForcedFormat, HttpRequest, HttpResponse};
use axum::http::header::ALLOW;
use axum::http::{HeaderValue, Method, StatusCode};
use itertools::Itertools;
use serde_json::json;
use springtime_bus::error::BusError;
use springtime_bus::future::{BoxFuture, FutureExt};
use springtime_bus::ErrorPtr;
use std::error::Error;
use thiserror::Error;
use tracing::{error, warn};

/// An error meant to be shown to the client, with its own status, title and details. Handlers
/// can return it (directly or as a source of their errors) to control the problem response.
#[derive(Error, Clone, Debug, Eq, PartialEq)]
#[error("{title}: {details}")]
pub struct Problem {
    pub status: StatusCode,
    pub title: String,
    pub details: String,
}

impl Problem {
    pub fn new(status: StatusCode, title: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            status,
            title: title.into(),
            details: details.into(),
        }
    }

    /// Problem with the canonical reason of `status` as its title.
    pub fn from_status(status: StatusCode, details: impl Into<String>) -> Self {
        Self::new(
            status,
            status.canonical_reason().unwrap_or("Unknown Error"),
            details,
        )
    }
}

/// Errors raised while handling requests.
#[derive(Error, Clone, Debug)]
pub enum HttpError {
    #[error("Cannot {method} {path}")]
    NotFound { method: Method, path: String },
    #[error("Method {method} is not allowed - use one of: {}", .allowed.iter().join(", "))]
    MethodNotAllowed {
        method: Method,
        allowed: Vec<Method>,
    },
    #[error("Invalid request body: {0}")]
    InvalidBody(#[source] ErrorPtr),
    #[error("Cannot generate URI for route \"{route}\": {reason}")]
    UriGeneration { route: String, reason: String },
    #[error(transparent)]
    Bus(#[from] BusError),
    #[error(transparent)]
    Container(#[from] ContainerError),
    #[error("Handler error: {0}")]
    Handler(#[source] ErrorPtr),
    #[error("Response formatting error: {0}")]
    Formatting(#[source] ErrorPtr),
    #[error("The request has not been handled by any middleware.")]
    PipelineExhausted,
}

fn find_problem<'a>(error: &'a (dyn Error + 'static)) -> Option<&'a Problem> {
    let mut current = Some(error);
    while let Some(error) = current {
        if let Some(problem) = error.downcast_ref::<Problem>() {
            return Some(problem);
        }

        current = error.source();
    }

    None
}

impl HttpError {
    /// Returns the [Problem] carried by this error, if there's one anywhere in the error chain.
    pub fn problem(&self) -> Option<&Problem> {
        let inner = match self {
            Self::Handler(error) | Self::Bus(BusError::Handler(error)) => error,
            _ => return None,
        };

        find_problem(&**inner as &(dyn Error + 'static))
    }

    /// Converts this error into a client-facing problem.
    pub fn to_problem(&self) -> Problem {
        if let Some(problem) = self.problem() {
            return problem.clone();
        }

        let status = match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            Self::InvalidBody(_) | Self::Bus(BusError::InvalidInput { .. }) => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        Problem::from_status(status, self.to_string())
    }
}

/// Creates an `application/problem+json` response for given error.
pub fn problem_response(error: &HttpError) -> HttpResponse {
    let problem = error.to_problem();

    if problem.status.is_server_error() {
        error!(%error, "Error handling request.");
    } else {
        warn!(%error, status = %problem.status, "Request failed.");
    }

    let mut response = content_response(
        problem.status,
        json!({
            "type": format!("https://httpstatuses.com/{}", problem.status.as_u16()),
            "title": problem.title,
            "details": problem.details,
        }),
    );

    response
        .extensions_mut()
        .insert(ForcedFormat(PROBLEM_JSON_FORMAT.to_string()));

    if let HttpError::MethodNotAllowed { allowed, .. } = error {
        if let Ok(allowed) = HeaderValue::from_str(&allowed.iter().join(", ")) {
            response.headers_mut().insert(ALLOW, allowed);
        }
    }

    response
}

/// Middleware converting errors raised further down the pipeline into problem responses.
#[derive(Copy, Clone, Debug, Default)]
pub struct ErrorConversion;

impl Middleware for ErrorConversion {
    fn process<'a>(
        &'a self,
        request: HttpRequest,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<HttpResponse, HttpError>> {
        async move {
            match next.run(request).await {
                Ok(response) => Ok(response),
                Err(error) => Ok(problem_response(&error)),
            }
        }
        .boxed()
    }
}
