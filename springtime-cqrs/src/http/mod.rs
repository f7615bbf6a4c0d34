//! HTTP runtime wired together by assembled applications: the middleware pipeline, routing,
//! route handlers, content negotiation and error conversion.
//!
//! Requests and responses carry fully buffered bodies. Handlers don't serialize response content
//! themselves - they attach [UnformattedContent] to the response and let content negotiation
//! format it.

pub mod action;
pub mod body;
pub mod error;
pub mod handler;
pub mod middleware;
pub mod negotiation;
pub mod routing;

use axum::body::Bytes;
use axum::http::{Request, Response, StatusCode};
use fxhash::FxHashMap;
use serde_json::Value;

pub type HttpRequest = Request<Bytes>;
pub type HttpResponse = Response<Bytes>;

/// Response content waiting to be formatted by content negotiation.
#[derive(Clone, Debug, PartialEq)]
pub struct UnformattedContent(pub Value);

/// Format negotiated for the current request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PreferredFormat(pub String);

/// Format a response needs to be formatted with, regardless of the negotiated one.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ForcedFormat(pub String);

/// Request body parsed as JSON.
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedBody(pub Value);

/// Parameters extracted from the matched route path.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RouteParams(pub FxHashMap<String, String>);

/// Creates an empty response with given status.
pub fn empty_response(status: StatusCode) -> HttpResponse {
    let mut response = Response::new(Bytes::new());
    *response.status_mut() = status;
    response
}

/// Creates a response with content to be formatted by content negotiation.
pub fn content_response(status: StatusCode, content: Value) -> HttpResponse {
    let mut response = empty_response(status);
    response.extensions_mut().insert(UnformattedContent(content));
    response
}
