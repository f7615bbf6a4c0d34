//! Request body parsing.

use crate::http::error::HttpError;
use crate::http::middleware::{Middleware, Next};
use crate::http::{HttpRequest, HttpResponse, ParsedBody};
use axum::http::header::CONTENT_TYPE;
use serde_json::Value;
use springtime_bus::future::{BoxFuture, FutureExt};
use std::sync::Arc;

fn is_json(request: &HttpRequest) -> bool {
    request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|content_type| content_type.to_str().ok())
        .map(|content_type| {
            let media_type = content_type
                .split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase();

            media_type == "application/json" || media_type.ends_with("+json")
        })
        .unwrap_or(true)
}

/// Parses non-empty JSON request bodies into [ParsedBody]. Bodies without a `Content-Type` are
/// assumed to be JSON, other media types are left untouched.
#[derive(Copy, Clone, Debug, Default)]
pub struct BodyParams;

impl Middleware for BodyParams {
    fn process<'a>(
        &'a self,
        mut request: HttpRequest,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<HttpResponse, HttpError>> {
        if request.body().is_empty() || !is_json(&request) {
            return next.run(request);
        }

        match serde_json::from_slice::<Value>(request.body()) {
            Ok(body) => {
                request.extensions_mut().insert(ParsedBody(body));
                next.run(request)
            }
            Err(error) => async move { Err(HttpError::InvalidBody(Arc::new(error))) }.boxed(),
        }
    }
}
