//! Content negotiation - picking the response format from the `Accept` header and formatting
//! response content with the matching formatter.

use crate::config::AllowedFormat;
use crate::http::error::HttpError;
use crate::http::middleware::{Middleware, Next};
use crate::http::{ForcedFormat, HttpRequest, HttpResponse, PreferredFormat, UnformattedContent};
use axum::body::Bytes;
use axum::http::header::{ACCEPT, CONTENT_TYPE, X_CONTENT_TYPE_OPTIONS};
use axum::http::HeaderValue;
use derivative::Derivative;
use indexmap::IndexMap;
#[cfg(test)]
use mockall::automock;
use serde_json::Value;
use springtime_bus::future::{BoxFuture, FutureExt};
use springtime_bus::ErrorPtr;
use std::sync::Arc;
use tracing::error;

const NOSNIFF: &str = "nosniff";

const PROBLEM_CONTENT_TYPE: &str = "application/problem+json; charset=UTF-8";

/// Serializes response content into a concrete format.
#[cfg_attr(test, automock)]
pub trait Formatter {
    fn format(&self, content: &Value) -> Result<Bytes, ErrorPtr>;
}

pub type FormatterPtr = Arc<dyn Formatter + Send + Sync>;

/// Formats content as JSON.
#[derive(Copy, Clone, Debug, Default)]
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn format(&self, content: &Value) -> Result<Bytes, ErrorPtr> {
        serde_json::to_vec(content)
            .map(Bytes::from)
            .map_err(|error| Arc::new(error) as ErrorPtr)
    }
}

/// Negotiable formats of an application along with the ids of their formatter services.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ContentNegotiationDescriptor {
    /// Formats in order of preference.
    pub formats: Vec<AllowedFormat>,
    /// Format to formatter service id.
    pub formatters: IndexMap<String, String>,
}

impl ContentNegotiationDescriptor {
    pub fn formatter(&self, format: &str) -> Option<&str> {
        self.formatters.get(format).map(String::as_str)
    }
}

#[derive(Derivative)]
#[derivative(Debug)]
struct FormatBinding {
    charset: String,
    #[derivative(Debug = "ignore")]
    formatter: FormatterPtr,
}

struct MediaRange<'a> {
    media_type: &'a str,
    quality: f32,
}

fn parse_accept(accept: &str) -> Vec<MediaRange<'_>> {
    accept
        .split(',')
        .filter_map(|range| {
            let mut parts = range.split(';').map(str::trim);
            let media_type = parts.next().filter(|media_type| !media_type.is_empty())?;
            let quality = parts
                .filter_map(|param| param.split_once('='))
                .filter(|(name, _)| name.trim().eq_ignore_ascii_case("q"))
                .find_map(|(_, quality)| quality.trim().parse::<f32>().ok())
                .unwrap_or(1.0);

            Some(MediaRange {
                media_type,
                quality,
            })
        })
        .collect()
}

// exact match beats type wildcard, which beats full wildcard
fn specificity(range: &str, format: &str) -> Option<u8> {
    if range.eq_ignore_ascii_case(format) {
        return Some(2);
    }

    if range == "*/*" {
        return Some(0);
    }

    let (range_type, range_subtype) = range.split_once('/')?;
    let (format_type, _) = format.split_once('/')?;

    (range_subtype == "*" && range_type.eq_ignore_ascii_case(format_type)).then_some(1)
}

/// Middleware negotiating the response format. Response content is formatted with the negotiated
/// formatter, unless the response forces a format. Every response gets a `Content-Type` with the
/// format charset and `X-Content-Type-Options: nosniff`.
#[derive(Debug)]
pub struct ContentNegotiation {
    formats: IndexMap<String, FormatBinding>,
}

impl ContentNegotiation {
    /// Creates the middleware with formats in order of preference. The first format is used when
    /// the client doesn't accept any of them.
    pub fn new(formats: impl IntoIterator<Item = (AllowedFormat, FormatterPtr)>) -> Self {
        Self {
            formats: formats
                .into_iter()
                .map(|(allowed, formatter)| {
                    (
                        allowed.format,
                        FormatBinding {
                            charset: allowed.charset,
                            formatter,
                        },
                    )
                })
                .collect(),
        }
    }

    pub fn formats(&self) -> impl Iterator<Item = &str> {
        self.formats.keys().map(String::as_str)
    }

    /// Picks the best allowed format for given `Accept` header value.
    pub fn negotiate(&self, accept: Option<&str>) -> Option<&str> {
        let default = self.formats.keys().next().map(String::as_str);
        let ranges = match accept {
            Some(accept) => parse_accept(accept),
            None => return default,
        };

        let mut best: Option<(&str, f32)> = None;
        for format in self.formats.keys() {
            let quality = ranges
                .iter()
                .filter_map(|range| {
                    specificity(range.media_type, format).map(|score| (score, range.quality))
                })
                .max_by_key(|(score, _)| *score)
                .map(|(_, quality)| quality)
                .unwrap_or(0.0);

            if quality > 0.0 && best.map(|(_, best)| quality > best).unwrap_or(true) {
                best = Some((format, quality));
            }
        }

        best.map(|(format, _)| format).or(default)
    }

    fn finish(&self, mut response: HttpResponse, preferred: &str) -> Result<HttpResponse, HttpError> {
        let forced = response.extensions_mut().remove::<ForcedFormat>();
        let (format, binding) = forced
            .and_then(|forced| self.formats.get_key_value(&forced.0))
            .or_else(|| self.formats.get_key_value(preferred))
            .ok_or_else(|| {
                HttpError::Formatting(Arc::new(UnsupportedFormat(preferred.to_string())))
            })?;

        if let Some(content) = response.extensions_mut().remove::<UnformattedContent>() {
            *response.body_mut() = binding
                .formatter
                .format(&content.0)
                .map_err(HttpError::Formatting)?;
        }

        let content_type = HeaderValue::from_str(&format!("{format}; charset={}", binding.charset))
            .map_err(|error| HttpError::Formatting(Arc::new(error)))?;

        let headers = response.headers_mut();
        headers.insert(CONTENT_TYPE, content_type);
        headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static(NOSNIFF));

        Ok(response)
    }
}

#[derive(thiserror::Error, Debug)]
#[error("Format \"{0}\" has no formatter.")]
struct UnsupportedFormat(String);

impl Middleware for ContentNegotiation {
    fn process<'a>(
        &'a self,
        mut request: HttpRequest,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<HttpResponse, HttpError>> {
        let accept = request
            .headers()
            .get(ACCEPT)
            .and_then(|accept| accept.to_str().ok());

        let preferred = match self.negotiate(accept) {
            Some(format) => format.to_string(),
            None => return next.run(request),
        };

        request
            .extensions_mut()
            .insert(PreferredFormat(preferred.clone()));

        async move {
            let response = next.run(request).await?;
            self.finish(response, &preferred)
        }
        .boxed()
    }
}

/// Renders a problem response without negotiation, for failures which happened before or during
/// negotiation itself.
pub fn render_problem(mut response: HttpResponse) -> HttpResponse {
    if let Some(content) = response.extensions_mut().remove::<UnformattedContent>() {
        match serde_json::to_vec(&content.0) {
            Ok(body) => *response.body_mut() = Bytes::from(body),
            Err(error) => error!(%error, "Cannot serialize problem details."),
        }
    }

    response.extensions_mut().remove::<ForcedFormat>();

    let headers = response.headers_mut();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static(PROBLEM_CONTENT_TYPE),
    );
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static(NOSNIFF));

    response
}
