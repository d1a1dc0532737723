//! Per-request correlation ids
//!
//! Every request runs inside a `request` tracing span carrying its id, and every
//! response, panics included, goes back with the id in `X-Request-Id`.

use axum::{
    extract::Request,
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use std::fmt;
use tracing::{info_span, Instrument};
use uuid::Uuid;

/// Header carrying the correlation id in both directions
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Correlation id of one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(String);

impl RequestId {
    /// Fresh UUID v4 id
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Reuse the caller's id when the header is present and non-empty
    pub fn from_header(value: Option<&HeaderValue>) -> Self {
        value
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map_or_else(Self::generate, |v| Self(v.to_string()))
    }

    /// Id as sent on the wire
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Middleware attaching a correlation id to the request span and the response
pub async fn propagate_request_id(request: Request, next: Next) -> Response {
    let request_id = RequestId::from_header(request.headers().get(REQUEST_ID_HEADER));

    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %request.method(),
        path = %request.uri().path()
    );

    let mut response = next.run(request).instrument(span).await;

    if let Ok(value) = HeaderValue::from_str(request_id.as_str()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    response
}
