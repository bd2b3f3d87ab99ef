//! W3C Trace Context propagation for outbound HTTP calls.
//!
//! Calls to third-party APIs (payment gateway, mail relays with HTTP APIs)
//! carry the current `traceparent` so the outbound leg shows up under the
//! inbound request in the trace backend.
//!
//! See: https://www.w3.org/TR/trace-context/

use opentelemetry::trace::TraceContextExt;
use reqwest::header::HeaderMap;
use tracing::Span;
use tracing_opentelemetry::OpenTelemetrySpanExt;

/// Header name for W3C traceparent
pub const TRACEPARENT_HEADER: &str = "traceparent";

/// Header name for request correlation ID
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Inject the current span's trace context as a `traceparent` header.
///
/// Nothing is written when there is no valid span context (tests, or
/// tracing initialised without the OTLP layer).
pub fn inject_trace_context(headers: &mut HeaderMap) {
    let span = Span::current();
    let context = span.context();
    let otel_span = context.span();
    let span_context = otel_span.span_context();

    if span_context.is_valid() {
        // version-trace_id-span_id-trace_flags
        let traceparent = format!(
            "00-{}-{}-{:02x}",
            span_context.trace_id(),
            span_context.span_id(),
            span_context.trace_flags().to_u8()
        );

        if let Ok(value) = traceparent.parse() {
            headers.insert(TRACEPARENT_HEADER, value);
        }
    }
}

/// Extract request ID from incoming request headers.
pub fn extract_request_id(headers: &http::HeaderMap) -> Option<String> {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// Wraps a reqwest `RequestBuilder` and injects trace headers on send.
pub struct TracedRequest {
    request: reqwest::RequestBuilder,
}

impl TracedRequest {
    pub fn new(request: reqwest::RequestBuilder) -> Self {
        Self { request }
    }

    pub fn json<T: serde::Serialize + ?Sized>(self, json: &T) -> Self {
        Self {
            request: self.request.json(json),
        }
    }

    /// HTTP basic auth, as used by gateway key-id/secret pairs.
    pub fn basic_auth(self, username: &str, password: Option<&str>) -> Self {
        Self {
            request: self.request.basic_auth(username, password),
        }
    }

    pub async fn send(self) -> Result<reqwest::Response, reqwest::Error> {
        let mut headers = HeaderMap::new();
        inject_trace_context(&mut headers);

        self.request.headers(headers).send().await
    }
}

/// Traced request builders on `reqwest::Client`.
pub trait TracedClientExt {
    fn traced_post(&self, url: &str) -> TracedRequest;
}

impl TracedClientExt for reqwest::Client {
    fn traced_post(&self, url: &str) -> TracedRequest {
        TracedRequest::new(self.post(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inject_without_span_leaves_headers_empty() {
        let mut headers = HeaderMap::new();
        inject_trace_context(&mut headers);
        assert!(headers.is_empty());
    }

    #[test]
    fn extract_request_id_reads_header() {
        let mut headers = http::HeaderMap::new();
        headers.insert(REQUEST_ID_HEADER, "req-42".parse().unwrap());
        assert_eq!(extract_request_id(&headers), Some("req-42".to_string()));

        let empty = http::HeaderMap::new();
        assert_eq!(extract_request_id(&empty), None);
    }
}
