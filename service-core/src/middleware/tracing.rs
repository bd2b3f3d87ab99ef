use axum::http::HeaderValue;
use axum::{extract::Request, middleware::Next, response::Response};
use uuid::Uuid;

use crate::observability::{REQUEST_ID_HEADER, extract_request_id};

/// Propagate the caller's `x-request-id`, or mint one, and echo it back.
///
/// Layer it outside the `TraceLayer` so the request span sees the minted id.
pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let request_id =
        extract_request_id(req.headers()).unwrap_or_else(|| Uuid::new_v4().to_string());

    let header_value = HeaderValue::from_str(&request_id).ok();
    if let Some(value) = header_value.clone() {
        req.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    let mut response = next.run(req).await;

    if let Some(value) = header_value {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    response
}
