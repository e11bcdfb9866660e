// Response construction for the dispatcher.
// Text bodies go out verbatim with no Content-Type header; JSON bodies are
// serialized with an explicit charset. The two 404 literals differ by a
// trailing period (dispatcher vs handler) and both are observable.

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{Response, StatusCode};

use crate::api::{ApiBody, ApiResponse};
use crate::logger;

/// Serialize a handler's response descriptor onto the wire.
pub fn from_api(api: ApiResponse) -> Response<Full<Bytes>> {
    match api.body {
        ApiBody::Text(body) => text(api.status, &body),
        ApiBody::Json(value) => json(api.status, &value),
    }
}

/// A verbatim text body, no Content-Type header.
pub fn text(status: StatusCode, body: &str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .body(Full::new(Bytes::from(body.to_string())))
        .expect("Failed to build text response")
}

pub fn json(status: StatusCode, value: &serde_json::Value) -> Response<Full<Bytes>> {
    match serde_json::to_string(value) {
        Ok(body) => Response::builder()
            .status(status)
            .header("Content-Type", "application/json; charset=utf-8")
            .body(Full::new(Bytes::from(body)))
            .expect("Failed to build JSON response"),
        Err(e) => {
            logger::log_error(&format!("Failed to serialize response body: {e}"));
            internal_error()
        }
    }
}

/// Routing miss: no pattern+method match.
pub fn not_found() -> Response<Full<Bytes>> {
    text(StatusCode::NOT_FOUND, "Not found.")
}

/// Body claimed to be JSON but did not parse.
pub fn ill_formed_json() -> Response<Full<Bytes>> {
    text(StatusCode::BAD_REQUEST, "Ill-formed JSON.")
}

/// Body read did not complete within the read timeout.
pub fn request_timeout() -> Response<Full<Bytes>> {
    text(StatusCode::REQUEST_TIMEOUT, "Request timeout.")
}

pub fn payload_too_large() -> Response<Full<Bytes>> {
    text(StatusCode::PAYLOAD_TOO_LARGE, "Request Entity Too Large")
}

/// Store I/O or serialization failure surfaced as a response instead of an
/// unhandled error.
pub fn internal_error() -> Response<Full<Bytes>> {
    text(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error.")
}
