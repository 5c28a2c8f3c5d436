//! HTTP routes for fieldops
//!
//! Each route group exposes a `handle_*_request` that answers every path
//! under its prefix and returns `None` for paths it does not own.

pub mod assignments;
pub mod attendance;
pub mod audits;
pub mod auth_routes;
pub mod health;

pub use assignments::handle_assignment_request;
pub use attendance::handle_attendance_request;
pub use audits::handle_audit_request;
pub use auth_routes::handle_auth_request;
pub use health::{health_check, readiness_check, version_info};

use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::header::{
    HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_MAX_AGE, CONTENT_TYPE, HOST,
};
use hyper::{Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{error, warn};

use crate::types::{FieldOpsError, Result};

pub type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

/// Cap for ordinary JSON bodies
pub const MAX_JSON_BODY: usize = 1024 * 1024;

/// Cap for audit bodies carrying base64 photos
pub const MAX_AUDIT_BODY: usize = 32 * 1024 * 1024;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

pub fn full_body(data: impl Into<Bytes>) -> BoxBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed()
}

pub fn empty_body() -> BoxBody {
    Full::new(Bytes::new())
        .map_err(|never| match never {})
        .boxed()
}

fn with_cors(mut response: Response<BoxBody>) -> Response<BoxBody> {
    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, PUT, DELETE, OPTIONS"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Authorization"),
    );
    response
}

pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<BoxBody> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());

    let mut response = Response::new(full_body(json));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    with_cors(response)
}

/// Raw bytes with a content type, for proxied images
pub fn bytes_response(data: Bytes, content_type: &'static str, cache: &'static str) -> Response<BoxBody> {
    let mut response = Response::new(full_body(data));
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(hyper::header::CACHE_CONTROL, HeaderValue::from_static(cache));
    with_cors(response)
}

pub fn cors_preflight() -> Response<BoxBody> {
    let mut response = Response::new(empty_body());
    *response.status_mut() = StatusCode::NO_CONTENT;
    response
        .headers_mut()
        .insert(ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("86400"));
    with_cors(response)
}

/// JSON error for a crate error. Server-side failures are logged in full
/// and reported generically.
pub fn error_response(err: &FieldOpsError) -> Response<BoxBody> {
    let status = err.status_code();
    if status.is_server_error() {
        error!(error = %err, "Request failed");
    } else {
        warn!(status = %status.as_u16(), error = %err, "Request rejected");
    }

    json_response(
        status,
        &ErrorResponse {
            error: err.public_message(),
            code: None,
        },
    )
}

pub fn method_not_allowed() -> Response<BoxBody> {
    json_response(
        StatusCode::METHOD_NOT_ALLOWED,
        &ErrorResponse {
            error: "Method not allowed".into(),
            code: None,
        },
    )
}

pub fn not_found(message: &str) -> Response<BoxBody> {
    json_response(
        StatusCode::NOT_FOUND,
        &ErrorResponse {
            error: message.into(),
            code: None,
        },
    )
}

/// Read the body up to `limit` bytes. An empty body reads as `{}`.
async fn read_body(req: Request<hyper::body::Incoming>, limit: usize) -> Result<Bytes> {
    let collected = Limited::new(req.into_body(), limit)
        .collect()
        .await
        .map_err(|e| FieldOpsError::BadRequest(format!("Failed to read body: {}", e)))?;

    let bytes = collected.to_bytes();
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Bytes::from_static(b"{}"));
    }
    Ok(bytes)
}

pub async fn parse_json_body<T: DeserializeOwned>(
    req: Request<hyper::body::Incoming>,
    limit: usize,
) -> Result<T> {
    let bytes = read_body(req, limit).await?;
    serde_json::from_slice(&bytes)
        .map_err(|e| FieldOpsError::BadRequest(format!("Invalid JSON: {}", e)))
}

/// Typed query string; absent query parses as the all-defaults value
pub fn query_params<T: DeserializeOwned + Default, B>(req: &Request<B>) -> Result<T> {
    match req.uri().query() {
        Some(q) if !q.is_empty() => serde_urlencoded::from_str(q)
            .map_err(|e| FieldOpsError::BadRequest(format!("Invalid query string: {}", e))),
        _ => Ok(T::default()),
    }
}

/// Scheme and host the client used, for building absolute image URLs
pub fn base_url<B>(req: &Request<B>) -> String {
    let header = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let host = header(HOST.as_str()).unwrap_or_else(|| "localhost".to_string());
    let scheme = header("x-forwarded-proto").unwrap_or_else(|| "http".to_string());
    format!("{}://{}", scheme, host)
}

/// Percent-decode one path segment, keeping it as-is when not valid UTF-8
pub fn decode_segment(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_segment() {
        assert_eq!(decode_segment("t%40example.com"), "t@example.com");
        assert_eq!(decode_segment("plain"), "plain");
    }

    #[test]
    fn test_error_response_hides_internal_detail() {
        let resp = error_response(&FieldOpsError::Database("connection reset".into()));
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let resp = error_response(&FieldOpsError::NotFound("Trainer not found".into()));
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(resp.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }

    #[test]
    fn test_base_url_and_query() {
        #[derive(serde::Deserialize, Default)]
        struct Q {
            date: Option<String>,
        }

        let req = Request::builder()
            .uri("/api/x?date=2026-10-18")
            .header("host", "api.example.com")
            .header("x-forwarded-proto", "https")
            .body(())
            .unwrap();
        assert_eq!(base_url(&req), "https://api.example.com");
        let q: Q = query_params(&req).unwrap();
        assert_eq!(q.date.as_deref(), Some("2026-10-18"));

        let bare = Request::builder().uri("/api/x").body(()).unwrap();
        let q: Q = query_params(&bare).unwrap();
        assert!(q.date.is_none());
        assert_eq!(base_url(&bare), "http://localhost");
    }

    #[test]
    fn test_preflight() {
        let resp = cors_preflight();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        assert_eq!(resp.headers()[ACCESS_CONTROL_MAX_AGE], "86400");
    }
}
