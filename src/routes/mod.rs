//! HTTP routes for casegate
//!
//! Handlers return `Result<Response<BoxBody>>`; the server turns errors into
//! `{ "error": <code>, "message": <text> }` bodies via [`error_response`].

pub mod cases;
pub mod health;
pub mod inbox;
pub mod intake;
pub mod sla;

pub use cases::{
    handle_break_glass, handle_ensure_channel, handle_grant_read, handle_handler_message,
    handle_handler_thread, handle_set_status,
};
pub use health::{health_check, version_info};
pub use inbox::{handle_inbox_auth, handle_inbox_list, handle_inbox_post};
pub use intake::handle_create_report;
pub use sla::{handle_get_policy, handle_put_policy, handle_sla_query, handle_sla_sweep};

use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Incoming;
use hyper::{header, Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::net::{IpAddr, SocketAddr};
use tracing::{error, warn};

use crate::audit::RequestContext;
use crate::identity::CaseId;
use crate::types::{CaseGateError, Result};

pub type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

/// Largest accepted request body
pub const MAX_BODY_BYTES: usize = 256 * 1024;

// =============================================================================
// Response Helpers
// =============================================================================

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

/// JSON response; nothing casegate returns may be cached
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<BoxBody> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());

    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::CACHE_CONTROL, "no-store")
        .header("Access-Control-Allow-Origin", "*")
        .body(full_body(json))
        .unwrap()
}

/// Error body with the caller-safe message only
pub fn error_response(err: &CaseGateError) -> Response<BoxBody> {
    let status = err.status_code();
    if status.is_server_error() {
        error!("request failed: {}", err);
    }

    let body = serde_json::json!({
        "error": err.code(),
        "message": err.public_message(),
    });

    let mut response = json_response(status, &body);
    if let Some(secs) = err.retry_after() {
        if let Ok(value) = header::HeaderValue::from_str(&secs.to_string()) {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
    }
    response
}

pub fn not_found_response(path: &str) -> Response<BoxBody> {
    let body = serde_json::json!({
        "error": "NOT_FOUND",
        "message": format!("No route for {}", path),
    });
    json_response(StatusCode::NOT_FOUND, &body)
}

pub fn preflight_response() -> Response<BoxBody> {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, PUT, OPTIONS")
        .header(
            "Access-Control-Allow-Headers",
            "Content-Type, Authorization, X-Case-Key, X-Captcha-Token",
        )
        .header("Access-Control-Max-Age", "86400")
        .body(empty_body())
        .unwrap()
}

// =============================================================================
// Request Helpers
// =============================================================================

pub async fn parse_json_body<T: DeserializeOwned>(req: Request<Incoming>) -> Result<T> {
    let bytes = Limited::new(req.into_body(), MAX_BODY_BYTES)
        .collect()
        .await
        .map_err(|e| CaseGateError::Validation(format!("Failed to read body: {}", e)))?
        .to_bytes();

    serde_json::from_slice(&bytes)
        .map_err(|e| CaseGateError::Validation(format!("Invalid JSON: {}", e)))
}

pub fn header_str<'a, B>(req: &'a Request<B>, name: &str) -> Option<&'a str> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Bearer token from the Authorization header
pub fn bearer_token<B>(req: &Request<B>) -> Result<&str> {
    header_str(req, header::AUTHORIZATION.as_str())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .ok_or_else(|| CaseGateError::Unauthorized("Missing bearer token".into()))
}

/// Value of `key` in a raw query string
pub fn query_param(query: Option<&str>, key: &str) -> Option<String> {
    query?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v.to_string())
        .filter(|v| !v.is_empty())
}

/// Handler-facing case id from a path segment
pub fn path_case_id(raw: &str) -> Result<CaseId> {
    CaseId::parse(raw).ok_or_else(|| CaseGateError::NotFound("Case not found".into()))
}

/// Client address: the first `X-Forwarded-For` hop when trusted, else the socket
pub fn client_ip<B>(req: &Request<B>, addr: SocketAddr, trust_forwarded_for: bool) -> IpAddr {
    if trust_forwarded_for {
        let forwarded = header_str(req, "x-forwarded-for")
            .and_then(|v| v.split(',').next())
            .map(str::trim);
        if let Some(value) = forwarded {
            match value.parse::<IpAddr>() {
                Ok(ip) => return ip,
                Err(_) => warn!("ignoring malformed X-Forwarded-For header"),
            }
        }
    }
    addr.ip()
}

/// Network context handed to services for rate limiting and audit hashing
pub fn request_context<B>(
    req: &Request<B>,
    addr: SocketAddr,
    trust_forwarded_for: bool,
) -> RequestContext {
    RequestContext::new(
        Some(client_ip(req, addr, trust_forwarded_for)),
        header_str(req, header::USER_AGENT.as_str()).map(str::to_string),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(headers: &[(&str, &str)]) -> Request<()> {
        let mut builder = Request::builder().uri("/api/inbox/auth");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap()
    }

    #[test]
    fn test_client_ip_ignores_forwarded_unless_trusted() {
        let addr: SocketAddr = "10.0.0.1:5000".parse().unwrap();
        let req = request(&[("x-forwarded-for", "203.0.113.9, 10.0.0.2")]);

        assert_eq!(client_ip(&req, addr, false), addr.ip());
        assert_eq!(
            client_ip(&req, addr, true),
            "203.0.113.9".parse::<IpAddr>().unwrap()
        );

        let bad = request(&[("x-forwarded-for", "not-an-ip")]);
        assert_eq!(client_ip(&bad, addr, true), addr.ip());
    }

    #[test]
    fn test_bearer_token() {
        let req = request(&[("authorization", "Bearer abc.def")]);
        assert_eq!(bearer_token(&req).unwrap(), "abc.def");

        let req = request(&[("authorization", "Basic abc")]);
        assert!(matches!(
            bearer_token(&req),
            Err(CaseGateError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_query_param() {
        assert_eq!(
            query_param(Some("orgId=org-1&x=2"), "orgId").as_deref(),
            Some("org-1")
        );
        assert_eq!(query_param(Some("orgId="), "orgId"), None);
        assert_eq!(query_param(None, "orgId"), None);
    }

    #[test]
    fn test_error_response_shape() {
        let response = error_response(&CaseGateError::RateLimited {
            retry_after_secs: 42,
        });
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "42");

        let response = error_response(&CaseGateError::Database("pool exhausted".into()));
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(response.headers().get(header::RETRY_AFTER).is_none());
    }
}
