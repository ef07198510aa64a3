//! Error types for casegate
//!
//! Reporter-facing paths collapse every credential failure into
//! `InvalidCredentials`; handler-facing paths may surface `NotFound` and
//! `Forbidden` precisely.

use hyper::StatusCode;

/// Main error type for casegate operations
#[derive(Debug, thiserror::Error)]
pub enum CaseGateError {
    #[error("Invalid case id or case key")]
    InvalidCredentials,

    #[error("Rate limited, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("CAPTCHA failed")]
    CaptchaFailed,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Decryption error: {0}")]
    Decryption(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CaseGateError {
    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::CaptchaFailed => StatusCode::BAD_REQUEST,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Decryption(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Database(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for response bodies
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::CaptchaFailed => "CAPTCHA_FAILED",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Decryption(_) => "INTERNAL",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Conflict(_) => "CONFLICT",
            Self::Database(_) => "UNAVAILABLE",
            Self::Config(_) | Self::Internal(_) => "INTERNAL",
        }
    }

    /// Message that is safe to hand back to a caller.
    ///
    /// Storage, crypto and configuration details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            Self::Decryption(_) | Self::Config(_) | Self::Internal(_) => {
                "Internal error".to_string()
            }
            Self::Database(_) => "Service temporarily unavailable".to_string(),
            other => other.to_string(),
        }
    }

    /// Seconds a client should wait before retrying, if any
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CaseGateError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for CaseGateError {
    fn from(err: serde_json::Error) -> Self {
        Self::Validation(format!("JSON error: {}", err))
    }
}

impl From<mongodb::error::Error> for CaseGateError {
    fn from(err: mongodb::error::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<bson::ser::Error> for CaseGateError {
    fn from(err: bson::ser::Error) -> Self {
        Self::Database(format!("BSON encode error: {}", err))
    }
}

impl From<jsonwebtoken::errors::Error> for CaseGateError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::Unauthorized(format!("JWT error: {}", err))
    }
}

/// Result type alias for casegate operations
pub type Result<T> = std::result::Result<T, CaseGateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            CaseGateError::InvalidCredentials.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            CaseGateError::RateLimited { retry_after_secs: 5 }.status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(CaseGateError::CaptchaFailed.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_internal_details_not_exposed() {
        let err = CaseGateError::Database("connection refused at 10.0.0.3".into());
        assert!(!err.public_message().contains("10.0.0.3"));

        let err = CaseGateError::Decryption("tag mismatch for org-1".into());
        assert_eq!(err.public_message(), "Internal error");
    }

    #[test]
    fn test_retry_after() {
        let err = CaseGateError::RateLimited { retry_after_secs: 42 };
        assert_eq!(err.retry_after(), Some(42));
        assert_eq!(CaseGateError::CaptchaFailed.retry_after(), None);
    }
}
