//! CAPTCHA verification
//!
//! Only the pass/fail contract matters to casegate. Every failure mode of the
//! provider (bad token, timeout, transport error, malformed reply) is
//! `CaptchaFailed`.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::types::{CaseGateError, Result};

#[async_trait]
pub trait CaptchaVerifier: Send + Sync {
    /// `Ok(())` only if the provider confirmed the token
    async fn verify(&self, token: Option<&str>, remote_ip: Option<IpAddr>) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct SiteVerifyResponse {
    success: bool,
    #[serde(default, rename = "error-codes")]
    error_codes: Vec<String>,
}

/// Siteverify-style verifier (Turnstile, hCaptcha, reCAPTCHA)
pub struct HttpCaptchaVerifier {
    verify_url: String,
    secret: String,
    http_client: reqwest::Client,
}

impl HttpCaptchaVerifier {
    pub fn new(verify_url: String, secret: String, timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("casegate/1.0")
            .build()
            .unwrap_or_default();

        Self {
            verify_url,
            secret,
            http_client,
        }
    }
}

#[async_trait]
impl CaptchaVerifier for HttpCaptchaVerifier {
    async fn verify(&self, token: Option<&str>, remote_ip: Option<IpAddr>) -> Result<()> {
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(CaseGateError::CaptchaFailed)?;

        let mut form = vec![
            ("secret", self.secret.clone()),
            ("response", token.to_string()),
        ];
        if let Some(ip) = remote_ip {
            form.push(("remoteip", ip.to_string()));
        }

        let response = self
            .http_client
            .post(&self.verify_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                warn!("CAPTCHA provider unreachable: {}", e);
                CaseGateError::CaptchaFailed
            })?;

        let body: SiteVerifyResponse = response.json().await.map_err(|e| {
            warn!("CAPTCHA provider returned an unreadable reply: {}", e);
            CaseGateError::CaptchaFailed
        })?;

        if body.success {
            Ok(())
        } else {
            debug!(errors = ?body.error_codes, "CAPTCHA rejected");
            Err(CaseGateError::CaptchaFailed)
        }
    }
}

/// Fixed-answer verifier for dev mode and tests
pub struct StaticCaptchaVerifier {
    /// Token that passes; `None` accepts any non-empty token
    accepted: Option<String>,
}

impl StaticCaptchaVerifier {
    /// Accept any non-empty token
    pub fn permissive() -> Self {
        Self { accepted: None }
    }

    /// Accept exactly `token`
    pub fn accepting(token: impl Into<String>) -> Self {
        Self {
            accepted: Some(token.into()),
        }
    }
}

#[async_trait]
impl CaptchaVerifier for StaticCaptchaVerifier {
    async fn verify(&self, token: Option<&str>, _remote_ip: Option<IpAddr>) -> Result<()> {
        match (token.map(str::trim), &self.accepted) {
            (Some(t), None) if !t.is_empty() => Ok(()),
            (Some(t), Some(expected)) if t == expected => Ok(()),
            _ => Err(CaseGateError::CaptchaFailed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_verifier() {
        let permissive = StaticCaptchaVerifier::permissive();
        assert!(permissive.verify(Some("anything"), None).await.is_ok());
        assert!(permissive.verify(Some("  "), None).await.is_err());
        assert!(permissive.verify(None, None).await.is_err());

        let strict = StaticCaptchaVerifier::accepting("pass");
        assert!(strict.verify(Some("pass"), None).await.is_ok());
        assert!(matches!(
            strict.verify(Some("fail"), None).await,
            Err(CaseGateError::CaptchaFailed)
        ));
    }

    #[tokio::test]
    async fn test_http_verifier_fails_closed_when_unreachable() {
        // Nothing listens on port 9 of the loopback interface
        let verifier = HttpCaptchaVerifier::new(
            "http://127.0.0.1:9/siteverify".into(),
            "secret".into(),
            Duration::from_millis(200),
        );
        assert!(matches!(
            verifier.verify(Some("token"), None).await,
            Err(CaseGateError::CaptchaFailed)
        ));
    }

    #[tokio::test]
    async fn test_http_verifier_rejects_missing_token_without_calling_out() {
        let verifier = HttpCaptchaVerifier::new(
            "http://127.0.0.1:9/siteverify".into(),
            "secret".into(),
            Duration::from_millis(200),
        );
        assert!(verifier.verify(None, None).await.is_err());
    }
}
