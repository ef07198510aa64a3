//! Reporter inbox access
//!
//! Every inbox request re-presents (case id, case key) and a CAPTCHA token.
//! The order of checks is fixed:
//!
//! 1. CAPTCHA
//! 2. attempt limits (per case id and address, and per address), checked
//!    together so a rejection is charged to neither
//! 3. lookup + constant-time digest comparison, on one code path whether or
//!    not the case exists
//!
//! Nothing here is audited: reporter activity is deliberately left out of the
//! organization's audit trail.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::audit::RequestContext;
use crate::auth::CaptchaVerifier;
use crate::cases::{
    normalize_body, validate_attachments, AttachmentRef, Case, CaseStatus, Message, SenderKind,
};
use crate::guard::AttemptLimiter;
use crate::identity::{verify_against, CaseId, CaseKey};
use crate::store::Store;
use crate::types::{CaseGateError, Result};

/// Attempt limits for inbox authentication
#[derive(Debug, Clone, Copy)]
pub struct GuardLimits {
    /// Attempts per (case id, address) per window
    pub max_attempts: u32,
    /// Attempts per address across all case ids per window
    pub max_attempts_per_address: u32,
    pub window_seconds: u64,
}

impl Default for GuardLimits {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            max_attempts_per_address: 30,
            window_seconds: 900,
        }
    }
}

/// Proof that (case id, case key) verified within the current request.
///
/// Only [`ThreadAccessGuard::authenticate`] can build one and it is never
/// serialized, so it cannot outlive the request that produced it.
#[derive(Debug)]
pub struct ReporterSession {
    case: Case,
}

impl ReporterSession {
    pub fn case_id(&self) -> &CaseId {
        &self.case.case_id
    }

    pub fn status(&self) -> CaseStatus {
        self.case.status
    }
}

/// Reporter-visible message; never carries the handler's user id
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReporterMessageView {
    pub id: String,
    pub sender: SenderKind,
    pub body: String,
    pub attachments: Vec<AttachmentRef>,
    pub created_at: DateTime<Utc>,
}

impl From<Message> for ReporterMessageView {
    fn from(message: Message) -> Self {
        Self {
            id: message.id,
            sender: message.sender,
            body: message.body,
            attachments: message.attachments,
            created_at: message.created_at,
        }
    }
}

pub struct ThreadAccessGuard {
    store: Arc<dyn Store>,
    captcha: Arc<dyn CaptchaVerifier>,
    per_case: AttemptLimiter,
    per_address: AttemptLimiter,
}

impl ThreadAccessGuard {
    pub fn new(
        store: Arc<dyn Store>,
        captcha: Arc<dyn CaptchaVerifier>,
        limits: GuardLimits,
    ) -> Self {
        Self {
            store,
            captcha,
            per_case: AttemptLimiter::new(limits.window_seconds, limits.max_attempts),
            per_address: AttemptLimiter::new(
                limits.window_seconds,
                limits.max_attempts_per_address,
            ),
        }
    }

    /// Verify a reporter's credentials for this request
    pub async fn authenticate(
        &self,
        raw_case_id: &str,
        presented: &CaseKey,
        captcha_token: Option<&str>,
        ctx: &RequestContext,
    ) -> Result<ReporterSession> {
        self.captcha.verify(captcha_token, ctx.ip).await?;

        let address = ctx.address_key();
        let case_bucket = format!("{}|{}", raw_case_id.trim().to_ascii_uppercase(), address);

        // Charged to both buckets or to neither
        self.per_case
            .check_and_record_with(&case_bucket, &self.per_address, &address)
            .map_err(|retry_after_secs| {
                warn!("inbox authentication rate limited");
                CaseGateError::RateLimited { retry_after_secs }
            })?;

        let case = match CaseId::parse(raw_case_id) {
            Some(case_id) => self.store.get_case(&case_id).await?,
            None => None,
        };

        let verified = verify_against(presented, case.as_ref().map(|c| c.key_digest.as_str()));

        match case {
            Some(case) if verified => Ok(ReporterSession { case }),
            _ => {
                debug!("inbox authentication failed");
                Err(CaseGateError::InvalidCredentials)
            }
        }
    }

    /// Reporter-visible thread, oldest first
    pub async fn list_thread(&self, session: &ReporterSession) -> Result<Vec<ReporterMessageView>> {
        let messages = self.store.list_messages(session.case_id()).await?;

        Ok(messages
            .into_iter()
            .filter(|m| m.sender.visible_to_reporter())
            .map(ReporterMessageView::from)
            .collect())
    }

    /// Append a reporter message to the session's case
    pub async fn post_reporter_message(
        &self,
        session: &ReporterSession,
        body: &str,
        attachments: Vec<AttachmentRef>,
    ) -> Result<ReporterMessageView> {
        if session.status() == CaseStatus::Closed {
            return Err(CaseGateError::Validation("Case is closed".into()));
        }

        let body = normalize_body(body)?;
        validate_attachments(session.case_id(), &attachments)?;

        let message = Message::new(
            session.case_id().clone(),
            SenderKind::Reporter,
            None,
            body,
            attachments,
        );
        self.store.insert_message(&message).await?;

        Ok(message.into())
    }

    /// Drop expired limiter entries
    pub fn cleanup(&self) {
        self.per_case.cleanup();
        self.per_address.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticCaptchaVerifier;
    use crate::cases::ReporterMode;
    use crate::identity::{generate_case_id, generate_case_key, hash_case_key};
    use crate::store::MemoryStore;

    async fn setup() -> (ThreadAccessGuard, Arc<MemoryStore>, CaseId, CaseKey) {
        let store = Arc::new(MemoryStore::new());
        let key = generate_case_key();
        let case = Case {
            case_id: generate_case_id(),
            org_id: "org-1".into(),
            channel_id: None,
            category: "fraud".into(),
            body: "report".into(),
            reporter_mode: ReporterMode::Anonymous,
            status: CaseStatus::Open,
            created_at: Utc::now(),
            acknowledged_at: None,
            feedback_due_at: None,
            feedback_given_at: None,
            key_digest: hash_case_key(&key),
            sealed_contact: None,
        };
        store.insert_case(&case).await.unwrap();

        let guard = ThreadAccessGuard::new(
            store.clone(),
            Arc::new(StaticCaptchaVerifier::accepting("ok")),
            GuardLimits::default(),
        );
        (guard, store, case.case_id, key)
    }

    fn ctx() -> RequestContext {
        RequestContext::new(Some("198.51.100.4".parse().unwrap()), None)
    }

    #[tokio::test]
    async fn test_authenticate_accepts_lowercase_id() {
        let (guard, _, case_id, key) = setup().await;
        let lower = case_id.as_str().to_ascii_lowercase();
        let session = guard
            .authenticate(&lower, &key, Some("ok"), &ctx())
            .await
            .unwrap();
        assert_eq!(session.case_id(), &case_id);
    }

    #[tokio::test]
    async fn test_captcha_checked_before_credentials() {
        let (guard, _, case_id, key) = setup().await;
        let err = guard
            .authenticate(case_id.as_str(), &key, Some("bad"), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, CaseGateError::CaptchaFailed));
    }

    #[tokio::test]
    async fn test_malformed_id_is_invalid_credentials() {
        let (guard, _, _, key) = setup().await;
        let err = guard
            .authenticate("not-a-case", &key, Some("ok"), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, CaseGateError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_thread_hides_internal_notes_and_authors() {
        let (guard, store, case_id, key) = setup().await;
        for (sender, author) in [
            (SenderKind::Handler, Some("handler-1".to_string())),
            (SenderKind::InternalNote, Some("handler-1".to_string())),
        ] {
            store
                .insert_message(&Message::new(
                    case_id.clone(),
                    sender,
                    author,
                    "text".into(),
                    Vec::new(),
                ))
                .await
                .unwrap();
        }

        let session = guard
            .authenticate(case_id.as_str(), &key, Some("ok"), &ctx())
            .await
            .unwrap();
        guard
            .post_reporter_message(&session, "follow-up", Vec::new())
            .await
            .unwrap();

        let thread = guard.list_thread(&session).await.unwrap();
        assert_eq!(thread.len(), 2);
        assert!(thread.iter().all(|m| m.sender != SenderKind::InternalNote));

        let json = serde_json::to_string(&thread).unwrap();
        assert!(!json.contains("handler-1"));
    }

    #[tokio::test]
    async fn test_closed_case_rejects_reporter_posts() {
        let (guard, store, case_id, key) = setup().await;
        store
            .update_case(&crate::store::CaseUpdate {
                case_id: case_id.clone(),
                expected_status: CaseStatus::Open,
                status: CaseStatus::Closed,
                acknowledged_at: None,
                feedback_due_at: None,
                feedback_given_at: None,
            })
            .await
            .unwrap();

        let session = guard
            .authenticate(case_id.as_str(), &key, Some("ok"), &ctx())
            .await
            .unwrap();
        assert!(guard
            .post_reporter_message(&session, "hello", Vec::new())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_per_address_limit_spans_case_ids() {
        let store = Arc::new(MemoryStore::new());
        let guard = ThreadAccessGuard::new(
            store,
            Arc::new(StaticCaptchaVerifier::permissive()),
            GuardLimits {
                max_attempts: 5,
                max_attempts_per_address: 3,
                window_seconds: 900,
            },
        );
        let key = generate_case_key();

        for _ in 0..3 {
            let id = generate_case_id();
            let err = guard
                .authenticate(id.as_str(), &key, Some("t"), &ctx())
                .await
                .unwrap_err();
            assert!(matches!(err, CaseGateError::InvalidCredentials));
        }

        let id = generate_case_id();
        let err = guard
            .authenticate(id.as_str(), &key, Some("t"), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, CaseGateError::RateLimited { .. }));
    }

    #[tokio::test]
    async fn test_address_rejection_does_not_charge_case_bucket() {
        let (guard, _, case_id, key) = setup().await;
        let guard = ThreadAccessGuard {
            per_address: AttemptLimiter::new(900, 2),
            ..guard
        };
        let client = ctx();

        for _ in 0..2 {
            guard
                .authenticate(case_id.as_str(), &key, Some("ok"), &client)
                .await
                .unwrap();
        }
        for _ in 0..3 {
            let err = guard
                .authenticate(case_id.as_str(), &key, Some("ok"), &client)
                .await
                .unwrap_err();
            assert!(matches!(err, CaseGateError::RateLimited { .. }));
        }

        let bucket = format!("{}|{}", case_id.as_str(), client.address_key());
        let now = Utc::now().timestamp() as u64;
        assert_eq!(guard.per_case.count_at(&bucket, now), 2);
        assert_eq!(guard.per_address.count_at(&client.address_key(), now), 2);
    }
}
