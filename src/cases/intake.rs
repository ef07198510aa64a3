//! Report intake
//!
//! Creates the case and its identity pair. The case key leaves the service
//! exactly once, in the [`CaseReceipt`]; only its digest is stored.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize, Serializer};
use tracing::{info, warn};

use crate::audit::{AuditAction, AuditLog, AuditRecord, RequestContext};
use crate::auth::CaptchaVerifier;
use crate::identity::{generate_case_id, generate_case_key, hash_case_key, CaseId, CaseKey};
use crate::sealing::{EncryptionCodec, ReporterContact};
use crate::sla::load_policy;
use crate::store::Store;
use crate::types::{CaseGateError, Result};

use super::model::{normalize_body, Case, CaseStatus, ReporterMode};

/// Case id draws before giving up on a colliding id
const MAX_ID_ATTEMPTS: usize = 3;

const MAX_CATEGORY_CHARS: usize = 100;

/// A reporter's submission
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReport {
    pub category: String,
    pub body: String,
    #[serde(default)]
    pub reporter_mode: ReporterMode,
    #[serde(default)]
    pub contact: Option<ReporterContact>,
    #[serde(default)]
    pub captcha_token: Option<String>,
}

/// What the reporter gets back, once
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseReceipt {
    pub case_id: CaseId,
    #[serde(serialize_with = "serialize_case_key")]
    pub case_key: CaseKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback_due_at: Option<DateTime<Utc>>,
}

fn serialize_case_key<S: Serializer>(key: &CaseKey, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(key.expose())
}

pub struct IntakeService {
    store: Arc<dyn Store>,
    codec: EncryptionCodec,
    captcha: Arc<dyn CaptchaVerifier>,
    audit: AuditLog,
}

impl IntakeService {
    pub fn new(
        store: Arc<dyn Store>,
        codec: EncryptionCodec,
        captcha: Arc<dyn CaptchaVerifier>,
        audit: AuditLog,
    ) -> Self {
        Self {
            store,
            codec,
            captcha,
            audit,
        }
    }

    /// File a report through the channel at `channel_slug`
    pub async fn create_case(
        &self,
        channel_slug: &str,
        report: NewReport,
        ctx: &RequestContext,
    ) -> Result<CaseReceipt> {
        self.captcha
            .verify(report.captcha_token.as_deref(), ctx.ip)
            .await?;

        let channel = self
            .store
            .get_channel(channel_slug)
            .await?
            .ok_or_else(|| CaseGateError::NotFound("Channel not found".into()))?;

        let category = report.category.trim();
        if category.is_empty() || category.chars().count() > MAX_CATEGORY_CHARS {
            return Err(CaseGateError::Validation("Invalid category".into()));
        }
        let body = normalize_body(&report.body)?;

        let sealed_contact = match (report.reporter_mode, report.contact) {
            (_, None) => None,
            (ReporterMode::Anonymous, Some(_)) => {
                return Err(CaseGateError::Validation(
                    "Anonymous reports cannot carry contact details".into(),
                ))
            }
            (ReporterMode::Identified, Some(contact)) => {
                contact.validate()?;
                Some(self.codec.seal_json(&channel.org_id, &contact)?.to_blob()?)
            }
        };

        let policy = load_policy(self.store.as_ref(), &channel.org_id).await?;
        let created_at = Utc::now();
        let feedback_due_at = policy
            .sla_enabled
            .then(|| created_at + Duration::days(policy.ack_days + policy.feedback_days));

        let case_key = generate_case_key();
        let mut case = Case {
            case_id: generate_case_id(),
            org_id: channel.org_id.clone(),
            channel_id: Some(channel.channel_id.clone()),
            category: category.to_string(),
            body,
            reporter_mode: report.reporter_mode,
            status: CaseStatus::Open,
            created_at,
            acknowledged_at: None,
            feedback_due_at,
            feedback_given_at: None,
            key_digest: hash_case_key(&case_key),
            sealed_contact,
        };

        let mut attempt = 1;
        loop {
            match self.store.insert_case(&case).await {
                Ok(()) => break,
                Err(CaseGateError::Conflict(_)) if attempt < MAX_ID_ATTEMPTS => {
                    warn!("case id collision, drawing a new id");
                    case.case_id = generate_case_id();
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }

        self.audit
            .record(AuditRecord::new(
                &case.org_id,
                AuditAction::CaseCreated,
                "case",
                case.case_id.as_str(),
            ))
            .await;

        info!(org_id = %case.org_id, case_id = %case.case_id, "case created");

        Ok(CaseReceipt {
            case_id: case.case_id,
            case_key,
            feedback_due_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticCaptchaVerifier;
    use crate::identity::verify;
    use crate::sealing::{EncryptedPayload, HkdfKeyResolver};
    use crate::sla::OrgPolicy;
    use crate::store::MemoryStore;

    async fn setup() -> (IntakeService, Arc<MemoryStore>, EncryptionCodec) {
        let store = Arc::new(MemoryStore::new());
        store.ensure_default_channel("org-1", "acme").await.unwrap();
        let codec = EncryptionCodec::new(Arc::new(HkdfKeyResolver::new(1, [9u8; 32])));
        let service = IntakeService::new(
            store.clone(),
            codec.clone(),
            Arc::new(StaticCaptchaVerifier::permissive()),
            AuditLog::new(store.clone(), "salt"),
        );
        (service, store, codec)
    }

    fn report(mode: ReporterMode, contact: Option<ReporterContact>) -> NewReport {
        NewReport {
            category: "fraud".into(),
            body: "Invoices are being split to avoid approval.".into(),
            reporter_mode: mode,
            contact,
            captcha_token: Some("token".into()),
        }
    }

    #[tokio::test]
    async fn test_create_stores_digest_not_key() {
        let (service, store, _) = setup().await;
        let receipt = service
            .create_case("acme", report(ReporterMode::Anonymous, None), &RequestContext::default())
            .await
            .unwrap();

        let case = store.get_case(&receipt.case_id).await.unwrap().unwrap();
        assert_ne!(case.key_digest, receipt.case_key.expose());
        assert!(verify(&receipt.case_key, &case.key_digest));
        assert_eq!(case.status, CaseStatus::Open);

        let audit = store.list_audit("org-1").await.unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].action, AuditAction::CaseCreated);
        assert!(audit[0].ip_hash.is_none());
    }

    #[tokio::test]
    async fn test_feedback_due_at_intake() {
        let (service, store, _) = setup().await;
        let receipt = service
            .create_case("acme", report(ReporterMode::Anonymous, None), &RequestContext::default())
            .await
            .unwrap();
        let case = store.get_case(&receipt.case_id).await.unwrap().unwrap();
        assert_eq!(
            receipt.feedback_due_at,
            Some(case.created_at + Duration::days(97))
        );

        let mut policy = OrgPolicy::default_for("org-1");
        policy.sla_enabled = false;
        store.put_org_policy(&policy).await.unwrap();
        let receipt = service
            .create_case("acme", report(ReporterMode::Anonymous, None), &RequestContext::default())
            .await
            .unwrap();
        assert!(receipt.feedback_due_at.is_none());
    }

    #[tokio::test]
    async fn test_contact_sealed_for_identified_only() {
        let (service, store, codec) = setup().await;
        let contact = ReporterContact {
            email: Some("reporter@example.org".into()),
            ..Default::default()
        };

        let err = service
            .create_case(
                "acme",
                report(ReporterMode::Anonymous, Some(contact.clone())),
                &RequestContext::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CaseGateError::Validation(_)));

        let receipt = service
            .create_case(
                "acme",
                report(ReporterMode::Identified, Some(contact.clone())),
                &RequestContext::default(),
            )
            .await
            .unwrap();
        let case = store.get_case(&receipt.case_id).await.unwrap().unwrap();
        let blob = case.sealed_contact.unwrap();
        assert!(!blob.contains("reporter@example.org"));

        let payload = EncryptedPayload::from_blob(&blob).unwrap();
        let opened: ReporterContact = codec.open_json("org-1", &payload).unwrap();
        assert_eq!(opened, contact);
    }

    #[tokio::test]
    async fn test_unknown_channel_and_captcha() {
        let (service, _, _) = setup().await;
        let err = service
            .create_case("nope", report(ReporterMode::Anonymous, None), &RequestContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CaseGateError::NotFound(_)));

        let mut r = report(ReporterMode::Anonymous, None);
        r.captcha_token = None;
        let err = service
            .create_case("acme", r, &RequestContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CaseGateError::CaptchaFailed));
    }

    #[tokio::test]
    async fn test_receipt_serializes_key_once() {
        let (service, _, _) = setup().await;
        let receipt = service
            .create_case("acme", report(ReporterMode::Anonymous, None), &RequestContext::default())
            .await
            .unwrap();
        let json = serde_json::to_value(&receipt).unwrap();
        assert_eq!(json["caseKey"], receipt.case_key.expose());
        assert_eq!(json["caseId"], receipt.case_id.as_str());
    }
}
