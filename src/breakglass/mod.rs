//! Break-glass access
//!
//! An admin can open any case of their organization outside the normal
//! thread flow by stating why. The audit write is the control here: a grant
//! only exists once its `BREAK_GLASS_ACCESS` record is stored, and each read
//! through the grant is audited again.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, warn};

use crate::audit::{AuditAction, AuditLog, AuditRecord, RequestContext};
use crate::auth::{require, Actor};
use crate::cases::{case_thread, load_org_case, Case, HandlerThread};
use crate::identity::CaseId;
use crate::sealing::{EncryptedPayload, EncryptionCodec, ReporterContact};
use crate::store::Store;
use crate::types::{CaseGateError, Result};

/// Minimum trimmed justification length
pub const MIN_JUSTIFICATION_CHARS: usize = 10;

/// Grant lifetime in minutes
pub const GRANT_TTL_MINUTES: i64 = 15;

/// Time-boxed access to one case for one admin
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessGrant {
    pub grant_id: String,
    pub case_id: CaseId,
    pub org_id: String,
    pub actor_id: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessGrant {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// What a grant unlocks: the full thread plus the opened contact seal
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakGlassView {
    #[serde(flatten)]
    pub thread: HandlerThread,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact: Option<ReporterContact>,
}

pub struct BreakGlassService {
    store: Arc<dyn Store>,
    codec: EncryptionCodec,
    audit: AuditLog,
    grants: DashMap<String, AccessGrant>,
}

impl BreakGlassService {
    pub fn new(store: Arc<dyn Store>, codec: EncryptionCodec, audit: AuditLog) -> Self {
        Self {
            store,
            codec,
            audit,
            grants: DashMap::new(),
        }
    }

    /// Open a case in an emergency.
    ///
    /// Rejections (short justification, role, unknown case) happen before
    /// anything is written. If the audit write fails no grant is issued.
    pub async fn break_glass(
        &self,
        actor: &Actor,
        case_id: &CaseId,
        justification: &str,
        ctx: &RequestContext,
    ) -> Result<AccessGrant> {
        let justification = justification.trim();
        if justification.chars().count() < MIN_JUSTIFICATION_CHARS {
            return Err(CaseGateError::Validation(format!(
                "Justification must be at least {} characters",
                MIN_JUSTIFICATION_CHARS
            )));
        }
        require("case.break_glass", actor.role)?;

        let case = load_org_case(self.store.as_ref(), actor, case_id).await?;

        let record = AuditRecord::new(
            &case.org_id,
            AuditAction::BreakGlassAccess,
            "case",
            case.case_id.as_str(),
        )
        .with_actor(&actor.user_id)
        .with_fingerprint(self.audit.fingerprint(ctx))
        .with_detail(justification);
        self.audit.write(record).await?;

        let grant = AccessGrant {
            grant_id: uuid::Uuid::new_v4().to_string(),
            case_id: case.case_id.clone(),
            org_id: case.org_id.clone(),
            actor_id: actor.user_id.clone(),
            expires_at: Utc::now() + Duration::minutes(GRANT_TTL_MINUTES),
        };
        self.grants.insert(grant.grant_id.clone(), grant.clone());

        warn!(
            org_id = %case.org_id,
            case_id = %case.case_id,
            actor_id = %actor.user_id,
            "break-glass access granted"
        );
        Ok(grant)
    }

    /// Read a case through a grant issued to this actor for that case
    pub async fn read_with_grant(
        &self,
        actor: &Actor,
        case_id: &CaseId,
        grant_id: &str,
        ctx: &RequestContext,
    ) -> Result<BreakGlassView> {
        require("case.break_glass", actor.role)?;

        let grant = self.active_grant(actor, case_id, grant_id, Utc::now())?;
        let case = load_org_case(self.store.as_ref(), actor, &grant.case_id).await?;

        self.audit
            .write(
                AuditRecord::new(
                    &case.org_id,
                    AuditAction::BreakGlassRead,
                    "case",
                    case.case_id.as_str(),
                )
                .with_actor(&actor.user_id)
                .with_fingerprint(self.audit.fingerprint(ctx))
                .with_detail(format!("grant={}", grant.grant_id)),
            )
            .await?;

        Ok(BreakGlassView {
            thread: case_thread(self.store.as_ref(), &case).await?,
            contact: self.open_contact(&case),
        })
    }

    fn active_grant(
        &self,
        actor: &Actor,
        case_id: &CaseId,
        grant_id: &str,
        now: DateTime<Utc>,
    ) -> Result<AccessGrant> {
        let grant = self
            .grants
            .get(grant_id)
            .map(|g| g.value().clone())
            .filter(|g| {
                g.actor_id == actor.user_id && g.org_id == actor.org_id && &g.case_id == case_id
            })
            .ok_or_else(|| CaseGateError::NotFound("Grant not found".into()))?;

        if grant.is_expired_at(now) {
            self.grants.remove(grant_id);
            return Err(CaseGateError::Forbidden("Grant expired".into()));
        }
        Ok(grant)
    }

    fn open_contact(&self, case: &Case) -> Option<ReporterContact> {
        let blob = case.sealed_contact.as_deref()?;
        let opened = EncryptedPayload::from_blob(blob)
            .and_then(|payload| self.codec.open_json(&case.org_id, &payload));
        match opened {
            Ok(contact) => Some(contact),
            Err(e) => {
                warn!(case_id = %case.case_id, "sealed contact unreadable: {}", e);
                None
            }
        }
    }

    /// Drop expired grants, returning how many were removed
    pub fn cleanup_expired(&self) -> usize {
        self.cleanup_expired_at(Utc::now())
    }

    pub fn cleanup_expired_at(&self, now: DateTime<Utc>) -> usize {
        let before = self.grants.len();
        self.grants.retain(|_, g| !g.is_expired_at(now));
        let removed = before.saturating_sub(self.grants.len());
        if removed > 0 {
            debug!("removed {} expired break-glass grants", removed);
        }
        removed
    }

    pub fn active_grants(&self) -> usize {
        self.grants.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::cases::{CaseService, CaseStatus, Message, ReporterMode, SenderKind};
    use crate::identity::generate_case_id;
    use crate::sealing::HkdfKeyResolver;
    use crate::store::MemoryStore;

    async fn setup() -> (BreakGlassService, Arc<MemoryStore>, CaseId, ReporterContact) {
        let store = Arc::new(MemoryStore::new());
        let codec = EncryptionCodec::new(Arc::new(HkdfKeyResolver::new(1, [3u8; 32])));
        let contact = ReporterContact {
            email: Some("reporter@example.org".into()),
            ..Default::default()
        };
        let case = Case {
            case_id: generate_case_id(),
            org_id: "org-1".into(),
            channel_id: None,
            category: "fraud".into(),
            body: "report".into(),
            reporter_mode: ReporterMode::Identified,
            status: CaseStatus::Open,
            created_at: Utc::now(),
            acknowledged_at: None,
            feedback_due_at: None,
            feedback_given_at: None,
            key_digest: "00".repeat(32),
            sealed_contact: Some(codec.seal_json("org-1", &contact).unwrap().to_blob().unwrap()),
        };
        store.insert_case(&case).await.unwrap();
        let service = BreakGlassService::new(
            store.clone(),
            codec,
            AuditLog::new(store.clone(), "salt"),
        );
        (service, store, case.case_id, contact)
    }

    fn admin() -> Actor {
        Actor::new("admin-1", "org-1", Role::Admin)
    }

    async fn count(store: &MemoryStore, action: AuditAction) -> usize {
        store
            .list_audit("org-1")
            .await
            .unwrap()
            .iter()
            .filter(|r| r.action == action)
            .count()
    }

    #[tokio::test]
    async fn test_short_justification_writes_nothing() {
        let (service, store, case_id, _) = setup().await;
        let err = service
            .break_glass(&admin(), &case_id, "123456789", &RequestContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CaseGateError::Validation(_)));
        assert_eq!(count(&store, AuditAction::BreakGlassAccess).await, 0);
        assert_eq!(service.active_grants(), 0);

        // Padding does not count
        assert!(service
            .break_glass(&admin(), &case_id, "   short    ", &RequestContext::default())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_grant_writes_exactly_one_record() {
        let (service, store, case_id, _) = setup().await;
        let grant = service
            .break_glass(&admin(), &case_id, "1234567890", &RequestContext::default())
            .await
            .unwrap();
        assert_eq!(grant.case_id, case_id);
        assert_eq!(count(&store, AuditAction::BreakGlassAccess).await, 1);

        let records = store.list_audit("org-1").await.unwrap();
        assert_eq!(records[0].detail.as_deref(), Some("1234567890"));
        assert_eq!(records[0].actor_id.as_deref(), Some("admin-1"));
    }

    #[tokio::test]
    async fn test_handler_and_other_org_rejected() {
        let (service, store, case_id, _) = setup().await;
        let handler = Actor::new("handler-1", "org-1", Role::Handler);
        let err = service
            .break_glass(&handler, &case_id, "urgent legal hold", &RequestContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CaseGateError::Forbidden(_)));

        let outsider = Actor::new("admin-2", "org-2", Role::Admin);
        let err = service
            .break_glass(&outsider, &case_id, "urgent legal hold", &RequestContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CaseGateError::NotFound(_)));
        assert_eq!(count(&store, AuditAction::BreakGlassAccess).await, 0);
    }

    #[tokio::test]
    async fn test_read_with_grant_opens_contact_and_audits() {
        let (service, store, case_id, contact) = setup().await;
        let ctx = RequestContext::default();
        let grant = service
            .break_glass(&admin(), &case_id, "regulator request #42", &ctx)
            .await
            .unwrap();

        let view = service
            .read_with_grant(&admin(), &case_id, &grant.grant_id, &ctx)
            .await
            .unwrap();
        assert_eq!(view.thread.case.case_id, case_id);
        assert_eq!(view.contact, Some(contact));
        assert_eq!(count(&store, AuditAction::BreakGlassRead).await, 1);

        // Grants are personal
        let other_admin = Actor::new("admin-3", "org-1", Role::Admin);
        let err = service
            .read_with_grant(&other_admin, &case_id, &grant.grant_id, &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, CaseGateError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_grant_view_matches_handler_thread() {
        let (service, store, case_id, _) = setup().await;
        store
            .insert_message(&Message::new(
                case_id.clone(),
                SenderKind::InternalNote,
                Some("handler-1".into()),
                "Check the payroll exports".into(),
                Vec::new(),
            ))
            .await
            .unwrap();
        let ctx = RequestContext::default();

        let cases = CaseService::new(store.clone(), AuditLog::new(store.clone(), "salt"));
        let handler_view = cases.handler_thread(&admin(), &case_id, &ctx).await.unwrap();

        let grant = service
            .break_glass(&admin(), &case_id, "regulator request #42", &ctx)
            .await
            .unwrap();
        let view = service
            .read_with_grant(&admin(), &case_id, &grant.grant_id, &ctx)
            .await
            .unwrap();

        assert_eq!(view.thread.messages.len(), 1);
        assert_eq!(
            serde_json::to_value(&view.thread).unwrap(),
            serde_json::to_value(&handler_view).unwrap()
        );
    }

    #[tokio::test]
    async fn test_expired_grants_are_rejected_and_cleaned() {
        let (service, _, case_id, _) = setup().await;
        let grant = service
            .break_glass(&admin(), &case_id, "regulator request #42", &RequestContext::default())
            .await
            .unwrap();

        let later = grant.expires_at + Duration::seconds(1);
        let err = service
            .active_grant(&admin(), &case_id, &grant.grant_id, later)
            .unwrap_err();
        assert!(matches!(err, CaseGateError::Forbidden(_)));
        assert_eq!(service.active_grants(), 0);

        service
            .break_glass(&admin(), &case_id, "regulator request #43", &RequestContext::default())
            .await
            .unwrap();
        assert_eq!(service.cleanup_expired_at(later + Duration::minutes(GRANT_TTL_MINUTES)), 1);
    }
}
