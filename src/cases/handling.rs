//! Handler-side case operations
//!
//! Every operation is scoped to the actor's organization: a case owned by
//! another organization is reported as `NotFound`, never `Forbidden`.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::info;

use crate::audit::{AuditAction, AuditLog, AuditRecord, RequestContext};
use crate::auth::{require, Actor};
use crate::identity::CaseId;
use crate::sla::{load_policy, OrgPolicy};
use crate::store::Store;
use crate::types::{CaseGateError, Result};

use super::model::{
    normalize_body, validate_attachments, AttachmentRef, Case, CaseLogEntry, CaseStatus,
    CaseSummary, Message, ReportChannel, SenderKind,
};
use super::status::plan_transition;

/// A case with its full thread, as handlers see it
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerThread {
    pub case: CaseSummary,
    pub messages: Vec<Message>,
    pub status_log: Vec<CaseLogEntry>,
}

/// Load a case of the actor's organization; other organizations' cases
/// are `NotFound`
pub(crate) async fn load_org_case(
    store: &dyn Store,
    actor: &Actor,
    case_id: &CaseId,
) -> Result<Case> {
    store
        .get_case(case_id)
        .await?
        .filter(|c| c.org_id == actor.org_id)
        .ok_or_else(|| CaseGateError::NotFound("Case not found".into()))
}

/// Thread of a case without role or audit checks; callers gate access
pub(crate) async fn case_thread(store: &dyn Store, case: &Case) -> Result<HandlerThread> {
    Ok(HandlerThread {
        case: CaseSummary::from(case),
        messages: store.list_messages(&case.case_id).await?,
        status_log: store.list_case_log(&case.case_id).await?,
    })
}

pub struct CaseService {
    store: Arc<dyn Store>,
    audit: AuditLog,
}

impl CaseService {
    pub fn new(store: Arc<dyn Store>, audit: AuditLog) -> Self {
        Self { store, audit }
    }

    /// Load a case of the actor's organization
    pub async fn load_case(&self, actor: &Actor, case_id: &CaseId) -> Result<Case> {
        load_org_case(self.store.as_ref(), actor, case_id).await
    }

    /// Move a case to `target`.
    ///
    /// Setting the status a case already has changes nothing and logs nothing.
    pub async fn set_status(
        &self,
        actor: &Actor,
        case_id: &CaseId,
        target: CaseStatus,
        ctx: &RequestContext,
    ) -> Result<CaseSummary> {
        require("case.status", actor.role)?;

        let mut case = self.load_case(actor, case_id).await?;
        let policy = load_policy(self.store.as_ref(), &case.org_id).await?;
        let now = Utc::now();

        let Some(update) = plan_transition(&case, target, &policy, now)? else {
            return Ok(CaseSummary::from(&case));
        };

        if !self.store.update_case(&update).await? {
            return Err(CaseGateError::Conflict(
                "Case status changed concurrently, reload and retry".into(),
            ));
        }

        let old_status = case.status;
        update.apply_to(&mut case);

        self.store
            .append_case_log(&CaseLogEntry {
                case_id: case.case_id.clone(),
                org_id: case.org_id.clone(),
                old_status,
                new_status: target,
                actor_id: actor.user_id.clone(),
                at: now,
            })
            .await?;

        self.audit
            .record(
                AuditRecord::new(
                    &case.org_id,
                    AuditAction::CaseStatusChanged,
                    "case",
                    case.case_id.as_str(),
                )
                .with_actor(&actor.user_id)
                .with_fingerprint(self.audit.fingerprint(ctx))
                .with_detail(format!("{} -> {}", old_status, target)),
            )
            .await;

        info!(
            case_id = %case.case_id,
            from = old_status.as_str(),
            to = target.as_str(),
            "case status changed"
        );
        Ok(CaseSummary::from(&case))
    }

    /// Post a reply to the reporter or an internal note
    pub async fn post_handler_message(
        &self,
        actor: &Actor,
        case_id: &CaseId,
        body: &str,
        internal: bool,
        attachments: Vec<AttachmentRef>,
        ctx: &RequestContext,
    ) -> Result<Message> {
        require("case.reply", actor.role)?;

        let case = self.load_case(actor, case_id).await?;
        let sender = if internal {
            SenderKind::InternalNote
        } else {
            SenderKind::Handler
        };
        if case.status == CaseStatus::Closed && sender == SenderKind::Handler {
            return Err(CaseGateError::Validation("Case is closed".into()));
        }

        let body = normalize_body(body)?;
        validate_attachments(&case.case_id, &attachments)?;

        let message = Message::new(
            case.case_id.clone(),
            sender,
            Some(actor.user_id.clone()),
            body,
            attachments,
        );
        self.store.insert_message(&message).await?;

        self.audit
            .record(
                AuditRecord::new(
                    &case.org_id,
                    AuditAction::MessagePosted,
                    "message",
                    &message.id,
                )
                .with_actor(&actor.user_id)
                .with_fingerprint(self.audit.fingerprint(ctx))
                .with_detail(format!("case={} sender={:?}", case.case_id, sender)),
            )
            .await;

        Ok(message)
    }

    /// Full thread including internal notes
    pub async fn handler_thread(
        &self,
        actor: &Actor,
        case_id: &CaseId,
        ctx: &RequestContext,
    ) -> Result<HandlerThread> {
        require("case.read", actor.role)?;

        let case = self.load_case(actor, case_id).await?;
        let thread = case_thread(self.store.as_ref(), &case).await?;

        self.audit
            .record(
                AuditRecord::new(
                    &case.org_id,
                    AuditAction::CaseViewed,
                    "case",
                    case.case_id.as_str(),
                )
                .with_actor(&actor.user_id)
                .with_fingerprint(self.audit.fingerprint(ctx)),
            )
            .await;

        Ok(thread)
    }

    /// Replace the actor's organization SLA policy
    pub async fn put_policy(
        &self,
        actor: &Actor,
        mut policy: OrgPolicy,
        ctx: &RequestContext,
    ) -> Result<OrgPolicy> {
        require("sla.policy", actor.role)?;

        policy.org_id = actor.org_id.clone();
        policy.validate()?;
        self.store.put_org_policy(&policy).await?;

        self.audit
            .record(
                AuditRecord::new(
                    &actor.org_id,
                    AuditAction::SlaPolicyChanged,
                    "organization",
                    &actor.org_id,
                )
                .with_actor(&actor.user_id)
                .with_fingerprint(self.audit.fingerprint(ctx))
                .with_detail(format!(
                    "enabled={} ack_days={} feedback_days={}",
                    policy.sla_enabled, policy.ack_days, policy.feedback_days
                )),
            )
            .await;

        Ok(policy)
    }

    /// Current policy of the actor's organization
    pub async fn get_policy(&self, actor: &Actor) -> Result<OrgPolicy> {
        require("sla.read", actor.role)?;
        load_policy(self.store.as_ref(), &actor.org_id).await
    }

    /// Return the organization's default intake channel, creating it if needed
    pub async fn ensure_channel(&self, actor: &Actor, slug: &str) -> Result<ReportChannel> {
        require("channel.manage", actor.role)?;

        let slug = slug.trim();
        let valid = (3..=64).contains(&slug.len())
            && slug
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-');
        if !valid {
            return Err(CaseGateError::Validation(
                "Slug must be 3-64 characters of a-z, 0-9 and '-'".into(),
            ));
        }

        self.store.ensure_default_channel(&actor.org_id, slug).await
    }
}
