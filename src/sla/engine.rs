//! SLA due dates, deadline status and the overdue sweep.
//!
//! # Sweep protocol
//!
//! For each open case of an organization with SLA tracking enabled, and for
//! each deadline that is overdue:
//!
//! 1. claim the due condition by inserting a `PENDING` event (`SKIPPED` when
//!    the organization has nobody to notify); the store refuses a second claim
//!    for the same `(case, kind, due_at)`
//! 2. send the notification (best effort, bounded by the mailer's timeout)
//! 3. on delivery, append a `SENT` event for the same due condition
//!
//! A failure on one case is logged and the sweep moves on.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::audit::{AuditAction, AuditLog, AuditRecord};
use crate::auth::{require, Actor};
use crate::cases::{Case, CaseStatus};
use crate::identity::CaseId;
use crate::sealing::{EncryptedPayload, EncryptionCodec, ReporterContact};
use crate::store::Store;
use crate::types::{CaseGateError, Result};

use super::event::{SlaEvent, SlaEventKind, SlaEventStatus};
use super::mail::{Mailer, Notification};
use super::policy::{load_policy, OrgPolicy};

/// Events returned with a status query
pub const RECENT_EVENT_LIMIT: usize = 10;

/// The two tracked deadlines of a case
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DueDates {
    pub ack_due_at: DateTime<Utc>,
    /// Unset until intake or the first acknowledgement stamps it
    pub feedback_due_at: Option<DateTime<Utc>>,
}

pub fn compute_due_dates(case: &Case, policy: &OrgPolicy) -> DueDates {
    DueDates {
        ack_due_at: case.created_at + Duration::days(policy.ack_days),
        feedback_due_at: case.feedback_due_at,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeadlineStatus {
    Due,
    Overdue,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadlineReport {
    pub due_at: Option<DateTime<Utc>>,
    pub status: DeadlineStatus,
}

/// Status of both deadlines at one instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SlaStatus {
    pub ack: DeadlineReport,
    pub feedback: DeadlineReport,
}

fn deadline(done: bool, due_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DeadlineReport {
    let status = match due_at {
        _ if done => DeadlineStatus::Done,
        Some(due) if now > due => DeadlineStatus::Overdue,
        _ => DeadlineStatus::Due,
    };
    DeadlineReport { due_at, status }
}

/// Deadline status of `case` at `now`.
///
/// A closed case has nothing left to track, so both deadlines are done.
pub fn status(case: &Case, policy: &OrgPolicy, now: DateTime<Utc>) -> SlaStatus {
    let due = compute_due_dates(case, policy);
    let closed = case.status == CaseStatus::Closed;

    let ack_done = closed || case.acknowledged_at.is_some();
    let feedback_done = closed
        || case.status == CaseStatus::FeedbackGiven
        || case.feedback_given_at.is_some();

    SlaStatus {
        ack: deadline(ack_done, Some(due.ack_due_at), now),
        feedback: deadline(feedback_done, due.feedback_due_at, now),
    }
}

/// Response of an SLA status query
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "sla", rename_all = "camelCase")]
pub enum SlaStatusReport {
    /// The organization opted out of SLA tracking
    Disabled,
    #[serde(rename_all = "camelCase")]
    Tracked {
        ack: DeadlineReport,
        feedback: DeadlineReport,
        recent_events: Vec<SlaEvent>,
    },
}

/// Outcome of one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepSummary {
    /// Due conditions claimed by this run
    pub inserted: usize,
    /// Notifications delivered by this run
    pub notified: usize,
}

impl std::ops::AddAssign for SweepSummary {
    fn add_assign(&mut self, other: Self) {
        self.inserted += other.inserted;
        self.notified += other.notified;
    }
}

pub struct SlaEngine {
    store: Arc<dyn Store>,
    codec: EncryptionCodec,
    mailer: Arc<dyn Mailer>,
    audit: AuditLog,
}

impl SlaEngine {
    pub fn new(
        store: Arc<dyn Store>,
        codec: EncryptionCodec,
        mailer: Arc<dyn Mailer>,
        audit: AuditLog,
    ) -> Self {
        Self {
            store,
            codec,
            mailer,
            audit,
        }
    }

    /// Stored policy, or the defaults for organizations without one
    pub async fn policy_for(&self, org_id: &str) -> Result<OrgPolicy> {
        load_policy(self.store.as_ref(), org_id).await
    }

    /// SLA status of one case for a handler of its organization
    pub async fn query(&self, actor: &Actor, case_id: &CaseId) -> Result<SlaStatusReport> {
        self.query_at(actor, case_id, Utc::now()).await
    }

    pub async fn query_at(
        &self,
        actor: &Actor,
        case_id: &CaseId,
        now: DateTime<Utc>,
    ) -> Result<SlaStatusReport> {
        require("sla.read", actor.role)?;

        let case = self
            .store
            .get_case(case_id)
            .await?
            .filter(|c| c.org_id == actor.org_id)
            .ok_or_else(|| CaseGateError::NotFound("Case not found".into()))?;

        let policy = self.policy_for(&case.org_id).await?;
        if !policy.sla_enabled {
            return Ok(SlaStatusReport::Disabled);
        }

        let SlaStatus { ack, feedback } = status(&case, &policy, now);
        let mut recent_events = self.store.list_sla_events(case_id).await?;
        recent_events.truncate(RECENT_EVENT_LIMIT);

        Ok(SlaStatusReport::Tracked {
            ack,
            feedback,
            recent_events,
        })
    }

    pub async fn sweep(&self, org_id: &str) -> Result<SweepSummary> {
        self.sweep_at(org_id, Utc::now()).await
    }

    /// Raise events for every overdue deadline of an organization's open cases
    pub async fn sweep_at(&self, org_id: &str, now: DateTime<Utc>) -> Result<SweepSummary> {
        let policy = self.policy_for(org_id).await?;
        if !policy.sla_enabled {
            debug!(org_id = %org_id, "SLA tracking disabled, sweep skipped");
            return Ok(SweepSummary::default());
        }

        let cases = self.store.list_open_cases(org_id).await?;
        let mut summary = SweepSummary::default();

        for case in &cases {
            match self.sweep_case(case, &policy, now).await {
                Ok(case_summary) => summary += case_summary,
                Err(e) => warn!(
                    org_id = %org_id,
                    case_id = %case.case_id,
                    "SLA sweep failed for case: {}",
                    e
                ),
            }
        }

        if summary.inserted > 0 {
            self.audit
                .record(
                    AuditRecord::new(org_id, AuditAction::SlaSweep, "organization", org_id)
                        .with_detail(format!(
                            "inserted={} notified={}",
                            summary.inserted, summary.notified
                        )),
                )
                .await;
        }

        info!(
            org_id = %org_id,
            cases = cases.len(),
            inserted = summary.inserted,
            notified = summary.notified,
            "SLA sweep complete"
        );
        Ok(summary)
    }

    /// Sweep every known organization concurrently
    pub async fn sweep_all(&self) -> Result<SweepSummary> {
        let now = Utc::now();
        let org_ids = self.store.list_org_ids().await?;

        let results = join_all(org_ids.iter().map(|org| self.sweep_at(org, now))).await;

        let mut total = SweepSummary::default();
        for (org_id, result) in org_ids.iter().zip(results) {
            match result {
                Ok(summary) => total += summary,
                Err(e) => warn!(org_id = %org_id, "SLA sweep failed for organization: {}", e),
            }
        }
        Ok(total)
    }

    async fn sweep_case(
        &self,
        case: &Case,
        policy: &OrgPolicy,
        now: DateTime<Utc>,
    ) -> Result<SweepSummary> {
        let current = status(case, policy, now);
        let mut overdue = Vec::with_capacity(2);
        if current.ack.status == DeadlineStatus::Overdue {
            overdue.extend(current.ack.due_at.map(|d| (SlaEventKind::AckDue, d)));
        }
        if current.feedback.status == DeadlineStatus::Overdue {
            overdue.extend(current.feedback.due_at.map(|d| (SlaEventKind::FeedbackDue, d)));
        }

        let mut summary = SweepSummary::default();
        for (kind, due_at) in overdue {
            let claim_status = if policy.notify_emails.is_empty() {
                SlaEventStatus::Skipped
            } else {
                SlaEventStatus::Pending
            };

            let claim = SlaEvent::new(case.case_id.clone(), &case.org_id, kind, due_at, claim_status);
            if !self.store.claim_sla_event(&claim).await? {
                continue;
            }
            summary.inserted += 1;

            if claim_status == SlaEventStatus::Pending && self.notify(case, policy, &claim).await {
                summary.notified += 1;
            }
        }
        Ok(summary)
    }

    /// Send the overdue notice; true once delivery is recorded
    async fn notify(&self, case: &Case, policy: &OrgPolicy, claim: &SlaEvent) -> bool {
        let notification = Notification::overdue(
            policy.notify_emails.clone(),
            &case.case_id,
            claim.kind,
            claim.due_at,
            self.reporter_reachable(case),
        );

        if let Err(e) = self.mailer.send(&notification).await {
            warn!(
                case_id = %case.case_id,
                kind = claim.kind.as_str(),
                "SLA notification not sent: {}",
                e
            );
            return false;
        }

        match self
            .store
            .append_sla_event(&claim.follow_up(SlaEventStatus::Sent))
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(case_id = %case.case_id, "failed to record SLA delivery: {}", e);
                false
            }
        }
    }

    /// Whether sealed contact details hold a way to reach the reporter.
    ///
    /// Anything that cannot be opened counts as no contact.
    fn reporter_reachable(&self, case: &Case) -> bool {
        let Some(ref blob) = case.sealed_contact else {
            return false;
        };

        let opened = EncryptedPayload::from_blob(blob)
            .and_then(|payload| self.codec.open_json::<ReporterContact>(&case.org_id, &payload));

        match opened {
            Ok(contact) => contact.is_reachable(),
            Err(e) => {
                warn!(case_id = %case.case_id, "sealed contact unreadable: {}", e);
                false
            }
        }
    }
}
