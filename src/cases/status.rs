//! Case status state machine
//!
//! `OPEN -> ACKNOWLEDGED -> IN_PROGRESS -> FEEDBACK_GIVEN -> CLOSED`
//!
//! Handlers may skip forward freely and may close from any state. Nothing
//! moves backwards and `CLOSED` is terminal. Milestone timestamps are
//! first-write-wins: a repeated acknowledgement never moves `acknowledged_at`.

use chrono::{DateTime, Duration, Utc};

use crate::sla::OrgPolicy;
use crate::store::CaseUpdate;
use crate::types::{CaseGateError, Result};

use super::model::{Case, CaseStatus};

/// Compute the store update for moving `case` to `target`.
///
/// Returns `Ok(None)` when the case already has that status.
pub fn plan_transition(
    case: &Case,
    target: CaseStatus,
    policy: &OrgPolicy,
    now: DateTime<Utc>,
) -> Result<Option<CaseUpdate>> {
    let current = case.status;

    if current == target {
        return Ok(None);
    }
    if current == CaseStatus::Closed {
        return Err(CaseGateError::Validation("Case is closed".into()));
    }
    if target != CaseStatus::Closed && target.rank() < current.rank() {
        return Err(CaseGateError::Validation(format!(
            "Cannot move case from {} back to {}",
            current, target
        )));
    }

    let mut update = CaseUpdate {
        case_id: case.case_id.clone(),
        expected_status: current,
        status: target,
        acknowledged_at: case.acknowledged_at,
        feedback_due_at: case.feedback_due_at,
        feedback_given_at: case.feedback_given_at,
    };

    // Any working status implies the report was acknowledged.
    let acknowledges = matches!(
        target,
        CaseStatus::Acknowledged | CaseStatus::InProgress | CaseStatus::FeedbackGiven
    );
    if acknowledges && case.acknowledged_at.is_none() {
        update.acknowledged_at = Some(now);
        if policy.sla_enabled {
            update.feedback_due_at = Some(now + Duration::days(policy.feedback_days));
        }
    }

    if target == CaseStatus::FeedbackGiven && case.feedback_given_at.is_none() {
        update.feedback_given_at = Some(now);
    }

    Ok(Some(update))
}

impl CaseUpdate {
    /// Apply this update to an in-memory case
    pub fn apply_to(&self, case: &mut Case) {
        case.status = self.status;
        case.acknowledged_at = self.acknowledged_at;
        case.feedback_due_at = self.feedback_due_at;
        case.feedback_given_at = self.feedback_given_at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cases::model::ReporterMode;
    use crate::identity::generate_case_id;

    fn case(status: CaseStatus) -> Case {
        Case {
            case_id: generate_case_id(),
            org_id: "org-1".into(),
            channel_id: None,
            category: "fraud".into(),
            body: "body".into(),
            reporter_mode: ReporterMode::Anonymous,
            status,
            created_at: Utc::now() - Duration::days(3),
            acknowledged_at: None,
            feedback_due_at: None,
            feedback_given_at: None,
            key_digest: "00".repeat(32),
            sealed_contact: None,
        }
    }

    #[test]
    fn test_acknowledge_stamps_once() {
        let policy = OrgPolicy::default_for("org-1");
        let mut c = case(CaseStatus::Open);
        let t1 = Utc::now();

        let update = plan_transition(&c, CaseStatus::Acknowledged, &policy, t1)
            .unwrap()
            .unwrap();
        assert_eq!(update.acknowledged_at, Some(t1));
        assert_eq!(
            update.feedback_due_at,
            Some(t1 + Duration::days(policy.feedback_days))
        );
        update.apply_to(&mut c);

        // Re-acknowledging is a no-op
        let t2 = t1 + Duration::days(2);
        assert!(plan_transition(&c, CaseStatus::Acknowledged, &policy, t2)
            .unwrap()
            .is_none());

        // Moving on keeps the original acknowledgement
        let update = plan_transition(&c, CaseStatus::InProgress, &policy, t2)
            .unwrap()
            .unwrap();
        assert_eq!(update.acknowledged_at, Some(t1));
    }

    #[test]
    fn test_skip_forward_and_close_from_anywhere() {
        let policy = OrgPolicy::default_for("org-1");
        let now = Utc::now();

        let c = case(CaseStatus::Open);
        let update = plan_transition(&c, CaseStatus::Closed, &policy, now)
            .unwrap()
            .unwrap();
        assert_eq!(update.status, CaseStatus::Closed);
        assert!(update.acknowledged_at.is_none());

        let update = plan_transition(&c, CaseStatus::FeedbackGiven, &policy, now)
            .unwrap()
            .unwrap();
        assert_eq!(update.feedback_given_at, Some(now));
        assert_eq!(update.acknowledged_at, Some(now));
    }

    #[test]
    fn test_no_backwards_and_closed_terminal() {
        let policy = OrgPolicy::default_for("org-1");
        let now = Utc::now();

        let c = case(CaseStatus::FeedbackGiven);
        assert!(plan_transition(&c, CaseStatus::InProgress, &policy, now).is_err());

        let c = case(CaseStatus::Closed);
        assert!(plan_transition(&c, CaseStatus::Open, &policy, now).is_err());
        assert!(plan_transition(&c, CaseStatus::Closed, &policy, now)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_disabled_sla_leaves_feedback_due_unset() {
        let mut policy = OrgPolicy::default_for("org-1");
        policy.sla_enabled = false;
        let c = case(CaseStatus::Open);

        let update = plan_transition(&c, CaseStatus::Acknowledged, &policy, Utc::now())
            .unwrap()
            .unwrap();
        assert!(update.acknowledged_at.is_some());
        assert!(update.feedback_due_at.is_none());
    }
}
