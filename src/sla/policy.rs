//! Organization SLA policy

use serde::{Deserialize, Serialize};

use crate::store::Store;
use crate::types::{CaseGateError, Result};

/// Default acknowledgement deadline in days
pub const DEFAULT_ACK_DAYS: i64 = 7;

/// Default feedback deadline in days
pub const DEFAULT_FEEDBACK_DAYS: i64 = 90;

/// Per-organization service-level commitments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrgPolicy {
    /// Always the caller's organization on writes
    #[serde(default)]
    pub org_id: String,
    /// When false the sweep is a no-op and status queries report `Disabled`
    pub sla_enabled: bool,
    pub ack_days: i64,
    pub feedback_days: i64,
    /// Handler addresses that receive due/overdue notifications
    #[serde(default)]
    pub notify_emails: Vec<String>,
}

impl OrgPolicy {
    /// Policy used for organizations that never configured one
    pub fn default_for(org_id: &str) -> Self {
        Self {
            org_id: org_id.to_string(),
            sla_enabled: true,
            ack_days: DEFAULT_ACK_DAYS,
            feedback_days: DEFAULT_FEEDBACK_DAYS,
            notify_emails: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.org_id.trim().is_empty() {
            return Err(CaseGateError::Validation("orgId is required".into()));
        }
        if !(1..=365).contains(&self.ack_days) {
            return Err(CaseGateError::Validation("ackDays must be 1-365".into()));
        }
        if !(1..=730).contains(&self.feedback_days) {
            return Err(CaseGateError::Validation("feedbackDays must be 1-730".into()));
        }
        if self.notify_emails.iter().any(|e| !e.contains('@')) {
            return Err(CaseGateError::Validation("Invalid notification email".into()));
        }
        Ok(())
    }
}

/// Stored policy of an organization, or the defaults if it never set one
pub async fn load_policy(store: &dyn Store, org_id: &str) -> Result<OrgPolicy> {
    Ok(store
        .get_org_policy(org_id)
        .await?
        .unwrap_or_else(|| OrgPolicy::default_for(org_id)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let policy = OrgPolicy::default_for("org-1");
        assert!(policy.sla_enabled);
        assert_eq!(policy.ack_days, 7);
        assert_eq!(policy.feedback_days, 90);
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_validation_bounds() {
        let mut policy = OrgPolicy::default_for("org-1");
        policy.ack_days = 0;
        assert!(policy.validate().is_err());

        let mut policy = OrgPolicy::default_for("org-1");
        policy.notify_emails = vec!["handlers".into()];
        assert!(policy.validate().is_err());
    }
}
