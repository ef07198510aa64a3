//! Reporter contact details sealed at intake.

use serde::{Deserialize, Serialize};

use crate::types::{CaseGateError, Result};

const MAX_FIELD_LEN: usize = 320;

/// Contact details an identified reporter chose to share
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReporterContact {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_channel: Option<String>,
}

impl ReporterContact {
    /// True when the reporter left at least one way to reach them
    pub fn is_reachable(&self) -> bool {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        present(&self.email) || present(&self.phone)
    }

    /// Reject empty contact blocks and oversized fields
    pub fn validate(&self) -> Result<()> {
        let fields = [&self.name, &self.email, &self.phone, &self.preferred_channel];
        if fields.iter().all(|f| f.as_deref().map_or(true, |s| s.trim().is_empty())) {
            return Err(CaseGateError::Validation("Contact details are empty".into()));
        }
        if fields
            .iter()
            .any(|f| f.as_deref().is_some_and(|s| s.len() > MAX_FIELD_LEN))
        {
            return Err(CaseGateError::Validation("Contact field too long".into()));
        }
        if let Some(email) = self.email.as_deref() {
            if !email.trim().is_empty() && !email.contains('@') {
                return Err(CaseGateError::Validation("Invalid contact email".into()));
            }
        }
        Ok(())
    }
}
