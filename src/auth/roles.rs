//! Organization roles and the handler operation whitelist

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{CaseGateError, Result};

/// Role of an authenticated handler within their organization
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[repr(u8)]
pub enum Role {
    /// Read-only oversight: SLA status
    #[default]
    Auditor = 0,
    /// Works cases: status, replies, thread reads
    Handler = 1,
    /// Break-glass, policy and channel changes
    Admin = 2,
}

impl Role {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "AUDITOR" => Some(Role::Auditor),
            "HANDLER" => Some(Role::Handler),
            "ADMIN" => Some(Role::Admin),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Auditor => write!(f, "AUDITOR"),
            Role::Handler => write!(f, "HANDLER"),
            Role::Admin => write!(f, "ADMIN"),
        }
    }
}

/// Get the required role for a handler operation.
/// Returns None for unknown operations (which should be blocked).
pub fn required_role(operation: &str) -> Option<Role> {
    match operation {
        "sla.read" => Some(Role::Auditor),

        "case.read" | "case.status" | "case.reply" => Some(Role::Handler),

        "case.break_glass" | "sla.policy" | "channel.manage" => Some(Role::Admin),

        _ => None,
    }
}

/// Check if an operation is allowed for the given role
pub fn is_operation_allowed(operation: &str, role: Role) -> bool {
    match required_role(operation) {
        Some(required) => role >= required,
        None => false,
    }
}

/// `Forbidden` unless `role` may perform `operation`
pub fn require(operation: &str, role: Role) -> Result<()> {
    if is_operation_allowed(operation, role) {
        Ok(())
    } else {
        Err(CaseGateError::Forbidden(format!(
            "{} requires a higher role than {}",
            operation_description(operation),
            role
        )))
    }
}

/// Get a human-readable description of an operation for logging
pub fn operation_description(operation: &str) -> &'static str {
    match operation {
        "sla.read" => "Read case SLA status",
        "case.read" => "Read case thread",
        "case.status" => "Change case status",
        "case.reply" => "Post handler message",
        "case.break_glass" => "Break-glass case access",
        "sla.policy" => "Change SLA policy",
        "channel.manage" => "Manage report channels",
        _ => "Unknown operation",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sla_read_open_to_all_roles() {
        assert!(is_operation_allowed("sla.read", Role::Auditor));
        assert!(is_operation_allowed("sla.read", Role::Handler));
        assert!(is_operation_allowed("sla.read", Role::Admin));
    }

    #[test]
    fn test_handler_operations() {
        assert!(!is_operation_allowed("case.status", Role::Auditor));
        assert!(is_operation_allowed("case.status", Role::Handler));
        assert!(is_operation_allowed("case.reply", Role::Admin));
    }

    #[test]
    fn test_admin_operations() {
        assert!(!is_operation_allowed("case.break_glass", Role::Handler));
        assert!(is_operation_allowed("case.break_glass", Role::Admin));
        assert!(matches!(
            require("sla.policy", Role::Handler),
            Err(CaseGateError::Forbidden(_))
        ));
    }

    #[test]
    fn test_unknown_operations_blocked() {
        assert!(!is_operation_allowed("case.delete", Role::Admin));
    }

    #[test]
    fn test_role_parse_and_ordering() {
        assert_eq!(Role::parse("handler"), Some(Role::Handler));
        assert_eq!(Role::parse("OWNER"), None);
        assert!(Role::Admin > Role::Handler);
        assert!(Role::Handler > Role::Auditor);
    }
}
