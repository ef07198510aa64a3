//! Shared-secret check for machine callers (the SLA sweep trigger).
//!
//! The secret is separate from handler sessions, so a leaked scheduler
//! credential cannot read cases.

use crate::identity::constant_time_eq;
use crate::types::{CaseGateError, Result};

/// Header carrying the sweep secret
pub const SWEEP_SECRET_HEADER: &str = "x-sweep-secret";

#[derive(Clone)]
pub struct SharedSecretValidator {
    secret: String,
}

impl SharedSecretValidator {
    pub fn new(secret: String) -> Result<Self> {
        if secret.len() < 16 {
            return Err(CaseGateError::Config(
                "SWEEP_SECRET must be at least 16 characters".into(),
            ));
        }
        Ok(Self { secret })
    }

    /// Validate a presented secret
    pub fn validate(&self, presented: Option<&str>) -> Result<()> {
        let presented = presented.ok_or_else(|| {
            CaseGateError::Unauthorized(format!("{} header required", SWEEP_SECRET_HEADER))
        })?;

        if constant_time_eq(presented.as_bytes(), self.secret.as_bytes()) {
            Ok(())
        } else {
            Err(CaseGateError::Unauthorized("Invalid sweep secret".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        let validator = SharedSecretValidator::new("sweep-secret-0123456789".into()).unwrap();
        assert!(validator.validate(Some("sweep-secret-0123456789")).is_ok());
        assert!(validator.validate(Some("sweep-secret-0123456780")).is_err());
        assert!(validator.validate(Some("short")).is_err());
        assert!(validator.validate(None).is_err());
    }

    #[test]
    fn test_short_secret_rejected() {
        assert!(SharedSecretValidator::new("abc".into()).is_err());
    }
}
