//! MongoDB document schemas for casegate
//!
//! Documents mirror the domain records in `cases`, `audit` and `sla` with bson
//! timestamps and index definitions.

mod audit;
mod case;
mod channel;
mod metadata;
mod sla;

pub use audit::{AuditDoc, AUDIT_COLLECTION};
pub use case::{
    CaseDoc, CaseLogDoc, MessageDoc, CASE_COLLECTION, CASE_LOG_COLLECTION, MESSAGE_COLLECTION,
};
pub use channel::{ChannelDoc, CHANNEL_COLLECTION};
pub use metadata::Metadata;
pub use sla::{OrgPolicyDoc, SlaEventDoc, ORG_POLICY_COLLECTION, SLA_EVENT_COLLECTION};

use crate::identity::CaseId;
use crate::types::{CaseGateError, Result};

fn parse_case_id(raw: &str) -> Result<CaseId> {
    CaseId::parse(raw)
        .ok_or_else(|| CaseGateError::Database(format!("Stored case id is malformed: {}", raw)))
}
