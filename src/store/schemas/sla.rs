//! SLA event and organization policy documents

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::sla::{OrgPolicy, SlaEvent, SlaEventKind, SlaEventStatus};
use crate::store::mongo::{IntoIndexes, MutMetadata};
use crate::types::Result;

use super::{parse_case_id, Metadata};

/// Collection name for SLA events
pub const SLA_EVENT_COLLECTION: &str = "sla_events";

/// Collection name for organization SLA policies
pub const ORG_POLICY_COLLECTION: &str = "org_policies";

/// SLA event document
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SlaEventDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    pub event_id: String,
    pub case_id: String,
    pub org_id: String,
    pub kind: SlaEventKind,
    pub due_at: DateTime,
    pub status: SlaEventStatus,
    pub created_at: DateTime,

    /// Set on the first event of a due condition; the partial unique index
    /// over claims is what makes sweeps idempotent.
    #[serde(default)]
    pub claim: bool,
}

impl SlaEventDoc {
    pub fn from_event(event: &SlaEvent, claim: bool) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            event_id: event.id.clone(),
            case_id: event.case_id.to_string(),
            org_id: event.org_id.clone(),
            kind: event.kind,
            due_at: DateTime::from_chrono(event.due_at),
            status: event.status,
            created_at: DateTime::from_chrono(event.created_at),
            claim,
        }
    }
}

impl TryFrom<SlaEventDoc> for SlaEvent {
    type Error = crate::types::CaseGateError;

    fn try_from(doc: SlaEventDoc) -> Result<Self> {
        Ok(SlaEvent {
            id: doc.event_id,
            case_id: parse_case_id(&doc.case_id)?,
            org_id: doc.org_id,
            kind: doc.kind,
            due_at: doc.due_at.to_chrono(),
            status: doc.status,
            created_at: doc.created_at.to_chrono(),
        })
    }
}

impl IntoIndexes for SlaEventDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // At most one claim per (case, kind, due_at)
            (
                doc! { "case_id": 1, "kind": 1, "due_at": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .partial_filter_expression(doc! { "claim": true })
                        .name("sla_claim_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "case_id": 1, "created_at": -1 },
                Some(
                    IndexOptions::builder()
                        .name("case_events_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for SlaEventDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

/// Organization SLA policy document
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct OrgPolicyDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    pub org_id: String,
    pub sla_enabled: bool,
    pub ack_days: i64,
    pub feedback_days: i64,
    #[serde(default)]
    pub notify_emails: Vec<String>,
}

impl From<&OrgPolicy> for OrgPolicyDoc {
    fn from(policy: &OrgPolicy) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            org_id: policy.org_id.clone(),
            sla_enabled: policy.sla_enabled,
            ack_days: policy.ack_days,
            feedback_days: policy.feedback_days,
            notify_emails: policy.notify_emails.clone(),
        }
    }
}

impl From<OrgPolicyDoc> for OrgPolicy {
    fn from(doc: OrgPolicyDoc) -> Self {
        Self {
            org_id: doc.org_id,
            sla_enabled: doc.sla_enabled,
            ack_days: doc.ack_days,
            feedback_days: doc.feedback_days,
            notify_emails: doc.notify_emails,
        }
    }
}

impl IntoIndexes for OrgPolicyDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "org_id": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("org_id_unique".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for OrgPolicyDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
