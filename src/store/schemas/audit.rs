//! Audit record document
//!
//! Audit documents are only ever inserted. The collection wrapper exposes no
//! update path for them.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::audit::{AuditAction, AuditRecord};
use crate::store::mongo::{IntoIndexes, MutMetadata};

use super::Metadata;

/// Collection name for audit records
pub const AUDIT_COLLECTION: &str = "audit_log";

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AuditDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    pub record_id: String,
    pub org_id: String,
    #[serde(default)]
    pub actor_id: Option<String>,
    pub action: AuditAction,
    pub target_type: String,
    pub target_id: String,
    #[serde(default)]
    pub ip_hash: Option<String>,
    #[serde(default)]
    pub ua_hash: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
    pub at: DateTime,
}

impl From<&AuditRecord> for AuditDoc {
    fn from(record: &AuditRecord) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            record_id: record.id.clone(),
            org_id: record.org_id.clone(),
            actor_id: record.actor_id.clone(),
            action: record.action,
            target_type: record.target_type.clone(),
            target_id: record.target_id.clone(),
            ip_hash: record.ip_hash.clone(),
            ua_hash: record.ua_hash.clone(),
            detail: record.detail.clone(),
            at: DateTime::from_chrono(record.at),
        }
    }
}

impl From<AuditDoc> for AuditRecord {
    fn from(doc: AuditDoc) -> Self {
        Self {
            id: doc.record_id,
            org_id: doc.org_id,
            actor_id: doc.actor_id,
            action: doc.action,
            target_type: doc.target_type,
            target_id: doc.target_id,
            ip_hash: doc.ip_hash,
            ua_hash: doc.ua_hash,
            detail: doc.detail,
            at: doc.at.to_chrono(),
        }
    }
}

impl IntoIndexes for AuditDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "record_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("record_id_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "org_id": 1, "at": 1 },
                Some(
                    IndexOptions::builder()
                        .name("org_time_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for AuditDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
