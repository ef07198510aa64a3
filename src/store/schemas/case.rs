//! Case, message and status-log documents

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::cases::{
    AttachmentRef, Case, CaseLogEntry, CaseStatus, Message, ReporterMode, SenderKind,
};
use crate::store::mongo::{IntoIndexes, MutMetadata};
use crate::types::Result;

use super::{parse_case_id, Metadata};

/// Collection name for cases
pub const CASE_COLLECTION: &str = "cases";

/// Collection name for thread messages
pub const MESSAGE_COLLECTION: &str = "case_messages";

/// Collection name for status change history
pub const CASE_LOG_COLLECTION: &str = "case_log";

/// Case document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CaseDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    pub case_id: String,
    pub org_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    pub category: String,
    pub body: String,
    pub reporter_mode: ReporterMode,
    pub status: CaseStatus,
    pub created_at: DateTime,
    #[serde(default)]
    pub acknowledged_at: Option<DateTime>,
    #[serde(default)]
    pub feedback_due_at: Option<DateTime>,
    #[serde(default)]
    pub feedback_given_at: Option<DateTime>,

    /// SHA-256 digest of the case key
    pub key_digest: String,

    /// Sealed reporter contact (`EncryptedPayload` blob)
    #[serde(default)]
    pub sealed_contact: Option<String>,
}

impl From<&Case> for CaseDoc {
    fn from(case: &Case) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            case_id: case.case_id.to_string(),
            org_id: case.org_id.clone(),
            channel_id: case.channel_id.clone(),
            category: case.category.clone(),
            body: case.body.clone(),
            reporter_mode: case.reporter_mode,
            status: case.status,
            created_at: DateTime::from_chrono(case.created_at),
            acknowledged_at: case.acknowledged_at.map(DateTime::from_chrono),
            feedback_due_at: case.feedback_due_at.map(DateTime::from_chrono),
            feedback_given_at: case.feedback_given_at.map(DateTime::from_chrono),
            key_digest: case.key_digest.clone(),
            sealed_contact: case.sealed_contact.clone(),
        }
    }
}

impl TryFrom<CaseDoc> for Case {
    type Error = crate::types::CaseGateError;

    fn try_from(doc: CaseDoc) -> Result<Self> {
        Ok(Case {
            case_id: parse_case_id(&doc.case_id)?,
            org_id: doc.org_id,
            channel_id: doc.channel_id,
            category: doc.category,
            body: doc.body,
            reporter_mode: doc.reporter_mode,
            status: doc.status,
            created_at: doc.created_at.to_chrono(),
            acknowledged_at: doc.acknowledged_at.map(|t| t.to_chrono()),
            feedback_due_at: doc.feedback_due_at.map(|t| t.to_chrono()),
            feedback_given_at: doc.feedback_given_at.map(|t| t.to_chrono()),
            key_digest: doc.key_digest,
            sealed_contact: doc.sealed_contact,
        })
    }
}

impl IntoIndexes for CaseDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // One case per case id; intake relies on this to detect collisions
            (
                doc! { "case_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("case_id_unique".to_string())
                        .build(),
                ),
            ),
            // SLA sweep scans open cases per organization
            (
                doc! { "org_id": 1, "status": 1 },
                Some(
                    IndexOptions::builder()
                        .name("org_status_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for CaseDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

/// Thread message document
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct MessageDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    pub message_id: String,
    pub case_id: String,
    pub sender: SenderKind,
    #[serde(default)]
    pub author_id: Option<String>,
    pub body: String,
    #[serde(default)]
    pub attachments: Vec<AttachmentRef>,
    pub created_at: DateTime,
}

impl From<&Message> for MessageDoc {
    fn from(message: &Message) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            message_id: message.id.clone(),
            case_id: message.case_id.to_string(),
            sender: message.sender,
            author_id: message.author_id.clone(),
            body: message.body.clone(),
            attachments: message.attachments.clone(),
            created_at: DateTime::from_chrono(message.created_at),
        }
    }
}

impl TryFrom<MessageDoc> for Message {
    type Error = crate::types::CaseGateError;

    fn try_from(doc: MessageDoc) -> Result<Self> {
        Ok(Message {
            id: doc.message_id,
            case_id: parse_case_id(&doc.case_id)?,
            sender: doc.sender,
            author_id: doc.author_id,
            body: doc.body,
            attachments: doc.attachments,
            created_at: doc.created_at.to_chrono(),
        })
    }
}

impl IntoIndexes for MessageDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "case_id": 1, "created_at": 1 },
            Some(
                IndexOptions::builder()
                    .name("case_thread_index".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for MessageDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

/// Status change history document
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CaseLogDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    pub case_id: String,
    pub org_id: String,
    pub old_status: CaseStatus,
    pub new_status: CaseStatus,
    pub actor_id: String,
    pub at: DateTime,
}

impl From<&CaseLogEntry> for CaseLogDoc {
    fn from(entry: &CaseLogEntry) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            case_id: entry.case_id.to_string(),
            org_id: entry.org_id.clone(),
            old_status: entry.old_status,
            new_status: entry.new_status,
            actor_id: entry.actor_id.clone(),
            at: DateTime::from_chrono(entry.at),
        }
    }
}

impl TryFrom<CaseLogDoc> for CaseLogEntry {
    type Error = crate::types::CaseGateError;

    fn try_from(doc: CaseLogDoc) -> Result<Self> {
        Ok(CaseLogEntry {
            case_id: parse_case_id(&doc.case_id)?,
            org_id: doc.org_id,
            old_status: doc.old_status,
            new_status: doc.new_status,
            actor_id: doc.actor_id,
            at: doc.at.to_chrono(),
        })
    }
}

impl IntoIndexes for CaseLogDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "case_id": 1, "at": 1 },
            Some(
                IndexOptions::builder()
                    .name("case_log_index".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for CaseLogDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
