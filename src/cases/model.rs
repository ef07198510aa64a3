//! Case, message and channel records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::identity::CaseId;
use crate::types::{CaseGateError, Result};

// =============================================================================
// Enums
// =============================================================================

/// Whether the reporter shared who they are
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReporterMode {
    #[default]
    Anonymous,
    Identified,
}

/// Case lifecycle status.
///
/// Variants are declared in forward order; `rank` drives the transition rules
/// in [`super::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaseStatus {
    #[default]
    Open,
    Acknowledged,
    InProgress,
    FeedbackGiven,
    Closed,
}

impl CaseStatus {
    pub fn rank(self) -> u8 {
        match self {
            CaseStatus::Open => 0,
            CaseStatus::Acknowledged => 1,
            CaseStatus::InProgress => 2,
            CaseStatus::FeedbackGiven => 3,
            CaseStatus::Closed => 4,
        }
    }

    /// Statuses the SLA sweep still tracks
    pub fn is_open(self) -> bool {
        self != CaseStatus::Closed
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CaseStatus::Open => "OPEN",
            CaseStatus::Acknowledged => "ACKNOWLEDGED",
            CaseStatus::InProgress => "IN_PROGRESS",
            CaseStatus::FeedbackGiven => "FEEDBACK_GIVEN",
            CaseStatus::Closed => "CLOSED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "OPEN" => Some(CaseStatus::Open),
            "ACKNOWLEDGED" => Some(CaseStatus::Acknowledged),
            "IN_PROGRESS" => Some(CaseStatus::InProgress),
            "FEEDBACK_GIVEN" => Some(CaseStatus::FeedbackGiven),
            "CLOSED" => Some(CaseStatus::Closed),
            _ => None,
        }
    }
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who wrote a thread message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SenderKind {
    #[default]
    Reporter,
    Handler,
    /// Visible to handlers only
    InternalNote,
}

impl SenderKind {
    pub fn visible_to_reporter(self) -> bool {
        self != SenderKind::InternalNote
    }
}

// =============================================================================
// Records
// =============================================================================

/// One confidential report.
///
/// `key_digest` and `sealed_contact` never leave the service layer; read
/// responses use [`CaseSummary`].
#[derive(Debug, Clone, PartialEq)]
pub struct Case {
    pub case_id: CaseId,
    pub org_id: String,
    pub channel_id: Option<String>,
    pub category: String,
    pub body: String,
    pub reporter_mode: ReporterMode,
    pub status: CaseStatus,
    pub created_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub feedback_due_at: Option<DateTime<Utc>>,
    pub feedback_given_at: Option<DateTime<Utc>>,
    pub key_digest: String,
    pub sealed_contact: Option<String>,
}

/// Handler-facing view of a case without secret-adjacent fields
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseSummary {
    pub case_id: CaseId,
    pub category: String,
    pub body: String,
    pub reporter_mode: ReporterMode,
    pub status: CaseStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acknowledged_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback_due_at: Option<DateTime<Utc>>,
    pub has_contact: bool,
}

impl From<&Case> for CaseSummary {
    fn from(case: &Case) -> Self {
        Self {
            case_id: case.case_id.clone(),
            category: case.category.clone(),
            body: case.body.clone(),
            reporter_mode: case.reporter_mode,
            status: case.status,
            created_at: case.created_at,
            acknowledged_at: case.acknowledged_at,
            feedback_due_at: case.feedback_due_at,
            has_contact: case.sealed_contact.is_some(),
        }
    }
}

/// Reference to a file held by the external object store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentRef {
    pub key: String,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: u64,
}

/// Max attachments per message
pub const MAX_ATTACHMENTS: usize = 5;

/// Max attachment size (25 MiB)
pub const MAX_ATTACHMENT_BYTES: u64 = 25 * 1024 * 1024;

impl AttachmentRef {
    /// Object-store prefix a case's attachments must live under
    pub fn prefix_for(case_id: &CaseId) -> String {
        format!("cases/{}/", case_id)
    }

    pub fn validate_for(&self, case_id: &CaseId) -> Result<()> {
        let prefix = Self::prefix_for(case_id);
        if !self.key.starts_with(&prefix) || self.key.contains("..") {
            return Err(CaseGateError::Validation(
                "Attachment key outside of case namespace".into(),
            ));
        }
        if self.filename.trim().is_empty() || self.filename.len() > 255 {
            return Err(CaseGateError::Validation("Invalid attachment filename".into()));
        }
        if self.size_bytes == 0 || self.size_bytes > MAX_ATTACHMENT_BYTES {
            return Err(CaseGateError::Validation("Invalid attachment size".into()));
        }
        Ok(())
    }
}

/// Validate a message's attachment list against its case
pub fn validate_attachments(case_id: &CaseId, attachments: &[AttachmentRef]) -> Result<()> {
    if attachments.len() > MAX_ATTACHMENTS {
        return Err(CaseGateError::Validation(format!(
            "At most {} attachments per message",
            MAX_ATTACHMENTS
        )));
    }
    attachments.iter().try_for_each(|a| a.validate_for(case_id))
}

/// A message in a case thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub case_id: CaseId,
    pub sender: SenderKind,
    /// Handler user id; always `None` for reporter messages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_id: Option<String>,
    pub body: String,
    #[serde(default)]
    pub attachments: Vec<AttachmentRef>,
    pub created_at: DateTime<Utc>,
}

/// Max message body length in characters
pub const MAX_MESSAGE_CHARS: usize = 20_000;

impl Message {
    pub fn new(
        case_id: CaseId,
        sender: SenderKind,
        author_id: Option<String>,
        body: String,
        attachments: Vec<AttachmentRef>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            case_id,
            sender,
            author_id,
            body,
            attachments,
            created_at: Utc::now(),
        }
    }
}

/// Trim and bound a message body
pub fn normalize_body(body: &str) -> Result<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Err(CaseGateError::Validation("Message body is required".into()));
    }
    if trimmed.chars().count() > MAX_MESSAGE_CHARS {
        return Err(CaseGateError::Validation("Message body too long".into()));
    }
    Ok(trimmed.to_string())
}

/// Status change history entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseLogEntry {
    pub case_id: CaseId,
    pub org_id: String,
    pub old_status: CaseStatus,
    pub new_status: CaseStatus,
    pub actor_id: String,
    pub at: DateTime<Utc>,
}

/// Public intake channel of an organization (the report form link)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportChannel {
    pub channel_id: String,
    pub org_id: String,
    pub slug: String,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}
