//! SLA events
//!
//! Events are append-only. The first event for a `(case, kind, due_at)` is the
//! claim that the due condition was handled; a later `SENT` record notes that
//! the notification went out.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::CaseId;

/// Which deadline an event is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlaEventKind {
    #[default]
    AckDue,
    FeedbackDue,
}

impl SlaEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SlaEventKind::AckDue => "ACK_DUE",
            SlaEventKind::FeedbackDue => "FEEDBACK_DUE",
        }
    }
}

/// Notification outcome recorded by an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlaEventStatus {
    /// Due condition recorded, notification not (yet) confirmed
    #[default]
    Pending,
    /// Notification delivered
    Sent,
    /// Due condition recorded, nobody to notify
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlaEvent {
    pub id: String,
    pub case_id: CaseId,
    pub org_id: String,
    pub kind: SlaEventKind,
    pub due_at: DateTime<Utc>,
    pub status: SlaEventStatus,
    pub created_at: DateTime<Utc>,
}

impl SlaEvent {
    pub fn new(
        case_id: CaseId,
        org_id: &str,
        kind: SlaEventKind,
        due_at: DateTime<Utc>,
        status: SlaEventStatus,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            case_id,
            org_id: org_id.to_string(),
            kind,
            due_at,
            status,
            created_at: Utc::now(),
        }
    }

    /// Follow-up record for the same due condition with a new status
    pub fn follow_up(&self, status: SlaEventStatus) -> Self {
        Self::new(self.case_id.clone(), &self.org_id, self.kind, self.due_at, status)
    }

    /// Key that identifies one due condition
    pub fn due_key(&self) -> (CaseId, SlaEventKind, i64) {
        (self.case_id.clone(), self.kind, self.due_at.timestamp_millis())
    }
}
