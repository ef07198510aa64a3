//! Outbound notification delivery
//!
//! Notifications are addressed to handlers and carry only the case id, the
//! deadline and whether the reporter can be reached. Contact details never
//! leave the encrypted field.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::identity::CaseId;
use crate::types::{CaseGateError, Result};

use super::event::SlaEventKind;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub to: Vec<String>,
    pub subject: String,
    pub text: String,
}

impl Notification {
    /// Overdue-deadline notice for an organization's handlers
    pub fn overdue(
        to: Vec<String>,
        case_id: &CaseId,
        kind: SlaEventKind,
        due_at: DateTime<Utc>,
        reporter_reachable: bool,
    ) -> Self {
        let deadline = match kind {
            SlaEventKind::AckDue => "acknowledgement",
            SlaEventKind::FeedbackDue => "feedback",
        };

        let mut text = format!(
            "The {} deadline for case {} passed at {}.\n",
            deadline,
            case_id,
            due_at.to_rfc3339()
        );
        if reporter_reachable {
            text.push_str("The reporter left contact details in the case.\n");
        } else {
            text.push_str("The reporter can only be reached through the case inbox.\n");
        }

        Self {
            to,
            subject: format!("[casegate] Case {}: {} overdue", case_id, deadline),
            text,
        }
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<()>;
}

#[derive(Serialize)]
struct MailRequest<'a> {
    from: &'a str,
    to: &'a [String],
    subject: &'a str,
    text: &'a str,
}

/// JSON mail-send API client (bearer key, bounded timeout)
pub struct HttpMailer {
    api_url: String,
    api_key: Option<String>,
    from: String,
    http_client: reqwest::Client,
}

impl HttpMailer {
    pub fn new(api_url: String, api_key: Option<String>, from: String, timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("casegate/1.0")
            .build()
            .unwrap_or_default();

        Self {
            api_url,
            api_key,
            from,
            http_client,
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, notification: &Notification) -> Result<()> {
        let mut request = self.http_client.post(&self.api_url).json(&MailRequest {
            from: &self.from,
            to: &notification.to,
            subject: &notification.subject,
            text: &notification.text,
        });
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CaseGateError::Internal(format!("Mail send failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(CaseGateError::Internal(format!(
                "Mail API returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Writes notifications to the log instead of sending them
#[derive(Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, notification: &Notification) -> Result<()> {
        info!(
            recipients = notification.to.len(),
            subject = %notification.subject,
            "notification (log only)"
        );
        Ok(())
    }
}
