//! Append-only audit log of sensitive actions
//!
//! Records carry hashed client fingerprints only. IP addresses and user agents
//! are salted and hashed before a record is built, so the audit trail cannot be
//! joined back to network logs without the salt.

use std::net::IpAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{error, info};

use crate::store::Store;
use crate::types::Result;

/// Audited action tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    #[default]
    CaseCreated,
    CaseViewed,
    CaseStatusChanged,
    MessagePosted,
    BreakGlassAccess,
    BreakGlassRead,
    SlaPolicyChanged,
    SlaSweep,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::CaseCreated => "CASE_CREATED",
            AuditAction::CaseViewed => "CASE_VIEWED",
            AuditAction::CaseStatusChanged => "CASE_STATUS_CHANGED",
            AuditAction::MessagePosted => "MESSAGE_POSTED",
            AuditAction::BreakGlassAccess => "BREAK_GLASS_ACCESS",
            AuditAction::BreakGlassRead => "BREAK_GLASS_READ",
            AuditAction::SlaPolicyChanged => "SLA_POLICY_CHANGED",
            AuditAction::SlaSweep => "SLA_SWEEP",
        }
    }
}

/// Where a request came from, as seen by the HTTP layer
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub ip: Option<IpAddr>,
    pub user_agent: Option<String>,
}

impl RequestContext {
    pub fn new(ip: Option<IpAddr>, user_agent: Option<String>) -> Self {
        Self { ip, user_agent }
    }

    /// Rate-limit bucket for the originating address
    pub fn address_key(&self) -> String {
        self.ip
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// Salted hashes of a request's IP and user agent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub ip_hash: Option<String>,
    pub ua_hash: Option<String>,
}

/// Immutable audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub id: String,
    pub org_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
    pub action: AuditAction,
    pub target_type: String,
    pub target_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ua_hash: Option<String>,
    /// Free text such as a break-glass justification
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub at: DateTime<Utc>,
}

impl AuditRecord {
    /// Create a new audit record
    pub fn new(
        org_id: impl Into<String>,
        action: AuditAction,
        target_type: impl Into<String>,
        target_id: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            org_id: org_id.into(),
            actor_id: None,
            action,
            target_type: target_type.into(),
            target_id: target_id.into(),
            ip_hash: None,
            ua_hash: None,
            detail: None,
            at: Utc::now(),
        }
    }

    /// Set the acting user
    pub fn with_actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    /// Attach a hashed client fingerprint
    pub fn with_fingerprint(mut self, fingerprint: Fingerprint) -> Self {
        self.ip_hash = fingerprint.ip_hash;
        self.ua_hash = fingerprint.ua_hash;
        self
    }

    /// Attach free-text detail
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Audit writer over the durable store
#[derive(Clone)]
pub struct AuditLog {
    store: Arc<dyn Store>,
    salt: Arc<str>,
}

impl AuditLog {
    pub fn new(store: Arc<dyn Store>, salt: impl Into<String>) -> Self {
        let salt: String = salt.into();
        Self {
            store,
            salt: Arc::from(salt),
        }
    }

    /// Hash a request's IP and user agent with the deployment salt
    pub fn fingerprint(&self, ctx: &RequestContext) -> Fingerprint {
        Fingerprint {
            ip_hash: ctx.ip.map(|ip| self.salted_hash("ip", &ip.to_string())),
            ua_hash: ctx
                .user_agent
                .as_deref()
                .filter(|ua| !ua.is_empty())
                .map(|ua| self.salted_hash("ua", ua)),
        }
    }

    fn salted_hash(&self, domain: &str, value: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.salt.as_bytes());
        hasher.update([0u8]);
        hasher.update(domain.as_bytes());
        hasher.update([0u8]);
        hasher.update(value.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Append a record and report failure.
    ///
    /// Use this where the audit entry is itself the control (break-glass).
    pub async fn write(&self, record: AuditRecord) -> Result<()> {
        self.store.append_audit(&record).await?;
        info!(
            action = record.action.as_str(),
            org_id = %record.org_id,
            target = %record.target_id,
            "audit record written"
        );
        Ok(())
    }

    /// Append a record; failures are logged and swallowed.
    pub async fn record(&self, record: AuditRecord) {
        let action = record.action;
        let org_id = record.org_id.clone();
        if let Err(e) = self.write(record).await {
            error!(
                action = action.as_str(),
                org_id = %org_id,
                "failed to write audit record: {}",
                e
            );
        }
    }

    /// All records of an organization, oldest first
    pub async fn list(&self, org_id: &str) -> Result<Vec<AuditRecord>> {
        self.store.list_audit(org_id).await
    }
}
