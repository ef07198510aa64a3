//! In-memory store for dev mode and tests.
//!
//! Each collection sits behind its own `RwLock`; every trait method takes at
//! most one write lock, so check-then-insert sequences are atomic.

use std::collections::{BTreeSet, HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::audit::AuditRecord;
use crate::cases::{Case, CaseLogEntry, Message, ReportChannel};
use crate::identity::CaseId;
use crate::sla::{OrgPolicy, SlaEvent, SlaEventKind};
use crate::types::{CaseGateError, Result};

use super::{CaseUpdate, Store};

#[derive(Default)]
struct SlaTable {
    events: Vec<SlaEvent>,
    claims: HashSet<(CaseId, SlaEventKind, i64)>,
}

/// Process-local [`Store`]
#[derive(Default)]
pub struct MemoryStore {
    cases: RwLock<HashMap<CaseId, Case>>,
    messages: RwLock<Vec<Message>>,
    case_log: RwLock<Vec<CaseLogEntry>>,
    audit: RwLock<Vec<AuditRecord>>,
    sla: RwLock<SlaTable>,
    policies: RwLock<HashMap<String, OrgPolicy>>,
    channels: RwLock<HashMap<String, ReportChannel>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_case(&self, case: &Case) -> Result<()> {
        let mut cases = self.cases.write().await;
        if cases.contains_key(&case.case_id) {
            return Err(CaseGateError::Conflict("Case id already exists".into()));
        }
        cases.insert(case.case_id.clone(), case.clone());
        Ok(())
    }

    async fn get_case(&self, case_id: &CaseId) -> Result<Option<Case>> {
        Ok(self.cases.read().await.get(case_id).cloned())
    }

    async fn list_open_cases(&self, org_id: &str) -> Result<Vec<Case>> {
        let cases = self.cases.read().await;
        let mut open: Vec<Case> = cases
            .values()
            .filter(|c| c.org_id == org_id && c.status.is_open())
            .cloned()
            .collect();
        open.sort_by_key(|c| c.created_at);
        Ok(open)
    }

    async fn update_case(&self, update: &CaseUpdate) -> Result<bool> {
        let mut cases = self.cases.write().await;
        match cases.get_mut(&update.case_id) {
            Some(case) if case.status == update.expected_status => {
                update.apply_to(case);
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(CaseGateError::NotFound("Case not found".into())),
        }
    }

    async fn insert_message(&self, message: &Message) -> Result<()> {
        self.messages.write().await.push(message.clone());
        Ok(())
    }

    async fn list_messages(&self, case_id: &CaseId) -> Result<Vec<Message>> {
        let messages = self.messages.read().await;
        let mut thread: Vec<Message> = messages
            .iter()
            .filter(|m| &m.case_id == case_id)
            .cloned()
            .collect();
        thread.sort_by_key(|m| m.created_at);
        Ok(thread)
    }

    async fn append_case_log(&self, entry: &CaseLogEntry) -> Result<()> {
        self.case_log.write().await.push(entry.clone());
        Ok(())
    }

    async fn list_case_log(&self, case_id: &CaseId) -> Result<Vec<CaseLogEntry>> {
        let log = self.case_log.read().await;
        Ok(log.iter().filter(|e| &e.case_id == case_id).cloned().collect())
    }

    async fn append_audit(&self, record: &AuditRecord) -> Result<()> {
        self.audit.write().await.push(record.clone());
        Ok(())
    }

    async fn list_audit(&self, org_id: &str) -> Result<Vec<AuditRecord>> {
        let audit = self.audit.read().await;
        Ok(audit.iter().filter(|r| r.org_id == org_id).cloned().collect())
    }

    async fn claim_sla_event(&self, event: &SlaEvent) -> Result<bool> {
        let mut sla = self.sla.write().await;
        if !sla.claims.insert(event.due_key()) {
            return Ok(false);
        }
        sla.events.push(event.clone());
        Ok(true)
    }

    async fn append_sla_event(&self, event: &SlaEvent) -> Result<()> {
        self.sla.write().await.events.push(event.clone());
        Ok(())
    }

    async fn list_sla_events(&self, case_id: &CaseId) -> Result<Vec<SlaEvent>> {
        let sla = self.sla.read().await;
        let mut events: Vec<SlaEvent> = sla
            .events
            .iter()
            .filter(|e| &e.case_id == case_id)
            .cloned()
            .collect();
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(events)
    }

    async fn get_org_policy(&self, org_id: &str) -> Result<Option<OrgPolicy>> {
        Ok(self.policies.read().await.get(org_id).cloned())
    }

    async fn put_org_policy(&self, policy: &OrgPolicy) -> Result<()> {
        self.policies
            .write()
            .await
            .insert(policy.org_id.clone(), policy.clone());
        Ok(())
    }

    async fn list_org_ids(&self) -> Result<Vec<String>> {
        let mut orgs: BTreeSet<String> = self
            .cases
            .read()
            .await
            .values()
            .map(|c| c.org_id.clone())
            .collect();
        orgs.extend(self.policies.read().await.keys().cloned());
        Ok(orgs.into_iter().collect())
    }

    async fn ensure_default_channel(&self, org_id: &str, slug: &str) -> Result<ReportChannel> {
        let mut channels = self.channels.write().await;

        if let Some(existing) = channels
            .values()
            .find(|c| c.org_id == org_id && c.is_default)
        {
            return Ok(existing.clone());
        }
        if channels.contains_key(slug) {
            return Err(CaseGateError::Conflict(format!(
                "Channel slug '{}' is taken",
                slug
            )));
        }

        let channel = ReportChannel {
            channel_id: uuid::Uuid::new_v4().to_string(),
            org_id: org_id.to_string(),
            slug: slug.to_string(),
            is_default: true,
            created_at: Utc::now(),
        };
        channels.insert(slug.to_string(), channel.clone());
        Ok(channel)
    }

    async fn get_channel(&self, slug: &str) -> Result<Option<ReportChannel>> {
        Ok(self.channels.read().await.get(slug).cloned())
    }
}
