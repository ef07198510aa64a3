//! Durable keyed storage
//!
//! The [`Store`] trait is the only persistence seam. Uniqueness (one case per
//! case id, one default channel per organization, one claim per SLA due
//! condition) is enforced here through insert-or-conflict semantics, never by
//! application-level locks.
//!
//! - [`MemoryStore`]: process-local, for dev mode and tests
//! - [`MongoStore`]: MongoDB with unique indexes

pub mod memory;
pub mod mongo;
pub mod schemas;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::audit::AuditRecord;
use crate::cases::{Case, CaseLogEntry, CaseStatus, Message, ReportChannel};
use crate::identity::CaseId;
use crate::sla::{OrgPolicy, SlaEvent};
use crate::types::Result;

pub use memory::MemoryStore;
pub use mongo::{MongoClient, MongoCollection, MongoStore};

/// Compare-and-set update of a case's lifecycle fields.
///
/// Applied only while the stored status still equals `expected_status`.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseUpdate {
    pub case_id: CaseId,
    pub expected_status: CaseStatus,
    pub status: CaseStatus,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub feedback_due_at: Option<DateTime<Utc>>,
    pub feedback_given_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Insert a new case; `Conflict` if the case id is taken
    async fn insert_case(&self, case: &Case) -> Result<()>;

    async fn get_case(&self, case_id: &CaseId) -> Result<Option<Case>>;

    /// Cases of an organization that are not closed
    async fn list_open_cases(&self, org_id: &str) -> Result<Vec<Case>>;

    /// Apply a compare-and-set update; `false` if the status moved meanwhile
    async fn update_case(&self, update: &CaseUpdate) -> Result<bool>;

    async fn insert_message(&self, message: &Message) -> Result<()>;

    /// Thread messages, oldest first
    async fn list_messages(&self, case_id: &CaseId) -> Result<Vec<Message>>;

    async fn append_case_log(&self, entry: &CaseLogEntry) -> Result<()>;

    async fn list_case_log(&self, case_id: &CaseId) -> Result<Vec<CaseLogEntry>>;

    async fn append_audit(&self, record: &AuditRecord) -> Result<()>;

    async fn list_audit(&self, org_id: &str) -> Result<Vec<AuditRecord>>;

    /// Insert the claim event for a due condition.
    ///
    /// Returns `false` if a claim for the same `(case, kind, due_at)` exists.
    async fn claim_sla_event(&self, event: &SlaEvent) -> Result<bool>;

    /// Append a non-claim event (e.g. `SENT` after delivery)
    async fn append_sla_event(&self, event: &SlaEvent) -> Result<()>;

    /// Events of a case, newest first
    async fn list_sla_events(&self, case_id: &CaseId) -> Result<Vec<SlaEvent>>;

    async fn get_org_policy(&self, org_id: &str) -> Result<Option<OrgPolicy>>;

    async fn put_org_policy(&self, policy: &OrgPolicy) -> Result<()>;

    /// Organizations that own cases or a policy
    async fn list_org_ids(&self) -> Result<Vec<String>>;

    /// Return the organization's default channel, creating it with `slug` if absent
    async fn ensure_default_channel(&self, org_id: &str, slug: &str) -> Result<ReportChannel>;

    async fn get_channel(&self, slug: &str) -> Result<Option<ReportChannel>>;
}
