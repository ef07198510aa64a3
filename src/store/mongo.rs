//! MongoDB client, collection wrapper and [`Store`] implementation
//!
//! Uniqueness lives in the indexes declared by each schema; a duplicate-key
//! write surfaces as [`CaseGateError::Conflict`].

use std::collections::BTreeSet;

use async_trait::async_trait;
use bson::{doc, oid::ObjectId, DateTime, Document};
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::{
    error::{ErrorKind, WriteFailure},
    options::{IndexOptions, UpdateModifications},
    results::UpdateResult,
    Client, Collection, IndexModel,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info, warn};

use crate::audit::AuditRecord;
use crate::cases::{Case, CaseLogEntry, CaseStatus, Message, ReportChannel};
use crate::identity::CaseId;
use crate::sla::{OrgPolicy, SlaEvent};
use crate::store::schemas::{
    AuditDoc, CaseDoc, CaseLogDoc, ChannelDoc, MessageDoc, Metadata, OrgPolicyDoc, SlaEventDoc,
    AUDIT_COLLECTION, CASE_COLLECTION, CASE_LOG_COLLECTION, CHANNEL_COLLECTION,
    MESSAGE_COLLECTION, ORG_POLICY_COLLECTION, SLA_EVENT_COLLECTION,
};
use crate::types::{CaseGateError, Result};

use super::{CaseUpdate, Store};

/// Server error code for a unique index violation
const DUPLICATE_KEY: i32 = 11000;

/// Trait for schemas that provide index definitions
pub trait IntoIndexes {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)>;
}

/// Trait for schemas with mutable metadata
pub trait MutMetadata {
    fn mut_metadata(&mut self) -> &mut Metadata;
}

fn stamp_updated(mut update: Document) -> Document {
    match update.get_document_mut("$set") {
        Ok(set) => {
            set.insert("metadata.updated_at", DateTime::now());
        }
        Err(_) => {
            update.insert("$set", doc! { "metadata.updated_at": DateTime::now() });
        }
    }
    update
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        *err.kind,
        ErrorKind::Write(WriteFailure::WriteError(ref e)) if e.code == DUPLICATE_KEY
    )
}

/// MongoDB client wrapper
#[derive(Clone)]
pub struct MongoClient {
    client: Client,
    db_name: String,
}

impl MongoClient {
    /// Connect and ping the database
    pub async fn new(uri: &str, db_name: &str) -> Result<Self> {
        info!("Connecting to MongoDB");

        // Bound server selection so startup fails fast on an unreachable cluster
        let timeout_uri = if uri.contains('?') {
            format!("{}&serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        } else {
            format!("{}?serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        };

        let client = Client::with_uri_str(&timeout_uri)
            .await
            .map_err(|e| CaseGateError::Database(format!("Failed to connect to MongoDB: {}", e)))?;

        client
            .database(db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| CaseGateError::Database(format!("MongoDB ping failed: {}", e)))?;

        info!("Connected to MongoDB database '{}'", db_name);

        Ok(Self {
            client,
            db_name: db_name.to_string(),
        })
    }

    /// Get a typed collection, applying its indexes
    pub async fn collection<T>(&self, name: &str) -> Result<MongoCollection<T>>
    where
        T: Serialize + DeserializeOwned + Unpin + Send + Sync + IntoIndexes + MutMetadata,
    {
        MongoCollection::new(&self.client, &self.db_name, name).await
    }

    pub fn db_name(&self) -> &str {
        &self.db_name
    }
}

/// Typed MongoDB collection with automatic indexing
#[derive(Debug, Clone)]
pub struct MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync,
{
    inner: Collection<T>,
}

impl<T> MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync + IntoIndexes + MutMetadata,
{
    /// Create a new collection and apply indexes
    pub async fn new(client: &Client, db_name: &str, collection_name: &str) -> Result<Self> {
        let collection = client.database(db_name).collection::<T>(collection_name);
        let mongo_collection = MongoCollection { inner: collection };

        mongo_collection.apply_indexes().await?;
        debug!(collection = collection_name, "indexes applied");

        Ok(mongo_collection)
    }

    /// Apply schema-defined indexes
    async fn apply_indexes(&self) -> Result<()> {
        let schema_indices = T::into_indices();

        if schema_indices.is_empty() {
            return Ok(());
        }

        let indices: Vec<IndexModel> = schema_indices
            .into_iter()
            .map(|(keys, opts)| IndexModel::builder().keys(keys).options(opts).build())
            .collect();

        self.inner
            .create_indexes(indices)
            .await
            .map_err(|e| CaseGateError::Database(format!("Failed to create indexes: {}", e)))?;

        Ok(())
    }

    /// Insert a document, setting metadata timestamps.
    ///
    /// A unique index violation maps to `Conflict`.
    pub async fn insert_one(&self, mut item: T) -> Result<ObjectId> {
        let metadata = item.mut_metadata();
        metadata.created_at = Some(DateTime::now());
        metadata.updated_at = Some(DateTime::now());

        let result = self.inner.insert_one(item).await.map_err(|e| {
            if is_duplicate_key(&e) {
                CaseGateError::Conflict("Duplicate key".into())
            } else {
                CaseGateError::Database(format!("Insert failed: {}", e))
            }
        })?;

        result
            .inserted_id
            .as_object_id()
            .ok_or_else(|| CaseGateError::Database("Failed to get inserted ID".into()))
    }

    /// Find one document by filter
    pub async fn find_one(&self, filter: Document) -> Result<Option<T>> {
        self.inner
            .find_one(filter)
            .await
            .map_err(|e| CaseGateError::Database(format!("Find failed: {}", e)))
    }

    /// Find many documents by filter, optionally sorted.
    ///
    /// A document that fails to decode fails the whole read. Use
    /// [`find_raw`](Self::find_raw) where one bad document must not hide the
    /// rest.
    pub async fn find_many(&self, filter: Document, sort: Option<Document>) -> Result<Vec<T>> {
        let mut find = self.inner.find(filter);
        if let Some(sort) = sort {
            find = find.sort(sort);
        }

        let cursor = find
            .await
            .map_err(|e| CaseGateError::Database(format!("Find failed: {}", e)))?;

        cursor
            .try_collect()
            .await
            .map_err(|e| CaseGateError::Database(format!("Error reading document: {}", e)))
    }

    /// Like [`find_many`](Self::find_many) but leaves decoding to the caller
    pub async fn find_raw(&self, filter: Document, sort: Option<Document>) -> Result<Vec<Document>> {
        let raw = self.inner.clone_with_type::<Document>();
        let mut find = raw.find(filter);
        if let Some(sort) = sort {
            find = find.sort(sort);
        }

        let cursor = find
            .await
            .map_err(|e| CaseGateError::Database(format!("Find failed: {}", e)))?;

        cursor
            .try_collect()
            .await
            .map_err(|e| CaseGateError::Database(format!("Error reading document: {}", e)))
    }

    /// Update one document, stamping `metadata.updated_at`
    pub async fn update_one(&self, filter: Document, update: Document) -> Result<UpdateResult> {
        self.inner
            .update_one(filter, stamp_updated(update))
            .await
            .map_err(|e| CaseGateError::Database(format!("Update failed: {}", e)))
    }

    /// Update one document or insert it if the filter matches nothing
    pub async fn upsert_one(&self, filter: Document, update: Document) -> Result<UpdateResult> {
        let mut update = stamp_updated(update);
        update.insert(
            "$setOnInsert",
            doc! { "metadata.created_at": DateTime::now() },
        );

        self.inner
            .update_one(filter, UpdateModifications::Document(update))
            .upsert(true)
            .await
            .map_err(|e| {
                if is_duplicate_key(&e) {
                    CaseGateError::Conflict("Duplicate key".into())
                } else {
                    CaseGateError::Database(format!("Upsert failed: {}", e))
                }
            })
    }

    /// Distinct values of a string field
    pub async fn distinct_strings(&self, field: &str) -> Result<Vec<String>> {
        let values = self
            .inner
            .distinct(field, doc! {})
            .await
            .map_err(|e| CaseGateError::Database(format!("Distinct failed: {}", e)))?;

        Ok(values
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect())
    }
}

/// [`Store`] backed by MongoDB
pub struct MongoStore {
    cases: MongoCollection<CaseDoc>,
    messages: MongoCollection<MessageDoc>,
    case_log: MongoCollection<CaseLogDoc>,
    audit: MongoCollection<AuditDoc>,
    sla_events: MongoCollection<SlaEventDoc>,
    policies: MongoCollection<OrgPolicyDoc>,
    channels: MongoCollection<ChannelDoc>,
}

impl MongoStore {
    /// Open every collection and apply its indexes
    pub async fn new(client: &MongoClient) -> Result<Self> {
        let store = Self {
            cases: client.collection(CASE_COLLECTION).await?,
            messages: client.collection(MESSAGE_COLLECTION).await?,
            case_log: client.collection(CASE_LOG_COLLECTION).await?,
            audit: client.collection(AUDIT_COLLECTION).await?,
            sla_events: client.collection(SLA_EVENT_COLLECTION).await?,
            policies: client.collection(ORG_POLICY_COLLECTION).await?,
            channels: client.collection(CHANNEL_COLLECTION).await?,
        };
        info!(db = client.db_name(), "MongoDB store ready");
        Ok(store)
    }

    async fn default_channel(&self, org_id: &str) -> Result<Option<ReportChannel>> {
        Ok(self
            .channels
            .find_one(doc! { "org_id": org_id, "is_default": true })
            .await?
            .map(ReportChannel::from))
    }
}

#[async_trait]
impl Store for MongoStore {
    async fn insert_case(&self, case: &Case) -> Result<()> {
        self.cases.insert_one(CaseDoc::from(case)).await.map(|_| ())
    }

    async fn get_case(&self, case_id: &CaseId) -> Result<Option<Case>> {
        self.cases
            .find_one(doc! { "case_id": case_id.as_str() })
            .await?
            .map(Case::try_from)
            .transpose()
    }

    async fn list_open_cases(&self, org_id: &str) -> Result<Vec<Case>> {
        let docs = self
            .cases
            .find_raw(
                doc! { "org_id": org_id, "status": { "$ne": CaseStatus::Closed.as_str() } },
                Some(doc! { "created_at": 1 }),
            )
            .await?;
        Ok(decode_cases(docs))
    }

    async fn update_case(&self, update: &CaseUpdate) -> Result<bool> {
        let result = self
            .cases
            .update_one(
                doc! {
                    "case_id": update.case_id.as_str(),
                    "status": update.expected_status.as_str(),
                },
                doc! {
                    "$set": {
                        "status": update.status.as_str(),
                        "acknowledged_at": update.acknowledged_at.map(DateTime::from_chrono),
                        "feedback_due_at": update.feedback_due_at.map(DateTime::from_chrono),
                        "feedback_given_at": update.feedback_given_at.map(DateTime::from_chrono),
                    }
                },
            )
            .await?;

        if result.matched_count > 0 {
            return Ok(true);
        }
        match self.get_case(&update.case_id).await? {
            Some(_) => Ok(false),
            None => Err(CaseGateError::NotFound("Case not found".into())),
        }
    }

    async fn insert_message(&self, message: &Message) -> Result<()> {
        self.messages
            .insert_one(MessageDoc::from(message))
            .await
            .map(|_| ())
    }

    async fn list_messages(&self, case_id: &CaseId) -> Result<Vec<Message>> {
        self.messages
            .find_many(
                doc! { "case_id": case_id.as_str() },
                Some(doc! { "created_at": 1 }),
            )
            .await?
            .into_iter()
            .map(Message::try_from)
            .collect()
    }

    async fn append_case_log(&self, entry: &CaseLogEntry) -> Result<()> {
        self.case_log
            .insert_one(CaseLogDoc::from(entry))
            .await
            .map(|_| ())
    }

    async fn list_case_log(&self, case_id: &CaseId) -> Result<Vec<CaseLogEntry>> {
        self.case_log
            .find_many(doc! { "case_id": case_id.as_str() }, Some(doc! { "at": 1 }))
            .await?
            .into_iter()
            .map(CaseLogEntry::try_from)
            .collect()
    }

    async fn append_audit(&self, record: &AuditRecord) -> Result<()> {
        self.audit.insert_one(AuditDoc::from(record)).await.map(|_| ())
    }

    async fn list_audit(&self, org_id: &str) -> Result<Vec<AuditRecord>> {
        Ok(self
            .audit
            .find_many(doc! { "org_id": org_id }, Some(doc! { "at": 1 }))
            .await?
            .into_iter()
            .map(AuditRecord::from)
            .collect())
    }

    async fn claim_sla_event(&self, event: &SlaEvent) -> Result<bool> {
        match self
            .sla_events
            .insert_one(SlaEventDoc::from_event(event, true))
            .await
        {
            Ok(_) => Ok(true),
            Err(CaseGateError::Conflict(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn append_sla_event(&self, event: &SlaEvent) -> Result<()> {
        self.sla_events
            .insert_one(SlaEventDoc::from_event(event, false))
            .await
            .map(|_| ())
    }

    async fn list_sla_events(&self, case_id: &CaseId) -> Result<Vec<SlaEvent>> {
        self.sla_events
            .find_many(
                doc! { "case_id": case_id.as_str() },
                Some(doc! { "created_at": -1 }),
            )
            .await?
            .into_iter()
            .map(SlaEvent::try_from)
            .collect()
    }

    async fn get_org_policy(&self, org_id: &str) -> Result<Option<OrgPolicy>> {
        Ok(self
            .policies
            .find_one(doc! { "org_id": org_id })
            .await?
            .map(OrgPolicy::from))
    }

    async fn put_org_policy(&self, policy: &OrgPolicy) -> Result<()> {
        self.policies
            .upsert_one(
                doc! { "org_id": policy.org_id.as_str() },
                doc! {
                    "$set": {
                        "sla_enabled": policy.sla_enabled,
                        "ack_days": policy.ack_days,
                        "feedback_days": policy.feedback_days,
                        "notify_emails": policy.notify_emails.clone(),
                    }
                },
            )
            .await
            .map(|_| ())
    }

    async fn list_org_ids(&self) -> Result<Vec<String>> {
        let mut orgs: BTreeSet<String> = self
            .cases
            .distinct_strings("org_id")
            .await?
            .into_iter()
            .collect();
        orgs.extend(self.policies.distinct_strings("org_id").await?);
        Ok(orgs.into_iter().collect())
    }

    async fn ensure_default_channel(&self, org_id: &str, slug: &str) -> Result<ReportChannel> {
        if let Some(existing) = self.default_channel(org_id).await? {
            return Ok(existing);
        }

        let channel = ReportChannel {
            channel_id: uuid::Uuid::new_v4().to_string(),
            org_id: org_id.to_string(),
            slug: slug.to_string(),
            is_default: true,
            created_at: Utc::now(),
        };

        match self.channels.insert_one(ChannelDoc::from(&channel)).await {
            Ok(_) => Ok(channel),
            Err(CaseGateError::Conflict(_)) => {
                // Either a concurrent creator won or the slug belongs elsewhere
                self.default_channel(org_id).await?.ok_or_else(|| {
                    CaseGateError::Conflict(format!("Channel slug '{}' is taken", slug))
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn get_channel(&self, slug: &str) -> Result<Option<ReportChannel>> {
        Ok(self
            .channels
            .find_one(doc! { "slug": slug })
            .await?
            .map(ReportChannel::from))
    }
}

/// Decode case documents, skipping any that no longer map to a [`Case`]
fn decode_cases(docs: Vec<Document>) -> Vec<Case> {
    docs.into_iter()
        .filter_map(|raw| {
            let case_id = raw.get_str("case_id").unwrap_or("<missing>").to_string();
            let decoded = bson::from_document::<CaseDoc>(raw)
                .map_err(|e| CaseGateError::Database(e.to_string()))
                .and_then(Case::try_from);
            match decoded {
                Ok(case) => Some(case),
                Err(e) => {
                    warn!(case_id = %case_id, "skipping unreadable case document: {}", e);
                    None
                }
            }
        })
        .collect()
}
