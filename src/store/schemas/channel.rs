//! Report channel document

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::cases::ReportChannel;
use crate::store::mongo::{IntoIndexes, MutMetadata};

use super::Metadata;

/// Collection name for report channels
pub const CHANNEL_COLLECTION: &str = "report_channels";

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ChannelDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    pub channel_id: String,
    pub org_id: String,
    pub slug: String,
    #[serde(default)]
    pub is_default: bool,
    pub created_at: DateTime,
}

impl From<&ReportChannel> for ChannelDoc {
    fn from(channel: &ReportChannel) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            channel_id: channel.channel_id.clone(),
            org_id: channel.org_id.clone(),
            slug: channel.slug.clone(),
            is_default: channel.is_default,
            created_at: DateTime::from_chrono(channel.created_at),
        }
    }
}

impl From<ChannelDoc> for ReportChannel {
    fn from(doc: ChannelDoc) -> Self {
        Self {
            channel_id: doc.channel_id,
            org_id: doc.org_id,
            slug: doc.slug,
            is_default: doc.is_default,
            created_at: doc.created_at.to_chrono(),
        }
    }
}

impl IntoIndexes for ChannelDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "slug": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("slug_unique".to_string())
                        .build(),
                ),
            ),
            // One default channel per organization
            (
                doc! { "org_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .partial_filter_expression(doc! { "is_default": true })
                        .name("default_channel_unique".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for ChannelDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
