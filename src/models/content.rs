use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct AdContentRow {
    pub id: Uuid,
    pub announcer_address: String,
    pub title: String,
    pub description: String,
    pub link_url: String,
    pub image_url: String,
    /// Hash of the creative document pinned to IPFS; announcers point the
    /// registry contract's contentHash at it when renting a parcel.
    pub ipfs_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The creative as published to IPFS and consumed by the template renderer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdCreative {
    pub title: String,
    pub description: String,
    pub link_url: String,
    pub image_url: String,
}

impl From<&AdContentRow> for AdCreative {
    fn from(row: &AdContentRow) -> Self {
        Self {
            title: row.title.clone(),
            description: row.description.clone(),
            link_url: row.link_url.clone(),
            image_url: row.image_url.clone(),
        }
    }
}
