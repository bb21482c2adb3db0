use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct WebsiteRow {
    pub id: Uuid,
    pub owner_address: String,
    pub name: String,
    pub url: String,
    pub category: String,
    pub traffic_tier: Option<String>,
    pub language: Option<String>,
    pub keywords: Vec<String>,
    pub geo_reach: Vec<String>,
    /// Hash of the metadata document pinned to IPFS, set after pinning.
    pub ipfs_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct NewWebsite {
    pub owner_address: String,
    pub name: String,
    pub url: String,
    pub category: String,
    pub traffic_tier: Option<String>,
    pub language: Option<String>,
    pub keywords: Vec<String>,
    pub geo_reach: Vec<String>,
}

/// The document pinned to IPFS for a website. Its hash ends up in the
/// registry contract's websiteInfoHash slot when the publisher lists parcels.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebsiteInfoDoc {
    pub name: String,
    pub url: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traffic_tier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub geo_reach: Vec<String>,
}

impl From<&WebsiteRow> for WebsiteInfoDoc {
    fn from(row: &WebsiteRow) -> Self {
        Self {
            name: row.name.clone(),
            url: row.url.clone(),
            category: row.category.clone(),
            traffic_tier: row.traffic_tier.clone(),
            language: row.language.clone(),
            keywords: row.keywords.clone(),
            geo_reach: row.geo_reach.clone(),
        }
    }
}
