use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Impression,
    Click,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Impression => "impression",
            EventKind::Click => "click",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct AdEventRow {
    pub id: Uuid,
    pub parcel_id: i64,
    pub kind: String,
    pub ip: String,
    pub country: Option<String>,
    pub referer: Option<String>,
    pub user_agent: Option<String>,
    pub accept_language: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Request-derived metadata captured for every impression/click.
#[derive(Debug, Clone)]
pub struct EventMeta {
    pub ip: String,
    pub country: Option<String>,
    pub referer: Option<String>,
    pub user_agent: Option<String>,
    pub accept_language: Option<String>,
}

