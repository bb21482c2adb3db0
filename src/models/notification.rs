use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct NotificationRow {
    pub id: Uuid,
    pub recipient_address: String,
    pub kind: String,
    pub title: String,
    pub body: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// One entry of a dispatch batch posted to /api/hooks/notify.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub recipient_address: String,
    #[serde(default)]
    pub email: Option<String>,
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub kind: Option<String>,
}
