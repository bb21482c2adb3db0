use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::content::{AdContentRow, AdCreative};
use crate::models::notification::NotificationRow;
use crate::models::user::{is_wallet_address, Role, UserRow};
use crate::models::website::{NewWebsite, WebsiteInfoDoc, WebsiteRow};
use crate::store::{is_foreign_key_violation, is_unique_violation};
use crate::AppState;

// ── Request / Response DTOs ──────────────────────────────────

#[derive(Deserialize)]
pub struct UpsertUserRequest {
    pub wallet_address: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub role: Role,
    /// Auth-provider profile blob (Web3Auth), stored opaquely.
    #[serde(default)]
    pub profile: Option<serde_json::Value>,
}

#[derive(Deserialize)]
pub struct ListUsersParams {
    pub role: Option<Role>,
}

#[derive(Deserialize)]
pub struct WebsiteRequest {
    pub owner_address: String,
    pub name: String,
    pub url: String,
    pub category: String,
    #[serde(default)]
    pub traffic_tier: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub geo_reach: Vec<String>,
}

#[derive(Deserialize)]
pub struct ListWebsitesParams {
    pub owner: Option<String>,
}

#[derive(Deserialize)]
pub struct ContentRequest {
    pub announcer_address: String,
    pub title: String,
    pub description: String,
    pub link_url: String,
    pub image_url: String,
}

#[derive(Deserialize)]
pub struct ListContentsParams {
    pub announcer: Option<String>,
}

#[derive(Deserialize)]
pub struct RecipientParams {
    pub recipient: String,
    pub limit: Option<i64>,
}

#[derive(Serialize)]
pub struct UnreadCount {
    pub unread: i64,
}

// ── Validation helpers ───────────────────────────────────────

fn require_wallet(address: &str) -> Result<(), AppError> {
    if is_wallet_address(address) {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!(
            "'{}' is not a wallet address",
            address
        )))
    }
}

fn require_http_url(raw: &str, field: &str) -> Result<(), AppError> {
    let url = url::Url::parse(raw)
        .map_err(|_| AppError::BadRequest(format!("{} is not a valid URL", field)))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(AppError::BadRequest(format!(
            "{} must be http(s), got '{}'",
            field,
            url.scheme()
        )));
    }
    Ok(())
}

// ── User handlers ────────────────────────────────────────────

/// POST /api/v1/users — register or update a user keyed by wallet address.
pub async fn upsert_user(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<UpsertUserRequest>,
) -> Result<(StatusCode, Json<UserRow>), AppError> {
    require_wallet(&payload.wallet_address)?;

    let row = state
        .db
        .upsert_user(
            &payload.wallet_address,
            payload.email.as_deref(),
            payload.name.as_deref(),
            payload.role.as_str(),
            payload.profile,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(row)))
}

/// GET /api/v1/users — list users, optionally by role.
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListUsersParams>,
) -> Result<Json<Vec<UserRow>>, AppError> {
    let users = state
        .db
        .list_users(params.role.map(|r| r.as_str()))
        .await?;
    Ok(Json(users))
}

/// GET /api/v1/users/:address
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> Result<Json<UserRow>, AppError> {
    require_wallet(&address)?;
    let user = state
        .db
        .get_user(&address)
        .await?
        .ok_or(AppError::NotFound("user"))?;
    Ok(Json(user))
}

// ── Website handlers ─────────────────────────────────────────

/// POST /api/v1/websites — register a publisher website. The metadata
/// document is pinned to IPFS when a pinning client is configured; its
/// hash is what publishers point the registry's websiteInfoHash at.
pub async fn create_website(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<WebsiteRequest>,
) -> Result<(StatusCode, Json<WebsiteRow>), AppError> {
    require_wallet(&payload.owner_address)?;
    require_http_url(&payload.url, "url")?;

    let new_site = NewWebsite {
        owner_address: payload.owner_address,
        name: payload.name,
        url: payload.url,
        category: payload.category,
        traffic_tier: payload.traffic_tier,
        language: payload.language,
        keywords: payload.keywords,
        geo_reach: payload.geo_reach,
    };

    let mut row = state.db.insert_website(&new_site).await.map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict("this owner already registered that URL".into())
        } else if is_foreign_key_violation(&e) {
            AppError::BadRequest("owner is not a registered user".into())
        } else {
            AppError::Database(e)
        }
    })?;

    if let Some(pinata) = &state.pinata {
        let doc = WebsiteInfoDoc::from(&row);
        let hash = pinata
            .pin_json(&format!("website-{}", row.id), &doc)
            .await?;
        state.db.set_website_ipfs_hash(row.id, &hash).await?;
        row.ipfs_hash = Some(hash);
    }

    Ok((StatusCode::CREATED, Json(row)))
}

/// GET /api/v1/websites — list websites, optionally by owner.
pub async fn list_websites(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListWebsitesParams>,
) -> Result<Json<Vec<WebsiteRow>>, AppError> {
    if let Some(owner) = &params.owner {
        require_wallet(owner)?;
    }
    let sites = state.db.list_websites(params.owner.as_deref()).await?;
    Ok(Json(sites))
}

/// GET /api/v1/websites/:id
pub async fn get_website(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<WebsiteRow>, AppError> {
    let site = state
        .db
        .get_website(id)
        .await?
        .ok_or(AppError::NotFound("website"))?;
    Ok(Json(site))
}

/// PUT /api/v1/websites/:id — update and re-pin the metadata document.
pub async fn update_website(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<WebsiteRequest>,
) -> Result<Json<WebsiteRow>, AppError> {
    require_http_url(&payload.url, "url")?;

    let old_hash = state
        .db
        .get_website(id)
        .await?
        .ok_or(AppError::NotFound("website"))?
        .ipfs_hash;

    let new_site = NewWebsite {
        owner_address: payload.owner_address,
        name: payload.name,
        url: payload.url,
        category: payload.category,
        traffic_tier: payload.traffic_tier,
        language: payload.language,
        keywords: payload.keywords,
        geo_reach: payload.geo_reach,
    };

    let mut row = state
        .db
        .update_website(id, &new_site)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict("this owner already registered that URL".into())
            } else {
                AppError::Database(e)
            }
        })?
        .ok_or(AppError::NotFound("website"))?;

    if let Some(pinata) = &state.pinata {
        if let Some(old) = old_hash {
            // old pin is garbage either way; losing it only costs pin quota
            if let Err(e) = pinata.unpin(&old).await {
                tracing::warn!(hash = %old, error = %e, "failed to unpin stale website doc");
            }
        }
        let doc = WebsiteInfoDoc::from(&row);
        let hash = pinata.pin_json(&format!("website-{}", row.id), &doc).await?;
        state.db.set_website_ipfs_hash(row.id, &hash).await?;
        row.ipfs_hash = Some(hash);
    }

    Ok(Json(row))
}

/// DELETE /api/v1/websites/:id
pub async fn delete_website(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    let hash = state
        .db
        .delete_website(id)
        .await?
        .ok_or(AppError::NotFound("website"))?;

    if let (Some(pinata), Some(hash)) = (&state.pinata, hash) {
        if let Err(e) = pinata.unpin(&hash).await {
            tracing::warn!(hash = %hash, error = %e, "failed to unpin deleted website doc");
        }
    }

    Ok(Json(json!({ "deleted": true })))
}

// ── Ad content handlers ──────────────────────────────────────

/// Run the creative image through moderation when the client is configured.
/// A flagged creative is rejected and the flag is fanned out to webhooks.
async fn screen_creative(
    state: &AppState,
    announcer: &str,
    image_url: &str,
) -> Result<(), AppError> {
    let Some(moderation) = &state.moderation else {
        return Ok(());
    };

    let verdict = moderation.check_image_url(image_url).await?;
    if verdict.flagged {
        let labels: Vec<String> = verdict.labels.iter().map(|l| l.name.clone()).collect();
        state
            .webhook
            .dispatch(
                &state.config.webhook_urls,
                crate::notification::webhook::WebhookEvent::content_flagged(
                    image_url, announcer, &labels,
                ),
            )
            .await;
        return Err(AppError::BadRequest(format!(
            "image rejected by moderation: {}",
            labels.join(", ")
        )));
    }
    Ok(())
}

/// POST /api/v1/contents — create an announcer creative.
pub async fn create_content(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ContentRequest>,
) -> Result<(StatusCode, Json<AdContentRow>), AppError> {
    require_wallet(&payload.announcer_address)?;
    require_http_url(&payload.link_url, "link_url")?;
    require_http_url(&payload.image_url, "image_url")?;

    screen_creative(&state, &payload.announcer_address, &payload.image_url).await?;

    let mut row = state
        .db
        .insert_content(
            &payload.announcer_address,
            &payload.title,
            &payload.description,
            &payload.link_url,
            &payload.image_url,
        )
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                AppError::BadRequest("announcer is not a registered user".into())
            } else {
                AppError::Database(e)
            }
        })?;

    if let Some(pinata) = &state.pinata {
        let creative = AdCreative::from(&row);
        let hash = pinata
            .pin_json(&format!("creative-{}", row.id), &creative)
            .await?;
        state.db.set_content_ipfs_hash(row.id, &hash).await?;
        row.ipfs_hash = Some(hash);
    }

    Ok((StatusCode::CREATED, Json(row)))
}

/// GET /api/v1/contents — list creatives, optionally by announcer.
pub async fn list_contents(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListContentsParams>,
) -> Result<Json<Vec<AdContentRow>>, AppError> {
    if let Some(announcer) = &params.announcer {
        require_wallet(announcer)?;
    }
    let rows = state.db.list_contents(params.announcer.as_deref()).await?;
    Ok(Json(rows))
}

/// GET /api/v1/contents/:id
pub async fn get_content(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<AdContentRow>, AppError> {
    let row = state
        .db
        .get_content(id)
        .await?
        .ok_or(AppError::NotFound("ad content"))?;
    Ok(Json(row))
}

/// PUT /api/v1/contents/:id — update and re-pin a creative.
pub async fn update_content(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ContentRequest>,
) -> Result<Json<AdContentRow>, AppError> {
    require_http_url(&payload.link_url, "link_url")?;
    require_http_url(&payload.image_url, "image_url")?;

    screen_creative(&state, &payload.announcer_address, &payload.image_url).await?;

    let old_hash = state
        .db
        .get_content(id)
        .await?
        .ok_or(AppError::NotFound("ad content"))?
        .ipfs_hash;

    let mut row = state
        .db
        .update_content(
            id,
            &payload.title,
            &payload.description,
            &payload.link_url,
            &payload.image_url,
        )
        .await?
        .ok_or(AppError::NotFound("ad content"))?;

    if let Some(pinata) = &state.pinata {
        if let Some(old) = old_hash {
            if let Err(e) = pinata.unpin(&old).await {
                tracing::warn!(hash = %old, error = %e, "failed to unpin stale creative");
            }
        }
        let creative = AdCreative::from(&row);
        let hash = pinata
            .pin_json(&format!("creative-{}", row.id), &creative)
            .await?;
        state.db.set_content_ipfs_hash(row.id, &hash).await?;
        row.ipfs_hash = Some(hash);
    }

    Ok(Json(row))
}

/// DELETE /api/v1/contents/:id
pub async fn delete_content(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    let hash = state
        .db
        .delete_content(id)
        .await?
        .ok_or(AppError::NotFound("ad content"))?;

    if let (Some(pinata), Some(hash)) = (&state.pinata, hash) {
        if let Err(e) = pinata.unpin(&hash).await {
            tracing::warn!(hash = %hash, error = %e, "failed to unpin deleted creative");
        }
    }

    Ok(Json(json!({ "deleted": true })))
}

// ── Notification handlers ────────────────────────────────────

/// GET /api/v1/notifications?recipient=0x…
pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RecipientParams>,
) -> Result<Json<Vec<NotificationRow>>, AppError> {
    require_wallet(&params.recipient)?;
    let rows = state
        .db
        .list_notifications(&params.recipient, params.limit.unwrap_or(50).clamp(1, 500))
        .await?;
    Ok(Json(rows))
}

/// GET /api/v1/notifications/unread?recipient=0x…
pub async fn count_unread_notifications(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RecipientParams>,
) -> Result<Json<UnreadCount>, AppError> {
    require_wallet(&params.recipient)?;
    let unread = state.db.count_unread(&params.recipient).await?;
    Ok(Json(UnreadCount { unread }))
}

/// POST /api/v1/notifications/:id/read
pub async fn mark_notification_read(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    if !state.db.mark_notification_read(id).await? {
        return Err(AppError::NotFound("notification"));
    }
    Ok(Json(json!({ "read": true })))
}

/// POST /api/v1/notifications/read-all?recipient=0x…
pub async fn mark_all_notifications_read(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RecipientParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    require_wallet(&params.recipient)?;
    let updated = state.db.mark_all_read(&params.recipient).await?;
    Ok(Json(json!({ "read": updated })))
}
