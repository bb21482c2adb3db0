//! Public ad-serving endpoints: template delivery, impression and click
//! recording (behind the de-duplication window), conversions.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cache::{ipfs_key, parcel_key};
use crate::chain::ParcelChain;
use crate::errors::AppError;
use crate::middleware::{click_window, client_country, client_ip};
use crate::models::content::AdCreative;
use crate::models::event::{EventKind, EventMeta};
use crate::models::parcel::{ParcelSnapshot, ParcelTraits};
use crate::proxy::pinata::PinataClient;
use crate::template;
use crate::AppState;

use super::parcel_db_id;

/// TTL for cached parcel snapshots and IPFS documents on the serve path.
const SERVE_CACHE_TTL_SECS: u64 = 60;

#[derive(Deserialize, Default)]
pub struct ClickReport {
    /// Page URL reported by the embed script; the Referer header is often
    /// stripped by the embedding page's referrer policy.
    #[serde(default)]
    pub page: Option<String>,
}

#[derive(Serialize)]
pub struct ClickResponse {
    pub recorded: bool,
    pub click_id: Option<Uuid>,
}

#[derive(Deserialize)]
pub struct ConversionRequest {
    pub click_id: Uuid,
    #[serde(default)]
    pub content_id: Option<Uuid>,
}

#[derive(Serialize)]
pub struct ConversionResponse {
    pub conversion_id: Uuid,
}

fn chain_client(state: &AppState) -> Result<&ParcelChain, AppError> {
    state
        .chain
        .as_ref()
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("chain client not configured")))
}

fn pinata_client(state: &AppState) -> Result<&PinataClient, AppError> {
    state
        .pinata
        .as_ref()
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("pinning client not configured")))
}

/// Load a parcel snapshot through the tiered cache.
async fn load_parcel(state: &AppState, parcel_id: u64) -> Result<ParcelSnapshot, AppError> {
    let key = parcel_key(parcel_id);
    if let Some(parcel) = state.cache.get::<ParcelSnapshot>(&key).await {
        return Ok(parcel);
    }
    let parcel = chain_client(state)?.get_parcel(parcel_id).await?;
    if let Err(e) = state.cache.set(&key, &parcel, SERVE_CACHE_TTL_SECS).await {
        tracing::warn!(parcel_id, error = %e, "failed to cache parcel snapshot");
    }
    Ok(parcel)
}

/// Load an IPFS document through the tiered cache.
async fn load_doc<T>(state: &AppState, hash: &str) -> Result<T, AppError>
where
    T: serde::de::DeserializeOwned + serde::Serialize,
{
    let key = ipfs_key(hash);
    if let Some(doc) = state.cache.get::<T>(&key).await {
        return Ok(doc);
    }
    let doc: T = pinata_client(state)?.fetch_json(hash).await?;
    if let Err(e) = state.cache.set(&key, &doc, SERVE_CACHE_TTL_SECS).await {
        tracing::warn!(hash, error = %e, "failed to cache ipfs document");
    }
    Ok(doc)
}

fn event_meta(headers: &HeaderMap, ip: String, page: Option<String>) -> EventMeta {
    let header_str =
        |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(String::from);
    EventMeta {
        ip,
        country: client_country(headers),
        referer: page.or_else(|| header_str("referer")),
        user_agent: header_str("user-agent"),
        accept_language: header_str("accept-language"),
    }
}

/// GET /api/serve/:parcel_id — render the ad snippet for a parcel and
/// register an impression. 404 for unknown, inactive or unrented parcels.
pub async fn serve_ad(
    State(state): State<Arc<AppState>>,
    Path(parcel_id): Path<u64>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let db_id = parcel_db_id(parcel_id)?;
    let parcel = load_parcel(&state, parcel_id).await?;
    if !parcel.servable() {
        return Err(AppError::NotFound("parcel"));
    }

    let traits: ParcelTraits = load_doc(&state, &parcel.traits_hash).await?;
    let creative: AdCreative = load_doc(&state, &parcel.content_hash).await?;
    let html = template::render(parcel_id, &traits, &creative);

    // Impression recording must not delay template delivery.
    let ip = client_ip(&headers, addr.ip()).to_string();
    let meta = event_meta(&headers, ip, None);
    let db = state.db.clone();
    tokio::spawn(async move {
        if let Err(e) = db.insert_event(db_id, EventKind::Impression, &meta).await {
            tracing::error!(parcel_id, error = %e, "failed to record impression");
        }
    });
    state.metrics.record_impression();

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        html,
    )
        .into_response())
}

/// POST /api/serve/:parcel_id/click — record a click.
///
/// A repeat click from the same IP inside the window is answered 200 with
/// `recorded: false` and never persisted; outside the window (or outside
/// production) it is credited.
pub async fn record_click(
    State(state): State<Arc<AppState>>,
    Path(parcel_id): Path<u64>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    payload: Option<Json<ClickReport>>,
) -> Result<Json<ClickResponse>, AppError> {
    let db_id = parcel_db_id(parcel_id)?;
    let ip = client_ip(&headers, addr.ip()).to_string();

    if state.config.enforce_click_window() {
        let last = state.db.last_click_at(db_id, &ip).await?;
        if !click_window::should_credit(last, Utc::now(), state.config.click_window_hours) {
            tracing::debug!(parcel_id, %ip, "click suppressed by de-duplication window");
            state.metrics.record_click(false);
            return Ok(Json(ClickResponse {
                recorded: false,
                click_id: None,
            }));
        }
    }

    let page = payload.and_then(|Json(p)| p.page);
    let meta = event_meta(&headers, ip, page);
    let click_id = state.db.insert_event(db_id, EventKind::Click, &meta).await?;
    state.metrics.record_click(true);

    Ok(Json(ClickResponse {
        recorded: true,
        click_id: Some(click_id),
    }))
}

/// POST /api/serve/:parcel_id/conversion — link a conversion to a click.
pub async fn record_conversion(
    State(state): State<Arc<AppState>>,
    Path(parcel_id): Path<u64>,
    Json(payload): Json<ConversionRequest>,
) -> Result<Json<ConversionResponse>, AppError> {
    let db_id = parcel_db_id(parcel_id)?;

    let click = state
        .db
        .get_click(payload.click_id)
        .await?
        .ok_or(AppError::NotFound("click"))?;
    if click.parcel_id != db_id {
        return Err(AppError::BadRequest(
            "click does not belong to this parcel".into(),
        ));
    }

    let conversion_id = state
        .db
        .insert_conversion(payload.click_id, db_id, payload.content_id)
        .await?;

    Ok(Json(ConversionResponse { conversion_id }))
}
