//! Thin proxy endpoints over the external collaborators: image moderation,
//! IPFS pinning, and the registry contract.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::chain::ParcelChain;
use crate::errors::AppError;
use crate::models::parcel::ParcelSnapshot;
use crate::proxy::pinata::PinataClient;
use crate::proxy::rekognition::{ModerationClient, ModerationVerdict};
use crate::AppState;

#[derive(Deserialize)]
pub struct ModerationRequest {
    pub image_url: String,
}

#[derive(Deserialize)]
pub struct PinRequest {
    pub name: String,
    pub content: serde_json::Value,
}

#[derive(Deserialize)]
pub struct SetActiveRequest {
    pub active: bool,
}

fn moderation_client(state: &AppState) -> Result<&ModerationClient, AppError> {
    state
        .moderation
        .as_ref()
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("moderation client not configured")))
}

fn pinata_client(state: &AppState) -> Result<&PinataClient, AppError> {
    state
        .pinata
        .as_ref()
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("pinning client not configured")))
}

fn chain_client(state: &AppState) -> Result<&ParcelChain, AppError> {
    state
        .chain
        .as_ref()
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("chain client not configured")))
}

/// POST /api/v1/moderation — run an image through Rekognition moderation.
pub async fn moderate_image(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ModerationRequest>,
) -> Result<Json<ModerationVerdict>, AppError> {
    let verdict = moderation_client(&state)?
        .check_image_url(&payload.image_url)
        .await?;
    Ok(Json(verdict))
}

/// POST /api/v1/ipfs/pin — pin an arbitrary JSON document.
pub async fn pin_json(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PinRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let hash = pinata_client(&state)?
        .pin_json(&payload.name, &payload.content)
        .await?;
    Ok(Json(json!({ "ipfs_hash": hash })))
}

/// DELETE /api/v1/ipfs/unpin/:hash
pub async fn unpin(
    State(state): State<Arc<AppState>>,
    Path(hash): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    pinata_client(&state)?.unpin(&hash).await?;
    Ok(Json(json!({ "unpinned": true })))
}

/// GET /api/v1/chain/parcels — registered parcel ids.
pub async fn list_parcels(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<u64>>, AppError> {
    let ids = chain_client(&state)?.list_parcel_ids().await?;
    Ok(Json(ids))
}

/// GET /api/v1/chain/parcels/:id — fresh (uncached) parcel snapshot.
pub async fn get_parcel(
    State(state): State<Arc<AppState>>,
    Path(parcel_id): Path<u64>,
) -> Result<Json<ParcelSnapshot>, AppError> {
    let parcel = chain_client(&state)?.get_parcel(parcel_id).await?;
    Ok(Json(parcel))
}

/// POST /api/v1/chain/parcels/:id/active — submit the activation write and
/// wait for one confirmation. Invalidate the cached snapshot on success.
pub async fn set_parcel_active(
    State(state): State<Arc<AppState>>,
    Path(parcel_id): Path<u64>,
    Json(payload): Json<SetActiveRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let tx_hash = chain_client(&state)?
        .set_parcel_active(parcel_id, payload.active)
        .await?;
    state
        .cache
        .invalidate(&crate::cache::parcel_key(parcel_id))
        .await;
    Ok(Json(json!({ "tx_hash": tx_hash, "active": payload.active })))
}
