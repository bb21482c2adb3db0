//! First-party analytics over the ad_events table.
//!
//! The original system proxied these queries to a third-party analytics
//! backend; events are recorded first-party here, so the endpoints are
//! plain SQL aggregations.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use crate::errors::AppError;
use crate::models::analytics::{CountryStat, DailyVolumeStat, ParcelSummary};
use crate::AppState;

use super::parcel_db_id;

#[derive(Deserialize)]
pub struct VolumeParams {
    pub parcel_id: u64,
    /// Lookback in days, default 30, capped at one year.
    pub days: Option<i32>,
}

#[derive(Deserialize)]
pub struct ParcelParams {
    pub parcel_id: u64,
}

/// GET /api/v1/analytics/volume — daily impressions and clicks.
pub async fn get_daily_volume(
    State(state): State<Arc<AppState>>,
    Query(params): Query<VolumeParams>,
) -> Result<Json<Vec<DailyVolumeStat>>, AppError> {
    let db_id = parcel_db_id(params.parcel_id)?;
    let days = params.days.unwrap_or(30).clamp(1, 365);
    let stats = state.db.daily_volume(db_id, days).await?;
    Ok(Json(stats))
}

/// GET /api/v1/analytics/countries — event counts by visitor country.
pub async fn get_country_breakdown(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ParcelParams>,
) -> Result<Json<Vec<CountryStat>>, AppError> {
    let db_id = parcel_db_id(params.parcel_id)?;
    let stats = state.db.country_breakdown(db_id).await?;
    Ok(Json(stats))
}

/// GET /api/v1/analytics/parcels/:id — impressions, clicks, conversions, CTR.
pub async fn get_parcel_summary(
    State(state): State<Arc<AppState>>,
    Path(parcel_id): Path<u64>,
) -> Result<Json<ParcelSummary>, AppError> {
    let db_id = parcel_db_id(parcel_id)?;
    let counts = state.db.parcel_counts(db_id).await?;
    Ok(Json(ParcelSummary::from_counts(parcel_id, counts)))
}
