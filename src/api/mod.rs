use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::{self, Next},
    response::Response,
    routing::{delete, get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::errors::AppError;
use crate::AppState;

pub mod analytics;
pub mod handlers;
pub mod hooks;
pub mod proxies;
pub mod serve;

/// Build the Management API router. The caller mounts this under /api/v1;
/// every route requires the admin key.
pub fn api_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/users", get(handlers::list_users).post(handlers::upsert_user))
        .route("/users/:address", get(handlers::get_user))
        .route(
            "/websites",
            get(handlers::list_websites).post(handlers::create_website),
        )
        .route(
            "/websites/:id",
            get(handlers::get_website)
                .put(handlers::update_website)
                .delete(handlers::delete_website),
        )
        .route(
            "/contents",
            get(handlers::list_contents).post(handlers::create_content),
        )
        .route(
            "/contents/:id",
            get(handlers::get_content)
                .put(handlers::update_content)
                .delete(handlers::delete_content),
        )
        .route("/analytics/volume", get(analytics::get_daily_volume))
        .route("/analytics/countries", get(analytics::get_country_breakdown))
        .route("/analytics/parcels/:id", get(analytics::get_parcel_summary))
        .route("/notifications", get(handlers::list_notifications))
        .route(
            "/notifications/unread",
            get(handlers::count_unread_notifications),
        )
        .route(
            "/notifications/:id/read",
            post(handlers::mark_notification_read),
        )
        .route(
            "/notifications/read-all",
            post(handlers::mark_all_notifications_read),
        )
        .route("/moderation", post(proxies::moderate_image))
        .route("/ipfs/pin", post(proxies::pin_json))
        .route("/ipfs/unpin/:hash", delete(proxies::unpin))
        .route("/chain/parcels", get(proxies::list_parcels))
        .route("/chain/parcels/:id", get(proxies::get_parcel))
        .route("/chain/parcels/:id/active", post(proxies::set_parcel_active))
        .layer(middleware::from_fn_with_state(state, admin_auth))
        .layer(TraceLayer::new_for_http())
        .fallback(fallback_404)
}

/// Public ad-serving router, mounted under /api/serve. No auth — these are
/// the endpoints the embed script talks to.
pub fn serve_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/:parcel_id", get(serve::serve_ad))
        .route("/:parcel_id/click", post(serve::record_click))
        .route("/:parcel_id/conversion", post(serve::record_conversion))
}

/// Webhook router, mounted under /api/hooks. Authenticated per-request via
/// the HMAC signature header, not the admin key.
pub fn hooks_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/agent-decision", post(hooks::agent_decision))
        .route("/notify", post(hooks::dispatch_notifications))
}

async fn fallback_404() -> AppError {
    AppError::NotFound("route")
}

/// Middleware: validates `X-Admin-Key` (or a Bearer token) against the
/// configured admin key. Constant-time comparison.
async fn admin_auth(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let provided_key = req
        .headers()
        .get("x-admin-key")
        .and_then(|v| v.to_str().ok())
        .or_else(|| {
            req.headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(|t| t.trim())
        });

    match provided_key {
        Some(k) if crate::middleware::constant_time_eq(k, &state.config.admin_key) => {
            Ok(next.run(req).await)
        }
        Some(k) => {
            // Never log the expected key or the full provided key
            let masked = if k.len() > 8 {
                format!("{}…{}", &k[..4], &k[k.len() - 4..])
            } else {
                "****".to_string()
            };
            tracing::warn!("management API: invalid key (provided: '{}')", masked);
            Err(AppError::Unauthorized)
        }
        None => {
            tracing::warn!("management API: missing X-Admin-Key header");
            Err(AppError::Unauthorized)
        }
    }
}

/// Middleware: per-IP fixed-window rate limit over everything under /api.
pub async fn rate_limit(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let ip = crate::middleware::client_ip(req.headers(), addr.ip());
    if !state.limiter.check(ip) {
        state.metrics.record_rate_limited();
        tracing::debug!(%ip, "request rejected by rate limiter");
        return Err(AppError::RateLimitExceeded);
    }
    Ok(next.run(req).await)
}

/// Parcel ids are uint256 on-chain but persisted as BIGINT; anything that
/// does not fit is rejected rather than silently truncated.
pub(crate) fn parcel_db_id(parcel_id: u64) -> Result<i64, AppError> {
    i64::try_from(parcel_id)
        .map_err(|_| AppError::BadRequest(format!("parcel id {} out of range", parcel_id)))
}
