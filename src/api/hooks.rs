//! Webhook-style endpoints delivered by upstream callers that retry.
//!
//! Both endpoints authenticate with the shared-secret HMAC signature and
//! run their action through the idempotency guard keyed by the request
//! UUID: replays of completed deliveries short-circuit with
//! `processed: false`, concurrent duplicates get a 409.

use std::sync::Arc;

use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::errors::AppError;
use crate::middleware::idempotency::{run_once, GuardOutcome};
use crate::middleware::verify_signature;
use crate::models::notification::NotificationRequest;
use crate::notification::webhook::WebhookEvent;
use crate::AppState;

use super::parcel_db_id;

#[derive(Deserialize)]
struct AgentDecisionRequest {
    uuid: Uuid,
    #[serde(default)]
    parcel_id: Option<u64>,
    action: String,
    #[serde(default)]
    details: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct NotifyRequest {
    uuid: Uuid,
    notifications: Vec<NotificationRequest>,
}

/// Authenticate an inbound webhook body against X-AdParcel-Signature.
fn authenticate(state: &AppState, headers: &HeaderMap, body: &[u8]) -> Result<(), AppError> {
    let header = headers
        .get("x-adparcel-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::Unauthorized)?;
    if !verify_signature(&state.config.webhook_secret, body, header) {
        tracing::warn!("webhook rejected: bad signature");
        return Err(AppError::Unauthorized);
    }
    Ok(())
}

fn parse_body<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, AppError> {
    serde_json::from_slice(body).map_err(|e| AppError::BadRequest(format!("invalid body: {}", e)))
}

/// POST /api/hooks/agent-decision — callback from the off-chain bidding
/// agent. Records the decision; a `content_rejected` decision also
/// deactivates the parcel on-chain and notifies the renter, while
/// `parcel_rented` notifies the owner.
pub async fn agent_decision(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, AppError> {
    authenticate(&state, &headers, &body)?;
    let payload: AgentDecisionRequest = parse_body(&body)?;

    let outcome = run_once(&state.db, payload.uuid, || {
        let state = state.clone();
        let payload = &payload;
        async move { process_decision(&state, payload).await }
    })
    .await?;

    match outcome {
        GuardOutcome::Executed(()) => {
            state
                .webhook
                .dispatch(
                    &state.config.webhook_urls,
                    WebhookEvent::agent_decision(&payload.uuid, payload.parcel_id, &payload.action),
                )
                .await;
            Ok(Json(json!({ "processed": true })))
        }
        GuardOutcome::AlreadyProcessed => {
            Ok(Json(json!({ "processed": false, "reason": "already processed" })))
        }
        GuardOutcome::InFlight => Err(AppError::Conflict(
            "a request with this uuid is already being processed".into(),
        )),
    }
}

async fn process_decision(state: &AppState, payload: &AgentDecisionRequest) -> anyhow::Result<()> {
    let db_parcel = payload
        .parcel_id
        .map(parcel_db_id)
        .transpose()
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    state
        .db
        .insert_agent_decision(
            payload.uuid,
            db_parcel,
            &payload.action,
            payload.details.clone(),
        )
        .await?;

    match (payload.action.as_str(), payload.parcel_id) {
        ("parcel_rented", Some(parcel_id)) => {
            if let Some(chain) = &state.chain {
                let parcel = chain
                    .get_parcel(parcel_id)
                    .await
                    .map_err(|e| anyhow::anyhow!("{}", e))?;
                state
                    .db
                    .insert_notification(
                        &parcel.owner,
                        "parcel_rented",
                        "Your ad parcel was rented",
                        Some(&format!(
                            "Parcel #{} was rented by {} for {} wei.",
                            parcel_id, parcel.renter, parcel.bid
                        )),
                        payload.details.clone(),
                    )
                    .await?;
            }
        }
        ("content_rejected", Some(parcel_id)) => {
            if let Some(chain) = &state.chain {
                let parcel = chain
                    .get_parcel(parcel_id)
                    .await
                    .map_err(|e| anyhow::anyhow!("{}", e))?;
                chain
                    .set_parcel_active(parcel_id, false)
                    .await
                    .map_err(|e| anyhow::anyhow!("{}", e))?;
                state.cache.invalidate(&crate::cache::parcel_key(parcel_id)).await;
                state
                    .db
                    .insert_notification(
                        &parcel.renter,
                        "content_rejected",
                        "Your ad content was rejected",
                        Some(&format!(
                            "The creative on parcel #{} was rejected and the parcel was deactivated.",
                            parcel_id
                        )),
                        payload.details.clone(),
                    )
                    .await?;
            }
        }
        _ => {
            tracing::debug!(action = %payload.action, "agent decision recorded without side effects");
        }
    }

    Ok(())
}

/// POST /api/hooks/notify — idempotent notification batch dispatch.
///
/// Persisting the rows is the guarded action; email delivery afterwards is
/// best-effort, so a retried batch never re-emails recipients that were
/// already persisted.
pub async fn dispatch_notifications(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, AppError> {
    authenticate(&state, &headers, &body)?;
    let payload: NotifyRequest = parse_body(&body)?;
    if payload.notifications.is_empty() {
        return Err(AppError::BadRequest("empty notification batch".into()));
    }

    let count = payload.notifications.len();
    let outcome = run_once(&state.db, payload.uuid, || {
        let state = state.clone();
        let notifications = payload.notifications.clone();
        async move {
            for n in &notifications {
                state
                    .db
                    .insert_notification(
                        &n.recipient_address,
                        n.kind.as_deref().unwrap_or("info"),
                        &n.subject,
                        Some(&n.body),
                        None,
                    )
                    .await?;
            }
            Ok(notifications)
        }
    })
    .await?;

    match outcome {
        GuardOutcome::Executed(notifications) => {
            // Fire-and-forget email delivery; failures are logged, never retried
            // through the guard (that would re-email the whole batch).
            if let Some(mailer) = state.mailer.clone() {
                let batch: Vec<_> = notifications
                    .iter()
                    .filter_map(|n| n.email.clone().map(|to| (to, n.subject.clone(), n.body.clone())))
                    .collect();
                tokio::spawn(async move {
                    for (to, subject, body) in batch {
                        if let Err(e) = mailer.send(&to, &subject, &body).await {
                            tracing::warn!(to, error = %e, "notification email failed");
                        }
                    }
                });
            }

            state
                .webhook
                .dispatch(
                    &state.config.webhook_urls,
                    WebhookEvent::notification_batch(&payload.uuid, count),
                )
                .await;

            Ok(Json(json!({ "processed": true, "count": count })))
        }
        GuardOutcome::AlreadyProcessed => {
            Ok(Json(json!({ "processed": false, "reason": "already processed" })))
        }
        GuardOutcome::InFlight => Err(AppError::Conflict(
            "a batch with this uuid is already being processed".into(),
        )),
    }
}
