//! Background maintenance: idempotency-key hygiene, event retention, and
//! in-memory sweeps.
//!
//! Runs hourly. Releases in-progress idempotency keys stranded by a crash
//! (so the upstream caller's retry can go through), prunes completed keys
//! past the replay horizon, drops raw ad events past retention, and sweeps
//! the rate-limiter windows and local cache tier.

use std::sync::Arc;
use std::time::Duration;
use tokio::time;

use crate::AppState;

/// In-progress keys older than this are assumed crashed and released.
const STALE_KEY_MINUTES: i32 = 15;
/// Completed keys are kept this long to reject replays.
const DONE_KEY_RETENTION_DAYS: i32 = 30;
/// Raw impression/click rows past this age are dropped; aggregates served
/// by the analytics endpoints only look this far back anyway.
const EVENT_RETENTION_DAYS: i64 = 180;

/// Spawn the background cleanup task. Call this once at startup.
pub fn spawn(state: Arc<AppState>) {
    tokio::spawn(async move {
        let mut interval = time::interval(Duration::from_secs(3600)); // every hour
        loop {
            interval.tick().await;
            if let Err(e) = sweep(&state).await {
                tracing::error!("cleanup job failed: {}", e);
            }
        }
    });
}

async fn sweep(state: &AppState) -> anyhow::Result<()> {
    let released = state.db.release_stale_keys(STALE_KEY_MINUTES).await?;
    if released > 0 {
        tracing::warn!(rows = released, "released stale in-progress idempotency keys");
    }

    let pruned = state.db.prune_done_keys(DONE_KEY_RETENTION_DAYS).await?;
    if pruned > 0 {
        tracing::info!(rows = pruned, "pruned completed idempotency keys");
    }

    let cutoff = chrono::Utc::now() - chrono::Duration::days(EVENT_RETENTION_DAYS);
    let dropped = state.db.prune_events_before(cutoff).await?;
    if dropped > 0 {
        tracing::info!(rows = dropped, "dropped ad events past retention");
    }

    let evicted_windows = state.limiter.evict_stale();
    let evicted_entries = state.cache.evict_expired();
    tracing::debug!(
        evicted_windows,
        evicted_entries,
        "swept limiter windows and local cache"
    );

    Ok(())
}
