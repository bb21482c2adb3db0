//! At-most-once execution guard for webhook-style endpoints.
//!
//! The agent decision callback and the notification dispatch endpoint are
//! delivered by an upstream caller that retries; both tag every request
//! with a UUID. `run_once` executes the guarded action at most once per
//! UUID, backed by a keyed store with an atomic first-writer-wins claim.
//!
//! Failure policy: a key is claimed `in_progress` before the action runs,
//! promoted to `done` only when the action succeeds, and released when it
//! fails so the caller may retry. Keys stranded `in_progress` by a crash
//! are released by the cleanup job after a staleness horizon.

use async_trait::async_trait;
use std::future::Future;
use uuid::Uuid;

use crate::store::postgres::PgStore;

/// Result of claiming a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeginOutcome {
    /// This caller won the claim and must run the action.
    Started,
    /// The key completed earlier; the action must not run again.
    AlreadyProcessed,
    /// Another caller holds the key right now.
    InFlight,
}

#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    async fn try_begin(&self, key: Uuid) -> anyhow::Result<BeginOutcome>;
    async fn mark_done(&self, key: Uuid) -> anyhow::Result<()>;
    async fn release(&self, key: Uuid) -> anyhow::Result<()>;
}

#[async_trait]
impl IdempotencyStore for PgStore {
    async fn try_begin(&self, key: Uuid) -> anyhow::Result<BeginOutcome> {
        match self.try_begin_key(key).await? {
            None => Ok(BeginOutcome::Started),
            Some(Some(status)) if status == "done" => Ok(BeginOutcome::AlreadyProcessed),
            // Lost the race, or the row vanished between the insert and the
            // status read (released by a concurrent failure) — either way
            // someone else owns this delivery attempt.
            Some(_) => Ok(BeginOutcome::InFlight),
        }
    }

    async fn mark_done(&self, key: Uuid) -> anyhow::Result<()> {
        self.mark_key_done(key).await
    }

    async fn release(&self, key: Uuid) -> anyhow::Result<()> {
        self.release_key(key).await
    }
}

/// What happened to a guarded request.
#[derive(Debug)]
pub enum GuardOutcome<T> {
    Executed(T),
    AlreadyProcessed,
    InFlight,
}

/// Execute `action` at most once for `key`.
///
/// Returns `Executed` with the action's value for the winning caller,
/// `AlreadyProcessed` for replays of a completed key, and `InFlight` for
/// concurrent duplicates. If the action fails the key is released and the
/// error is propagated — a later retry with the same UUID will run again.
pub async fn run_once<S, F, Fut, T>(
    store: &S,
    key: Uuid,
    action: F,
) -> anyhow::Result<GuardOutcome<T>>
where
    S: IdempotencyStore + ?Sized,
    F: FnOnce() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    match store.try_begin(key).await? {
        BeginOutcome::AlreadyProcessed => return Ok(GuardOutcome::AlreadyProcessed),
        BeginOutcome::InFlight => return Ok(GuardOutcome::InFlight),
        BeginOutcome::Started => {}
    }

    match action().await {
        Ok(value) => {
            store.mark_done(key).await?;
            Ok(GuardOutcome::Executed(value))
        }
        Err(err) => {
            if let Err(release_err) = store.release(key).await {
                tracing::error!(%key, error = %release_err, "failed to release idempotency key");
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dashmap::DashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Minimal in-memory store with the same claim semantics as the
    /// Postgres table: the DashMap entry is the atomic first-writer-wins.
    #[derive(Default)]
    struct MemoryStore {
        keys: DashMap<Uuid, &'static str>,
    }

    #[async_trait]
    impl IdempotencyStore for MemoryStore {
        async fn try_begin(&self, key: Uuid) -> anyhow::Result<BeginOutcome> {
            match self.keys.entry(key) {
                dashmap::mapref::entry::Entry::Vacant(e) => {
                    e.insert("in_progress");
                    Ok(BeginOutcome::Started)
                }
                dashmap::mapref::entry::Entry::Occupied(e) => {
                    if *e.get() == "done" {
                        Ok(BeginOutcome::AlreadyProcessed)
                    } else {
                        Ok(BeginOutcome::InFlight)
                    }
                }
            }
        }

        async fn mark_done(&self, key: Uuid) -> anyhow::Result<()> {
            self.keys.insert(key, "done");
            Ok(())
        }

        async fn release(&self, key: Uuid) -> anyhow::Result<()> {
            self.keys.remove(&key);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_unseen_uuid_runs_action_exactly_once() {
        let store = MemoryStore::default();
        let calls = AtomicUsize::new(0);
        let key = Uuid::new_v4();

        let outcome = run_once(&store, key, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, anyhow::Error>(42)
        })
        .await
        .unwrap();

        assert!(matches!(outcome, GuardOutcome::Executed(42)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_processed_uuid_short_circuits() {
        let store = MemoryStore::default();
        let calls = AtomicUsize::new(0);
        let key = Uuid::new_v4();

        let run = || {
            run_once(&store, key, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, anyhow::Error>(())
            })
        };

        assert!(matches!(run().await.unwrap(), GuardOutcome::Executed(())));
        assert!(matches!(run().await.unwrap(), GuardOutcome::AlreadyProcessed));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_calls_execute_once() {
        let store = Arc::new(MemoryStore::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let key = Uuid::new_v4();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                run_once(store.as_ref(), key, || async {
                    // widen the race window
                    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, anyhow::Error>(())
                })
                .await
                .unwrap()
            }));
        }

        let mut executed = 0;
        for handle in handles {
            if matches!(handle.await.unwrap(), GuardOutcome::Executed(())) {
                executed += 1;
            }
        }

        assert_eq!(executed, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_action_frees_key_for_retry() {
        let store = MemoryStore::default();
        let attempts = AtomicUsize::new(0);
        let key = Uuid::new_v4();

        let first = run_once(&store, key, || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(anyhow::anyhow!("smtp unreachable"))
        })
        .await;
        assert!(first.is_err());

        let second = run_once(&store, key, || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Ok::<_, anyhow::Error>(())
        })
        .await
        .unwrap();

        assert!(matches!(second, GuardOutcome::Executed(())));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }
}
