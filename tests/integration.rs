//! Integration tests for the idempotency guard, the click de-duplication
//! window, and the per-IP rate limiter.
//!
//! The guard is exercised through the `IdempotencyStore` trait against an
//! in-memory store with the same claim semantics as the Postgres table
//! (atomic first-writer-wins on the key). Tests that need a live Postgres
//! and Redis live in the handlers and are covered separately.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use adparcel_gateway::middleware::idempotency::{
    run_once, BeginOutcome, GuardOutcome, IdempotencyStore,
};

/// In-memory double for the idempotency_keys table.
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

mod guard {
    use super::*;

    /// Property 1: an unseen UUID executes the action exactly once.
    #[tokio::test]
    async fn unseen_uuid_executes_once() {
        let store = MemoryStore::default();
        let calls = AtomicUsize::new(0);
        let key = Uuid::new_v4();

        let outcome = run_once(&store, key, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, anyhow::Error>("dispatched")
        })
        .await
        .unwrap();

        assert!(matches!(outcome, GuardOutcome::Executed("dispatched")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    /// Property 2: a completed UUID short-circuits without re-running.
    #[tokio::test]
    async fn completed_uuid_does_not_rerun() {
        let store = MemoryStore::default();
        let calls = AtomicUsize::new(0);
        let key = Uuid::new_v4();

        for expected_executed in [true, false] {
            let outcome = run_once(&store, key, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, anyhow::Error>(())
            })
            .await
            .unwrap();
            match outcome {
                GuardOutcome::Executed(()) => assert!(expected_executed),
                GuardOutcome::AlreadyProcessed => assert!(!expected_executed),
                GuardOutcome::InFlight => panic!("no concurrency in this test"),
            }
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    /// Property 3: N concurrent calls with the same new UUID run the
    /// action once; the losers observe InFlight or AlreadyProcessed.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_duplicates_execute_once() {
        let store = Arc::new(MemoryStore::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let key = Uuid::new_v4();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                run_once(store.as_ref(), key, || async {
                    tokio::time::sleep(std::time::Duration::from_millis(25)).await;
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

        assert_eq!(executed, 1, "exactly one concurrent caller may execute");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    /// Documented failure policy: a failed action releases the key so a
    /// retry with the same UUID can run.
    #[tokio::test]
    async fn failure_releases_key() {
        let store = MemoryStore::default();
        let key = Uuid::new_v4();

        let failed = run_once(&store, key, || async {
            Err::<(), _>(anyhow::anyhow!("upstream down"))
        })
        .await;
        assert!(failed.is_err());

        let retried = run_once(&store, key, || async { Ok::<_, anyhow::Error>(()) })
            .await
            .unwrap();
        assert!(matches!(retried, GuardOutcome::Executed(())));
    }
}

mod click_window {
    use adparcel_gateway::middleware::click_window::should_credit;
    use chrono::{Duration, Utc};

    /// Property 4: a repeat click at T+23h59m is suppressed, at T+24h01m
    /// it is credited.
    #[test]
    fn window_boundaries() {
        let first = Utc::now();
        let just_inside = first + Duration::hours(23) + Duration::minutes(59);
        let just_outside = first + Duration::hours(24) + Duration::minutes(1);

        assert!(!should_credit(Some(first), just_inside, 24));
        assert!(should_credit(Some(first), just_outside, 24));
    }

    #[test]
    fn first_click_always_credits() {
        assert!(should_credit(None, Utc::now(), 24));
    }

    /// Property 5: outside production the window check is not consulted at
    /// all — enforcement hangs off the environment flag.
    #[test]
    fn development_mode_bypasses_window() {
        use adparcel_gateway::config::{Config, Environment};

        let cfg = Config {
            port: 8080,
            database_url: String::new(),
            redis_url: String::new(),
            environment: Environment::Development,
            admin_key: String::new(),
            webhook_secret: String::new(),
            webhook_urls: vec![],
            rate_limit: 10,
            rate_limit_window_secs: 1,
            click_window_hours: 24,
            dashboard_origin: String::new(),
            rpc_url: None,
            registry_address: None,
            signer_key: None,
            pinata_jwt: None,
            ipfs_gateway: String::new(),
            aws_access_key_id: None,
            aws_secret_access_key: None,
            aws_region: String::new(),
            moderation_min_confidence: 80.0,
            smtp_host: None,
            smtp_username: None,
            smtp_password: None,
            smtp_from: None,
        };
        assert!(!cfg.enforce_click_window());

        let prod = Config {
            environment: Environment::Production,
            ..cfg
        };
        assert!(prod.enforce_click_window());
    }
}

mod rate_limit {
    use adparcel_gateway::middleware::rate_limit::FixedWindowLimiter;
    use std::net::IpAddr;
    use std::time::{Duration, Instant};

    /// Property 6: the 11th request from one IP inside one second is
    /// rejected.
    #[test]
    fn eleventh_request_within_a_second_is_rejected() {
        let limiter = FixedWindowLimiter::new(10, Duration::from_secs(1));
        let ip: IpAddr = "203.0.113.9".parse().unwrap();
        let now = Instant::now();

        for i in 0..10 {
            assert!(limiter.check_at(ip, now), "request {} should pass", i + 1);
        }
        assert!(!limiter.check_at(ip, now), "11th request must be rejected");

        // other IPs are unaffected
        let other: IpAddr = "203.0.113.10".parse().unwrap();
        assert!(limiter.check_at(other, now));
    }

    #[test]
    fn budget_resets_after_window() {
        let limiter = FixedWindowLimiter::new(10, Duration::from_secs(1));
        let ip: IpAddr = "203.0.113.9".parse().unwrap();
        let now = Instant::now();

        for _ in 0..11 {
            limiter.check_at(ip, now);
        }
        assert!(limiter.check_at(ip, now + Duration::from_millis(1001)));
    }
}
