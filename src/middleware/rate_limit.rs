//! In-process per-IP rate limiter.
//!
//! A fixed window per client IP: the first request in a window stamps the
//! window start, every request increments the counter, and requests past
//! the budget are rejected until the window rolls over. Stale windows are
//! swept by the cleanup job.

use dashmap::DashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

#[derive(Clone, Copy)]
struct Window {
    started_at: Instant,
    count: u32,
}

pub struct FixedWindowLimiter {
    max_requests: u32,
    window: Duration,
    windows: DashMap<IpAddr, Window>,
}

impl FixedWindowLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            windows: DashMap::new(),
        }
    }

    /// Account one request from `ip`. Returns false when the budget for the
    /// current window is exhausted.
    pub fn check(&self, ip: IpAddr) -> bool {
        self.check_at(ip, Instant::now())
    }

    /// Same as `check` with an injected clock, for tests.
    pub fn check_at(&self, ip: IpAddr, now: Instant) -> bool {
        let mut entry = self.windows.entry(ip).or_insert(Window {
            started_at: now,
            count: 0,
        });
        let w = entry.value_mut();

        if now.duration_since(w.started_at) >= self.window {
            w.started_at = now;
            w.count = 0;
        }

        w.count += 1;
        w.count <= self.max_requests
    }

    /// Drop windows that have been idle for at least two window lengths.
    /// Returns the number of evicted entries.
    pub fn evict_stale(&self) -> usize {
        let now = Instant::now();
        let horizon = self.window * 2;
        let before = self.windows.len();
        self.windows
            .retain(|_, w| now.duration_since(w.started_at) < horizon);
        before - self.windows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(last: u8) -> IpAddr {
        IpAddr::from([10, 0, 0, last])
    }

    #[test]
    fn test_eleventh_request_in_window_is_rejected() {
        let limiter = FixedWindowLimiter::new(10, Duration::from_secs(1));
        let now = Instant::now();
        for _ in 0..10 {
            assert!(limiter.check_at(ip(1), now));
        }
        assert!(!limiter.check_at(ip(1), now));
    }

    #[test]
    fn test_window_rollover_resets_budget() {
        let limiter = FixedWindowLimiter::new(10, Duration::from_secs(1));
        let now = Instant::now();
        for _ in 0..11 {
            limiter.check_at(ip(1), now);
        }
        assert!(!limiter.check_at(ip(1), now));
        assert!(limiter.check_at(ip(1), now + Duration::from_secs(1)));
    }

    #[test]
    fn test_ips_are_limited_independently() {
        let limiter = FixedWindowLimiter::new(1, Duration::from_secs(1));
        let now = Instant::now();
        assert!(limiter.check_at(ip(1), now));
        assert!(!limiter.check_at(ip(1), now));
        assert!(limiter.check_at(ip(2), now));
    }

    #[test]
    fn test_evict_stale_drops_idle_windows() {
        let limiter = FixedWindowLimiter::new(10, Duration::from_nanos(1));
        limiter.check(ip(1));
        std::thread::sleep(Duration::from_millis(2));
        assert_eq!(limiter.evict_stale(), 1);
    }
}
