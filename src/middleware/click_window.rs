//! Click-fraud lookback window.
//!
//! A click from an IP on a parcel is only credited when the most recent
//! prior click from that IP on that parcel is at least the window length
//! old. Suppressed clicks are still answered with HTTP 200 so the embed
//! script cannot distinguish them — they are simply never persisted.

use chrono::{DateTime, Duration, Utc};

/// Decide whether a click may be credited.
///
/// `last_click` is the newest prior click from the same IP on the same
/// parcel, if any. A click exactly at the window boundary is credited.
pub fn should_credit(
    last_click: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    window_hours: i64,
) -> bool {
    match last_click {
        None => true,
        Some(t) => now - t >= Duration::hours(window_hours),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(base: DateTime<Utc>, minutes: i64) -> DateTime<Utc> {
        base + Duration::minutes(minutes)
    }

    #[test]
    fn test_first_click_is_credited() {
        assert!(should_credit(None, Utc::now(), 24));
    }

    #[test]
    fn test_click_inside_window_is_suppressed() {
        let t = Utc::now();
        // 23h59m later
        assert!(!should_credit(Some(t), at(t, 23 * 60 + 59), 24));
    }

    #[test]
    fn test_click_after_window_is_credited() {
        let t = Utc::now();
        // 24h01m later
        assert!(should_credit(Some(t), at(t, 24 * 60 + 1), 24));
    }

    #[test]
    fn test_click_exactly_at_boundary_is_credited() {
        let t = Utc::now();
        assert!(should_credit(Some(t), at(t, 24 * 60), 24));
    }
}
