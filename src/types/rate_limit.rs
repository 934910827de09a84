//! Rate-limit snapshot as reported by the GraphQL `rateLimit` field.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Extra wait added on top of the time remaining until the window resets.
pub const RESET_BUFFER: Duration = Duration::from_secs(5);

/// Point-in-time view of the provider's rate-limit window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitSnapshot {
    /// Points available per window.
    pub limit: u64,

    /// Points left in the current window.
    pub remaining: u64,

    /// When the window refreshes.
    pub reset_at: DateTime<Utc>,

    /// Cost of the query that produced this snapshot.
    pub cost: u64,
}

impl RateLimitSnapshot {
    /// Returns true if no points remain in the current window.
    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    /// Time to wait before the window has refreshed, measured from `now`.
    ///
    /// This is `max(0, reset_at - now) + RESET_BUFFER`, so a window that has
    /// already reset still yields the buffer.
    pub fn wait_until_reset(&self, now: DateTime<Utc>) -> Duration {
        let until_reset = (self.reset_at - now).to_std().unwrap_or(Duration::ZERO);
        until_reset + RESET_BUFFER
    }
}

impl fmt::Display for RateLimitSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} remaining (cost {}), resets at {}",
            self.remaining,
            self.limit,
            self.cost,
            self.reset_at.to_rfc3339()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use proptest::prelude::*;

    fn snapshot(reset_at: DateTime<Utc>) -> RateLimitSnapshot {
        RateLimitSnapshot {
            limit: 5000,
            remaining: 0,
            reset_at,
            cost: 1,
        }
    }

    #[test]
    fn wait_adds_buffer_to_time_until_reset() {
        let now = Utc::now();
        let snap = snapshot(now + ChronoDuration::seconds(10));

        assert_eq!(snap.wait_until_reset(now), Duration::from_secs(15));
    }

    #[test]
    fn past_reset_waits_only_for_buffer() {
        let now = Utc::now();
        let snap = snapshot(now - ChronoDuration::seconds(30));

        assert_eq!(snap.wait_until_reset(now), RESET_BUFFER);
    }

    #[test]
    fn deserializes_graphql_field_names() {
        let snap: RateLimitSnapshot = serde_json::from_value(serde_json::json!({
            "limit": 5000,
            "remaining": 4999,
            "resetAt": "2026-01-15T12:00:00Z",
            "cost": 1,
        }))
        .unwrap();

        assert_eq!(snap.limit, 5000);
        assert_eq!(snap.remaining, 4999);
        assert!(!snap.is_exhausted());
        assert_eq!(snap.reset_at.to_rfc3339(), "2026-01-15T12:00:00+00:00");
    }

    proptest! {
        #[test]
        fn wait_is_never_below_buffer(offset_secs in -100_000i64..100_000) {
            let now = Utc::now();
            let snap = snapshot(now + ChronoDuration::seconds(offset_secs));

            let wait = snap.wait_until_reset(now);

            prop_assert!(wait >= RESET_BUFFER);
            if offset_secs > 0 {
                prop_assert_eq!(wait, Duration::from_secs(offset_secs as u64) + RESET_BUFFER);
            }
        }
    }
}
