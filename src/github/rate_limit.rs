//! Rate-limit probe.
//!
//! The probe is a fixed, minimal query sent straight to the live transport.
//! It never goes through the retry pipeline: a probe issued while handling a
//! rate-limit failure must not itself be retried on rate limiting.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::types::{Operation, RateLimitSnapshot};

use super::error::RawFailure;

/// The probe document.
pub const RATE_LIMIT_QUERY: &str = "query { rateLimit { limit remaining resetAt cost } }";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RateLimitData {
    rate_limit: Option<RateLimitSnapshot>,
}

/// The probe operation.
pub(crate) fn probe_operation() -> Operation {
    Operation::new(RATE_LIMIT_QUERY)
}

/// Extracts the snapshot from the probe's `data` value.
pub(crate) fn parse_rate_limit(data: Value) -> Result<RateLimitSnapshot, RawFailure> {
    let parsed: RateLimitData = serde_json::from_value(data).map_err(|e| {
        RawFailure::protocol(format!("malformed rateLimit response: {}", e), None)
    })?;
    parsed
        .rate_limit
        .ok_or_else(|| RawFailure::protocol("rateLimit missing from response", None))
}

/// How long to sleep before the window has refreshed, measured from `now`.
///
/// Always includes the reset buffer, so it is never zero.
pub fn compute_wait(snapshot: &RateLimitSnapshot, now: DateTime<Utc>) -> Duration {
    snapshot.wait_until_reset(now)
}
