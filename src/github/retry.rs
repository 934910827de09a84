//! Exponential backoff with jitter.
//!
//! The delay before a retry is `base_delay * multiplier^step + jitter`, where
//! `step` counts the backoff sleeps already taken for the operation and
//! `jitter` is drawn uniformly from `[0, max_jitter)`. With the defaults this
//! is `2^step + uniform(0, 1)` seconds: roughly 1s, 2s, 4s, ...
//!
//! Jitter keeps many operations that failed together from retrying together.

use std::time::Duration;

use rand::Rng;

/// Fixed pause after the server closed the connection, before reconnecting.
pub const CONNECTION_CLOSED_DELAY: Duration = Duration::from_secs(1);

/// Backoff schedule for retried attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first retry, without jitter.
    pub base_delay: Duration,

    /// Growth factor per step (typically 2.0).
    pub multiplier: f64,

    /// Upper bound (exclusive) of the uniform jitter added to each delay.
    pub max_jitter: Duration,

    /// Cap on the un-jittered delay.
    pub max_delay: Duration,
}

impl BackoffPolicy {
    /// `2^step` seconds plus up to one second of jitter, capped at five minutes.
    pub const DEFAULT: Self = Self {
        base_delay: Duration::from_secs(1),
        multiplier: 2.0,
        max_jitter: Duration::from_secs(1),
        max_delay: Duration::from_secs(300),
    };

    /// Computes the delay for the given backoff step (0-indexed), without jitter.
    pub fn delay_for_step(&self, step: u32) -> Duration {
        let exponent = i32::try_from(step).unwrap_or(i32::MAX);
        let delay_secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped_secs = delay_secs.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped_secs)
    }

    /// Computes the delay for the given step with jitter drawn from `rng`.
    pub fn jittered_delay_with<R: Rng + ?Sized>(&self, step: u32, rng: &mut R) -> Duration {
        let jitter = if self.max_jitter.is_zero() {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(rng.gen_range(0.0..self.max_jitter.as_secs_f64()))
        };
        self.delay_for_step(step) + jitter
    }

    /// Computes the delay for the given step with thread-local jitter.
    pub fn jittered_delay(&self, step: u32) -> Duration {
        self.jittered_delay_with(step, &mut rand::thread_rng())
    }

    /// Returns an iterator over the un-jittered delays for `steps` retries.
    pub fn delays(&self, steps: u32) -> impl Iterator<Item = Duration> + '_ {
        (0..steps).map(|step| self.delay_for_step(step))
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::DEFAULT
    }
}
