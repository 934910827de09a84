//! Per-operation attempt bookkeeping carried on errors and logs.

use std::fmt;
use std::time::Duration;

/// Where an operation stood when it failed.
///
/// Not persisted; it exists so errors and log lines can say how far the
/// retry loop got and how long it spent sleeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AttemptContext {
    /// Zero-based index of the attempt that produced the failure.
    pub attempt: u32,

    /// Total attempts the client is configured to make.
    pub max_attempts: u32,

    /// Time spent in backoff and rate-limit sleeps before this attempt.
    pub backoff_elapsed: Duration,
}

impl AttemptContext {
    /// Context for the first attempt, before any sleep.
    pub fn first(max_attempts: u32) -> Self {
        AttemptContext {
            attempt: 0,
            max_attempts,
            backoff_elapsed: Duration::ZERO,
        }
    }

    /// Returns true if no further attempt will be made after this one.
    pub fn is_last(&self) -> bool {
        self.attempt + 1 >= self.max_attempts
    }

    /// Number of attempts made so far, including this one.
    pub fn attempts_made(&self) -> u32 {
        self.attempt + 1
    }
}

impl fmt::Display for AttemptContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "attempt {}/{} after {:.1}s of backoff",
            self.attempts_made(),
            self.max_attempts,
            self.backoff_elapsed.as_secs_f64()
        )
    }
}
