//! The retry pipeline behind `GraphqlClient::execute`.
//!
//! Each attempt ensures a connection, sends the operation under the total
//! deadline, and on failure asks the classifier what happened. The kind
//! decides what comes next:
//!
//! | Kind                  | Action                                              |
//! |-----------------------|-----------------------------------------------------|
//! | Authentication        | raise                                               |
//! | RateLimit             | probe, wait for reset + buffer, retry               |
//! | NotFound              | raise (logged quietly)                              |
//! | Forbidden             | probe; exhausted window is a rate limit, else backoff |
//! | ServerError           | backoff, retry                                      |
//! | ConnectionClosed      | close, fixed delay, retry                           |
//! | Timeout (connect)     | close, backoff, retry                               |
//! | Timeout (read, total) | close, raise                                        |
//! | Cancelled             | raise unchanged                                     |
//! | Unknown               | raise (logged with full context)                    |
//!
//! Retried kinds raise instead once the final attempt has failed.
//!
//! The backoff exponent counts backoff sleeps already taken for this
//! operation. Rate-limit waits do not advance it.

use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::types::{AttemptContext, Operation, RateLimitSnapshot};

use super::classify::{classify, extract_status_code};
use super::client::GraphqlClient;
use super::error::{ClientError, ErrorKind, RawFailure, TimeoutPhase};
use super::rate_limit::{compute_wait, parse_rate_limit, probe_operation};
use super::retry::CONNECTION_CLOSED_DELAY;
use super::transport::{Connector, Transport};

/// Per-operation retry bookkeeping.
#[derive(Debug, Default)]
struct RetryState {
    /// Backoff sleeps taken so far.
    backoff_step: u32,
    /// Most recent successful probe.
    last_snapshot: Option<RateLimitSnapshot>,
}

impl<C: Connector> GraphqlClient<C> {
    /// Executes one operation through the retry pipeline.
    pub async fn execute_operation(&self, operation: &Operation) -> Result<Value, ClientError> {
        let max_attempts = self.config.max_attempts();
        let mut state = RetryState::default();
        let mut backoff_elapsed = Duration::ZERO;

        for attempt in 0..max_attempts {
            let context = AttemptContext {
                attempt,
                max_attempts,
                backoff_elapsed,
            };
            self.metrics.record_request();
            if attempt > 0 {
                self.metrics.record_retry();
            }

            let failure = match self.round_trip(operation).await {
                Ok(data) => {
                    if attempt > 0 {
                        debug!(
                            attempt = context.attempts_made(),
                            max_attempts, "GraphQL operation succeeded after retry"
                        );
                    }
                    return Ok(data);
                }
                Err(failure) => failure,
            };

            let kind = classify(&failure);
            let delay = self.next_delay(kind, failure, context, &mut state).await?;

            self.pause(delay).await?;
            backoff_elapsed += delay;
        }

        warn!(max_attempts, "GraphQL retry loop ended without a result");
        Err(ClientError::RetriesExhausted {
            attempts: max_attempts,
        })
    }

    /// Decides what to do about a failed attempt: sleep for the returned
    /// delay and retry, or raise.
    async fn next_delay(
        &self,
        kind: ErrorKind,
        failure: RawFailure,
        context: AttemptContext,
        state: &mut RetryState,
    ) -> Result<Duration, ClientError> {
        match kind {
            ErrorKind::Cancelled => {
                debug!(
                    attempt = context.attempts_made(),
                    "GraphQL operation cancelled"
                );
                Err(ClientError::Cancelled)
            }

            ErrorKind::Authentication => {
                error!(
                    attempt = context.attempts_made(),
                    status_code = failure.status_code(),
                    error = %failure,
                    "GitHub rejected the credentials"
                );
                Err(self.client_error(kind, failure, context, None))
            }

            ErrorKind::NotFound => {
                info!(error = %failure, "GraphQL object not found");
                Err(self.client_error(kind, failure, context, None))
            }

            ErrorKind::RateLimit => {
                let snapshot = self.probe_for_retry(state).await?;
                if context.is_last() {
                    return Err(self.exhausted(kind, failure, context, snapshot));
                }
                Ok(match snapshot {
                    Some(snapshot) => self.rate_limit_wait(&snapshot),
                    None => self.backoff(kind, &failure, context, state),
                })
            }

            ErrorKind::Forbidden => match self.probe_for_retry(state).await? {
                Some(snapshot) if snapshot.is_exhausted() => {
                    if context.is_last() {
                        return Err(self.exhausted(
                            ErrorKind::RateLimit,
                            failure,
                            context,
                            Some(snapshot),
                        ));
                    }
                    Ok(self.rate_limit_wait(&snapshot))
                }
                _ => {
                    if context.is_last() {
                        let snapshot = state.last_snapshot;
                        return Err(self.exhausted(kind, failure, context, snapshot));
                    }
                    Ok(self.backoff(kind, &failure, context, state))
                }
            },

            ErrorKind::ServerError => {
                if context.is_last() {
                    let snapshot = state.last_snapshot;
                    return Err(self.exhausted(kind, failure, context, snapshot));
                }
                Ok(self.backoff(kind, &failure, context, state))
            }

            ErrorKind::ConnectionClosed => {
                self.force_close().await;
                if context.is_last() {
                    return Err(self.exhausted(kind, failure, context, None));
                }
                Ok(self.retrying(kind, &failure, context, CONNECTION_CLOSED_DELAY))
            }

            ErrorKind::Timeout(TimeoutPhase::Connect) => {
                self.force_close().await;
                if context.is_last() {
                    return Err(self.exhausted(kind, failure, context, None));
                }
                Ok(self.backoff(kind, &failure, context, state))
            }

            ErrorKind::Timeout(phase) => {
                self.force_close().await;
                warn!(
                    attempt = context.attempts_made(),
                    phase = %phase,
                    limit_secs = self.timeout_limit(phase).as_secs_f64(),
                    error = %failure,
                    "GraphQL request timed out, not retrying"
                );
                Err(self.client_error(kind, failure, context, None))
            }

            ErrorKind::Unknown => {
                error!(
                    attempt = context.attempts_made(),
                    origin = failure.origin(),
                    status_code = failure.status_code(),
                    causes = ?failure.context(),
                    error = %failure,
                    "Unexpected GraphQL failure"
                );
                Err(self.client_error(kind, failure, context, None))
            }
        }
    }

    /// Logs a retry and returns its delay.
    fn retrying(
        &self,
        kind: ErrorKind,
        failure: &RawFailure,
        context: AttemptContext,
        delay: Duration,
    ) -> Duration {
        warn!(
            attempt = context.attempts_made(),
            max_attempts = context.max_attempts,
            kind = %kind,
            status_code = failure.status_code(),
            delay_ms = delay.as_millis() as u64,
            error = %failure,
            "Retrying GraphQL operation"
        );
        delay
    }

    /// Takes the next backoff step.
    fn backoff(
        &self,
        kind: ErrorKind,
        failure: &RawFailure,
        context: AttemptContext,
        state: &mut RetryState,
    ) -> Duration {
        let delay = self.backoff.jittered_delay(state.backoff_step);
        state.backoff_step += 1;
        self.retrying(kind, failure, context, delay)
    }

    fn rate_limit_wait(&self, snapshot: &RateLimitSnapshot) -> Duration {
        let wait = compute_wait(snapshot, Utc::now());
        self.metrics.record_rate_limit_wait();
        info!(
            remaining = snapshot.remaining,
            limit = snapshot.limit,
            reset_at = %snapshot.reset_at,
            delay_ms = wait.as_millis() as u64,
            "Rate limited, waiting for window reset"
        );
        wait
    }

    /// Builds the error for a retried kind that ran out of attempts.
    fn exhausted(
        &self,
        kind: ErrorKind,
        failure: RawFailure,
        context: AttemptContext,
        snapshot: Option<RateLimitSnapshot>,
    ) -> ClientError {
        warn!(
            attempts = context.attempts_made(),
            kind = %kind,
            status_code = failure.status_code(),
            error = %failure,
            "GraphQL operation failed on final attempt"
        );
        self.client_error(kind, failure, context, snapshot)
    }

    /// Best-effort probe used while handling rate limits and 403s.
    ///
    /// Only cancellation escapes; any other probe failure yields `None`.
    async fn probe_for_retry(
        &self,
        state: &mut RetryState,
    ) -> Result<Option<RateLimitSnapshot>, ClientError> {
        match self.fetch_rate_limit().await {
            Ok(snapshot) => {
                state.last_snapshot = Some(snapshot);
                Ok(Some(snapshot))
            }
            Err(RawFailure::Cancelled) => Err(ClientError::Cancelled),
            Err(failure) => {
                debug!(error = %failure, "Rate limit probe failed, continuing without snapshot");
                Ok(None)
            }
        }
    }

    /// Sends the rate-limit probe on the live connection.
    pub(super) async fn fetch_rate_limit(&self) -> Result<RateLimitSnapshot, RawFailure> {
        let data = self.round_trip(&probe_operation()).await?;
        parse_rate_limit(data)
    }

    /// One network round trip: connect if needed, take an in-flight slot,
    /// and send under the total deadline. Races the cancellation token.
    async fn round_trip(&self, operation: &Operation) -> Result<Value, RawFailure> {
        let call = async {
            let transport = self.connection.ensure(&self.config).await?;
            let _permit = self.connection.permit().await?;
            let deadline = self.config.total_timeout;
            match tokio::time::timeout(deadline, transport.execute(operation)).await {
                Ok(result) => result,
                Err(_) => Err(RawFailure::timed_out([format!(
                    "deadline of {}s elapsed",
                    deadline.as_secs_f64()
                )])),
            }
        };

        tokio::select! {
            biased;

            _ = self.cancel.cancelled() => Err(RawFailure::Cancelled),
            result = call => result,
        }
    }

    /// Sleeps for `delay` unless cancelled first.
    async fn pause(&self, delay: Duration) -> Result<(), ClientError> {
        tokio::select! {
            biased;

            _ = self.cancel.cancelled() => {
                debug!("GraphQL retry sleep cancelled");
                Err(ClientError::Cancelled)
            }
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }

    /// Drops the connection so the next attempt builds a fresh one.
    async fn force_close(&self) {
        self.metrics.record_reconnect();
        self.connection.close().await;
    }

    fn timeout_limit(&self, phase: TimeoutPhase) -> Duration {
        match phase {
            TimeoutPhase::Connect => self.config.connect_timeout,
            TimeoutPhase::Read => self.config.read_timeout,
            TimeoutPhase::Total => self.config.total_timeout,
        }
    }

    /// Wraps a classified failure in the caller-facing error.
    pub(super) fn client_error(
        &self,
        kind: ErrorKind,
        failure: RawFailure,
        context: AttemptContext,
        snapshot: Option<RateLimitSnapshot>,
    ) -> ClientError {
        let status_code = failure.status_code();
        let origin = failure.origin();
        let message = failure.to_string();

        match kind {
            ErrorKind::Authentication => ClientError::Authentication { message, context },
            ErrorKind::RateLimit => ClientError::RateLimit {
                message,
                snapshot,
                context,
            },
            ErrorKind::NotFound => ClientError::NotFound { message, context },
            ErrorKind::Forbidden => ClientError::Forbidden {
                message,
                snapshot,
                context,
            },
            ErrorKind::ServerError => ClientError::Server {
                status_code: status_code.or_else(|| extract_status_code(&message)),
                message,
                snapshot,
                context,
            },
            ErrorKind::ConnectionClosed => ClientError::Connection { message, context },
            ErrorKind::Timeout(phase) => ClientError::Timeout {
                phase,
                limit: self.timeout_limit(phase),
                message,
                context,
            },
            ErrorKind::Cancelled => ClientError::Cancelled,
            ErrorKind::Unknown => ClientError::Unknown {
                message,
                origin,
                context,
            },
        }
    }
}
