//! Error types for GraphQL operations.
//!
//! Three layers:
//!
//! - [`RawFailure`] is what a transport hands back: a protocol error, a
//!   transport error, a timeout, or a cancellation. It carries the message,
//!   any status code, and the chain of underlying causes.
//! - [`ErrorKind`] is the classifier's verdict on a raw failure (see
//!   `classify`), and drives the retry decision.
//! - [`ClientError`] is what callers see. Every variant except `Cancelled`
//!   carries the [`AttemptContext`] of the failing attempt; the rate-limit
//!   adjacent variants also carry the last snapshot probed, if any.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::types::{AttemptContext, RateLimitSnapshot};

/// The phase of a request that ran out of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeoutPhase {
    /// DNS resolution or TCP/TLS connect.
    Connect,
    /// Waiting on the socket after the connection was established.
    Read,
    /// The end-to-end deadline, or a timeout with no phase marker.
    Total,
}

impl fmt::Display for TimeoutPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeoutPhase::Connect => f.write_str("connect"),
            TimeoutPhase::Read => f.write_str("read"),
            TimeoutPhase::Total => f.write_str("total"),
        }
    }
}

/// Classification of a failed attempt, used for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad or missing credentials. Never retried.
    Authentication,
    /// The provider reported rate limiting.
    RateLimit,
    /// The referenced object does not exist (or is not visible).
    NotFound,
    /// HTTP 403 without an explicit rate-limit message.
    Forbidden,
    /// HTTP 5xx.
    ServerError,
    /// The connection was closed underneath the request.
    ConnectionClosed,
    /// A deadline elapsed in the given phase.
    Timeout(TimeoutPhase),
    /// The caller cancelled the operation.
    Cancelled,
    /// Anything else.
    Unknown,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Authentication => f.write_str("authentication"),
            ErrorKind::RateLimit => f.write_str("rate_limit"),
            ErrorKind::NotFound => f.write_str("not_found"),
            ErrorKind::Forbidden => f.write_str("forbidden"),
            ErrorKind::ServerError => f.write_str("server_error"),
            ErrorKind::ConnectionClosed => f.write_str("connection_closed"),
            ErrorKind::Timeout(phase) => write!(f, "timeout_{}", phase),
            ErrorKind::Cancelled => f.write_str("cancelled"),
            ErrorKind::Unknown => f.write_str("unknown"),
        }
    }
}

/// A failure as reported by a transport, before classification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RawFailure {
    /// The server answered, but with an error: a non-2xx response or a
    /// GraphQL `errors` array.
    #[error("{message}")]
    Protocol {
        message: String,
        status_code: Option<u16>,
    },

    /// The request failed below the protocol level.
    #[error("{message}")]
    Transport {
        message: String,
        /// Which layer produced the error, for diagnostics.
        origin: &'static str,
        /// Display strings of the underlying causes, outermost first.
        context: Vec<String>,
    },

    /// A deadline elapsed. `context` holds the cause chain, which is
    /// inspected for connect-phase or read-phase markers.
    #[error("request timed out: {}", .context.join(": "))]
    TimedOut { context: Vec<String> },

    /// The operation was cancelled by the caller.
    #[error("operation cancelled")]
    Cancelled,
}

impl RawFailure {
    /// Creates a protocol failure.
    pub fn protocol(message: impl Into<String>, status_code: Option<u16>) -> Self {
        RawFailure::Protocol {
            message: message.into(),
            status_code,
        }
    }

    /// Creates a transport failure without a cause chain.
    pub fn transport(message: impl Into<String>, origin: &'static str) -> Self {
        RawFailure::Transport {
            message: message.into(),
            origin,
            context: Vec::new(),
        }
    }

    /// Creates a timeout failure from its cause chain.
    pub fn timed_out<I, S>(context: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RawFailure::TimedOut {
            context: context.into_iter().map(Into::into).collect(),
        }
    }

    /// The status code reported by the server, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            RawFailure::Protocol { status_code, .. } => *status_code,
            _ => None,
        }
    }

    /// The cause chain, outermost first. Empty for protocol failures.
    pub fn context(&self) -> &[String] {
        match self {
            RawFailure::Transport { context, .. } | RawFailure::TimedOut { context } => context,
            RawFailure::Protocol { .. } | RawFailure::Cancelled => &[],
        }
    }

    /// Short name of the failure's shape, used in logs.
    pub fn origin(&self) -> &'static str {
        match self {
            RawFailure::Protocol { .. } => "protocol",
            RawFailure::Transport { origin, .. } => origin,
            RawFailure::TimedOut { .. } => "timeout",
            RawFailure::Cancelled => "cancellation",
        }
    }

    /// Converts an octocrab error, walking its source chain.
    ///
    /// GitHub API errors keep their HTTP status. An `io::ErrorKind::TimedOut`
    /// anywhere in the chain (which is how the connector's connect and read
    /// timeouts surface) makes the result a `TimedOut` so the classifier can
    /// pick the phase from the chain. Octocrab appends a captured backtrace
    /// to its display text; that is cut off before anything is stored.
    pub fn from_octocrab(err: octocrab::Error) -> Self {
        if let octocrab::Error::GitHub { source, .. } = &err {
            return RawFailure::Protocol {
                message: source.message.clone(),
                status_code: Some(source.status_code.as_u16()),
            };
        }

        let mut context = Vec::new();
        let mut timed_out = false;
        let mut current: Option<&(dyn std::error::Error + 'static)> = Some(&err);
        while let Some(cause) = current {
            context.push(without_backtrace(&cause.to_string()).to_string());
            if let Some(io) = cause.downcast_ref::<std::io::Error>()
                && io.kind() == std::io::ErrorKind::TimedOut
            {
                timed_out = true;
            }
            current = cause.source();
        }

        if timed_out {
            return RawFailure::TimedOut { context };
        }

        RawFailure::Transport {
            message: context.first().cloned().unwrap_or_default(),
            origin: "octocrab",
            context,
        }
    }
}

/// Cuts a snafu `Found at <backtrace>` trailer off an error's display text.
fn without_backtrace(text: &str) -> &str {
    match text.find("\nFound at ") {
        Some(index) => text[..index].trim_end(),
        None => text,
    }
}

/// An error returned to callers of the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Credentials were rejected. Never retried.
    #[error("authentication failed ({context}): {message}")]
    Authentication {
        message: String,
        context: AttemptContext,
    },

    /// Still rate limited when attempts ran out.
    #[error("rate limit exceeded ({context}): {message}{}", snapshot_suffix(.snapshot))]
    RateLimit {
        message: String,
        snapshot: Option<RateLimitSnapshot>,
        context: AttemptContext,
    },

    /// The referenced object was not found. Raised on first occurrence so a
    /// higher layer can retry with fresh identifiers.
    #[error("not found ({context}): {message}")]
    NotFound {
        message: String,
        context: AttemptContext,
    },

    /// HTTP 403 persisted after backoff.
    #[error("forbidden ({context}): {message}{}", snapshot_suffix(.snapshot))]
    Forbidden {
        message: String,
        snapshot: Option<RateLimitSnapshot>,
        context: AttemptContext,
    },

    /// HTTP 5xx persisted after backoff.
    #[error("server error{} ({context}): {message}{}", status_suffix(.status_code), snapshot_suffix(.snapshot))]
    Server {
        message: String,
        status_code: Option<u16>,
        snapshot: Option<RateLimitSnapshot>,
        context: AttemptContext,
    },

    /// The connection kept closing until attempts ran out.
    #[error("connection closed ({context}): {message}")]
    Connection {
        message: String,
        context: AttemptContext,
    },

    /// A deadline elapsed. Connect timeouts are retried first; read and
    /// total timeouts are raised immediately.
    #[error("{phase} timeout of {}s exceeded ({context}): {message}", .limit.as_secs_f64())]
    Timeout {
        phase: TimeoutPhase,
        limit: Duration,
        message: String,
        context: AttemptContext,
    },

    /// The operation was cancelled. Always passed through unchanged.
    #[error("operation cancelled")]
    Cancelled,

    /// A failure the classifier did not recognise.
    #[error("unexpected {origin} error ({context}): {message}")]
    Unknown {
        message: String,
        origin: &'static str,
        context: AttemptContext,
    },

    /// The retry loop ended without a result or a classified error.
    #[error("retries exhausted after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    /// A successful response did not match the requested type.
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ClientError {
    /// The classification this error was raised for.
    ///
    /// `RetriesExhausted` and `Decode` have no classifier counterpart and
    /// report `Unknown`.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Authentication { .. } => ErrorKind::Authentication,
            ClientError::RateLimit { .. } => ErrorKind::RateLimit,
            ClientError::NotFound { .. } => ErrorKind::NotFound,
            ClientError::Forbidden { .. } => ErrorKind::Forbidden,
            ClientError::Server { .. } => ErrorKind::ServerError,
            ClientError::Connection { .. } => ErrorKind::ConnectionClosed,
            ClientError::Timeout { phase, .. } => ErrorKind::Timeout(*phase),
            ClientError::Cancelled => ErrorKind::Cancelled,
            ClientError::Unknown { .. }
            | ClientError::RetriesExhausted { .. }
            | ClientError::Decode(_) => ErrorKind::Unknown,
        }
    }

    /// Returns true if the client retries this kind of failure internally.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::RateLimit
                | ErrorKind::Forbidden
                | ErrorKind::ServerError
                | ErrorKind::ConnectionClosed
                | ErrorKind::Timeout(TimeoutPhase::Connect)
        )
    }

    /// Returns true if this is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ClientError::Cancelled)
    }

    /// The attempt context of the failing attempt, if the error carries one.
    pub fn attempt_context(&self) -> Option<&AttemptContext> {
        match self {
            ClientError::Authentication { context, .. }
            | ClientError::RateLimit { context, .. }
            | ClientError::NotFound { context, .. }
            | ClientError::Forbidden { context, .. }
            | ClientError::Server { context, .. }
            | ClientError::Connection { context, .. }
            | ClientError::Timeout { context, .. }
            | ClientError::Unknown { context, .. } => Some(context),
            ClientError::Cancelled
            | ClientError::RetriesExhausted { .. }
            | ClientError::Decode(_) => None,
        }
    }

    /// The last rate-limit snapshot attached to the error, if any.
    pub fn rate_limit_snapshot(&self) -> Option<&RateLimitSnapshot> {
        match self {
            ClientError::RateLimit { snapshot, .. }
            | ClientError::Forbidden { snapshot, .. }
            | ClientError::Server { snapshot, .. } => snapshot.as_ref(),
            _ => None,
        }
    }
}

fn snapshot_suffix(snapshot: &Option<RateLimitSnapshot>) -> String {
    match snapshot {
        Some(snap) => format!(" [rate limit: {}]", snap),
        None => String::new(),
    }
}

fn status_suffix(status_code: &Option<u16>) -> String {
    match status_code {
        Some(code) => format!(" (HTTP {})", code),
        None => String::new(),
    }
}
