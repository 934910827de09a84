//! Failure classification.
//!
//! [`classify`] is the single place where raw failures are mapped to an
//! [`ErrorKind`]. Most of it is substring matching on provider error text,
//! which is brittle but is what downstream retry logic keys off. Changing a
//! marker changes which failures are retried, so the markers are kept literal
//! and covered by tests.
//!
//! Precedence, first match wins:
//!
//! 1. Cancellation
//! 2. Timeouts (phase from connect/read markers in the cause chain)
//! 3. Authentication markers (or HTTP 401)
//! 4. Rate-limit markers
//! 5. Not-found markers
//! 6. HTTP 403, then HTTP 5xx (structured status, else parsed from the
//!    protocol message; transport text is never scanned for a status)
//! 7. Connection-closed markers
//! 8. Unknown

use super::error::{ErrorKind, RawFailure, TimeoutPhase};

/// Maps a raw failure to its kind.
pub fn classify(failure: &RawFailure) -> ErrorKind {
    match failure {
        RawFailure::Cancelled => ErrorKind::Cancelled,
        RawFailure::TimedOut { context } => ErrorKind::Timeout(timeout_phase(context)),
        RawFailure::Protocol {
            message,
            status_code,
        } => classify_message(
            message,
            status_code.or_else(|| extract_status_code(message)),
            &[],
        ),
        RawFailure::Transport {
            message, context, ..
        } => classify_message(message, None, context),
    }
}

fn classify_message(message: &str, status: Option<u16>, context: &[String]) -> ErrorKind {
    let message_lower = message.to_lowercase();

    if status == Some(401) || is_authentication_error(&message_lower) {
        return ErrorKind::Authentication;
    }
    if is_rate_limit_error(&message_lower) {
        return ErrorKind::RateLimit;
    }
    if is_not_found_error(&message_lower) {
        return ErrorKind::NotFound;
    }

    match status {
        Some(403) => return ErrorKind::Forbidden,
        Some(code) if (500..600).contains(&code) => return ErrorKind::ServerError,
        _ => {}
    }

    if is_connection_closed(&message_lower)
        || context
            .iter()
            .any(|cause| is_connection_closed(&cause.to_lowercase()))
    {
        return ErrorKind::ConnectionClosed;
    }

    ErrorKind::Unknown
}

/// Picks the timeout phase from the cause chain.
///
/// Connect-phase markers win over read-phase markers, because a connect
/// failure is usually wrapped in generic "error reading" style text by
/// outer layers. A socket timeout on an established connection surfaces
/// from hyper as `client error (SendRequest)` over `connection error`, and
/// counts as a read. No marker at all means the overall deadline fired.
pub fn timeout_phase(context: &[String]) -> TimeoutPhase {
    let lowered: Vec<String> = context.iter().map(|c| c.to_lowercase()).collect();

    if lowered.iter().any(|c| is_connect_phase(c)) {
        TimeoutPhase::Connect
    } else if lowered.iter().any(|c| is_read_phase(c)) {
        TimeoutPhase::Read
    } else {
        TimeoutPhase::Total
    }
}

/// Checks if an error message indicates rejected credentials.
fn is_authentication_error(message_lower: &str) -> bool {
    message_lower.contains("unauthorized")
        || message_lower.contains("bad credentials")
        || message_lower.contains("requires authentication")
}

/// Checks if an error message indicates a rate limit.
fn is_rate_limit_error(message_lower: &str) -> bool {
    message_lower.contains("rate limit")
        || message_lower.contains("rate_limited")
        || message_lower.contains("abuse detection")
}

/// Checks if an error message indicates a missing object.
fn is_not_found_error(message_lower: &str) -> bool {
    message_lower.contains("not found")
        || message_lower.contains("not_found")
        || message_lower.contains("could not resolve to a node")
}

/// Checks if an error message indicates the peer closed the connection.
fn is_connection_closed(message_lower: &str) -> bool {
    message_lower.contains("connection closed")
        || message_lower.contains("closed before message completed")
        || message_lower.contains("connection reset")
        || message_lower.contains("broken pipe")
        || message_lower.contains("server disconnected")
}

fn is_connect_phase(cause_lower: &str) -> bool {
    cause_lower.contains("dns error")
        || cause_lower.contains("failed to lookup address")
        || cause_lower.contains("name resolution")
        || cause_lower.contains("(connect)")
        || cause_lower.contains("tcp connect")
        || cause_lower.contains("connect timed out")
        || cause_lower.contains("connect timeout")
}

fn is_read_phase(cause_lower: &str) -> bool {
    cause_lower.contains("error reading")
        || cause_lower.contains("reading a body")
        || cause_lower.contains("read timed out")
        || cause_lower.contains("read timeout")
        || cause_lower.contains("socket read")
        || cause_lower.contains("(sendrequest)")
        || cause_lower.contains("connection error")
}

/// Extracts an HTTP error status from free-form error text.
///
/// Looks for the first standalone three-digit token in the 400-599 range,
/// so "HTTP 502 Bad Gateway" yields 502 but "node 14031" yields nothing.
pub fn extract_status_code(text: &str) -> Option<u16> {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|token| token.len() == 3 && token.bytes().all(|b| b.is_ascii_digit()))
        .filter_map(|token| token.parse::<u16>().ok())
        .find(|code| (400..600).contains(code))
}
