//! GitHub GraphQL client.
//!
//! This module provides `GraphqlClient`, which sends GraphQL operations to
//! GitHub over one lazily-opened, pooled connection and retries failures
//! according to their classification.
//!
//! Key features:
//! - Centralized string-based failure classification (`classify`)
//! - Exponential backoff with jitter for transient failures
//! - Rate-limit aware waits, using a probe that bypasses the retry loop
//! - Forced reconnection after closed connections and connect timeouts
//! - Ordered, bounded-concurrency batch execution
//! - Cooperative cancellation via `CancellationToken`

mod batch;
mod classify;
mod client;
mod connection;
mod error;
mod metrics;
mod octocrab_transport;
mod pipeline;
mod rate_limit;
mod retry;
mod transport;

pub use classify::{classify, extract_status_code, timeout_phase};
pub use client::GraphqlClient;
pub use connection::ConnectionState;
pub use error::{ClientError, ErrorKind, RawFailure, TimeoutPhase};
pub use metrics::ClientMetricsSnapshot;
pub use octocrab_transport::{OctocrabConnector, OctocrabTransport};
pub use rate_limit::{RATE_LIMIT_QUERY, compute_wait};
pub use retry::{BackoffPolicy, CONNECTION_CLOSED_DELAY};
pub use transport::{Connector, Transport};
