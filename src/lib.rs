//! GitHub GraphQL client with classified retries.
//!
//! This library sends GraphQL operations to GitHub over a single pooled
//! connection, classifies failures, and retries the transient ones with
//! backoff or rate-limit aware waits. See [`GraphqlClient`].

pub mod config;
pub mod github;
pub mod types;

#[cfg(test)]
pub mod test_utils;

pub use config::{BatchConcurrency, ClientConfig, ConfigError, PoolConfig, Token};
pub use github::{
    ClientError, ClientMetricsSnapshot, ConnectionState, Connector, ErrorKind, GraphqlClient,
    OctocrabConnector, OctocrabTransport, RawFailure, TimeoutPhase, Transport,
};
pub use types::{AttemptContext, Operation, RateLimitSnapshot, Variables};
