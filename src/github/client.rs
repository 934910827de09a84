//! The GraphQL client.
//!
//! `GraphqlClient` owns one connection slot, the retry pipeline and the
//! batch limiter. It is cheap to share behind an `Arc`; all methods take
//! `&self`.
//!
//! ```ignore
//! let client = GraphqlClient::new(ClientConfig::from_env()?);
//! let result = client.execute("query { viewer { login } }", None).await;
//! client.close().await;
//! let data = result?;
//! ```
//!
//! Callers must call [`GraphqlClient::close`] on every exit path.

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::{BatchConcurrency, ClientConfig};
use crate::types::{AttemptContext, Operation, RateLimitSnapshot, Variables};

use super::classify::classify;
use super::connection::{Connection, ConnectionState};
use super::error::ClientError;
use super::metrics::{ClientMetrics, ClientMetricsSnapshot};
use super::octocrab_transport::OctocrabConnector;
use super::retry::BackoffPolicy;
use super::transport::Connector;

/// A retrying GraphQL client bound to one endpoint.
pub struct GraphqlClient<C: Connector = OctocrabConnector> {
    pub(super) config: ClientConfig,
    pub(super) backoff: BackoffPolicy,
    pub(super) batch: BatchConcurrency,
    pub(super) connection: Connection<C>,
    pub(super) metrics: ClientMetrics,
    pub(super) cancel: CancellationToken,
}

impl GraphqlClient<OctocrabConnector> {
    /// Creates a client that talks to GitHub through octocrab.
    ///
    /// No connection is opened until the first request.
    pub fn new(config: ClientConfig) -> Self {
        Self::with_connector(config, OctocrabConnector)
    }
}

impl<C: Connector> GraphqlClient<C> {
    /// Creates a client using the given connector.
    ///
    /// The batch concurrency limit is clamped here; a warning is logged only
    /// if the requested value was above the maximum.
    pub fn with_connector(config: ClientConfig, connector: C) -> Self {
        let batch = BatchConcurrency::clamp(config.batch_concurrency_limit);
        if let Some(requested) = batch.capped_from {
            warn!(
                requested,
                effective = batch.limit,
                "Batch concurrency limit above maximum, capping"
            );
        }

        let connection = Connection::new(connector, config.pool.in_flight_limit());

        GraphqlClient {
            config,
            backoff: BackoffPolicy::DEFAULT,
            batch,
            connection,
            metrics: ClientMetrics::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Ties the client to a cancellation token.
    ///
    /// Once the token fires, in-flight calls and sleeps end with
    /// [`ClientError::Cancelled`], as does every later call.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Replaces the backoff schedule.
    pub fn with_backoff(mut self, policy: BackoffPolicy) -> Self {
        self.backoff = policy;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The effective batch concurrency after clamping.
    pub fn batch_concurrency(&self) -> BatchConcurrency {
        self.batch
    }

    /// Executes one operation through the retry pipeline and returns its
    /// `data` value.
    pub async fn execute(
        &self,
        document: &str,
        variables: Option<Variables>,
    ) -> Result<Value, ClientError> {
        let operation = Operation {
            document: document.to_string(),
            variables,
        };
        self.execute_operation(&operation).await
    }

    /// Executes one operation and deserializes its `data` value into `T`.
    pub async fn execute_typed<T: DeserializeOwned>(
        &self,
        operation: &Operation,
    ) -> Result<T, ClientError> {
        let data = self.execute_operation(operation).await?;
        Ok(serde_json::from_value(data)?)
    }

    /// Fetches the current rate-limit window.
    ///
    /// This is a single probe on the live connection, outside the retry
    /// pipeline.
    pub async fn get_rate_limit(&self) -> Result<RateLimitSnapshot, ClientError> {
        self.fetch_rate_limit().await.map_err(|failure| {
            let kind = classify(&failure);
            let context = AttemptContext::first(1);
            self.client_error(kind, failure, context, None)
        })
    }

    /// Closes the connection. Idempotent; the next request reconnects.
    pub async fn close(&self) {
        self.connection.close().await;
    }

    pub async fn connection_state(&self) -> ConnectionState {
        self.connection.state().await
    }

    /// Returns a snapshot of the client counters.
    pub fn metrics(&self) -> ClientMetricsSnapshot {
        self.metrics.snapshot()
    }
}

impl<C: Connector> std::fmt::Debug for GraphqlClient<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphqlClient")
            .field("config", &self.config)
            .field("batch", &self.batch)
            .finish_non_exhaustive()
    }
}
