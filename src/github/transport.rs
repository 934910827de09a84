//! Transport traits.
//!
//! The retry pipeline talks to the network only through these two traits:
//!
//! - [`Connector`] builds a connection handle from the client configuration.
//!   It is called lazily, and again after a fatal transport error forced the
//!   previous handle closed.
//! - [`Transport`] is the handle: it executes one operation and returns the
//!   GraphQL `data` value, or a [`RawFailure`] for the classifier.
//!
//! The production implementation is [`super::OctocrabConnector`]. Tests use
//! a scripted double.

use std::future::Future;

use serde_json::Value;

use crate::config::ClientConfig;
use crate::types::Operation;

use super::error::RawFailure;

/// A live connection to the GraphQL endpoint.
///
/// # Example (mock for testing)
///
/// ```ignore
/// struct FixedTransport(Value);
///
/// impl Transport for FixedTransport {
///     async fn execute(&self, _operation: &Operation) -> Result<Value, RawFailure> {
///         Ok(self.0.clone())
///     }
///
///     async fn close(&self) -> Result<(), RawFailure> {
///         Ok(())
///     }
/// }
/// ```
pub trait Transport: Send + Sync + 'static {
    /// Sends one operation and returns its `data` value.
    fn execute(
        &self,
        operation: &Operation,
    ) -> impl Future<Output = Result<Value, RawFailure>> + Send;

    /// Releases the handle's resources.
    ///
    /// Called at most once per handle. Errors are logged by the caller and
    /// otherwise ignored.
    fn close(&self) -> impl Future<Output = Result<(), RawFailure>> + Send;
}

/// Builds connection handles.
pub trait Connector: Send + Sync + 'static {
    /// The handle type this connector produces.
    type Transport: Transport;

    /// Opens a new handle using the configured endpoint, credentials,
    /// timeouts and headers.
    fn connect(
        &self,
        config: &ClientConfig,
    ) -> impl Future<Output = Result<Self::Transport, RawFailure>> + Send;
}
