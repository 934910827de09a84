//! Connection lifecycle.
//!
//! A client owns at most one live transport handle. The handle is created on
//! first use, shared by every in-flight request, and dropped by `close()`
//! either on request or after a fatal transport error. The next request
//! transparently opens a fresh one.
//!
//! ```text
//!            ensure()
//!   Absent ───────────► Connected
//!     ▲                    │
//!     └────────────────────┘
//!      close() / fatal error
//! ```
//!
//! `ensure` and `close` serialize on one async mutex, so concurrent callers
//! never build two handles and a close racing an ensure leaves a consistent
//! state. Requests that already hold a handle keep it until they finish.

use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore, SemaphorePermit};
use tracing::{debug, info};

use crate::config::ClientConfig;

use super::error::RawFailure;
use super::transport::{Connector, Transport};

/// Whether the client currently holds a live handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Absent,
    Connected,
}

/// The single connection slot of a client.
pub(crate) struct Connection<C: Connector> {
    connector: C,
    handle: Mutex<Option<Arc<C::Transport>>>,
    in_flight: Semaphore,
}

impl<C: Connector> Connection<C> {
    /// Creates an empty slot allowing `in_flight_limit` concurrent requests.
    pub(crate) fn new(connector: C, in_flight_limit: usize) -> Self {
        Connection {
            connector,
            handle: Mutex::new(None),
            in_flight: Semaphore::new(in_flight_limit),
        }
    }

    /// Returns the live handle, opening one if the slot is empty.
    pub(crate) async fn ensure(
        &self,
        config: &ClientConfig,
    ) -> Result<Arc<C::Transport>, RawFailure> {
        let mut slot = self.handle.lock().await;
        if let Some(handle) = slot.as_ref() {
            return Ok(Arc::clone(handle));
        }

        debug!(base_url = %config.base_url, "Opening connection");
        let handle = Arc::new(self.connector.connect(config).await?);
        *slot = Some(Arc::clone(&handle));
        info!(base_url = %config.base_url, "Connection established");

        Ok(handle)
    }

    /// Drops the live handle, if any. Idempotent.
    ///
    /// Teardown errors are logged and otherwise ignored; the slot is always
    /// empty afterwards.
    pub(crate) async fn close(&self) {
        let mut slot = self.handle.lock().await;
        let Some(handle) = slot.take() else {
            return;
        };
        if let Err(e) = handle.close().await {
            debug!(error = %e, "Error while closing connection, continuing");
        }
        info!("Connection closed");
    }

    /// Reports whether a handle is live.
    pub(crate) async fn state(&self) -> ConnectionState {
        if self.handle.lock().await.is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::Absent
        }
    }

    /// Waits for an in-flight request slot.
    pub(crate) async fn permit(&self) -> Result<SemaphorePermit<'_>, RawFailure> {
        self.in_flight
            .acquire()
            .await
            .map_err(|_| RawFailure::transport("connection pool shut down", "pool"))
    }
}
