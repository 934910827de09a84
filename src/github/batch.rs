//! Concurrent batch execution.
//!
//! Every operation in a batch goes through the full retry pipeline. At most
//! `batch_concurrency().limit` run at once (unbounded when the limit is 0).
//! Results come back in input order. The first operation to fail fails the
//! whole batch, and the remaining operations are dropped mid-flight.

use futures_util::future::try_join_all;
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::types::Operation;

use super::client::GraphqlClient;
use super::error::ClientError;
use super::transport::Connector;

impl<C: Connector> GraphqlClient<C> {
    /// Executes operations concurrently, returning their results in input
    /// order.
    pub async fn execute_batch<I, O>(&self, operations: I) -> Result<Vec<Value>, ClientError>
    where
        I: IntoIterator<Item = O>,
        O: Into<Operation>,
    {
        let operations: Vec<Operation> = operations.into_iter().map(Into::into).collect();
        if operations.is_empty() {
            return Ok(Vec::new());
        }

        let limiter = (!self.batch.is_unbounded()).then(|| Semaphore::new(self.batch.limit));
        let limiter = limiter.as_ref();
        debug!(
            operations = operations.len(),
            limit = self.batch.limit,
            "Executing GraphQL batch"
        );

        let tasks = operations.iter().enumerate().map(|(index, operation)| async move {
            // The semaphore is never closed, so acquire cannot fail.
            let _permit = match limiter {
                Some(semaphore) => semaphore.acquire().await.ok(),
                None => None,
            };
            self.execute_operation(operation)
                .await
                .inspect_err(|e| debug!(index, error = %e, "Batch operation failed"))
        });

        try_join_all(tasks).await
    }
}
