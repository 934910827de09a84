//! `gql-probe`: print the current rate-limit window and optionally run one
//! GraphQL document.
//!
//! ```text
//! GITHUB_TOKEN=... gql-probe [QUERY_FILE [VARIABLES_JSON_FILE]]
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use github_graphql_client::{ClientConfig, GraphqlClient, Operation, Variables};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,github_graphql_client=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut args = std::env::args_os().skip(1).map(PathBuf::from);
    let operation = match args.next() {
        Some(query_path) => Some(read_operation(query_path, args.next())?),
        None => None,
    };

    let config = ClientConfig::from_env().context("reading client configuration")?;

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupted, cancelling");
                shutdown.cancel();
            }
        }
    });

    let client = GraphqlClient::new(config).with_cancellation(shutdown);
    let outcome = run(&client, operation.as_ref()).await;
    client.close().await;
    outcome
}

async fn run(client: &GraphqlClient, operation: Option<&Operation>) -> Result<()> {
    let snapshot = client
        .get_rate_limit()
        .await
        .context("fetching rate limit")?;
    println!("rate limit: {}", snapshot);

    if let Some(operation) = operation {
        let data = client
            .execute_operation(operation)
            .await
            .context("executing query")?;
        println!("{}", serde_json::to_string_pretty(&data)?);
    }

    let metrics = client.metrics();
    tracing::debug!(
        requests = metrics.requests,
        retries = metrics.retries,
        reconnects = metrics.reconnects,
        rate_limit_waits = metrics.rate_limit_waits,
        "Done"
    );
    Ok(())
}

fn read_operation(query_path: PathBuf, variables_path: Option<PathBuf>) -> Result<Operation> {
    let document = std::fs::read_to_string(&query_path)
        .with_context(|| format!("reading {}", query_path.display()))?;

    let operation = Operation::new(document);
    match variables_path {
        None => Ok(operation),
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let variables: Variables = serde_json::from_str(&text)
                .with_context(|| format!("parsing {} as a JSON object", path.display()))?;
            Ok(operation.with_variables(variables))
        }
    }
}
