//! Octocrab-backed transport.
//!
//! `OctocrabConnector` builds an `Octocrab` instance from the client
//! configuration: token, API root, headers, and the connect and read
//! timeouts. It assembles the service stack itself rather than using
//! `Octocrab::builder()`, whose stack always adds its own `User-Agent` and
//! its own retry layer. Here the configured `User-Agent` is the only one
//! sent, and retries belong to the pipeline, which needs to see every
//! failure to classify it.
//!
//! GraphQL reports most failures in-band with HTTP 200 and an `errors`
//! array. Those are turned into protocol failures whose message is each
//! error's `"TYPE: message"`, which is what the classifier matches on.

use std::sync::Arc;

use http::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use http::{HeaderName, HeaderValue, Uri};
use hyper_rustls::HttpsConnectorBuilder;
use hyper_timeout::TimeoutConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use octocrab::service::middleware::auth_header::AuthHeaderLayer;
use octocrab::service::middleware::base_uri::BaseUriLayer;
use octocrab::service::middleware::extra_headers::ExtraHeadersLayer;
use octocrab::{AuthState, Octocrab, OctocrabBuilder};
use serde::Deserialize;
use serde_json::Value;

use crate::config::ClientConfig;
use crate::types::Operation;

use super::error::RawFailure;
use super::transport::{Connector, Transport};

// ─── Response Envelope ────────────────────────────────────────────────────────

/// The top-level GraphQL response body.
#[derive(Debug, Deserialize)]
struct GraphqlEnvelope {
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
    #[serde(rename = "type")]
    error_type: Option<String>,
}

impl GraphqlError {
    fn render(&self) -> String {
        match &self.error_type {
            Some(error_type) => format!("{}: {}", error_type, self.message),
            None => self.message.clone(),
        }
    }
}

impl GraphqlEnvelope {
    /// Returns `data`, or a protocol failure if the server reported errors.
    ///
    /// A response with both `data` and `errors` is partial; it is treated as
    /// a failure so the caller never sees silently missing fields.
    fn into_data(self) -> Result<Value, RawFailure> {
        if !self.errors.is_empty() {
            let message = self
                .errors
                .iter()
                .map(GraphqlError::render)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(RawFailure::protocol(message, None));
        }
        self.data.ok_or_else(|| {
            RawFailure::protocol("GraphQL response contained neither data nor errors", None)
        })
    }
}

// ─── Transport ────────────────────────────────────────────────────────────────

/// A connection handle wrapping an `Octocrab` instance.
#[derive(Clone)]
pub struct OctocrabTransport {
    client: Octocrab,
}

impl OctocrabTransport {
    /// Wraps a pre-configured Octocrab instance.
    ///
    /// Use this when the instance needs authentication the connector does not
    /// set up, such as a GitHub App installation token.
    pub fn new(client: Octocrab) -> Self {
        Self { client }
    }

    /// Returns a reference to the underlying octocrab client.
    pub fn inner(&self) -> &Octocrab {
        &self.client
    }
}

impl std::fmt::Debug for OctocrabTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OctocrabTransport").finish_non_exhaustive()
    }
}

impl Transport for OctocrabTransport {
    async fn execute(&self, operation: &Operation) -> Result<Value, RawFailure> {
        let envelope: GraphqlEnvelope = self
            .client
            .graphql(&operation.payload())
            .await
            .map_err(RawFailure::from_octocrab)?;
        envelope.into_data()
    }

    async fn close(&self) -> Result<(), RawFailure> {
        // The hyper pool is released when the last clone of the client drops.
        Ok(())
    }
}

// ─── Connector ────────────────────────────────────────────────────────────────

/// Builds an [`OctocrabTransport`] per connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct OctocrabConnector;

impl Connector for OctocrabConnector {
    type Transport = OctocrabTransport;

    async fn connect(&self, config: &ClientConfig) -> Result<OctocrabTransport, RawFailure> {
        let base_uri: Uri = config.base_url.parse().map_err(|e| {
            RawFailure::transport(format!("invalid base URL {}: {}", config.base_url, e), "config")
        })?;
        let headers = vec![
            (USER_AGENT, header_value(USER_AGENT, &config.user_agent)?),
            (ACCEPT, header_value(ACCEPT, &config.accept)?),
        ];
        let mut bearer =
            header_value(AUTHORIZATION, &format!("Bearer {}", config.token.expose()))?;
        bearer.set_sensitive(true);

        let https = HttpsConnectorBuilder::new()
            .with_native_roots()
            .map_err(|e| RawFailure::transport(format!("loading TLS roots: {}", e), "tls"))?
            .https_or_http()
            .enable_http1()
            .build();
        let mut connector = TimeoutConnector::new(https);
        connector.set_connect_timeout(Some(config.connect_timeout));
        connector.set_read_timeout(Some(config.read_timeout));
        let service = Client::builder(TokioExecutor::new()).build(connector);

        let client = OctocrabBuilder::new_empty()
            .with_service(service)
            .with_layer(&ExtraHeadersLayer::new(Arc::new(headers)))
            .with_layer(&BaseUriLayer::new(base_uri.clone()))
            .with_layer(&AuthHeaderLayer::new(Some(bearer), base_uri.clone(), base_uri))
            .with_auth(AuthState::None)
            .build()
            .unwrap_or_else(|never| match never {});

        Ok(OctocrabTransport::new(client))
    }
}

fn header_value(name: HeaderName, value: &str) -> Result<HeaderValue, RawFailure> {
    HeaderValue::from_str(value)
        .map_err(|_| RawFailure::transport(format!("invalid {} header value", name), "config"))
}
