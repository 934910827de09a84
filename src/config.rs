//! Client configuration.
//!
//! All values have defaults except the token. `ClientConfig::from_env` reads
//! overrides from the environment:
//!
//! - `GITHUB_TOKEN` (required)
//! - `GITHUB_GRAPHQL_BASE_URL`
//! - `GITHUB_GRAPHQL_RETRY_COUNT`
//! - `GITHUB_GRAPHQL_TOTAL_TIMEOUT_SECS`
//! - `GITHUB_GRAPHQL_CONNECT_TIMEOUT_SECS`
//! - `GITHUB_GRAPHQL_READ_TIMEOUT_SECS`
//! - `GITHUB_GRAPHQL_BATCH_CONCURRENCY`

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// Default API root. GraphQL requests go to `{base_url}/graphql`.
pub const DEFAULT_BASE_URL: &str = "https://api.github.com";

/// Default `Accept` header.
pub const DEFAULT_ACCEPT: &str = "application/vnd.github+json";

/// Default number of attempts per operation.
const DEFAULT_RETRY_COUNT: u32 = 3;

/// Default end-to-end deadline for a single request (seconds).
const DEFAULT_TOTAL_TIMEOUT_SECS: u64 = 90;

/// Default deadline for establishing a connection (seconds).
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default deadline for reading from an established connection (seconds).
const DEFAULT_READ_TIMEOUT_SECS: u64 = 30;

/// Default number of batch operations in flight at once.
const DEFAULT_BATCH_CONCURRENCY: i64 = 10;

/// Upper bound for the batch concurrency limit.
pub const MAX_BATCH_CONCURRENCY: usize = 100;

/// Errors reading configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required variable is not set.
    #[error("environment variable {0} is not set")]
    Missing(&'static str),

    /// A variable is set but cannot be parsed.
    #[error("environment variable {name} has invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Bearer credential. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    pub fn new(token: impl Into<String>) -> Self {
        Token(token.into())
    }

    /// Returns the raw token for building the `Authorization` header.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(<redacted>)")
    }
}

/// Connection pool limits.
///
/// A client talks to exactly one host, so the per-host cap and the global cap
/// bound the same set of connections; the smaller one wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum concurrent connections across all hosts.
    pub max_connections: usize,

    /// Maximum concurrent connections to a single host.
    pub max_per_host: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            max_connections: 100,
            max_per_host: 30,
        }
    }
}

impl PoolConfig {
    /// Number of requests allowed in flight on one connection handle.
    pub fn in_flight_limit(&self) -> usize {
        self.max_connections.min(self.max_per_host).max(1)
    }
}

/// Effective batch concurrency after clamping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConcurrency {
    /// Operations allowed in flight per batch; `0` means unbounded.
    pub limit: usize,

    /// The requested value, if it was above `MAX_BATCH_CONCURRENCY` and
    /// had to be lowered.
    pub capped_from: Option<i64>,
}

impl BatchConcurrency {
    /// Clamps a requested limit into `[0, MAX_BATCH_CONCURRENCY]`.
    ///
    /// Negative values mean "unlimited" and map to `0` without being reported
    /// as capped. Only values above the maximum set `capped_from`.
    pub fn clamp(requested: i64) -> Self {
        if requested <= 0 {
            return BatchConcurrency {
                limit: 0,
                capped_from: None,
            };
        }
        match usize::try_from(requested) {
            Ok(limit) if limit <= MAX_BATCH_CONCURRENCY => BatchConcurrency {
                limit,
                capped_from: None,
            },
            _ => BatchConcurrency {
                limit: MAX_BATCH_CONCURRENCY,
                capped_from: Some(requested),
            },
        }
    }

    /// Returns true if batches run without a concurrency bound.
    pub fn is_unbounded(&self) -> bool {
        self.limit == 0
    }
}

/// Configuration for a `GraphqlClient`.
///
/// Immutable once handed to the client; the batch limit is clamped when the
/// client is constructed.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Bearer token sent in the `Authorization` header.
    pub token: Token,

    /// API root used for the lifetime of the client.
    pub base_url: String,

    /// `Accept` header value.
    pub accept: String,

    /// `User-Agent` header value.
    pub user_agent: String,

    /// Attempts per operation. `0` is treated as `1`.
    pub retry_count: u32,

    /// End-to-end deadline for one request.
    pub total_timeout: Duration,

    /// Deadline for DNS resolution and TCP/TLS connect.
    pub connect_timeout: Duration,

    /// Deadline for reading from the socket.
    pub read_timeout: Duration,

    /// Requested batch concurrency; see `BatchConcurrency::clamp`.
    pub batch_concurrency_limit: i64,

    /// Connection pool limits.
    pub pool: PoolConfig,
}

impl ClientConfig {
    /// Creates a configuration with default values for everything but the token.
    pub fn new(token: impl Into<String>) -> Self {
        ClientConfig {
            token: Token::new(token),
            base_url: DEFAULT_BASE_URL.to_string(),
            accept: DEFAULT_ACCEPT.to_string(),
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"))
                .to_string(),
            retry_count: DEFAULT_RETRY_COUNT,
            total_timeout: Duration::from_secs(DEFAULT_TOTAL_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(DEFAULT_READ_TIMEOUT_SECS),
            batch_concurrency_limit: DEFAULT_BATCH_CONCURRENCY,
            pool: PoolConfig::default(),
        }
    }

    /// Reads configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let token = lookup("GITHUB_TOKEN").ok_or(ConfigError::Missing("GITHUB_TOKEN"))?;
        let mut config = ClientConfig::new(token);

        if let Some(base_url) = lookup("GITHUB_GRAPHQL_BASE_URL") {
            config.base_url = base_url;
        }
        if let Some(n) = parse_var::<u32>(&lookup, "GITHUB_GRAPHQL_RETRY_COUNT")? {
            config.retry_count = n;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "GITHUB_GRAPHQL_TOTAL_TIMEOUT_SECS")? {
            config.total_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "GITHUB_GRAPHQL_CONNECT_TIMEOUT_SECS")? {
            config.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "GITHUB_GRAPHQL_READ_TIMEOUT_SECS")? {
            config.read_timeout = Duration::from_secs(secs);
        }
        if let Some(limit) = parse_var::<i64>(&lookup, "GITHUB_GRAPHQL_BATCH_CONCURRENCY")? {
            config.batch_concurrency_limit = limit;
        }

        Ok(config)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn with_total_timeout(mut self, timeout: Duration) -> Self {
        self.total_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_batch_concurrency_limit(mut self, limit: i64) -> Self {
        self.batch_concurrency_limit = limit;
        self
    }

    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// Number of attempts each operation gets (never zero).
    pub fn max_attempts(&self) -> u32 {
        self.retry_count.max(1)
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match lookup(name) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::Invalid {
                name,
                reason: e.to_string(),
                value,
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = ClientConfig::new("t");

        assert_eq!(config.retry_count, 3);
        assert_eq!(config.total_timeout, Duration::from_secs(90));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.read_timeout, Duration::from_secs(30));
        assert_eq!(config.batch_concurrency_limit, 10);
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.pool.in_flight_limit(), 30);
    }

    #[test]
    fn token_is_redacted_in_debug_output() {
        let config = ClientConfig::new("ghp_supersecret");
        let debug = format!("{:?}", config);

        assert!(!debug.contains("ghp_supersecret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn zero_retry_count_still_makes_one_attempt() {
        let config = ClientConfig::new("t").with_retry_count(0);
        assert_eq!(config.max_attempts(), 1);
    }

    #[test]
    fn clamp_caps_large_limits_and_reports_it() {
        let clamped = BatchConcurrency::clamp(150);
        assert_eq!(clamped.limit, 100);
        assert_eq!(clamped.capped_from, Some(150));
    }

    #[test]
    fn clamp_maps_negative_to_unbounded_silently() {
        let clamped = BatchConcurrency::clamp(-5);
        assert_eq!(clamped.limit, 0);
        assert!(clamped.is_unbounded());
        assert_eq!(clamped.capped_from, None);
    }

    #[test]
    fn clamp_keeps_in_range_values() {
        assert_eq!(BatchConcurrency::clamp(0).limit, 0);
        assert_eq!(BatchConcurrency::clamp(10).limit, 10);
        assert_eq!(BatchConcurrency::clamp(100).capped_from, None);
    }

    #[test]
    fn from_lookup_requires_token() {
        let err = ClientConfig::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("GITHUB_TOKEN")));
    }

    #[test]
    fn from_lookup_reads_overrides() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            ("GITHUB_TOKEN", "abc"),
            ("GITHUB_GRAPHQL_BASE_URL", "https://ghe.example.com/api"),
            ("GITHUB_GRAPHQL_RETRY_COUNT", "5"),
            ("GITHUB_GRAPHQL_READ_TIMEOUT_SECS", " 12 "),
            ("GITHUB_GRAPHQL_BATCH_CONCURRENCY", "-1"),
        ]))
        .unwrap();

        assert_eq!(config.token.expose(), "abc");
        assert_eq!(config.base_url, "https://ghe.example.com/api");
        assert_eq!(config.retry_count, 5);
        assert_eq!(config.read_timeout, Duration::from_secs(12));
        assert_eq!(config.batch_concurrency_limit, -1);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
    }

    #[test]
    fn from_lookup_rejects_garbage() {
        let err = ClientConfig::from_lookup(lookup_from(&[
            ("GITHUB_TOKEN", "abc"),
            ("GITHUB_GRAPHQL_RETRY_COUNT", "three"),
        ]))
        .unwrap_err();

        match err {
            ConfigError::Invalid { name, value, .. } => {
                assert_eq!(name, "GITHUB_GRAPHQL_RETRY_COUNT");
                assert_eq!(value, "three");
            }
            other => panic!("expected Invalid, got {other:?}"),
        }
    }
}
