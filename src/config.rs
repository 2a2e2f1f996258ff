//! Client configuration.
//!
//! [`ClientConfig`] can be filled in directly, deserialized by whatever loads
//! the application's settings, or assembled through
//! [`ClientBuilder`](crate::ClientBuilder). Durations are given in
//! milliseconds when deserialized.

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::observe::LogConfig;
use crate::{Error, Result};
use http::HeaderMap;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything a [`Client`](crate::Client) needs at construction.
///
/// # Examples
///
/// ```
/// use breakwater::ClientConfig;
/// use std::time::Duration;
///
/// let config: ClientConfig = serde_json::from_str(r#"{
///     "base_url": "https://inventory.internal",
///     "max_conns_per_host": 16,
///     "timeout_ms": 2000,
///     "basic_auth": { "username": "svc", "password": "secret" },
///     "circuit_breaker": {
///         "enabled": true,
///         "error_percent_threshold": 25,
///         "request_volume_threshold": 10,
///         "sleep_window_ms": 3000
///     }
/// }"#).unwrap();
///
/// assert_eq!(config.timeout, Duration::from_secs(2));
/// assert_eq!(config.circuit_breaker.sleep_window, Duration::from_secs(3));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Prefix every request path is appended to. Required.
    pub base_url: String,

    /// Cap on concurrent connections to the base host. `0` means no cap.
    pub max_conns_per_host: usize,

    /// Accept invalid TLS certificates.
    pub insecure_skip_verify: bool,

    /// Credentials attached to every call, unless a request overrides them.
    pub basic_auth: Option<BasicAuth>,

    /// Bound on a whole call. Zero disables the timeout.
    #[serde(rename = "timeout_ms", deserialize_with = "millis::deserialize")]
    pub timeout: Duration,

    /// Circuit breaker settings. Disabled by default.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Request and response logging policy.
    pub log: LogConfig,

    /// Headers added to every call unless the request sets them itself.
    #[serde(skip)]
    pub default_headers: HeaderMap,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            max_conns_per_host: 0,
            insecure_skip_verify: false,
            basic_auth: None,
            timeout: DEFAULT_TIMEOUT,
            circuit_breaker: CircuitBreakerConfig::default(),
            log: LogConfig::default(),
            default_headers: HeaderMap::new(),
        }
    }
}

impl ClientConfig {
    /// Creates a configuration for the given base URL with defaults elsewhere.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Checks the configuration without building anything.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigurationError`] when the base URL is empty or
    /// the breaker settings are out of range, and [`Error::InvalidUrl`] when
    /// the base URL does not parse.
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(Error::ConfigurationError("Base URL is required".to_string()));
        }
        url::Url::parse(&self.base_url)?;
        self.circuit_breaker.validate()
    }
}

/// Username and password for HTTP basic authentication.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct BasicAuth {
    /// The username
    pub username: String,
    /// The password
    pub password: String,
}

impl BasicAuth {
    /// Creates a credential pair.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Returns `true` when both username and password are non-empty.
    ///
    /// Incomplete credentials are never sent.
    pub fn is_set(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }
}

impl fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

pub(crate) mod millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }

    pub(crate) fn deserialize_option<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<u64>::deserialize(deserializer).map(|ms| ms.map(Duration::from_millis))
    }
}
