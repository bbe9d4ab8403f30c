//! Collaborator client configuration.
//!
//! Base URLs for the DID resolver and the dataspace authority, the
//! authority's bearer token, and the per-request timeout. Loaded from the
//! environment or constructed explicitly for tests.

use url::Url;
use zeroize::Zeroizing;

/// Configuration for the HTTP collaborators.
///
/// Custom `Debug` implementation redacts the `authority_token` field
/// to prevent credential leakage in log output.
#[derive(Clone)]
pub struct ClientConfig {
    /// Base URL of a universal-resolver compatible DID resolver.
    /// Default: <http://localhost:8180>
    pub resolver_url: Url,
    /// Base URL of the dataspace authority.
    /// Default: <http://localhost:8181>
    pub authority_url: Url,
    /// Bearer token presented to the authority.
    pub authority_token: Zeroizing<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("resolver_url", &self.resolver_url)
            .field("authority_url", &self.authority_url)
            .field("authority_token", &"[REDACTED]")
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl ClientConfig {
    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `DSREG_RESOLVER_URL` (default: `http://localhost:8180`)
    /// - `DSREG_AUTHORITY_URL` (default: `http://localhost:8181`)
    /// - `DSREG_AUTHORITY_TOKEN` (required)
    /// - `DSREG_HTTP_TIMEOUT_SECS` (default: 10, must be > 0)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let authority_token = lookup("DSREG_AUTHORITY_TOKEN").ok_or(ConfigError::MissingToken)?;
        let url = |var: &str, default: &str| {
            let raw = lookup(var).unwrap_or_else(|| default.to_string());
            parse_url(var, &raw)
        };

        Ok(Self {
            resolver_url: url("DSREG_RESOLVER_URL", DEFAULT_RESOLVER_URL)?,
            authority_url: url("DSREG_AUTHORITY_URL", DEFAULT_AUTHORITY_URL)?,
            authority_token: Zeroizing::new(authority_token),
            timeout_secs: timeout_secs(lookup("DSREG_HTTP_TIMEOUT_SECS"))?,
        })
    }

    /// Configuration pointing both collaborators at explicit base URLs.
    pub fn new(resolver_url: &str, authority_url: &str, token: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            resolver_url: parse_url("resolver_url", resolver_url)?,
            authority_url: parse_url("authority_url", authority_url)?,
            authority_token: Zeroizing::new(token.to_string()),
            timeout_secs: 5,
        })
    }
}

/// Resolver default. Kept off the API's own default port.
pub const DEFAULT_RESOLVER_URL: &str = "http://localhost:8180";
pub const DEFAULT_AUTHORITY_URL: &str = "http://localhost:8181";
const DEFAULT_TIMEOUT_SECS: u64 = 10;

fn timeout_secs(raw: Option<String>) -> Result<u64, ConfigError> {
    let Some(raw) = raw else {
        return Ok(DEFAULT_TIMEOUT_SECS);
    };
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(secs),
        _ => Err(ConfigError::InvalidValue {
            var: "DSREG_HTTP_TIMEOUT_SECS".into(),
            value: raw,
        }),
    }
}

fn parse_url(name: &str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|e| ConfigError::InvalidUrl(name.to_string(), e.to_string()))
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("DSREG_AUTHORITY_TOKEN environment variable is required")]
    MissingToken,
    #[error("invalid URL for {0}: {1}")]
    InvalidUrl(String, String),
    #[error("invalid value for {var}: {value:?}")]
    InvalidValue { var: String, value: String },
}
