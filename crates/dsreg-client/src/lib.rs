//! # dsreg-client — HTTP Collaborators
//!
//! reqwest-based implementations of the engine's collaborator traits:
//!
//! - **Identity verification** via a universal-resolver compatible DID
//!   resolver (`resolver.rs`).
//! - **Credential issuance** via the dataspace authority (`authority.rs`).
//!
//! Each adapter classifies its own failures as transient or permanent. The
//! engine decides retries from that classification alone.
//!
//! Neither client retries internally. Retries, backoff, and call timeouts
//! belong to the engine, which persists attempt counts across restarts.

pub mod authority;
pub mod config;
pub mod error;
pub mod resolver;

pub use authority::HttpAuthorityClient;
pub use config::{ClientConfig, ConfigError};
pub use error::ClientError;
pub use resolver::{DidDocument, HttpIdentityVerifier};

use std::time::Duration;

use url::Url;

/// Build the shared HTTP client for both collaborators.
pub fn build_http(config: &ClientConfig) -> Result<reqwest::Client, ClientError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .user_agent(concat!("dsreg/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ClientError::Http {
            endpoint: "client_init".into(),
            source: e,
        })
}

/// `{base}/{path}` with exactly one slash between them.
pub(crate) fn join(base: &Url, path: &str) -> String {
    format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_normalises_slashes() {
        let base = Url::parse("http://127.0.0.1:9000").unwrap();
        assert_eq!(join(&base, "/api/v1/credentials"), "http://127.0.0.1:9000/api/v1/credentials");
        let nested = Url::parse("https://auth.example.com/authority/").unwrap();
        assert_eq!(
            join(&nested, "api/v1/credentials"),
            "https://auth.example.com/authority/api/v1/credentials"
        );
    }
}
