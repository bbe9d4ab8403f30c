//! Client errors and their classification into collaborator failures.

use dsreg_core::CollaboratorFailure;
use reqwest::StatusCode;

/// Errors from calls to the resolver or the authority.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// HTTP transport error (connection refused, timeout, TLS failure).
    #[error("HTTP request to {endpoint} failed: {source}")]
    Http {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status.
    #[error("{endpoint} returned {status}: {body}")]
    Status {
        endpoint: String,
        status: StatusCode,
        body: String,
    },

    /// Response body did not match the expected shape.
    #[error("failed to decode {endpoint} response: {reason}")]
    Decode { endpoint: String, reason: String },

    /// Client construction failed.
    #[error("client configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

/// Whether a status is worth retrying: request timeout, rate limiting, or a
/// server-side error.
pub fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}

impl ClientError {
    /// Classification shared by both collaborators. Endpoint-specific
    /// statuses are mapped by the caller before falling back to this.
    pub fn into_failure(self) -> CollaboratorFailure {
        match &self {
            Self::Http { source, .. } if source.is_timeout() => {
                CollaboratorFailure::transient(format!("timed out: {self}"))
            }
            Self::Http { .. } => CollaboratorFailure::transient(self.to_string()),
            Self::Status { status, .. } if is_transient_status(*status) => {
                CollaboratorFailure::transient(self.to_string())
            }
            Self::Status { .. } | Self::Decode { .. } | Self::Config(_) => {
                CollaboratorFailure::permanent(self.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> ClientError {
        ClientError::Status {
            endpoint: "GET /1.0/identifiers".into(),
            status: StatusCode::from_u16(code).unwrap(),
            body: String::new(),
        }
    }

    #[test]
    fn retryable_statuses_are_transient() {
        for code in [408, 429, 500, 502, 503, 504] {
            assert!(status(code).into_failure().is_transient(), "{code}");
        }
    }

    #[test]
    fn other_statuses_are_permanent() {
        for code in [400, 401, 403, 404, 409, 422] {
            assert!(!status(code).into_failure().is_transient(), "{code}");
        }
    }

    #[test]
    fn decode_errors_are_permanent() {
        let err = ClientError::Decode {
            endpoint: "POST /api/v1/credentials".into(),
            reason: "missing credentialId".into(),
        };
        assert!(!err.into_failure().is_transient());
    }
}
