//! # Dataspace Authority Client
//!
//! Requests a membership credential for a verified participant.
//!
//! | Method | Path | Operation |
//! |--------|------|-----------|
//! | POST   | `/api/v1/credentials` | Issue a membership credential |
//!
//! Each request carries the registration id, in the body and as the
//! `Idempotency-Key` header, so a retried request can be matched to an
//! earlier issuance.
//!
//! ## Failure classification
//!
//! | Outcome | Kind | Reason |
//! |---------|------|--------|
//! | 403, 422 | permanent | `policy rejection: {body}` |
//! | 401 | permanent | authority rejected the service's credentials |
//! | 408, 429, 5xx, transport error | transient | upstream message |

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use url::Url;
use zeroize::Zeroizing;

use dsreg_core::{CollaboratorFailure, CredentialReference, IdentityAssertion, RegistrationId};
use dsreg_engine::AuthorityClient;

use crate::config::ClientConfig;
use crate::error::ClientError;

/// Header repeating the registration id for deduplication.
pub const IDEMPOTENCY_KEY: &str = "Idempotency-Key";

/// Body of a credential request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRequest<'a> {
    pub registration_id: RegistrationId,
    pub participant_did: &'a str,
    pub verification_methods: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_hub_url: Option<&'a str>,
}

impl<'a> CredentialRequest<'a> {
    pub fn new(registration_id: RegistrationId, assertion: &'a IdentityAssertion) -> Self {
        Self {
            registration_id,
            participant_did: assertion.did.as_str(),
            verification_methods: &assertion.verification_methods,
            identity_hub_url: assertion.identity_hub_url.as_deref(),
        }
    }
}

/// Successful issuance response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialResponse {
    pub credential_id: String,
}

/// Authority client over HTTP.
#[derive(Clone)]
pub struct HttpAuthorityClient {
    http: reqwest::Client,
    base_url: Url,
    token: Zeroizing<String>,
}

impl std::fmt::Debug for HttpAuthorityClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpAuthorityClient")
            .field("base_url", &self.base_url)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl HttpAuthorityClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        Ok(Self {
            http: crate::build_http(config)?,
            base_url: config.authority_url.clone(),
            token: config.authority_token.clone(),
        })
    }

    /// Request a credential.
    ///
    /// Calls `POST {authority_url}/api/v1/credentials`.
    pub async fn issue(
        &self,
        registration: RegistrationId,
        assertion: &IdentityAssertion,
    ) -> Result<CredentialResponse, ClientError> {
        let endpoint = "POST /api/v1/credentials";
        let url = crate::join(&self.base_url, "api/v1/credentials");

        let resp = self
            .http
            .post(&url)
            .bearer_auth(self.token.as_str())
            .header(IDEMPOTENCY_KEY, registration.as_uuid().to_string())
            .json(&CredentialRequest::new(registration, assertion))
            .send()
            .await
            .map_err(|e| ClientError::Http {
                endpoint: endpoint.into(),
                source: e,
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                endpoint: endpoint.into(),
                status,
                body,
            });
        }

        resp.json().await.map_err(|e| ClientError::Decode {
            endpoint: endpoint.into(),
            reason: e.to_string(),
        })
    }
}

fn classify(err: ClientError) -> CollaboratorFailure {
    match &err {
        ClientError::Status { status, body, .. }
            if *status == StatusCode::FORBIDDEN || *status == StatusCode::UNPROCESSABLE_ENTITY =>
        {
            let detail = body.trim();
            if detail.is_empty() {
                CollaboratorFailure::permanent(format!("policy rejection: {status}"))
            } else {
                CollaboratorFailure::permanent(format!("policy rejection: {detail}"))
            }
        }
        ClientError::Status { status, .. } if *status == StatusCode::UNAUTHORIZED => {
            CollaboratorFailure::permanent("authority rejected the service's credentials")
        }
        _ => err.into_failure(),
    }
}

#[async_trait]
impl AuthorityClient for HttpAuthorityClient {
    async fn request_credential(
        &self,
        registration: RegistrationId,
        assertion: &IdentityAssertion,
    ) -> Result<CredentialReference, CollaboratorFailure> {
        let issued = self.issue(registration, assertion).await.map_err(|e| {
            tracing::debug!(
                registration_id = %registration,
                participant_did = %assertion.did,
                error = %e,
                "credential request failed"
            );
            classify(e)
        })?;
        CredentialReference::new(issued.credential_id).map_err(|_| {
            CollaboratorFailure::permanent("authority returned an empty credential id")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use dsreg_core::ParticipantDid;

    #[test]
    fn request_body_shape() {
        let mut assertion =
            IdentityAssertion::new(ParticipantDid::new("did:example:alice").unwrap(), Utc::now());
        assertion.verification_methods = vec!["did:example:alice#key-1".into()];
        let id = RegistrationId::new();
        let body = serde_json::to_value(CredentialRequest::new(id, &assertion)).unwrap();
        assert_eq!(body["registrationId"], id.as_uuid().to_string());
        assert_eq!(body["participantDid"], "did:example:alice");
        assert_eq!(body["verificationMethods"][0], "did:example:alice#key-1");
        assert!(body.get("identityHubUrl").is_none());
    }

    #[test]
    fn forbidden_is_policy_rejection() {
        let failure = classify(ClientError::Status {
            endpoint: "POST /api/v1/credentials".into(),
            status: StatusCode::FORBIDDEN,
            body: "participant region not admitted".into(),
        });
        assert!(!failure.is_transient());
        assert_eq!(failure.reason, "policy rejection: participant region not admitted");
    }

    #[test]
    fn debug_redacts_token() {
        let cfg = ClientConfig::new("http://r", "http://a", "secret-token").unwrap();
        let client = HttpAuthorityClient::new(&cfg).unwrap();
        assert!(!format!("{client:?}").contains("secret-token"));
    }
}
