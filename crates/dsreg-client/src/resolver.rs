//! # DID Resolution (Identity Verifier)
//!
//! Verifies a participant's DID by resolving it through a universal-resolver
//! compatible endpoint and checking the returned document.
//!
//! | Method | Path | Operation |
//! |--------|------|-----------|
//! | GET    | `/1.0/identifiers/{did}` | Resolve a DID document |
//!
//! ## Failure classification
//!
//! | Outcome | Kind | Reason |
//! |---------|------|--------|
//! | 404, 410 | permanent | `unresolvable document` |
//! | 400 | permanent | `invalid DID` |
//! | 408, 429, 5xx, transport error | transient | upstream message |
//! | document subject differs from the DID | permanent | `signature mismatch` |
//! | document lists no verification methods | permanent | `no verification methods` |
//!
//! The same documents supply the public keys that callers of the HTTP API
//! sign their bearer tokens with ([`HttpIdentityVerifier::public_keys`]).

use async_trait::async_trait;
use chrono::Utc;
use reqwest::StatusCode;
use serde::Deserialize;
use url::Url;

use dsreg_core::{CollaboratorFailure, IdentityAssertion, ParticipantDid};
use dsreg_engine::IdentityVerifier;

use crate::config::ClientConfig;
use crate::error::ClientError;

/// Service type advertising a participant's identity hub.
pub const IDENTITY_HUB_SERVICE_TYPE: &str = "IdentityHub";

// -- Types matching the resolver's response ----------------------------------

/// A DID document, as far as verification needs it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidDocument {
    pub id: String,
    #[serde(default)]
    pub verification_method: Vec<VerificationMethod>,
    #[serde(default)]
    pub service: Vec<ServiceEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationMethod {
    pub id: String,
    #[serde(rename = "type", default)]
    pub method_type: Option<String>,
    #[serde(default)]
    pub controller: Option<String>,
    /// Public key as a JWK, when the method publishes one.
    #[serde(default)]
    pub public_key_jwk: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceEntry {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub service_type: String,
    #[serde(default)]
    pub service_endpoint: serde_json::Value,
}

impl ServiceEntry {
    /// The first URL-like endpoint, whether given as a string, a list, or a map.
    pub fn endpoint(&self) -> Option<String> {
        match &self.service_endpoint {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Array(items) => items
                .iter()
                .find_map(|v| v.as_str().map(str::to_string)),
            serde_json::Value::Object(map) => map
                .values()
                .find_map(|v| v.as_str().map(str::to_string)),
            _ => None,
        }
    }
}

impl DidDocument {
    /// Extract a document from a resolution result. Accepts both the
    /// wrapped form (`{"didDocument": {...}}`) and a bare document.
    pub fn from_resolution(body: serde_json::Value) -> Result<Self, serde_json::Error> {
        match body {
            serde_json::Value::Object(mut map) if map.contains_key("didDocument") => {
                let doc = map.remove("didDocument").unwrap_or(serde_json::Value::Null);
                serde_json::from_value(doc)
            }
            other => serde_json::from_value(other),
        }
    }

    /// Check the document against the DID it was resolved for.
    pub fn verify(&self, did: &ParticipantDid) -> Result<IdentityAssertion, CollaboratorFailure> {
        if self.id != did.as_str() {
            return Err(CollaboratorFailure::permanent(format!(
                "signature mismatch: document subject {} does not match {}",
                self.id, did
            )));
        }
        if self.verification_method.is_empty() {
            return Err(CollaboratorFailure::permanent("no verification methods"));
        }

        let mut assertion = IdentityAssertion::new(did.clone(), Utc::now());
        assertion.verification_methods = self
            .verification_method
            .iter()
            .map(|m| m.id.clone())
            .collect();
        assertion.identity_hub_url = self
            .service
            .iter()
            .filter(|s| s.service_type == IDENTITY_HUB_SERVICE_TYPE)
            .find_map(ServiceEntry::endpoint);
        Ok(assertion)
    }

    /// The JWKs published by the document's verification methods.
    pub fn public_keys(
        &self,
        did: &ParticipantDid,
    ) -> Result<Vec<serde_json::Value>, CollaboratorFailure> {
        if self.id != did.as_str() {
            return Err(CollaboratorFailure::permanent(format!(
                "document subject {} does not match {}",
                self.id, did
            )));
        }
        let keys: Vec<_> = self
            .verification_method
            .iter()
            .filter_map(|m| m.public_key_jwk.clone())
            .collect();
        if keys.is_empty() {
            return Err(CollaboratorFailure::permanent("no public keys"));
        }
        Ok(keys)
    }
}

// -- Client ------------------------------------------------------------------

/// Identity verifier backed by a universal resolver.
#[derive(Debug, Clone)]
pub struct HttpIdentityVerifier {
    http: reqwest::Client,
    base_url: Url,
}

impl HttpIdentityVerifier {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        Ok(Self::with_client(
            crate::build_http(config)?,
            config.resolver_url.clone(),
        ))
    }

    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    /// Fetch and decode the DID document.
    ///
    /// Calls `GET {resolver_url}/1.0/identifiers/{did}`.
    pub async fn resolve(&self, did: &ParticipantDid) -> Result<DidDocument, ClientError> {
        let endpoint = format!("GET /1.0/identifiers/{did}");
        let url = crate::join(&self.base_url, &format!("1.0/identifiers/{did}"));

        let resp = self
            .http
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/did+ld+json, application/json")
            .send()
            .await
            .map_err(|e| ClientError::Http {
                endpoint: endpoint.clone(),
                source: e,
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                endpoint,
                status,
                body,
            });
        }

        let body: serde_json::Value = resp.json().await.map_err(|e| ClientError::Decode {
            endpoint: endpoint.clone(),
            reason: e.to_string(),
        })?;
        DidDocument::from_resolution(body).map_err(|e| ClientError::Decode {
            endpoint,
            reason: e.to_string(),
        })
    }

    /// Resolve `did` and return the public keys it publishes.
    pub async fn public_keys(
        &self,
        did: &ParticipantDid,
    ) -> Result<Vec<serde_json::Value>, CollaboratorFailure> {
        let document = self.resolve(did).await.map_err(|e| {
            tracing::debug!(participant_did = %did, error = %e, "public key resolution failed");
            classify(e)
        })?;
        document.public_keys(did)
    }
}

fn classify(err: ClientError) -> CollaboratorFailure {
    match &err {
        ClientError::Status { status, .. }
            if *status == StatusCode::NOT_FOUND || *status == StatusCode::GONE =>
        {
            CollaboratorFailure::permanent("unresolvable document")
        }
        ClientError::Status { status, .. } if *status == StatusCode::BAD_REQUEST => {
            CollaboratorFailure::permanent("invalid DID")
        }
        ClientError::Decode { reason, .. } => {
            CollaboratorFailure::permanent(format!("unresolvable document: {reason}"))
        }
        _ => err.into_failure(),
    }
}

#[async_trait]
impl IdentityVerifier for HttpIdentityVerifier {
    async fn verify(&self, did: &ParticipantDid) -> Result<IdentityAssertion, CollaboratorFailure> {
        let document = self.resolve(did).await.map_err(|e| {
            tracing::debug!(participant_did = %did, error = %e, "DID resolution failed");
            classify(e)
        })?;
        document.verify(did)
    }
}
