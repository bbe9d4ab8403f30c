//! # Verification Results
//!
//! Types exchanged with the external collaborators: the identity assertion
//! produced by a successful DID verification, and the failure taxonomy every
//! collaborator reports with.
//!
//! Collaborators classify their own failures. The engine never inspects a
//! message to decide whether a failure is worth retrying; it only reads
//! [`FailureKind`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::ParticipantDid;

/// Whether a collaborator failure may succeed on a later attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Network timeout, temporary unavailability, rate limiting.
    Transient,
    /// Invalid DID document, signature mismatch, policy rejection.
    Permanent,
}

impl FailureKind {
    /// Return the string representation of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Permanent => "permanent",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure reported by the identity verifier or the authority client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind} failure: {reason}")]
pub struct CollaboratorFailure {
    /// Transient or permanent.
    pub kind: FailureKind,
    /// Human-readable reason, surfaced to operators on terminal failure.
    pub reason: String,
}

impl CollaboratorFailure {
    /// A failure that may succeed if retried.
    pub fn transient(reason: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Transient,
            reason: reason.into(),
        }
    }

    /// A failure that will never succeed for this input.
    pub fn permanent(reason: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Permanent,
            reason: reason.into(),
        }
    }

    /// Whether the failure is transient.
    pub fn is_transient(&self) -> bool {
        self.kind == FailureKind::Transient
    }
}

/// Proof that a participant's DID resolved to a valid document it controls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityAssertion {
    /// The verified DID.
    pub did: ParticipantDid,
    /// Ids of the verification methods listed in the DID document.
    #[serde(default)]
    pub verification_methods: Vec<String>,
    /// Identity hub endpoint advertised in the DID document, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_hub_url: Option<String>,
    /// When the verification completed.
    pub verified_at: DateTime<Utc>,
}

impl IdentityAssertion {
    /// Create an assertion with no verification-method detail.
    pub fn new(did: ParticipantDid, verified_at: DateTime<Utc>) -> Self {
        Self {
            did,
            verification_methods: Vec::new(),
            identity_hub_url: None,
            verified_at,
        }
    }
}
