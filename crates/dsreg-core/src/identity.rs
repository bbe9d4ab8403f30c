//! # Domain Identity Newtypes
//!
//! Newtype wrappers for the identifiers that flow through the registration
//! service. A `RegistrationId` cannot be passed where a `WorkerId` is
//! expected, and a `ParticipantDid` is only constructible from a string that
//! satisfies the W3C DID syntax.
//!
//! ## DID Syntax
//!
//! ```text
//! did = "did:" method-name ":" method-specific-id
//! method-name = 1*( %x61-7A / DIGIT )
//! method-specific-id = *( *idchar ":" ) 1*idchar
//! idchar = ALPHA / DIGIT / "." / "-" / "_" / pct-encoded
//! ```
//!
//! Validation is syntactic only. Resolving the DID document and checking its
//! proofs is the job of the identity verifier.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Maximum accepted length of a DID string.
pub const MAX_DID_LENGTH: usize = 2048;

/// Unique identifier for a registration entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegistrationId(pub Uuid);

impl RegistrationId {
    /// Generate a new random registration identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Access the inner UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RegistrationId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for RegistrationId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "registration:{}", self.0)
    }
}

/// A syntactically valid decentralized identifier claimed by a participant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ParticipantDid(String);

impl ParticipantDid {
    /// Parse and validate a DID string.
    ///
    /// Leading and trailing whitespace is trimmed before validation.
    pub fn new(did: impl Into<String>) -> Result<Self, ValidationError> {
        let did = did.into().trim().to_string();
        validate_did(&did)?;
        Ok(Self(did))
    }

    /// The DID method name (e.g. `web` for `did:web:example.com`).
    pub fn method(&self) -> &str {
        // Validated on construction: at least "did:<method>:<id>".
        self.0.split(':').nth(1).unwrap_or_default()
    }

    /// The method-specific identifier (everything after the method name).
    pub fn method_specific_id(&self) -> &str {
        let prefix_len = "did:".len() + self.method().len() + 1;
        &self.0[prefix_len..]
    }

    /// Return the DID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ParticipantDid {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ParticipantDid> for String {
    fn from(did: ParticipantDid) -> Self {
        did.0
    }
}

impl std::fmt::Display for ParticipantDid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn validate_did(did: &str) -> Result<(), ValidationError> {
    let invalid = |reason: &str| ValidationError::InvalidDid {
        did: did.to_string(),
        reason: reason.to_string(),
    };

    if did.is_empty() {
        return Err(invalid("DID must not be empty"));
    }
    if did.len() > MAX_DID_LENGTH {
        return Err(invalid("DID exceeds maximum length"));
    }

    let rest = did
        .strip_prefix("did:")
        .ok_or_else(|| invalid("DID must start with \"did:\""))?;
    let (method, specific_id) = rest
        .split_once(':')
        .ok_or_else(|| invalid("DID must contain a method-specific identifier"))?;

    if method.is_empty() {
        return Err(invalid("DID method must not be empty"));
    }
    if !method
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
    {
        return Err(invalid("DID method must be lowercase alphanumeric"));
    }
    if specific_id.is_empty() || specific_id.ends_with(':') {
        return Err(invalid("method-specific identifier must not be empty"));
    }
    if !specific_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ':' | '%'))
    {
        return Err(invalid("method-specific identifier contains invalid characters"));
    }

    Ok(())
}

/// Identifier of an engine worker holding claims on registration entities.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(String);

impl WorkerId {
    /// Create a worker identifier from an explicit name.
    pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into().trim().to_string();
        if id.is_empty() {
            return Err(ValidationError::Empty("worker id"));
        }
        Ok(Self(id))
    }

    /// Generate a unique worker identifier for this process.
    pub fn generate() -> Self {
        Self(format!("worker-{}", Uuid::new_v4()))
    }

    /// Return the worker id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque handle to a membership credential issued by the dataspace authority.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CredentialReference(String);

impl CredentialReference {
    /// Wrap a credential handle. Empty handles are rejected.
    pub fn new(reference: impl Into<String>) -> Result<Self, ValidationError> {
        let reference = reference.into();
        if reference.trim().is_empty() {
            return Err(ValidationError::Empty("credential reference"));
        }
        Ok(Self(reference))
    }

    /// Return the handle as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CredentialReference {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CredentialReference> for String {
    fn from(reference: CredentialReference) -> Self {
        reference.0
    }
}

impl std::fmt::Display for CredentialReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
