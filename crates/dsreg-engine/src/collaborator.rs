//! External collaborators called by the state handlers.
//!
//! Both report a classified [`CollaboratorFailure`]; the engine retries or
//! fails purely on its [`FailureKind`](dsreg_core::FailureKind).

use async_trait::async_trait;
use dsreg_core::{
    CollaboratorFailure, CredentialReference, IdentityAssertion, ParticipantDid, RegistrationId,
};

/// Resolves a participant DID and confirms the participant controls it.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, did: &ParticipantDid) -> Result<IdentityAssertion, CollaboratorFailure>;
}

/// Requests a membership credential from the dataspace authority.
///
/// Every retry for one registration passes the same `registration` id, which
/// the authority can use to deduplicate issuance.
#[async_trait]
pub trait AuthorityClient: Send + Sync {
    async fn request_credential(
        &self,
        registration: RegistrationId,
        assertion: &IdentityAssertion,
    ) -> Result<CredentialReference, CollaboratorFailure>;
}
