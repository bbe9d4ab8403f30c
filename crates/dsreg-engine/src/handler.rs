//! # State Handlers
//!
//! One handler per non-terminal state, selected by an exhaustive `match` on
//! [`RegistrationState`]. A handler mutates a claimed entity in memory and
//! reports what it did; persisting the result is the engine's job.
//!
//! | State                   | Action                     | Success                   |
//! |-------------------------|----------------------------|---------------------------|
//! | `SUBMITTED`             | none                       | `VERIFYING_IDENTITY`      |
//! | `VERIFYING_IDENTITY`    | `IdentityVerifier::verify` | `REQUESTING_CREDENTIAL`   |
//! | `REQUESTING_CREDENTIAL` | `AuthorityClient::request_credential` | `ONBOARDED`    |
//!
//! A transient failure keeps the state and defers the entity by the retry
//! policy. A permanent failure moves it to `FAILED`. Before any collaborator
//! is called, an entity whose next attempt would exceed the budget is failed
//! with "retries exhausted".

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dsreg_core::{add_duration, Clock, CollaboratorFailure, FailureKind};
use dsreg_state::{ErrorDetail, RegistrationEntity, RegistrationError, RegistrationState};

use crate::backoff::RetryPolicy;
use crate::collaborator::{AuthorityClient, IdentityVerifier};

/// What a handler did to an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// Moved along the success path.
    Advanced {
        from: RegistrationState,
        to: RegistrationState,
    },
    /// Stayed in place after a transient failure.
    RetryScheduled,
    /// Moved to `FAILED` (permanent failure or exhausted retries).
    Failed { from: RegistrationState },
    /// The entity was terminal; nothing to do.
    Skipped,
}

impl HandlerOutcome {
    /// Whether the entity changed and must be saved.
    pub fn is_write(&self) -> bool {
        !matches!(self, Self::Skipped)
    }
}

/// Dispatches claimed entities to their state's handler.
#[derive(Clone)]
pub struct StateHandlers {
    verifier: Arc<dyn IdentityVerifier>,
    authority: Arc<dyn AuthorityClient>,
    policy: RetryPolicy,
    call_timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl StateHandlers {
    pub fn new(
        verifier: Arc<dyn IdentityVerifier>,
        authority: Arc<dyn AuthorityClient>,
        policy: RetryPolicy,
        call_timeout: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            verifier,
            authority,
            policy,
            call_timeout,
            clock,
        }
    }

    /// Run one processing step on `entity`.
    pub async fn handle(
        &self,
        entity: &mut RegistrationEntity,
    ) -> Result<HandlerOutcome, RegistrationError> {
        let from = entity.state;
        if from.is_terminal() {
            return Ok(HandlerOutcome::Skipped);
        }

        let attempt = entity.attempt_count.saturating_add(1);
        if requires_collaborator(from) && !self.policy.permits(attempt) {
            entity.exhaust(self.clock.now())?;
            return Ok(HandlerOutcome::Failed { from });
        }

        match from {
            RegistrationState::Submitted => {
                entity.advance(RegistrationState::VerifyingIdentity, self.clock.now())?;
            }
            RegistrationState::VerifyingIdentity => {
                let result = self.call(self.verifier.verify(&entity.participant_did)).await;
                match result {
                    Ok(assertion) => entity.identity_verified(assertion, self.clock.now())?,
                    Err(failure) => return self.on_failure(entity, failure),
                }
            }
            RegistrationState::RequestingCredential => {
                let Some(assertion) = entity.identity_assertion.clone() else {
                    let failure = CollaboratorFailure::permanent("identity assertion missing");
                    return self.on_failure(entity, failure);
                };
                let result = self
                    .call(self.authority.request_credential(entity.id, &assertion))
                    .await;
                match result {
                    Ok(credential) => entity.onboard(credential, self.clock.now())?,
                    Err(failure) => return self.on_failure(entity, failure),
                }
            }
            RegistrationState::Onboarded | RegistrationState::Failed => {
                return Ok(HandlerOutcome::Skipped);
            }
        }

        Ok(HandlerOutcome::Advanced {
            from,
            to: entity.state,
        })
    }

    async fn call<T, F>(&self, fut: F) -> Result<T, CollaboratorFailure>
    where
        F: Future<Output = Result<T, CollaboratorFailure>>,
    {
        match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(CollaboratorFailure::transient(format!(
                "call timed out after {}ms",
                self.call_timeout.as_millis()
            ))),
        }
    }

    fn on_failure(
        &self,
        entity: &mut RegistrationEntity,
        failure: CollaboratorFailure,
    ) -> Result<HandlerOutcome, RegistrationError> {
        let from = entity.state;
        let now = self.clock.now();
        let detail = ErrorDetail::new(failure.kind, failure.reason);
        match failure.kind {
            FailureKind::Permanent => {
                entity.reject(detail, now)?;
                Ok(HandlerOutcome::Failed { from })
            }
            FailureKind::Transient => {
                // The budget was checked before the call; exhaustion is
                // decided on the next claim.
                let delay = self.policy.delay(entity.attempt_count.saturating_add(1));
                entity.schedule_retry(detail, add_duration(now, delay))?;
                Ok(HandlerOutcome::RetryScheduled)
            }
        }
    }
}

fn requires_collaborator(state: RegistrationState) -> bool {
    matches!(
        state,
        RegistrationState::VerifyingIdentity | RegistrationState::RequestingCredential
    )
}
