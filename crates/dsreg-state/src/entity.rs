//! # Registration Lifecycle State Machine
//!
//! Models the lifecycle of a participant registration from submission to
//! onboarding.
//!
//! ## States
//!
//! ```text
//! Submitted ──▶ VerifyingIdentity ──▶ RequestingCredential ──▶ Onboarded (terminal)
//!     │                 │                      │
//!     └─────────────────┴──────────────────────┴──────▶ Failed (terminal)
//! ```
//!
//! ## Design Decision
//!
//! The lifecycle uses an enum with validated transitions rather than
//! typestate types. Entities are loaded from a shared store, claimed by
//! whichever worker wins the race, and dispatched on their runtime state,
//! so the state is inherently a runtime value. Transitions return `Result`
//! and reject regressions, skips, and any move out of a terminal state.
//!
//! Every mutation that the engine persists (`state`, `attempt_count`,
//! `next_attempt_at`, `error_detail`, `credential_reference`) happens through
//! one of the methods below, so a single conditional write always carries a
//! consistent combination of fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use dsreg_core::{
    CredentialReference, FailureKind, IdentityAssertion, ParticipantDid, RegistrationId, WorkerId,
};

// ─── Registration State ─────────────────────────────────────────────

/// The lifecycle state of a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegistrationState {
    /// Submission accepted, nothing verified yet.
    Submitted,
    /// Resolving and validating the participant's DID document.
    VerifyingIdentity,
    /// Requesting a membership credential from the dataspace authority.
    RequestingCredential,
    /// Credential issued, participant is a member (terminal).
    Onboarded,
    /// Registration rejected or abandoned (terminal).
    Failed,
}

impl RegistrationState {
    /// All states, in lifecycle order.
    pub const ALL: [RegistrationState; 5] = [
        Self::Submitted,
        Self::VerifyingIdentity,
        Self::RequestingCredential,
        Self::Onboarded,
        Self::Failed,
    ];

    /// Whether this state is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Onboarded | Self::Failed)
    }

    /// The next state on the success path, if any.
    pub fn next(&self) -> Option<RegistrationState> {
        match self {
            Self::Submitted => Some(Self::VerifyingIdentity),
            Self::VerifyingIdentity => Some(Self::RequestingCredential),
            Self::RequestingCredential => Some(Self::Onboarded),
            Self::Onboarded | Self::Failed => None,
        }
    }

    /// Position along the lifecycle. `Failed` ranks after every other
    /// state so that "never regresses" is a plain `<=` comparison.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Submitted => 0,
            Self::VerifyingIdentity => 1,
            Self::RequestingCredential => 2,
            Self::Onboarded => 3,
            Self::Failed => 4,
        }
    }

    /// Whether moving from `self` to `to` is a legal transition.
    pub fn can_transition_to(&self, to: RegistrationState) -> bool {
        if self.is_terminal() {
            return false;
        }
        to == Self::Failed || self.next() == Some(to)
    }

    /// Return the string representation of this state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "SUBMITTED",
            Self::VerifyingIdentity => "VERIFYING_IDENTITY",
            Self::RequestingCredential => "REQUESTING_CREDENTIAL",
            Self::Onboarded => "ONBOARDED",
            Self::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for RegistrationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RegistrationState {
    type Err = RegistrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| RegistrationError::UnknownState(s.to_string()))
    }
}

// ─── Errors ──────────────────────────────────────────────────────────

/// Errors that can occur during registration lifecycle transitions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    /// Attempted transition is not valid from the current state.
    #[error("invalid registration transition: {from} -> {to}")]
    InvalidTransition {
        /// Current state.
        from: RegistrationState,
        /// Attempted target state.
        to: RegistrationState,
    },

    /// Registration is in a terminal state.
    #[error("{id} is {state} and cannot change")]
    Terminal {
        /// The registration identifier.
        id: RegistrationId,
        /// The terminal state it is in.
        state: RegistrationState,
    },

    /// A credential reference was already recorded.
    #[error("{id} already holds a credential reference")]
    CredentialAlreadySet {
        /// The registration identifier.
        id: RegistrationId,
    },

    /// A state name could not be parsed.
    #[error("unknown registration state: {0:?}")]
    UnknownState(String),
}

// ─── Failure Detail ──────────────────────────────────────────────────

/// Why the last attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A retryable collaborator failure; the entity will be retried.
    Transient,
    /// A collaborator rejected the registration outright.
    Permanent,
    /// Transient failures exceeded the retry budget.
    RetriesExhausted,
}

impl ErrorKind {
    /// Return the string representation of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Permanent => "permanent",
            Self::RetriesExhausted => "retries_exhausted",
        }
    }
}

impl From<FailureKind> for ErrorKind {
    fn from(kind: FailureKind) -> Self {
        match kind {
            FailureKind::Transient => Self::Transient,
            FailureKind::Permanent => Self::Permanent,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last failure recorded on a registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Failure classification.
    pub kind: ErrorKind,
    /// Human-readable reason.
    pub message: String,
    /// For exhausted retries: the last transient reason seen.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl ErrorDetail {
    /// Reason recorded when the retry budget runs out.
    pub const RETRIES_EXHAUSTED: &'static str = "retries exhausted";

    /// Build a detail from a collaborator failure.
    pub fn new(kind: impl Into<ErrorKind>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            cause: None,
        }
    }

    /// Detail for a registration whose retries are exhausted, keeping the
    /// last transient message as the cause.
    pub fn retries_exhausted(last: Option<&ErrorDetail>) -> Self {
        Self {
            kind: ErrorKind::RetriesExhausted,
            message: Self::RETRIES_EXHAUSTED.to_string(),
            cause: last.map(|d| d.message.clone()),
        }
    }
}

impl std::fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "{} ({}; last error: {})", self.message, self.kind, cause),
            None => write!(f, "{} ({})", self.message, self.kind),
        }
    }
}

// ─── Lease & Transition Log ──────────────────────────────────────────

/// A worker's time-bounded claim on a registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    /// The worker holding the claim.
    pub owner: WorkerId,
    /// When the claim lapses and the entity becomes reclaimable.
    pub expires_at: DateTime<Utc>,
}

impl Lease {
    /// Whether the lease has lapsed at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Record of a registration state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    /// State before the transition.
    pub from_state: RegistrationState,
    /// State after the transition.
    pub to_state: RegistrationState,
    /// When the transition occurred.
    pub at: DateTime<Utc>,
    /// Failure reason, for transitions into `FAILED`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

// ─── Registration Entity ─────────────────────────────────────────────

/// A participant registration and its processing bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationEntity {
    /// Unique registration identifier.
    pub id: RegistrationId,
    /// The DID the participant claims to control.
    pub participant_did: ParticipantDid,
    /// Connector endpoint supplied at submission.
    #[serde(default)]
    pub endpoint_url: Option<String>,
    /// Dataspace protocols the participant's connector supports.
    #[serde(default)]
    pub supported_protocols: Vec<String>,
    /// Current lifecycle state.
    pub state: RegistrationState,
    /// When the entity last changed state.
    pub state_timestamp: DateTime<Utc>,
    /// Processing attempts made in the current state.
    pub attempt_count: u32,
    /// Earliest time the entity may be claimed again; `None` means now.
    pub next_attempt_at: Option<DateTime<Utc>>,
    /// Last failure, kept on `FAILED` entities and while retrying.
    pub error_detail: Option<ErrorDetail>,
    /// Optimistic-concurrency token, bumped by every store write.
    pub version: u64,
    /// Result of identity verification, recorded on entry to
    /// `REQUESTING_CREDENTIAL` and presented to the authority.
    #[serde(default)]
    pub identity_assertion: Option<IdentityAssertion>,
    /// Handle to the issued membership credential.
    pub credential_reference: Option<CredentialReference>,
    /// The current claim, if any.
    pub lease: Option<Lease>,
    /// When the registration was submitted.
    pub created_at: DateTime<Utc>,
    /// Ordered log of all state transitions.
    #[serde(default)]
    pub transitions: Vec<TransitionRecord>,
}

impl RegistrationEntity {
    /// Create a new registration in the `SUBMITTED` state.
    pub fn new(participant_did: ParticipantDid, now: DateTime<Utc>) -> Self {
        Self {
            id: RegistrationId::new(),
            participant_did,
            endpoint_url: None,
            supported_protocols: Vec::new(),
            state: RegistrationState::Submitted,
            state_timestamp: now,
            attempt_count: 0,
            next_attempt_at: None,
            error_detail: None,
            version: 0,
            identity_assertion: None,
            credential_reference: None,
            lease: None,
            created_at: now,
            transitions: Vec::new(),
        }
    }

    /// Builder: set the connector endpoint.
    pub fn with_endpoint_url(mut self, url: impl Into<String>) -> Self {
        self.endpoint_url = Some(url.into());
        self
    }

    /// Builder: set the supported protocols.
    pub fn with_supported_protocols(mut self, protocols: Vec<String>) -> Self {
        self.supported_protocols = protocols;
        self
    }

    /// Whether the engine should process this entity at `now`.
    ///
    /// Due means non-terminal and either never deferred or deferred to a
    /// time that has passed.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.state.is_terminal() && self.next_attempt_at.map_or(true, |at| at <= now)
    }

    /// Whether a worker may claim this entity at `now`: due, and not held
    /// under an unexpired lease.
    pub fn is_claimable(&self, now: DateTime<Utc>) -> bool {
        self.is_due(now) && self.lease.as_ref().map_or(true, |l| l.is_expired(now))
    }

    /// Whether the registration is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Advance along the success path (e.g. SUBMITTED → VERIFYING_IDENTITY).
    ///
    /// Resets the attempt counter and clears any retry schedule and stale
    /// transient error.
    pub fn advance(
        &mut self,
        to: RegistrationState,
        now: DateTime<Utc>,
    ) -> Result<(), RegistrationError> {
        if to == RegistrationState::Onboarded || to == RegistrationState::Failed {
            // Terminal targets carry extra data; use `onboard` / `fail`.
            return Err(RegistrationError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        self.require_transition(to)?;
        self.do_transition(to, now, None);
        self.attempt_count = 0;
        self.next_attempt_at = None;
        self.error_detail = None;
        Ok(())
    }

    /// Record a verified identity and move on to requesting a credential
    /// (VERIFYING_IDENTITY → REQUESTING_CREDENTIAL).
    pub fn identity_verified(
        &mut self,
        assertion: IdentityAssertion,
        now: DateTime<Utc>,
    ) -> Result<(), RegistrationError> {
        if self.state != RegistrationState::VerifyingIdentity {
            return Err(RegistrationError::InvalidTransition {
                from: self.state,
                to: RegistrationState::RequestingCredential,
            });
        }
        self.advance(RegistrationState::RequestingCredential, now)?;
        self.identity_assertion = Some(assertion);
        Ok(())
    }

    /// Complete onboarding (REQUESTING_CREDENTIAL → ONBOARDED), recording
    /// the issued credential in the same mutation as the state change.
    pub fn onboard(
        &mut self,
        credential: CredentialReference,
        now: DateTime<Utc>,
    ) -> Result<(), RegistrationError> {
        self.require_transition(RegistrationState::Onboarded)?;
        if self.credential_reference.is_some() {
            return Err(RegistrationError::CredentialAlreadySet { id: self.id });
        }
        self.do_transition(RegistrationState::Onboarded, now, None);
        self.credential_reference = Some(credential);
        self.attempt_count = 0;
        self.next_attempt_at = None;
        self.error_detail = None;
        Ok(())
    }

    /// Record a transient failure: stay in the current state, count the
    /// attempt, and defer the next claim until `retry_at`.
    pub fn schedule_retry(
        &mut self,
        detail: ErrorDetail,
        retry_at: DateTime<Utc>,
    ) -> Result<(), RegistrationError> {
        self.require_active()?;
        self.attempt_count = self.attempt_count.saturating_add(1);
        self.next_attempt_at = Some(retry_at);
        self.error_detail = Some(detail);
        Ok(())
    }

    /// Fail after a permanent collaborator rejection. The rejected call
    /// counts as an attempt.
    pub fn reject(
        &mut self,
        detail: ErrorDetail,
        now: DateTime<Utc>,
    ) -> Result<(), RegistrationError> {
        self.require_active()?;
        self.attempt_count = self.attempt_count.saturating_add(1);
        self.fail(detail, now)
    }

    /// Fail because the retry budget is spent. No attempt is made, so the
    /// attempt counter is left as is.
    pub fn exhaust(&mut self, now: DateTime<Utc>) -> Result<(), RegistrationError> {
        self.require_active()?;
        let detail = ErrorDetail::retries_exhausted(self.error_detail.as_ref());
        self.fail(detail, now)
    }

    /// A read-only projection for status queries.
    pub fn status(&self) -> RegistrationStatus {
        RegistrationStatus {
            id: self.id,
            participant_did: self.participant_did.clone(),
            state: self.state,
            state_timestamp: self.state_timestamp,
            attempt_count: self.attempt_count,
            next_attempt_at: self.next_attempt_at,
            error_detail: self.error_detail.clone(),
            credential_reference: self.credential_reference.clone(),
        }
    }

    fn fail(&mut self, detail: ErrorDetail, now: DateTime<Utc>) -> Result<(), RegistrationError> {
        self.require_transition(RegistrationState::Failed)?;
        let reason = detail.message.clone();
        self.do_transition(RegistrationState::Failed, now, Some(reason));
        self.next_attempt_at = None;
        self.error_detail = Some(detail);
        Ok(())
    }

    fn require_active(&self) -> Result<(), RegistrationError> {
        if self.state.is_terminal() {
            return Err(RegistrationError::Terminal {
                id: self.id,
                state: self.state,
            });
        }
        Ok(())
    }

    fn require_transition(&self, to: RegistrationState) -> Result<(), RegistrationError> {
        self.require_active()?;
        if !self.state.can_transition_to(to) {
            return Err(RegistrationError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        Ok(())
    }

    fn do_transition(&mut self, to: RegistrationState, now: DateTime<Utc>, reason: Option<String>) {
        self.transitions.push(TransitionRecord {
            from_state: self.state,
            to_state: to,
            at: now,
            reason,
        });
        self.state = to;
        self.state_timestamp = now;
    }
}

// ─── Status Projection ───────────────────────────────────────────────

/// What a status query returns: the committed state of a registration
/// without its processing internals (lease, version, transition log).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationStatus {
    pub id: RegistrationId,
    pub participant_did: ParticipantDid,
    pub state: RegistrationState,
    pub state_timestamp: DateTime<Utc>,
    pub attempt_count: u32,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub error_detail: Option<ErrorDetail>,
    pub credential_reference: Option<CredentialReference>,
}

// ─── Tests ───────────────────────────────────────────────────────────
