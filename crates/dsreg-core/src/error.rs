//! # Error Types
//!
//! Validation errors for the core newtypes. Each downstream crate defines
//! its own `thiserror` enum and wraps [`ValidationError`] where inputs are
//! parsed.
//!
//! ## Design
//!
//! - Validation errors name the offending value and the rule it broke.
//! - State machine errors include the current state and the attempted
//!   target state (see `dsreg-state`).
//! - Collaborator failures are not errors of this crate: they are data
//!   (`CollaboratorFailure`) that the engine turns into entity state.

use thiserror::Error;

/// A domain value failed validation at construction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The DID string does not satisfy the DID syntax.
    #[error("invalid DID {did:?}: {reason}")]
    InvalidDid {
        /// The rejected input.
        did: String,
        /// Which rule was violated.
        reason: String,
    },

    /// A required value was empty.
    #[error("{0} must not be empty")]
    Empty(&'static str),
}
