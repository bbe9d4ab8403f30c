//! # dsreg-core — Foundational Types for the Registration Service
//!
//! The leaf crate of the workspace. It defines the primitives every other
//! crate builds on: validated identifier newtypes, the collaborator failure
//! taxonomy, and the injectable clock.
//!
//! ## Key Design Principles
//!
//! 1. **Newtype wrappers for domain primitives.** `RegistrationId`,
//!    `ParticipantDid`, `WorkerId`, `CredentialReference`. No bare strings
//!    for identifiers. `ParticipantDid` is validated on construction and on
//!    deserialization.
//!
//! 2. **Classified failures.** Collaborators report `CollaboratorFailure`
//!    with an explicit `FailureKind`. Retry decisions are made from the kind,
//!    never from message text.
//!
//! 3. **Time is injected.** Everything that compares against "now" takes a
//!    `Clock`. `ManualClock` makes lease expiry and backoff deterministic
//!    under test.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `dsreg-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod error;
pub mod identity;
pub mod temporal;
pub mod verification;

// Re-export primary types for ergonomic imports.
pub use error::ValidationError;
pub use identity::{CredentialReference, ParticipantDid, RegistrationId, WorkerId};
pub use temporal::{add_duration, Clock, ManualClock, SystemClock};
pub use verification::{CollaboratorFailure, FailureKind, IdentityAssertion};
