//! # dsreg-state — Registration Lifecycle State Machine
//!
//! Defines the persisted shape of a registration and the only legal ways it
//! may change.
//!
//! ## State Machine
//!
//! - **Registration** (`entity.rs`):
//!   `SUBMITTED → VERIFYING_IDENTITY → REQUESTING_CREDENTIAL → ONBOARDED`,
//!   with `FAILED` reachable from every non-terminal state.
//!
//! ## Invariants
//!
//! - State never regresses. `ONBOARDED` and `FAILED` are absorbing.
//! - `attempt_count` resets on every successful transition and is preserved
//!   on the way into `FAILED`.
//! - `credential_reference` is written exactly once, in the same mutation as
//!   the transition to `ONBOARDED`.
//!
//! The `version` and `lease` fields are carried here but owned by the store:
//! nothing in this crate bumps a version or writes a lease.

pub mod entity;

pub use entity::{
    ErrorDetail, ErrorKind, Lease, RegistrationEntity, RegistrationError, RegistrationState,
    RegistrationStatus, TransitionRecord,
};
