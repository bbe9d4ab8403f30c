//! # dsreg-engine — Registration State-Machine Engine
//!
//! Drives registrations from `SUBMITTED` to `ONBOARDED` or `FAILED`.
//!
//! ## Components
//!
//! - **Store contract** (`store.rs`): `RegistrationStore` with atomic
//!   `claim_due` and version-conditional `save`, plus an in-memory store.
//!
//! - **Retry policy** (`backoff.rs`): pure capped exponential backoff with
//!   an attempt budget.
//!
//! - **Handlers** (`handler.rs`): one per non-terminal state, dispatched by
//!   exhaustive match. Collaborator calls are bounded by `call_timeout`.
//!
//! - **Engine** (`engine.rs`): the claim → process → save loop, safe to run
//!   on any number of instances against one store.
//!
//! - **Service** (`service.rs`): submission with duplicate rejection, and
//!   status queries.
//!
//! - **Listeners** (`listener.rs`): post-commit hooks for logging and
//!   metrics.
//!
//! - **Config** (`config.rs`): defaults, YAML file, environment overrides.
//!
//! ## Concurrency
//!
//! Workers never cache entity state across ticks and never take blocking
//! locks on shared data. Contention is settled by the store: the claim
//! hands each due entity to one worker, and the conditional save rejects a
//! write based on a version that has since moved.

pub mod backoff;
pub mod collaborator;
pub mod config;
pub mod engine;
pub mod handler;
pub mod listener;
pub mod service;
pub mod store;

pub use backoff::{RetryDecision, RetryPolicy};
pub use collaborator::{AuthorityClient, IdentityVerifier};
pub use config::{ConfigError, EngineConfig};
pub use engine::{EngineError, RegistrationEngine, TickReport};
pub use handler::{HandlerOutcome, StateHandlers};
pub use listener::{Listeners, MetricsListener, RegistrationListener, TracingListener};
pub use service::{RegistrationService, ServiceError, SubmitRegistration, MAX_PAGE_SIZE};
pub use store::{due_since, InMemoryRegistrationStore, RegistrationStore, SaveOutcome, StoreError};
