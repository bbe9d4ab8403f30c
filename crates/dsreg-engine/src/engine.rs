//! # Registration Engine — Claim Loop
//!
//! Each tick claims up to `batch_size` due registrations, runs their state
//! handlers in parallel, and writes each result back with the version read
//! at claim time.
//!
//! ## Failure handling
//!
//! - A save conflict discards that entity's result. The next tick sees the
//!   winner's state. Nothing reaches the submitter.
//! - A store error on claim fails the tick. The loop logs it and waits the
//!   normal interval before trying again.
//! - A store error on save leaves the lease in place. The entity becomes
//!   claimable again once the lease expires.
//!
//! ## Pacing
//!
//! A full batch suggests more work is waiting, so the loop re-ticks
//! immediately. A partial or empty batch waits `tick_interval` or until
//! shutdown is signalled, whichever comes first.

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use tokio::sync::watch;
use tokio::task::JoinSet;

use dsreg_core::{Clock, RegistrationId, SystemClock};
use dsreg_state::{RegistrationEntity, RegistrationError, RegistrationState};

use crate::collaborator::{AuthorityClient, IdentityVerifier};
use crate::config::EngineConfig;
use crate::handler::{HandlerOutcome, StateHandlers};
use crate::listener::Listeners;
use crate::store::{RegistrationStore, SaveOutcome, StoreError};

/// Errors that abort a whole tick.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("claim failed: {0}")]
    Claim(#[from] StoreError),
}

/// What happened to one claimed entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntityResult {
    Advanced,
    RetryScheduled,
    Failed,
    Conflict,
    Skipped,
    Error,
}

/// Summary of one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Entities claimed this tick.
    pub claimed: usize,
    /// Entities that moved along the success path.
    pub advanced: usize,
    /// Entities deferred after a transient failure.
    pub retried: usize,
    /// Entities moved to `FAILED`.
    pub failed: usize,
    /// Results discarded because of a version conflict.
    pub conflicts: usize,
    /// Entities whose processing or save errored; they recover on lease expiry.
    pub errors: usize,
}

impl TickReport {
    fn record(&mut self, result: EntityResult) {
        match result {
            EntityResult::Advanced => self.advanced += 1,
            EntityResult::RetryScheduled => self.retried += 1,
            EntityResult::Failed => self.failed += 1,
            EntityResult::Conflict => self.conflicts += 1,
            EntityResult::Skipped => {}
            EntityResult::Error => self.errors += 1,
        }
    }
}

/// The registration state-machine engine.
///
/// Holds no entity state between ticks. Any number of engines may run
/// against the same store.
pub struct RegistrationEngine {
    store: Arc<dyn RegistrationStore>,
    verifier: Arc<dyn IdentityVerifier>,
    authority: Arc<dyn AuthorityClient>,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    listeners: Listeners,
}

impl RegistrationEngine {
    /// Create an engine on the system clock with the standard listeners.
    pub fn new(
        store: Arc<dyn RegistrationStore>,
        verifier: Arc<dyn IdentityVerifier>,
        authority: Arc<dyn AuthorityClient>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            verifier,
            authority,
            config,
            clock: Arc::new(SystemClock),
            listeners: Listeners::standard(),
        }
    }

    /// Read time from `clock` instead of the system clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the listener set.
    pub fn with_listeners(mut self, listeners: Listeners) -> Self {
        self.listeners = listeners;
        self
    }

    /// The engine's configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn handlers(&self) -> StateHandlers {
        StateHandlers::new(
            self.verifier.clone(),
            self.authority.clone(),
            self.config.retry_policy(),
            self.config.call_timeout,
            self.clock.clone(),
        )
    }

    /// Run a single tick: claim, process in parallel, save.
    pub async fn run_once(&self) -> Result<TickReport, EngineError> {
        let started = Instant::now();
        let claimed = self
            .store
            .claim_due(&self.config.worker_id, self.config.batch_size)
            .await?;

        let mut report = TickReport {
            claimed: claimed.len(),
            ..TickReport::default()
        };
        if claimed.is_empty() {
            return Ok(report);
        }
        counter!("dsreg_registrations_claimed_total").increment(claimed.len() as u64);
        tracing::debug!(
            worker_id = %self.config.worker_id,
            claimed = claimed.len(),
            "claimed due registrations"
        );

        let handlers = self.handlers();
        let mut tasks = JoinSet::new();
        for entity in claimed {
            let store = self.store.clone();
            let handlers = handlers.clone();
            let listeners = self.listeners.clone();
            tasks.spawn(process_one(store, handlers, listeners, entity));
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => report.record(result),
                Err(e) => {
                    tracing::error!(error = %e, "registration task panicked");
                    report.record(EntityResult::Error);
                }
            }
        }

        histogram!("dsreg_tick_duration_seconds").record(started.elapsed().as_secs_f64());
        Ok(report)
    }

    /// Run ticks until `shutdown` becomes `true` or its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            worker_id = %self.config.worker_id,
            batch_size = self.config.batch_size,
            tick_interval_ms = self.config.tick_interval.as_millis() as u64,
            "registration engine started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let full_batch = match self.run_once().await {
                Ok(report) => {
                    if report.claimed > 0 {
                        tracing::info!(
                            claimed = report.claimed,
                            advanced = report.advanced,
                            retried = report.retried,
                            failed = report.failed,
                            conflicts = report.conflicts,
                            errors = report.errors,
                            "tick complete"
                        );
                    }
                    report.claimed >= self.config.batch_size
                }
                Err(e) => {
                    counter!("dsreg_tick_errors_total").increment(1);
                    tracing::warn!(error = %e, "tick failed");
                    false
                }
            };

            if full_batch {
                tokio::task::yield_now().await;
                continue;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.tick_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::info!(worker_id = %self.config.worker_id, "registration engine stopped");
    }
}

async fn process_one(
    store: Arc<dyn RegistrationStore>,
    handlers: StateHandlers,
    listeners: Listeners,
    mut entity: RegistrationEntity,
) -> EntityResult {
    let id = entity.id;
    let from = entity.state;
    let expected_version = entity.version;

    let outcome = match handlers.handle(&mut entity).await {
        Ok(outcome) => outcome,
        Err(e) => {
            log_handler_error(id, from, &e);
            return EntityResult::Error;
        }
    };
    if !outcome.is_write() {
        return EntityResult::Skipped;
    }

    match store.save(&entity, expected_version).await {
        Ok(SaveOutcome::Saved { version }) => {
            entity.version = version;
            entity.lease = None;
            match outcome {
                HandlerOutcome::Advanced { from, .. } => {
                    listeners.transitioned(&entity, from);
                    EntityResult::Advanced
                }
                HandlerOutcome::Failed { from } => {
                    listeners.transitioned(&entity, from);
                    EntityResult::Failed
                }
                HandlerOutcome::RetryScheduled => {
                    listeners.retry_scheduled(&entity);
                    EntityResult::RetryScheduled
                }
                HandlerOutcome::Skipped => EntityResult::Skipped,
            }
        }
        Ok(SaveOutcome::Conflict) => {
            listeners.save_conflict(id, from);
            EntityResult::Conflict
        }
        Err(e) => {
            tracing::warn!(registration_id = %id, state = %from, error = %e, "save failed");
            EntityResult::Error
        }
    }
}

fn log_handler_error(id: RegistrationId, state: RegistrationState, error: &RegistrationError) {
    tracing::error!(
        registration_id = %id,
        state = %state,
        error = %error,
        "handler rejected claimed registration"
    );
}
