//! # Registration Listeners
//!
//! Observers notified after a registration write has committed. Every hook
//! has a no-op default, so a listener implements only the events it cares
//! about. Listeners are never called for writes that lost a version race,
//! except through [`RegistrationListener::on_save_conflict`].
//!
//! Two listeners ship with the crate:
//!
//! - [`TracingListener`] logs lifecycle events.
//! - [`MetricsListener`] records counters through the `metrics` facade.

use std::sync::Arc;

use dsreg_core::RegistrationId;
use dsreg_state::{RegistrationEntity, RegistrationState};
use metrics::counter;

/// Lifecycle observer.
pub trait RegistrationListener: Send + Sync {
    /// A registration was submitted.
    fn on_created(&self, _entity: &RegistrationEntity) {}

    /// A registration changed state, including transitions into `FAILED`.
    fn on_transition(&self, _entity: &RegistrationEntity, _from: RegistrationState) {}

    /// A transient failure deferred the registration.
    fn on_retry_scheduled(&self, _entity: &RegistrationEntity) {}

    /// A registration reached `FAILED`.
    fn on_failed(&self, _entity: &RegistrationEntity) {}

    /// A processed result was discarded because another writer got there first.
    fn on_save_conflict(&self, _id: RegistrationId, _state: RegistrationState) {}
}

/// Fan-out over a set of listeners.
#[derive(Clone, Default)]
pub struct Listeners(Vec<Arc<dyn RegistrationListener>>);

impl std::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Listeners").field(&self.0.len()).finish()
    }
}

impl Listeners {
    /// The listeners used by the service binary.
    pub fn standard() -> Self {
        Self(vec![Arc::new(TracingListener), Arc::new(MetricsListener)])
    }

    /// Register another listener.
    pub fn push(&mut self, listener: Arc<dyn RegistrationListener>) {
        self.0.push(listener);
    }

    pub fn created(&self, entity: &RegistrationEntity) {
        self.0.iter().for_each(|l| l.on_created(entity));
    }

    pub fn transitioned(&self, entity: &RegistrationEntity, from: RegistrationState) {
        self.0.iter().for_each(|l| l.on_transition(entity, from));
        if entity.state == RegistrationState::Failed {
            self.0.iter().for_each(|l| l.on_failed(entity));
        }
    }

    pub fn retry_scheduled(&self, entity: &RegistrationEntity) {
        self.0.iter().for_each(|l| l.on_retry_scheduled(entity));
    }

    pub fn save_conflict(&self, id: RegistrationId, state: RegistrationState) {
        self.0.iter().for_each(|l| l.on_save_conflict(id, state));
    }
}

// ─── Tracing ─────────────────────────────────────────────────────────

/// Logs lifecycle events with structured fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingListener;

impl RegistrationListener for TracingListener {
    fn on_created(&self, entity: &RegistrationEntity) {
        tracing::info!(
            registration_id = %entity.id,
            participant_did = %entity.participant_did,
            "registration submitted"
        );
    }

    fn on_transition(&self, entity: &RegistrationEntity, from: RegistrationState) {
        tracing::info!(
            registration_id = %entity.id,
            participant_did = %entity.participant_did,
            from = %from,
            to = %entity.state,
            "registration transitioned"
        );
    }

    fn on_retry_scheduled(&self, entity: &RegistrationEntity) {
        tracing::warn!(
            registration_id = %entity.id,
            state = %entity.state,
            attempt = entity.attempt_count,
            next_attempt_at = ?entity.next_attempt_at,
            error = ?entity.error_detail.as_ref().map(|d| d.message.as_str()),
            "transient failure, retry scheduled"
        );
    }

    fn on_failed(&self, entity: &RegistrationEntity) {
        let reason = entity
            .error_detail
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();
        tracing::info!(
            registration_id = %entity.id,
            participant_did = %entity.participant_did,
            attempt = entity.attempt_count,
            reason = %reason,
            "registration failed"
        );
    }

    fn on_save_conflict(&self, id: RegistrationId, state: RegistrationState) {
        tracing::debug!(registration_id = %id, state = %state, "save conflict, result discarded");
    }
}

// ─── Metrics ─────────────────────────────────────────────────────────

/// Records lifecycle counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsListener;

impl RegistrationListener for MetricsListener {
    fn on_created(&self, _entity: &RegistrationEntity) {
        counter!("dsreg_registrations_created_total").increment(1);
    }

    fn on_transition(&self, entity: &RegistrationEntity, from: RegistrationState) {
        counter!(
            "dsreg_transitions_total",
            "from" => from.as_str(),
            "to" => entity.state.as_str()
        )
        .increment(1);
    }

    fn on_retry_scheduled(&self, entity: &RegistrationEntity) {
        counter!("dsreg_retries_scheduled_total", "state" => entity.state.as_str()).increment(1);
    }

    fn on_failed(&self, entity: &RegistrationEntity) {
        let reason = entity
            .error_detail
            .as_ref()
            .map_or("unknown", |d| d.kind.as_str());
        counter!("dsreg_registrations_failed_total", "reason" => reason).increment(1);
    }

    fn on_save_conflict(&self, _id: RegistrationId, _state: RegistrationState) {
        counter!("dsreg_save_conflicts_total").increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use dsreg_core::{FailureKind, ParticipantDid};
    use dsreg_state::ErrorDetail;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl RegistrationListener for Recorder {
        fn on_transition(&self, entity: &RegistrationEntity, from: RegistrationState) {
            self.0.lock().push(format!("{from}->{}", entity.state));
        }
        fn on_failed(&self, _entity: &RegistrationEntity) {
            self.0.lock().push("failed".into());
        }
    }

    #[test]
    fn failed_transition_fires_both_hooks() {
        let recorder = Arc::new(Recorder::default());
        let mut listeners = Listeners::default();
        listeners.push(recorder.clone());

        let mut entity =
            RegistrationEntity::new(ParticipantDid::new("did:example:alice").unwrap(), Utc::now());
        entity
            .reject(ErrorDetail::new(FailureKind::Permanent, "bad"), Utc::now())
            .unwrap();
        listeners.transitioned(&entity, RegistrationState::Submitted);

        assert_eq!(*recorder.0.lock(), vec!["SUBMITTED->FAILED", "failed"]);
    }

    #[test]
    fn default_hooks_are_no_ops() {
        struct Silent;
        impl RegistrationListener for Silent {}

        let mut listeners = Listeners::standard();
        listeners.push(Arc::new(Silent));
        let entity =
            RegistrationEntity::new(ParticipantDid::new("did:example:bob").unwrap(), Utc::now());
        listeners.created(&entity);
        listeners.retry_scheduled(&entity);
        listeners.save_conflict(entity.id, entity.state);
    }
}
