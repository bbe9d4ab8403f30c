//! # Registration Store
//!
//! The persistence contract the engine runs against, and an in-memory
//! implementation of it.
//!
//! The store is the single source of truth. Correctness across concurrent
//! workers rests on two primitives only:
//!
//! - [`RegistrationStore::claim_due`]: atomically lease up to `limit` due,
//!   unleased (or lease-expired) entities to one worker, bumping each
//!   entity's `version`.
//! - [`RegistrationStore::save`]: a conditional write that succeeds only if
//!   the stored `version` still equals the caller's expected version.
//!
//! A worker that crashes mid-tick leaves its lease behind. Once the lease
//! expires the entity is claimable again, and the new claim bumps the
//! version so the crashed worker's eventual write (if any) conflicts.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use dsreg_core::{add_duration, Clock, ParticipantDid, RegistrationId, SystemClock, WorkerId};
use dsreg_state::{Lease, RegistrationEntity, RegistrationState};

// ─── Contract ────────────────────────────────────────────────────────

/// Result of a conditional save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Written; the entity now has this version.
    Saved { version: u64 },
    /// The stored version moved on. Nothing was written.
    Conflict,
}

impl SaveOutcome {
    /// Whether the write was applied.
    pub fn is_saved(&self) -> bool {
        matches!(self, Self::Saved { .. })
    }
}

/// Store failures. Conflicts are not errors; see [`SaveOutcome`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A non-FAILED registration already exists for this DID.
    #[error("an active registration already exists for {did}")]
    Duplicate { did: ParticipantDid },

    /// No registration with this id.
    #[error("{0} not found")]
    NotFound(RegistrationId),

    /// The backing store could not be reached or refused the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A stored record could not be decoded.
    #[error("corrupt registration record: {0}")]
    Corrupt(String),
}

/// Persistence operations required by the engine and the submission service.
#[async_trait]
pub trait RegistrationStore: Send + Sync {
    /// Insert a new registration. Fails with [`StoreError::Duplicate`] if a
    /// non-FAILED registration for the same DID exists; the check and the
    /// insert are atomic.
    async fn create(&self, entity: RegistrationEntity) -> Result<RegistrationEntity, StoreError>;

    /// Fetch a registration by id.
    async fn get(&self, id: RegistrationId) -> Result<Option<RegistrationEntity>, StoreError>;

    /// All registrations for a DID, newest first.
    async fn find_by_did(
        &self,
        did: &ParticipantDid,
    ) -> Result<Vec<RegistrationEntity>, StoreError>;

    /// Registrations ordered by creation time, optionally filtered by state.
    async fn list(
        &self,
        state: Option<RegistrationState>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<RegistrationEntity>, StoreError>;

    /// Lease up to `limit` due entities to `owner`, oldest due first.
    ///
    /// The returned entities carry the lease and the bumped version; that
    /// version is the one to pass to [`save`](Self::save).
    async fn claim_due(
        &self,
        owner: &WorkerId,
        limit: usize,
    ) -> Result<Vec<RegistrationEntity>, StoreError>;

    /// Conditionally replace the stored entity. On success the version is
    /// incremented and the lease is cleared.
    async fn save(
        &self,
        entity: &RegistrationEntity,
        expected_version: u64,
    ) -> Result<SaveOutcome, StoreError>;
}

/// When an entity became due, for "oldest due first" ordering.
pub fn due_since(entity: &RegistrationEntity) -> DateTime<Utc> {
    entity.next_attempt_at.unwrap_or(entity.state_timestamp)
}

// ─── In-Memory Store ─────────────────────────────────────────────────

/// Thread-safe, cloneable in-memory registration store.
///
/// All operations run under a `parking_lot` lock that is never held across
/// an `.await`, so each claim and each conditional save is atomic with
/// respect to every other caller sharing the same `Arc`.
#[derive(Debug, Clone)]
pub struct InMemoryRegistrationStore {
    data: Arc<RwLock<HashMap<RegistrationId, RegistrationEntity>>>,
    clock: Arc<dyn Clock>,
    lease_timeout: Duration,
}

impl InMemoryRegistrationStore {
    /// Create an empty store on the system clock.
    pub fn new(lease_timeout: Duration) -> Self {
        Self::with_clock(lease_timeout, Arc::new(SystemClock))
    }

    /// Create an empty store that reads time from `clock`.
    pub fn with_clock(lease_timeout: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
            clock,
            lease_timeout,
        }
    }

    /// Number of stored registrations.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RegistrationStore for InMemoryRegistrationStore {
    async fn create(&self, entity: RegistrationEntity) -> Result<RegistrationEntity, StoreError> {
        let mut guard = self.data.write();
        let duplicate = guard.values().any(|existing| {
            existing.participant_did == entity.participant_did
                && existing.state != RegistrationState::Failed
        });
        if duplicate {
            return Err(StoreError::Duplicate {
                did: entity.participant_did,
            });
        }
        guard.insert(entity.id, entity.clone());
        Ok(entity)
    }

    async fn get(&self, id: RegistrationId) -> Result<Option<RegistrationEntity>, StoreError> {
        Ok(self.data.read().get(&id).cloned())
    }

    async fn find_by_did(
        &self,
        did: &ParticipantDid,
    ) -> Result<Vec<RegistrationEntity>, StoreError> {
        let mut found: Vec<_> = self
            .data
            .read()
            .values()
            .filter(|e| &e.participant_did == did)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(found)
    }

    async fn list(
        &self,
        state: Option<RegistrationState>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<RegistrationEntity>, StoreError> {
        let mut all: Vec<_> = self
            .data
            .read()
            .values()
            .filter(|e| state.map_or(true, |s| e.state == s))
            .cloned()
            .collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(all.into_iter().skip(offset).take(limit).collect())
    }

    async fn claim_due(
        &self,
        owner: &WorkerId,
        limit: usize,
    ) -> Result<Vec<RegistrationEntity>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let now = self.clock.now();
        let expires_at = add_duration(now, self.lease_timeout);

        let mut guard = self.data.write();
        let mut due: Vec<(DateTime<Utc>, RegistrationId)> = guard
            .values()
            .filter(|e| e.is_claimable(now))
            .map(|e| (due_since(e), e.id))
            .collect();
        due.sort();

        let mut claimed = Vec::with_capacity(limit.min(due.len()));
        for (_, id) in due.into_iter().take(limit) {
            if let Some(entity) = guard.get_mut(&id) {
                entity.lease = Some(Lease {
                    owner: owner.clone(),
                    expires_at,
                });
                entity.version += 1;
                claimed.push(entity.clone());
            }
        }
        Ok(claimed)
    }

    async fn save(
        &self,
        entity: &RegistrationEntity,
        expected_version: u64,
    ) -> Result<SaveOutcome, StoreError> {
        let mut guard = self.data.write();
        let stored = guard
            .get_mut(&entity.id)
            .ok_or(StoreError::NotFound(entity.id))?;
        if stored.version != expected_version {
            return Ok(SaveOutcome::Conflict);
        }
        let version = expected_version + 1;
        *stored = RegistrationEntity {
            version,
            lease: None,
            ..entity.clone()
        };
        Ok(SaveOutcome::Saved { version })
    }
}
