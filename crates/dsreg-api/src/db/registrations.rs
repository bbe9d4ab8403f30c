//! Registration persistence operations.
//!
//! All free functions take a `&PgPool` and operate on the `registrations`
//! table. [`PgRegistrationStore`] wraps them behind the engine's
//! [`RegistrationStore`] contract.
//!
//! Transition rules are enforced by the entity in `dsreg-state`, not in SQL.
//! SQL enforces only what must hold across processes:
//!
//! - one non-FAILED registration per DID (partial unique index);
//! - claims use `FOR UPDATE SKIP LOCKED`, so concurrent workers never lease
//!   the same row;
//! - saves are conditional on `version`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use sqlx::PgPool;
use uuid::Uuid;

use dsreg_core::{
    add_duration, Clock, CredentialReference, ParticipantDid, RegistrationId, SystemClock,
    WorkerId,
};
use dsreg_engine::{due_since, RegistrationStore, SaveOutcome, StoreError};
use dsreg_state::{Lease, RegistrationEntity, RegistrationState};

const COLUMNS: &str = "id, participant_did, endpoint_url, supported_protocols, state, \
     state_timestamp, attempt_count, next_attempt_at, error_detail, version, \
     identity_assertion, credential_reference, lease_owner, lease_expires_at, \
     created_at, transitions";

/// Serialize a JSON-backed column, logging on failure.
fn to_json<T: serde::Serialize>(
    id: RegistrationId,
    column: &'static str,
    value: &T,
) -> Result<serde_json::Value, sqlx::Error> {
    serde_json::to_value(value).map_err(|e| {
        tracing::error!(registration_id = %id, column, error = %e, "failed to serialize column");
        sqlx::Error::Encode(Box::new(e))
    })
}

fn to_i64(value: u64, column: &'static str) -> Result<i64, sqlx::Error> {
    i64::try_from(value).map_err(|e| {
        tracing::error!(column, value, "value out of range for BIGINT");
        sqlx::Error::Encode(Box::new(e))
    })
}

fn to_i32(value: u32, column: &'static str) -> Result<i32, sqlx::Error> {
    i32::try_from(value).map_err(|e| {
        tracing::error!(column, value, "value out of range for INTEGER");
        sqlx::Error::Encode(Box::new(e))
    })
}

/// Insert a new registration.
///
/// A second non-FAILED registration for the same DID violates
/// `registrations_active_did` and surfaces as a unique violation.
pub async fn insert(pool: &PgPool, entity: &RegistrationEntity) -> Result<(), sqlx::Error> {
    let protocols = to_json(entity.id, "supported_protocols", &entity.supported_protocols)?;
    let error_detail = entity
        .error_detail
        .as_ref()
        .map(|d| to_json(entity.id, "error_detail", d))
        .transpose()?;
    let assertion = entity
        .identity_assertion
        .as_ref()
        .map(|a| to_json(entity.id, "identity_assertion", a))
        .transpose()?;
    let transitions = to_json(entity.id, "transitions", &entity.transitions)?;

    sqlx::query(&format!(
        "INSERT INTO registrations ({COLUMNS})
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)"
    ))
    .bind(entity.id.0)
    .bind(entity.participant_did.as_str())
    .bind(entity.endpoint_url.as_deref())
    .bind(&protocols)
    .bind(entity.state.as_str())
    .bind(entity.state_timestamp)
    .bind(to_i32(entity.attempt_count, "attempt_count")?)
    .bind(entity.next_attempt_at)
    .bind(&error_detail)
    .bind(to_i64(entity.version, "version")?)
    .bind(&assertion)
    .bind(entity.credential_reference.as_ref().map(CredentialReference::as_str))
    .bind(entity.lease.as_ref().map(|l| l.owner.as_str()))
    .bind(entity.lease.as_ref().map(|l| l.expires_at))
    .bind(entity.created_at)
    .bind(&transitions)
    .execute(pool)
    .await?;

    Ok(())
}

/// Fetch a registration by id.
pub async fn get_by_id(pool: &PgPool, id: Uuid) -> Result<Option<RegistrationRow>, sqlx::Error> {
    sqlx::query_as::<_, RegistrationRow>(&format!(
        "SELECT {COLUMNS} FROM registrations WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// All registrations for a DID, newest first.
pub async fn find_by_did(pool: &PgPool, did: &str) -> Result<Vec<RegistrationRow>, sqlx::Error> {
    sqlx::query_as::<_, RegistrationRow>(&format!(
        "SELECT {COLUMNS} FROM registrations
         WHERE participant_did = $1
         ORDER BY created_at DESC, id DESC"
    ))
    .bind(did)
    .fetch_all(pool)
    .await
}

/// List registrations in submission order, optionally filtered by state.
pub async fn list(
    pool: &PgPool,
    state: Option<RegistrationState>,
    limit: i64,
    offset: i64,
) -> Result<Vec<RegistrationRow>, sqlx::Error> {
    sqlx::query_as::<_, RegistrationRow>(&format!(
        "SELECT {COLUMNS} FROM registrations
         WHERE ($1::TEXT IS NULL OR state = $1)
         ORDER BY created_at, id
         LIMIT $2 OFFSET $3"
    ))
    .bind(state.map(|s| s.as_str()))
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

/// Lease up to `limit` due rows to `owner` in one statement.
///
/// Rows locked by a concurrent claim are skipped rather than waited on, so
/// two workers claiming at once receive disjoint sets.
pub async fn claim_due(
    pool: &PgPool,
    owner: &WorkerId,
    now: DateTime<Utc>,
    lease_expires_at: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<RegistrationRow>, sqlx::Error> {
    let returning = COLUMNS
        .split(", ")
        .map(|c| format!("r.{}", c.trim()))
        .collect::<Vec<_>>()
        .join(", ");

    sqlx::query_as::<_, RegistrationRow>(&format!(
        "UPDATE registrations r
         SET lease_owner = $1, lease_expires_at = $2, version = r.version + 1
         FROM (
             SELECT id FROM registrations
             WHERE state NOT IN ('ONBOARDED', 'FAILED')
               AND (next_attempt_at IS NULL OR next_attempt_at <= $3)
               AND (lease_expires_at IS NULL OR lease_expires_at <= $3)
             ORDER BY COALESCE(next_attempt_at, state_timestamp), id
             LIMIT $4
             FOR UPDATE SKIP LOCKED
         ) due
         WHERE r.id = due.id
         RETURNING {returning}"
    ))
    .bind(owner.as_str())
    .bind(lease_expires_at)
    .bind(now)
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// Replace a row if its version still equals `expected_version`, clearing
/// the lease and bumping the version.
///
/// Returns the number of rows written: `0` means the version moved on or
/// the row does not exist.
pub async fn update_if_version(
    pool: &PgPool,
    entity: &RegistrationEntity,
    expected_version: u64,
) -> Result<u64, sqlx::Error> {
    let protocols = to_json(entity.id, "supported_protocols", &entity.supported_protocols)?;
    let error_detail = entity
        .error_detail
        .as_ref()
        .map(|d| to_json(entity.id, "error_detail", d))
        .transpose()?;
    let assertion = entity
        .identity_assertion
        .as_ref()
        .map(|a| to_json(entity.id, "identity_assertion", a))
        .transpose()?;
    let transitions = to_json(entity.id, "transitions", &entity.transitions)?;

    let result = sqlx::query(
        "UPDATE registrations SET
             endpoint_url = $1,
             supported_protocols = $2,
             state = $3,
             state_timestamp = $4,
             attempt_count = $5,
             next_attempt_at = $6,
             error_detail = $7,
             identity_assertion = $8,
             credential_reference = $9,
             transitions = $10,
             lease_owner = NULL,
             lease_expires_at = NULL,
             version = version + 1
         WHERE id = $11 AND version = $12",
    )
    .bind(entity.endpoint_url.as_deref())
    .bind(&protocols)
    .bind(entity.state.as_str())
    .bind(entity.state_timestamp)
    .bind(to_i32(entity.attempt_count, "attempt_count")?)
    .bind(entity.next_attempt_at)
    .bind(&error_detail)
    .bind(&assertion)
    .bind(entity.credential_reference.as_ref().map(CredentialReference::as_str))
    .bind(&transitions)
    .bind(entity.id.0)
    .bind(to_i64(expected_version, "version")?)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Whether a row with this id exists.
pub async fn exists(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let found: Option<(i32,)> = sqlx::query_as("SELECT 1 FROM registrations WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(found.is_some())
}

// ─── Row Mapping ─────────────────────────────────────────────────────

/// Internal row type for SQLx mapping.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RegistrationRow {
    id: Uuid,
    participant_did: String,
    endpoint_url: Option<String>,
    supported_protocols: serde_json::Value,
    state: String,
    state_timestamp: DateTime<Utc>,
    attempt_count: i32,
    next_attempt_at: Option<DateTime<Utc>>,
    error_detail: Option<serde_json::Value>,
    version: i64,
    identity_assertion: Option<serde_json::Value>,
    credential_reference: Option<String>,
    lease_owner: Option<String>,
    lease_expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    transitions: serde_json::Value,
}

impl RegistrationRow {
    /// Decode a row into an entity.
    ///
    /// This is the READ path: unlike a default-on-error policy, a row that
    /// fails to decode is reported as [`StoreError::Corrupt`] so the engine
    /// never processes (and then overwrites) a half-understood record.
    pub fn into_entity(self) -> Result<RegistrationEntity, StoreError> {
        let id = RegistrationId::from(self.id);
        let corrupt = |column: &str, reason: String| {
            tracing::error!(
                registration_id = %id,
                column,
                error = %reason,
                "undecodable registration row; investigate for data corruption"
            );
            StoreError::Corrupt(format!("{id}: {column}: {reason}"))
        };

        let participant_did = ParticipantDid::new(self.participant_did)
            .map_err(|e| corrupt("participant_did", e.to_string()))?;
        let state: RegistrationState = self
            .state
            .parse()
            .map_err(|e: dsreg_state::RegistrationError| corrupt("state", e.to_string()))?;
        let attempt_count = u32::try_from(self.attempt_count)
            .map_err(|e| corrupt("attempt_count", e.to_string()))?;
        let version =
            u64::try_from(self.version).map_err(|e| corrupt("version", e.to_string()))?;
        let credential_reference = self
            .credential_reference
            .map(CredentialReference::new)
            .transpose()
            .map_err(|e| corrupt("credential_reference", e.to_string()))?;
        let lease = match (self.lease_owner, self.lease_expires_at) {
            (Some(owner), Some(expires_at)) => Some(Lease {
                owner: WorkerId::new(owner).map_err(|e| corrupt("lease_owner", e.to_string()))?,
                expires_at,
            }),
            _ => None,
        };

        Ok(RegistrationEntity {
            id,
            participant_did,
            endpoint_url: self.endpoint_url,
            supported_protocols: from_json(self.supported_protocols)
                .map_err(|e| corrupt("supported_protocols", e))?,
            state,
            state_timestamp: self.state_timestamp,
            attempt_count,
            next_attempt_at: self.next_attempt_at,
            error_detail: self
                .error_detail
                .map(from_json)
                .transpose()
                .map_err(|e| corrupt("error_detail", e))?,
            version,
            identity_assertion: self
                .identity_assertion
                .map(from_json)
                .transpose()
                .map_err(|e| corrupt("identity_assertion", e))?,
            credential_reference,
            lease,
            created_at: self.created_at,
            transitions: from_json(self.transitions).map_err(|e| corrupt("transitions", e))?,
        })
    }
}

fn from_json<T: DeserializeOwned>(value: serde_json::Value) -> Result<T, String> {
    serde_json::from_value(value).map_err(|e| e.to_string())
}

fn into_entities(rows: Vec<RegistrationRow>) -> Result<Vec<RegistrationEntity>, StoreError> {
    rows.into_iter().map(RegistrationRow::into_entity).collect()
}

fn store_err(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            tracing::error!(error = %e, "failed to decode registration row");
            StoreError::Corrupt(e.to_string())
        }
        other => StoreError::Unavailable(other.to_string()),
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn clamp(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

// ─── Store ───────────────────────────────────────────────────────────

/// [`RegistrationStore`] backed by Postgres.
///
/// Time comes from the injected clock rather than `now()` in SQL, so the
/// store agrees with the engine on when an entity is due.
#[derive(Clone)]
pub struct PgRegistrationStore {
    pool: PgPool,
    clock: Arc<dyn Clock>,
    lease_timeout: Duration,
}

impl std::fmt::Debug for PgRegistrationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgRegistrationStore")
            .field("lease_timeout", &self.lease_timeout)
            .finish_non_exhaustive()
    }
}

impl PgRegistrationStore {
    pub fn new(pool: PgPool, lease_timeout: Duration) -> Self {
        Self::with_clock(pool, lease_timeout, Arc::new(SystemClock))
    }

    pub fn with_clock(pool: PgPool, lease_timeout: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            pool,
            clock,
            lease_timeout,
        }
    }
}

#[async_trait]
impl RegistrationStore for PgRegistrationStore {
    async fn create(&self, entity: RegistrationEntity) -> Result<RegistrationEntity, StoreError> {
        match insert(&self.pool, &entity).await {
            Ok(()) => Ok(entity),
            Err(e) if is_unique_violation(&e) => Err(StoreError::Duplicate {
                did: entity.participant_did,
            }),
            Err(e) => Err(store_err(e)),
        }
    }

    async fn get(&self, id: RegistrationId) -> Result<Option<RegistrationEntity>, StoreError> {
        get_by_id(&self.pool, id.0)
            .await
            .map_err(store_err)?
            .map(RegistrationRow::into_entity)
            .transpose()
    }

    async fn find_by_did(
        &self,
        did: &ParticipantDid,
    ) -> Result<Vec<RegistrationEntity>, StoreError> {
        let rows = find_by_did(&self.pool, did.as_str())
            .await
            .map_err(store_err)?;
        into_entities(rows)
    }

    async fn list(
        &self,
        state: Option<RegistrationState>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<RegistrationEntity>, StoreError> {
        let rows = list(&self.pool, state, clamp(limit), clamp(offset))
            .await
            .map_err(store_err)?;
        into_entities(rows)
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
        let rows = claim_due(&self.pool, owner, now, expires_at, clamp(limit))
            .await
            .map_err(store_err)?;

        let mut claimed = into_entities(rows)?;
        claimed.sort_by(|a, b| due_since(a).cmp(&due_since(b)).then(a.id.cmp(&b.id)));
        Ok(claimed)
    }

    async fn save(
        &self,
        entity: &RegistrationEntity,
        expected_version: u64,
    ) -> Result<SaveOutcome, StoreError> {
        let written = update_if_version(&self.pool, entity, expected_version)
            .await
            .map_err(store_err)?;
        if written > 0 {
            return Ok(SaveOutcome::Saved {
                version: expected_version + 1,
            });
        }
        if exists(&self.pool, entity.id.0).await.map_err(store_err)? {
            Ok(SaveOutcome::Conflict)
        } else {
            Err(StoreError::NotFound(entity.id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dsreg_core::IdentityAssertion;
    use dsreg_state::ErrorDetail;
    use serde_json::json;

    fn row(state: &str) -> RegistrationRow {
        let now = Utc::now();
        RegistrationRow {
            id: Uuid::new_v4(),
            participant_did: "did:web:connector.example.com".into(),
            endpoint_url: Some("https://connector.example.com/ids".into()),
            supported_protocols: json!(["ids-multipart"]),
            state: state.into(),
            state_timestamp: now,
            attempt_count: 2,
            next_attempt_at: Some(now),
            error_detail: None,
            version: 7,
            identity_assertion: None,
            credential_reference: None,
            lease_owner: Some("worker-a".into()),
            lease_expires_at: Some(now),
            created_at: now,
            transitions: json!([]),
        }
    }

    #[test]
    fn row_decodes_into_entity() {
        let mut r = row("REQUESTING_CREDENTIAL");
        let did = ParticipantDid::new("did:web:connector.example.com").unwrap();
        let assertion = IdentityAssertion::new(did.clone(), Utc::now());
        r.identity_assertion = Some(serde_json::to_value(&assertion).unwrap());
        r.error_detail = Some(
            serde_json::to_value(ErrorDetail::new(
                dsreg_core::FailureKind::Transient,
                "resolver returned 503",
            ))
            .unwrap(),
        );

        let entity = r.into_entity().unwrap();
        assert_eq!(entity.state, RegistrationState::RequestingCredential);
        assert_eq!(entity.participant_did, did);
        assert_eq!(entity.attempt_count, 2);
        assert_eq!(entity.version, 7);
        assert_eq!(entity.supported_protocols, vec!["ids-multipart"]);
        assert_eq!(entity.identity_assertion, Some(assertion));
        assert_eq!(entity.lease.unwrap().owner.as_str(), "worker-a");
        assert_eq!(
            entity.error_detail.unwrap().message,
            "resolver returned 503"
        );
    }

    #[test]
    fn unknown_state_is_corrupt() {
        let err = row("PENDING").into_entity().unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(msg) if msg.contains("state")));
    }

    #[test]
    fn negative_version_is_corrupt() {
        let mut r = row("SUBMITTED");
        r.version = -1;
        assert!(matches!(r.into_entity(), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn half_written_lease_is_ignored() {
        let mut r = row("SUBMITTED");
        r.lease_expires_at = None;
        assert!(r.into_entity().unwrap().lease.is_none());
    }

    #[test]
    fn claim_returning_list_is_qualified() {
        let qualified: Vec<String> = COLUMNS
            .split(", ")
            .map(|c| format!("r.{}", c.trim()))
            .collect();
        assert_eq!(qualified.len(), 16);
        assert!(qualified.iter().all(|c| !c.contains(' ')));
    }
}
