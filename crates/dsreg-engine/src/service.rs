//! # Registration Service — Submission and Status Boundary
//!
//! The write path for new registrations and the read path for status
//! queries. Submission validates the request, rejects a DID that already
//! has an in-flight or onboarded registration, and stores the new entity in
//! `SUBMITTED`. From there the engine takes over.
//!
//! Status queries return the committed [`RegistrationStatus`] projection
//! straight from the store.

use std::sync::Arc;

use serde::Deserialize;

use dsreg_core::{Clock, ParticipantDid, RegistrationId, SystemClock, ValidationError};
use dsreg_state::{RegistrationEntity, RegistrationState, RegistrationStatus};

use crate::listener::Listeners;
use crate::store::{RegistrationStore, StoreError};

/// Largest page [`RegistrationService::list`] returns.
pub const MAX_PAGE_SIZE: usize = 500;

/// A request to register a participant.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitRegistration {
    pub participant_did: String,
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default)]
    pub supported_protocols: Vec<String>,
}

impl SubmitRegistration {
    /// A request carrying only a DID.
    pub fn new(participant_did: impl Into<String>) -> Self {
        Self {
            participant_did: participant_did.into(),
            endpoint_url: None,
            supported_protocols: Vec::new(),
        }
    }
}

/// Errors from the submission and status boundary.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    InvalidDid(#[from] ValidationError),

    #[error("invalid endpoint URL {url:?}: {reason}")]
    InvalidEndpoint { url: String, reason: String },

    #[error("an active registration already exists for {did}")]
    Duplicate {
        did: ParticipantDid,
        existing: Option<RegistrationId>,
    },

    #[error("{0} not found")]
    NotFound(RegistrationId),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Duplicate { did } => Self::Duplicate {
                did,
                existing: None,
            },
            StoreError::NotFound(id) => Self::NotFound(id),
            other => Self::Store(other),
        }
    }
}

/// Submission and status queries over a [`RegistrationStore`].
#[derive(Clone)]
pub struct RegistrationService {
    store: Arc<dyn RegistrationStore>,
    clock: Arc<dyn Clock>,
    listeners: Listeners,
}

impl RegistrationService {
    pub fn new(store: Arc<dyn RegistrationStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            listeners: Listeners::standard(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_listeners(mut self, listeners: Listeners) -> Self {
        self.listeners = listeners;
        self
    }

    /// Create a registration in `SUBMITTED`.
    ///
    /// Fails with [`ServiceError::Duplicate`] if the DID already has a
    /// registration that has not failed.
    pub async fn submit(
        &self,
        request: SubmitRegistration,
    ) -> Result<RegistrationStatus, ServiceError> {
        let did = ParticipantDid::new(request.participant_did)?;
        if let Some(url) = &request.endpoint_url {
            validate_endpoint(url)?;
        }

        let active = self
            .store
            .find_by_did(&did)
            .await?
            .into_iter()
            .find(|e| e.state != RegistrationState::Failed);
        if let Some(existing) = active {
            return Err(ServiceError::Duplicate {
                did,
                existing: Some(existing.id),
            });
        }

        let mut entity = RegistrationEntity::new(did, self.clock.now())
            .with_supported_protocols(request.supported_protocols);
        if let Some(url) = request.endpoint_url {
            entity = entity.with_endpoint_url(url);
        }

        let created = self.store.create(entity).await?;
        self.listeners.created(&created);
        Ok(created.status())
    }

    /// Status of a registration by id.
    pub async fn status(&self, id: RegistrationId) -> Result<RegistrationStatus, ServiceError> {
        self.store
            .get(id)
            .await?
            .map(|e| e.status())
            .ok_or(ServiceError::NotFound(id))
    }

    /// Status of every registration for a DID, newest first.
    pub async fn status_by_did(&self, did: &str) -> Result<Vec<RegistrationStatus>, ServiceError> {
        let did = ParticipantDid::new(did)?;
        let found = self.store.find_by_did(&did).await?;
        Ok(found.iter().map(RegistrationEntity::status).collect())
    }

    /// A page of registrations ordered by submission time.
    ///
    /// `limit` is clamped to [`MAX_PAGE_SIZE`].
    pub async fn list(
        &self,
        state: Option<RegistrationState>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<RegistrationStatus>, ServiceError> {
        let page = self
            .store
            .list(state, limit.min(MAX_PAGE_SIZE), offset)
            .await?;
        Ok(page.iter().map(RegistrationEntity::status).collect())
    }
}

fn validate_endpoint(raw: &str) -> Result<(), ServiceError> {
    let parsed = url::Url::parse(raw).map_err(|e| ServiceError::InvalidEndpoint {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ServiceError::InvalidEndpoint {
            url: raw.to_string(),
            reason: format!("unsupported scheme {other:?}"),
        }),
    }
}
