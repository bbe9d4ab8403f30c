//! # Application State
//!
//! Shared state handed to every route handler: the registration service
//! (backed by whichever store the binary selected), the caller
//! authenticator and, when a recorder is installed, the Prometheus handle
//! that renders `/metrics`.

use std::sync::Arc;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusHandle;

use dsreg_engine::{InMemoryRegistrationStore, RegistrationService, RegistrationStore};

use crate::auth::DidAuthenticator;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    /// Submission and status queries.
    pub service: RegistrationService,
    /// Verifies enrollment tokens. `None` refuses every enrollment.
    pub auth: Option<DidAuthenticator>,
    /// Renders the Prometheus exposition; `None` when no recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("auth", &self.auth)
            .field("metrics", &self.metrics.is_some())
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// State over an arbitrary store.
    pub fn with_store(store: Arc<dyn RegistrationStore>) -> Self {
        Self::with_service(RegistrationService::new(store))
    }

    /// State around a pre-configured service.
    pub fn with_service(service: RegistrationService) -> Self {
        Self {
            service,
            auth: None,
            metrics: None,
        }
    }

    /// Attach the authenticator for enrollment requests.
    pub fn with_authenticator(mut self, auth: DidAuthenticator) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Attach the Prometheus handle served on `/metrics`.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

impl Default for AppState {
    /// In-memory state for development and tests.
    fn default() -> Self {
        Self::with_store(Arc::new(InMemoryRegistrationStore::new(
            Duration::from_secs(60),
        )))
    }
}
