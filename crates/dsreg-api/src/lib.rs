//! # dsreg-api — HTTP Surface and Service Binary
//!
//! A thin Axum layer over [`dsreg_engine::RegistrationService`], plus the
//! Postgres implementation of the engine's store contract.
//!
//! ## Routes
//!
//! - `/v1/registrations/*`: submission (DID-signed bearer token) and status
//!   queries
//! - `/health/*`: Kubernetes health probes
//! - `/metrics`: Prometheus exposition, when a recorder is installed
//!
//! ## Middleware Stack (Tower)
//!
//! TraceLayer → MetricsLayer
//!
//! ## Persistence
//!
//! With `DATABASE_URL` set, registrations live in Postgres
//! ([`db::registrations::PgRegistrationStore`]) and survive restarts.
//! Without it the binary falls back to the in-memory store.

pub mod auth;
pub mod db;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod routes;
pub mod state;

pub use auth::{AuthenticatedDid, DidAuthenticator, DidKeyResolver};
pub use error::AppError;
pub use state::AppState;

use axum::extract::State;
use axum::http::StatusCode;
use axum::middleware::from_fn;
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

/// Assemble the application router.
pub fn app(state: AppState) -> Router {
    let api = Router::new()
        .merge(routes::registrations::router())
        .layer(from_fn(middleware::metrics::metrics_middleware))
        .layer(TraceLayer::new_for_http());

    let ops = Router::new()
        .route("/health/liveness", get(liveness))
        .route("/health/readiness", get(readiness))
        .route("/metrics", get(render_metrics));

    Router::new().merge(ops).merge(api).with_state(state)
}

/// Liveness probe: 200 while the process is up.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness probe.
async fn readiness() -> &'static str {
    "ready"
}

async fn render_metrics(State(state): State<AppState>) -> Result<String, StatusCode> {
    state
        .metrics
        .as_ref()
        .map(|handle| handle.render())
        .ok_or(StatusCode::NOT_FOUND)
}
