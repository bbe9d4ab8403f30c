//! # dsreg-api — Binary Entry Point
//!
//! Runs the HTTP surface and the registration engine loop in one process.
//! Binds to configurable port (default 8080).
//!
//! On SIGINT/SIGTERM the server stops accepting requests, then the engine
//! is signalled and finishes its current tick before the process exits.
//! Anything a tick leaves unsaved is recovered by lease expiry.

use std::sync::Arc;

use anyhow::Context;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::sync::watch;

use dsreg_api::db::registrations::PgRegistrationStore;
use dsreg_api::{AppState, DidAuthenticator};
use dsreg_client::{ClientConfig, HttpAuthorityClient, HttpIdentityVerifier};
use dsreg_engine::{
    EngineConfig, InMemoryRegistrationStore, RegistrationEngine, RegistrationService,
    RegistrationStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);

    let engine_config = EngineConfig::from_env().context("invalid engine configuration")?;
    let client_config = ClientConfig::from_env().context("invalid collaborator configuration")?;
    let audience = std::env::var("DSREG_JWT_AUDIENCE")
        .context("DSREG_JWT_AUDIENCE environment variable is required")?;
    tracing::info!(
        worker_id = %engine_config.worker_id,
        batch_size = engine_config.batch_size,
        max_attempts = engine_config.max_attempts,
        resolver = %client_config.resolver_url,
        authority = %client_config.authority_url,
        audience = %audience,
        "configuration loaded"
    );

    let metrics = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus recorder")?;

    // Database pool is optional; absent means the in-memory store.
    let store: Arc<dyn RegistrationStore> = match dsreg_api::db::init_pool()
        .await
        .context("database initialization failed")?
    {
        Some(pool) => Arc::new(PgRegistrationStore::new(pool, engine_config.lease_timeout)),
        None => Arc::new(InMemoryRegistrationStore::new(engine_config.lease_timeout)),
    };

    let verifier = Arc::new(HttpIdentityVerifier::new(&client_config)?);
    let authority = Arc::new(HttpAuthorityClient::new(&client_config)?);
    let authenticator = DidAuthenticator::new(audience, verifier.clone());
    let engine = RegistrationEngine::new(store.clone(), verifier, authority, engine_config);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let engine_task = tokio::spawn(async move { engine.run(shutdown_rx).await });

    let state = AppState::with_service(RegistrationService::new(store))
        .with_authenticator(authenticator)
        .with_metrics(metrics);
    let app = dsreg_api::app(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("dsreg API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    engine_task.await.context("engine task panicked")?;
    tracing::info!("shutdown complete");

    Ok(())
}

/// `RUST_LOG` filter (default `info`); `LOG_FORMAT=json` for JSON lines.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => tracing::info!("Received Ctrl+C signal"),
            Err(e) => {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                tracing::info!("Received SIGTERM signal");
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Starting graceful shutdown...");
}
