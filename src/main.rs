//! Peregrine sync service
//!
//! Keeps a local SQLite store synchronized with The Blue Alliance competition data
//! and reports its health over HTTP.

mod api;
mod config;
mod db;
mod errors;
mod models;
mod sync;
mod upstream;

use std::sync::Arc;
use std::time::Instant;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::Config;
use db::{Repository, Store};
use sync::Engine;
use upstream::{TbaClient, Upstream};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub store: Arc<dyn Store>,
    pub upstream: Arc<dyn Upstream>,
    pub started_at: Instant,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    if config.log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("Starting Peregrine sync service");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("TBA URL: {}", config.tba_url);
    tracing::info!("Season: {}", config.year);
    tracing::info!("Bind address: {}", config.bind_addr);

    if config.tba_api_key.is_none() {
        tracing::warn!("No TBA API key configured (PEREGRINE_TBA_API_KEY). Upstream requests will be rejected!");
    }

    // Initialize database
    let pool = db::init_database(&config.db_path).await?;
    let store: Arc<dyn Store> = Arc::new(Repository::new(pool));

    let upstream: Arc<dyn Upstream> = Arc::new(TbaClient::new(
        config.tba_url.clone(),
        config.tba_api_key.clone(),
        config.fetch_timeout,
    )?);

    // Start background sync
    let engine = Arc::new(Engine::new(
        Arc::clone(&upstream),
        Arc::clone(&store),
        config.sync_config(),
    ));
    engine.begin();

    let state = AppState {
        engine: Arc::clone(&engine),
        store,
        upstream,
        started_at: Instant::now(),
    };

    // Build router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    engine.shutdown().await;
    tracing::info!("Shutdown complete");

    Ok(())
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(api::health_check))
        .route("/sync/status", get(api::sync_status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Unable to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
