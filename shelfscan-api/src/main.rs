//! shelfscan-api - Scan Orchestration Microservice
//!
//! Turns one long-running shelf scan (spine detection + bibliographic
//! enrichment) into a responsive, observable, cancellable asynchronous
//! job with live progress over SSE.

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use shelfscan_api::{build_router, spawn_store_maintenance, AppState};
use shelfscan_common::config::ScanConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with env-filter support (RUST_LOG)
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    info!("Starting shelfscan-api (Scan Orchestration) microservice");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = ScanConfig::load();

    let db_path = config.database_path();
    info!("Database: {}", db_path.display());
    let db_pool = shelfscan_api::db::init_database_pool(&db_path).await?;

    // Reclaim anything left behind by a previous run
    shelfscan_api::db::jobs::purge_expired(&db_pool).await?;

    let bind_addr = format!("{}:{}", config.host, config.port);
    let state = AppState::new(db_pool, config)?;

    spawn_store_maintenance(state.clone());

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Listening on http://{}", bind_addr);
    info!("Health check: http://{}/health", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
