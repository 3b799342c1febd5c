//! shelfscan-api library interface
//!
//! Exposes the router, state, and service components for integration
//! testing.

pub mod api;
pub mod db;
pub mod error;
pub mod models;
pub mod progress;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use anyhow::Result;
use axum::extract::DefaultBodyLimit;
use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::progress::ProgressChannels;
use crate::services::detector::{SpineDetector, VisionDetector};
use crate::services::enrichment::EnrichmentService;
use crate::services::providers::{EditionLookup, GoogleBooksClient, OpenLibraryClient};
use crate::services::vision_client::VisionClient;
use shelfscan_common::config::ScanConfig;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Job store connection pool
    pub db: SqlitePool,
    /// Service configuration
    pub config: Arc<ScanConfig>,
    /// Per-job progress channel registry
    pub channels: ProgressChannels,
    /// Spine detection service
    pub detector: Arc<dyn SpineDetector>,
    /// Bibliographic enrichment service
    pub enricher: Arc<EnrichmentService>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    /// Production state: vision detector plus the Open Library →
    /// Google Books provider fallback chain
    pub fn new(db: SqlitePool, config: ScanConfig) -> Result<Self> {
        let vision = VisionClient::new(
            config.vision_base_url.clone(),
            config.vision_api_key.clone(),
            config.vision_timeout_secs,
        )?;
        let detector: Arc<dyn SpineDetector> = Arc::new(VisionDetector::new(vision));

        let providers: Vec<Arc<dyn EditionLookup>> = vec![
            Arc::new(OpenLibraryClient::new(config.open_library_base_url.clone())?),
            Arc::new(GoogleBooksClient::new(config.google_books_base_url.clone())?),
        ];
        let enricher = Arc::new(EnrichmentService::new(providers));

        Ok(Self::with_services(db, config, detector, enricher))
    }

    /// State with injected services (used by tests)
    pub fn with_services(
        db: SqlitePool,
        config: ScanConfig,
        detector: Arc<dyn SpineDetector>,
        enricher: Arc<EnrichmentService>,
    ) -> Self {
        Self {
            db,
            config: Arc::new(config),
            channels: ProgressChannels::new(),
            detector,
            enricher,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
///
/// All responses carry permissive CORS headers for browser/mobile
/// client consumption.
pub fn build_router(state: AppState) -> Router {
    // Batch requests carry up to the photo cap of base64-encoded images
    let body_limit = state
        .config
        .max_image_bytes
        .saturating_mul(state.config.max_batch_photos)
        .saturating_mul(4)
        / 3
        + 64 * 1024;

    Router::new()
        .merge(api::scan_routes())
        .merge(api::batch_routes())
        .merge(api::event_routes())
        .merge(api::health_routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Periodically reclaim expired job rows
///
/// load_job already treats expired rows as absent; this sweep keeps the
/// table from accumulating orphans.
pub fn spawn_store_maintenance(state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            if let Err(e) = db::jobs::purge_expired(&state.db).await {
                tracing::warn!(error = %e, "Expired job purge failed");
            }
        }
    });
}
