//! Shared test fixtures: in-memory state with stubbed external services

// Not every test binary uses every fixture
#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use shelfscan_api::services::detector::{DetectError, DetectionOutcome, SpineDetector};
use shelfscan_api::services::enrichment::EnrichmentService;
use shelfscan_api::services::providers::{EditionLookup, ProviderError};
use shelfscan_api::AppState;
use shelfscan_common::config::ScanConfig;
use shelfscan_common::types::{BoundingBox, Detection, EditionRecord};

/// Detector stub returning a fixed shelf, with an optional per-call delay
pub struct StubDetector {
    pub detections: Vec<Detection>,
    pub delay: Duration,
    pub calls: AtomicUsize,
}

impl StubDetector {
    pub fn shelf() -> Arc<Self> {
        Arc::new(Self {
            detections: vec![
                readable_detection("Nineteen Eighty-Four", "George Orwell", 0.92),
                readable_detection("Dune", "Frank Herbert", 0.87),
                unreadable_detection(),
            ],
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn slow_shelf(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            detections: vec![readable_detection("Dune", "Frank Herbert", 0.87)],
            delay,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl SpineDetector for StubDetector {
    async fn detect(&self, _image: &[u8]) -> Result<DetectionOutcome, DetectError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(DetectionOutcome {
            detections: self.detections.clone(),
            suggestions: vec![],
        })
    }
}

/// Provider stub that always finds an edition
pub struct StubProvider;

#[async_trait]
impl EditionLookup for StubProvider {
    fn provider_name(&self) -> &'static str {
        "stub"
    }

    async fn lookup(
        &self,
        _title: &str,
        _author: Option<&str>,
    ) -> Result<Option<EditionRecord>, ProviderError> {
        Ok(Some(EditionRecord {
            isbn: Some("9780000000000".to_string()),
            cover_url: None,
            publisher: Some("Test House".to_string()),
            page_count: Some(300),
            subjects: vec![],
            provider: "stub".to_string(),
        }))
    }
}

pub fn readable_detection(title: &str, author: &str, confidence: f64) -> Detection {
    Detection {
        title: Some(title.to_string()),
        author: Some(author.to_string()),
        confidence,
        bounding_box: BoundingBox {
            x1: 0.1,
            y1: 0.1,
            x2: 0.2,
            y2: 0.9,
        },
        enrichment: None,
    }
}

pub fn unreadable_detection() -> Detection {
    Detection {
        title: None,
        author: None,
        confidence: 0.0,
        bounding_box: BoundingBox {
            x1: 0.5,
            y1: 0.1,
            x2: 0.55,
            y2: 0.9,
        },
        enrichment: None,
    }
}

/// Config tuned for fast tests: tight readiness polling, small image cap
pub fn test_config() -> ScanConfig {
    ScanConfig {
        max_image_bytes: 1024,
        readiness_poll_ms: 10,
        readiness_timeout_ms: 2000,
        ..ScanConfig::default()
    }
}

pub async fn test_state_with(config: ScanConfig, detector: Arc<dyn SpineDetector>) -> AppState {
    let db_pool = sqlx::SqlitePool::connect(":memory:").await.unwrap();
    shelfscan_api::db::init_tables(&db_pool).await.unwrap();

    let enricher = Arc::new(EnrichmentService::new(vec![
        Arc::new(StubProvider) as Arc<dyn EditionLookup>
    ]));

    AppState::with_services(db_pool, config, detector, enricher)
}

pub async fn test_state() -> AppState {
    test_state_with(test_config(), StubDetector::shelf()).await
}
