//! Bibliographic enrichment service
//!
//! Iterates detections strictly in submission order and attaches an
//! edition record to each readable spine via the provider fallback
//! chain. Progress is reported through a caller-supplied callback; this
//! service has no knowledge of progress channels or the orchestrator,
//! which keeps the service dependency graph acyclic.

use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use super::providers::EditionLookup;
use shelfscan_common::events::ProgressEvent;
use shelfscan_common::types::{Detection, Enrichment};

/// Opaque per-item progress callback supplied by the caller
pub type ProgressCallback = Box<dyn Fn(ProgressEvent) + Send + Sync>;

/// Enrichment batch options
#[derive(Debug, Clone)]
pub struct EnrichmentOptions {
    /// Detections below this confidence are skipped without any lookup
    pub confidence_threshold: f64,
}

/// Outcome of one enrichment batch
#[derive(Debug)]
pub struct BatchEnrichment {
    pub processed_count: usize,
    pub total_count: usize,
    pub enriched: Vec<Detection>,
}

/// Whole-batch failures (per-item failures are recorded on the item)
#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("No lookup providers configured")]
    NoProviders,
}

/// Enrichment over an ordered provider fallback chain
pub struct EnrichmentService {
    providers: Vec<Arc<dyn EditionLookup>>,
}

impl EnrichmentService {
    pub fn new(providers: Vec<Arc<dyn EditionLookup>>) -> Self {
        Self { providers }
    }

    /// Enrich a batch of detections, invoking `on_progress` after each item
    ///
    /// Per-item lookup failures are caught and recorded on that item's
    /// `enrichment.status`; the batch continues. A whole-batch failure
    /// invokes the callback once with an error event and propagates.
    pub async fn enrich_batch(
        &self,
        job_id: Uuid,
        detections: Vec<Detection>,
        on_progress: ProgressCallback,
        options: &EnrichmentOptions,
    ) -> Result<BatchEnrichment, EnrichError> {
        let total_count = detections.len();

        if self.providers.is_empty() {
            on_progress(ProgressEvent::failed(
                0.0,
                "Enrichment unavailable",
                "no lookup providers configured",
            ));
            return Err(EnrichError::NoProviders);
        }

        let mut enriched = Vec::with_capacity(total_count);
        let mut processed_count = 0;

        for mut detection in detections {
            detection.enrichment = Some(self.enrich_one(&detection, options).await);
            enriched.push(detection);
            processed_count += 1;

            on_progress(ProgressEvent::items(
                processed_count as f64 / total_count as f64,
                processed_count,
                total_count,
                format!("Enriched {} of {} books", processed_count, total_count),
            ));
        }

        tracing::info!(
            job_id = %job_id,
            processed = processed_count,
            total = total_count,
            "Enrichment batch completed"
        );

        Ok(BatchEnrichment {
            processed_count,
            total_count,
            enriched,
        })
    }

    /// Look up one detection through the provider chain
    async fn enrich_one(&self, detection: &Detection, options: &EnrichmentOptions) -> Enrichment {
        let Some(title) = detection.title.as_deref() else {
            return Enrichment::skipped();
        };
        if detection.confidence < options.confidence_threshold {
            return Enrichment::skipped();
        }

        let mut last_error: Option<String> = None;
        let mut definitive_miss = false;

        for provider in &self.providers {
            match provider.lookup(title, detection.author.as_deref()).await {
                Ok(Some(edition)) => return Enrichment::success(edition),
                Ok(None) => {
                    definitive_miss = true;
                }
                Err(e) => {
                    tracing::warn!(
                        provider = provider.provider_name(),
                        title = %title,
                        error = %e,
                        "Provider lookup failed, trying next"
                    );
                    last_error = Some(format!("{}: {}", provider.provider_name(), e));
                }
            }
        }

        // A definitive miss from any provider outranks another's failure
        if definitive_miss {
            Enrichment::not_found()
        } else {
            Enrichment::error(last_error.unwrap_or_else(|| "lookup failed".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::providers::ProviderError;
    use async_trait::async_trait;
    use shelfscan_common::types::{BoundingBox, EditionRecord, EnrichmentStatus};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn detection(title: Option<&str>, confidence: f64) -> Detection {
        Detection {
            title: title.map(String::from),
            author: Some("Author".to_string()),
            confidence,
            bounding_box: BoundingBox {
                x1: 0.0,
                y1: 0.0,
                x2: 0.1,
                y2: 1.0,
            },
            enrichment: None,
        }
    }

    fn edition(provider: &str) -> EditionRecord {
        EditionRecord {
            isbn: Some("9780000000000".to_string()),
            cover_url: None,
            publisher: None,
            page_count: None,
            subjects: vec![],
            provider: provider.to_string(),
        }
    }

    enum StubBehavior {
        Hit,
        Miss,
        Fail,
    }

    struct StubProvider {
        name: &'static str,
        behavior: StubBehavior,
        calls: AtomicUsize,
    }

    impl StubProvider {
        fn new(name: &'static str, behavior: StubBehavior) -> Arc<Self> {
            Arc::new(Self {
                name,
                behavior,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl EditionLookup for StubProvider {
        fn provider_name(&self) -> &'static str {
            self.name
        }

        async fn lookup(
            &self,
            _title: &str,
            _author: Option<&str>,
        ) -> Result<Option<EditionRecord>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behavior {
                StubBehavior::Hit => Ok(Some(edition(self.name))),
                StubBehavior::Miss => Ok(None),
                StubBehavior::Fail => Err(ProviderError::Network("unreachable".to_string())),
            }
        }
    }

    fn options() -> EnrichmentOptions {
        EnrichmentOptions {
            confidence_threshold: 0.3,
        }
    }

    #[tokio::test]
    async fn below_threshold_detections_are_skipped_without_lookup() {
        let provider = StubProvider::new("stub", StubBehavior::Hit);
        let service = EnrichmentService::new(vec![provider.clone()]);

        let batch = service
            .enrich_batch(
                Uuid::new_v4(),
                vec![detection(Some("Faint Spine"), 0.1), detection(None, 0.0)],
                Box::new(|_| {}),
                &options(),
            )
            .await
            .unwrap();

        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        for det in &batch.enriched {
            assert_eq!(
                det.enrichment.as_ref().unwrap().status,
                EnrichmentStatus::Skipped
            );
        }
    }

    #[tokio::test]
    async fn callbacks_fire_in_order_with_running_progress() {
        let provider = StubProvider::new("stub", StubBehavior::Hit);
        let service = EnrichmentService::new(vec![provider]);

        let seen: Arc<Mutex<Vec<ProgressEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let batch = service
            .enrich_batch(
                Uuid::new_v4(),
                vec![
                    detection(Some("First"), 0.9),
                    detection(Some("Second"), 0.8),
                    detection(Some("Third"), 0.7),
                ],
                Box::new(move |event| sink.lock().unwrap().push(event)),
                &options(),
            )
            .await
            .unwrap();

        assert_eq!(batch.processed_count, 3);
        assert_eq!(batch.total_count, 3);

        let events = seen.lock().unwrap();
        assert_eq!(events.len(), 3);
        for (i, event) in events.iter().enumerate() {
            assert_eq!(event.processed_items, i + 1);
            assert_eq!(event.total_items, 3);
        }
        // Monotonically non-decreasing progress
        assert!(events.windows(2).all(|w| w[0].progress <= w[1].progress));
        assert_eq!(events.last().unwrap().progress, 1.0);
    }

    #[tokio::test]
    async fn per_item_failure_is_recorded_and_batch_continues() {
        let provider = StubProvider::new("stub", StubBehavior::Fail);
        let service = EnrichmentService::new(vec![provider]);

        let batch = service
            .enrich_batch(
                Uuid::new_v4(),
                vec![detection(Some("One"), 0.9), detection(Some("Two"), 0.9)],
                Box::new(|_| {}),
                &options(),
            )
            .await
            .unwrap();

        assert_eq!(batch.processed_count, 2);
        for det in &batch.enriched {
            let enrichment = det.enrichment.as_ref().unwrap();
            assert_eq!(enrichment.status, EnrichmentStatus::Error);
            assert!(enrichment.error.is_some());
        }
    }

    #[tokio::test]
    async fn fallback_provider_is_tried_after_miss() {
        let first = StubProvider::new("first", StubBehavior::Miss);
        let second = StubProvider::new("second", StubBehavior::Hit);
        let service = EnrichmentService::new(vec![first.clone(), second.clone()]);

        let batch = service
            .enrich_batch(
                Uuid::new_v4(),
                vec![detection(Some("Rare Book"), 0.9)],
                Box::new(|_| {}),
                &options(),
            )
            .await
            .unwrap();

        assert_eq!(first.calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.calls.load(Ordering::SeqCst), 1);

        let enrichment = batch.enriched[0].enrichment.as_ref().unwrap();
        assert_eq!(enrichment.status, EnrichmentStatus::Success);
        assert_eq!(enrichment.edition.as_ref().unwrap().provider, "second");
    }

    #[tokio::test]
    async fn all_misses_are_not_found() {
        let service = EnrichmentService::new(vec![
            StubProvider::new("first", StubBehavior::Miss) as Arc<dyn EditionLookup>,
            StubProvider::new("second", StubBehavior::Miss),
        ]);

        let batch = service
            .enrich_batch(
                Uuid::new_v4(),
                vec![detection(Some("Unknown Book"), 0.9)],
                Box::new(|_| {}),
                &options(),
            )
            .await
            .unwrap();

        assert_eq!(
            batch.enriched[0].enrichment.as_ref().unwrap().status,
            EnrichmentStatus::NotFound
        );
    }

    #[tokio::test]
    async fn miss_outranks_failure_from_another_provider() {
        let service = EnrichmentService::new(vec![
            StubProvider::new("first", StubBehavior::Fail) as Arc<dyn EditionLookup>,
            StubProvider::new("second", StubBehavior::Miss),
        ]);

        let batch = service
            .enrich_batch(
                Uuid::new_v4(),
                vec![detection(Some("Maybe Book"), 0.9)],
                Box::new(|_| {}),
                &options(),
            )
            .await
            .unwrap();

        assert_eq!(
            batch.enriched[0].enrichment.as_ref().unwrap().status,
            EnrichmentStatus::NotFound
        );
    }

    #[tokio::test]
    async fn no_providers_is_a_batch_failure_with_error_callback() {
        let service = EnrichmentService::new(vec![]);

        let seen: Arc<Mutex<Vec<ProgressEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let result = service
            .enrich_batch(
                Uuid::new_v4(),
                vec![detection(Some("Any"), 0.9)],
                Box::new(move |event| sink.lock().unwrap().push(event)),
                &options(),
            )
            .await;

        assert!(matches!(result, Err(EnrichError::NoProviders)));
        let events = seen.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].error.is_some());
    }
}
