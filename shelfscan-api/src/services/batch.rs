//! Batch scan coordinator
//!
//! Processes an ordered list of photos sequentially, one full
//! detection→enrichment cycle per photo, pushing one progress event per
//! completed photo with the running book total. Cancellation is
//! cooperative: the canceled flag is re-read before each photo, an
//! in-flight photo finishes, and no new photo starts.

use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::db::jobs;
use crate::models::ScanStage;
use crate::services::enrichment::EnrichmentOptions;
use crate::services::orchestrator::{
    fail_job, schedule_cleanup, wait_for_channel_ready, WaitOutcome, PROGRESS_COMPLETE,
};
use crate::AppState;
use shelfscan_common::events::ProgressEvent;
use shelfscan_common::types::{Detection, QualitySuggestion, ScanResult};

/// Run one multi-photo scan job end-to-end
///
/// `photos` arrive sorted by their submitted index.
pub async fn run_batch_job(state: AppState, job_id: Uuid, photos: Vec<(usize, Vec<u8>)>) {
    match wait_for_channel_ready(&state, job_id).await {
        WaitOutcome::Ready | WaitOutcome::TimedOut => {}
        WaitOutcome::Gone => {
            state.channels.remove(job_id).await;
            return;
        }
        WaitOutcome::Canceled => {
            state.channels.close(job_id, "Scan canceled").await;
            schedule_cleanup(state, job_id);
            return;
        }
    }

    let total_photos = photos.len();
    let mut books: Vec<Detection> = Vec::new();
    let mut suggestions: Vec<QualitySuggestion> = Vec::new();
    let mut photos_processed = 0usize;
    let mut enriching = false;

    let options = EnrichmentOptions {
        confidence_threshold: state.config.enrichment_confidence_threshold,
    };

    for (seq, (index, image)) in photos.into_iter().enumerate() {
        // Cooperative cancellation check before each photo's cycle
        match jobs::load_job(&state.db, job_id).await {
            Ok(Some(job)) if job.stage == ScanStage::Canceled => {
                info!(job_id = %job_id, photos_processed, "Batch scan canceled, stopping early");
                state.channels.close(job_id, "Scan canceled").await;
                schedule_cleanup(state, job_id);
                return;
            }
            Ok(Some(_)) => {}
            Ok(None) => {
                state.channels.remove(job_id).await;
                return;
            }
            Err(_) => {}
        }

        if seq == 0 {
            merge_stage(&state, job_id, "analyzing").await;
        }

        let outcome = match state.detector.detect(&image).await {
            Ok(outcome) => outcome,
            Err(e) => {
                fail_job(
                    &state,
                    job_id,
                    photo_progress(photos_processed, total_photos),
                    "detection",
                    format!("Photo {}: {}", index, e),
                )
                .await;
                return;
            }
        };

        // Stages never revert: once enrichment has started the record
        // stays in enriching through the remaining photo cycles.
        if !enriching && !outcome.detections.is_empty() {
            merge_stage(&state, job_id, "enriching").await;
            enriching = true;
        }

        let batch = match state
            .enricher
            .enrich_batch(job_id, outcome.detections, Box::new(|_| {}), &options)
            .await
        {
            Ok(batch) => batch,
            Err(e) => {
                fail_job(
                    &state,
                    job_id,
                    photo_progress(photos_processed, total_photos),
                    "enrichment",
                    format!("Photo {}: {}", index, e),
                )
                .await;
                return;
            }
        };

        books.extend(batch.enriched);
        suggestions.extend(outcome.suggestions);
        photos_processed += 1;

        let patch = json!({
            "photosProcessed": photos_processed,
            "booksDetected": books.len(),
        });
        if let Err(e) = jobs::merge_job(&state.db, job_id, patch, state.config.job_ttl_secs).await {
            tracing::warn!(job_id = %job_id, error = %e, "Batch progress merge failed");
        }

        state
            .channels
            .push(
                job_id,
                ProgressEvent::items(
                    photo_progress(photos_processed, total_photos),
                    photos_processed,
                    total_photos,
                    format!(
                        "Processed photo {} of {}: {} books found",
                        photos_processed,
                        total_photos,
                        books.len()
                    ),
                ),
            )
            .await;
    }

    // A cancel issued during the final photo still wins
    match jobs::load_job(&state.db, job_id).await {
        Ok(Some(job)) if job.stage == ScanStage::Canceled => {
            state.channels.close(job_id, "Scan canceled").await;
            schedule_cleanup(state, job_id);
            return;
        }
        Ok(None) => {
            state.channels.remove(job_id).await;
            return;
        }
        _ => {}
    }

    let books_detected = books.len();
    let result = ScanResult {
        books,
        suggestions,
        photos_processed: Some(photos_processed),
    };

    if let Err(e) = jobs::merge_job(
        &state.db,
        job_id,
        json!({
            "stage": "complete",
            "result": result,
            "booksDetected": books_detected,
        }),
        state.config.job_ttl_secs,
    )
    .await
    {
        tracing::warn!(job_id = %job_id, error = %e, "Batch completion merge failed");
    }

    state
        .channels
        .push(
            job_id,
            ProgressEvent::items(
                PROGRESS_COMPLETE,
                photos_processed,
                total_photos,
                format!("Scan complete: {} books found", books_detected),
            ),
        )
        .await;
    state.channels.close(job_id, "Scan complete").await;

    info!(
        job_id = %job_id,
        photos_processed,
        books_detected,
        "Batch scan job complete"
    );
    schedule_cleanup(state, job_id);
}

async fn merge_stage(state: &AppState, job_id: Uuid, stage: &str) {
    if let Err(e) = jobs::merge_job(
        &state.db,
        job_id,
        json!({ "stage": stage }),
        state.config.job_ttl_secs,
    )
    .await
    {
        tracing::warn!(job_id = %job_id, error = %e, "Batch stage merge failed");
    }
}

fn photo_progress(photos_processed: usize, total_photos: usize) -> f64 {
    if total_photos == 0 {
        return 0.0;
    }
    photos_processed as f64 / total_photos as f64
}
