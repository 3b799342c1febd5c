//! Scan job orchestrator
//!
//! Owns one job end-to-end: waits for the client's readiness signal,
//! runs detection, runs enrichment with a progress callback wired into
//! the job's progress channel, finalizes the record, and tears the
//! channel down. Progress delivery is a UX nicety: its failures never
//! fail the job, and the job record stays the authoritative outcome.

use serde_json::json;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::jobs;
use crate::models::ScanStage;
use crate::services::enrichment::EnrichmentOptions;
use crate::AppState;
use shelfscan_common::events::ProgressEvent;
use shelfscan_common::types::ScanResult;

// Overall progress values per stage; enrichment sub-progress is mapped
// into the span between ENRICHING and ENRICH_DONE.
pub(crate) const PROGRESS_ANALYZING: f64 = 0.1;
pub(crate) const PROGRESS_ENRICHING: f64 = 0.3;
pub(crate) const PROGRESS_ENRICH_DONE: f64 = 0.7;
pub(crate) const PROGRESS_COMPLETE: f64 = 1.0;

/// Map enrichment sub-progress [0, 1] into the overall progress scale
pub(crate) fn enrichment_progress(sub: f64) -> f64 {
    PROGRESS_ENRICHING + (PROGRESS_ENRICH_DONE - PROGRESS_ENRICHING) * sub.clamp(0.0, 1.0)
}

/// Outcome of the readiness wait-loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaitOutcome {
    /// Client signaled readiness within the bound
    Ready,
    /// Bound elapsed; processing proceeds, pushes become no-ops
    TimedOut,
    /// Job record disappeared (expired or deleted)
    Gone,
    /// Client canceled while we were waiting
    Canceled,
}

/// Poll the job record for the client's readiness signal
///
/// Bounded: after the configured timeout, processing proceeds anyway so
/// a misbehaving or old client can never stall a job. Such clients fall
/// back to polling the status endpoint.
pub(crate) async fn wait_for_channel_ready(state: &AppState, job_id: Uuid) -> WaitOutcome {
    let poll = Duration::from_millis(state.config.readiness_poll_ms);
    let deadline = tokio::time::Instant::now()
        + Duration::from_millis(state.config.readiness_timeout_ms);

    loop {
        match jobs::load_job(&state.db, job_id).await {
            Ok(Some(job)) => {
                if job.stage == ScanStage::Canceled {
                    return WaitOutcome::Canceled;
                }
                if job.channel_ready {
                    return WaitOutcome::Ready;
                }
            }
            Ok(None) => return WaitOutcome::Gone,
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "Readiness poll failed, retrying");
            }
        }

        if tokio::time::Instant::now() >= deadline {
            info!(job_id = %job_id, "Readiness wait timed out, proceeding without a listener");
            return WaitOutcome::TimedOut;
        }

        tokio::time::sleep(poll).await;
    }
}

/// Mark a job failed, notify listeners best-effort, and tear down
pub(crate) async fn fail_job(
    state: &AppState,
    job_id: Uuid,
    progress_reached: f64,
    error_type: &str,
    message: String,
) {
    warn!(job_id = %job_id, error_type, error = %message, "Scan job failed");

    let merged = jobs::merge_job(
        &state.db,
        job_id,
        json!({
            "stage": "error",
            "error": message,
            "errorType": error_type,
        }),
        state.config.job_ttl_secs,
    )
    .await;
    if let Err(e) = merged {
        warn!(job_id = %job_id, error = %e, "Failed to record job failure");
    }

    state
        .channels
        .push(
            job_id,
            ProgressEvent::failed(progress_reached, "Scan failed", message.clone()),
        )
        .await;
    state.channels.close(job_id, message).await;
    schedule_cleanup(state.clone(), job_id);
}

/// Hard-delete the job record after the terminal retention window
pub(crate) fn schedule_cleanup(state: AppState, job_id: Uuid) {
    let retention = Duration::from_secs(state.config.terminal_retention_secs);
    tokio::spawn(async move {
        tokio::time::sleep(retention).await;
        if let Err(e) = jobs::delete_job(&state.db, job_id).await {
            warn!(job_id = %job_id, error = %e, "Terminal job cleanup failed");
        }
        state.channels.remove(job_id).await;
    });
}

/// Merge a record patch, tolerating an expired record silently
async fn merge_quiet(state: &AppState, job_id: Uuid, patch: serde_json::Value) {
    match jobs::merge_job(&state.db, job_id, patch, state.config.job_ttl_secs).await {
        Ok(_) => {}
        Err(e) => warn!(job_id = %job_id, error = %e, "Job record merge failed"),
    }
}

/// Run one single-photo scan job end-to-end
///
/// Spawned as an independent task from the scan handler; keeps running
/// after the triggering request has returned its 202.
pub async fn run_scan_job(state: AppState, job_id: Uuid, image: Vec<u8>) {
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

    // Detection stage
    merge_quiet(&state, job_id, json!({"stage": "analyzing"})).await;
    state
        .channels
        .push(
            job_id,
            ProgressEvent::stage(PROGRESS_ANALYZING, "Analyzing shelf photo"),
        )
        .await;

    let outcome = match state.detector.detect(&image).await {
        Ok(outcome) => outcome,
        Err(e) => {
            fail_job(&state, job_id, PROGRESS_ANALYZING, "detection", e.to_string()).await;
            return;
        }
    };

    let books_detected = outcome.detections.len();
    info!(job_id = %job_id, books_detected, "Detection stage complete");

    merge_quiet(
        &state,
        job_id,
        json!({"stage": "enriching", "booksDetected": books_detected}),
    )
    .await;
    state
        .channels
        .push(
            job_id,
            ProgressEvent::stage(
                PROGRESS_ENRICHING,
                format!("Found {} books, looking up editions", books_detected),
            ),
        )
        .await;

    // Enrichment stage: progress flows through the callback closure,
    // never through a service reference back into this orchestrator.
    let channel = state.channels.get(job_id).await;
    let callback: crate::services::enrichment::ProgressCallback = Box::new(move |event| {
        if let Some(channel) = &channel {
            let mut event = event;
            event.progress = enrichment_progress(event.progress);
            channel.push(event);
        }
    });

    let options = EnrichmentOptions {
        confidence_threshold: state.config.enrichment_confidence_threshold,
    };
    let batch = match state
        .enricher
        .enrich_batch(job_id, outcome.detections, callback, &options)
        .await
    {
        Ok(batch) => batch,
        Err(e) => {
            fail_job(&state, job_id, PROGRESS_ENRICHING, "enrichment", e.to_string()).await;
            return;
        }
    };

    // The client may have canceled while enrichment ran
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

    let result = ScanResult {
        books: batch.enriched,
        suggestions: outcome.suggestions,
        photos_processed: None,
    };

    merge_quiet(
        &state,
        job_id,
        json!({
            "stage": "complete",
            "result": result,
            "booksDetected": books_detected,
        }),
    )
    .await;

    state
        .channels
        .push(
            job_id,
            ProgressEvent::stage(PROGRESS_COMPLETE, "Scan complete"),
        )
        .await;
    state.channels.close(job_id, "Scan complete").await;

    info!(job_id = %job_id, books_detected, "Scan job complete");
    schedule_cleanup(state, job_id);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enrichment_progress_spans_the_middle_band() {
        assert_eq!(enrichment_progress(0.0), PROGRESS_ENRICHING);
        assert_eq!(enrichment_progress(1.0), PROGRESS_ENRICH_DONE);
        assert_eq!(enrichment_progress(0.5), 0.5);
        // Out-of-range sub-progress is clamped, keeping overall progress monotonic
        assert_eq!(enrichment_progress(1.5), PROGRESS_ENRICH_DONE);
        assert_eq!(enrichment_progress(-0.5), PROGRESS_ENRICHING);
    }
}
