//! Scan job state machine
//!
//! A job progresses WaitingForChannel → Analyzing → Enriching →
//! Complete, or jumps to Error from any non-terminal stage, or to
//! Canceled on client request. Stages never revert.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shelfscan_common::types::ScanResult;
use uuid::Uuid;

/// Scan job workflow stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStage {
    /// Job created, background task waiting for the client's readiness signal
    WaitingForChannel,
    /// Spine detection running against the uploaded photo(s)
    Analyzing,
    /// Bibliographic lookups running per detection
    Enriching,
    /// Finished successfully, `result` populated
    Complete,
    /// Stopped early on client request
    Canceled,
    /// Failed with `error`/`error_type` populated
    Error,
}

impl ScanStage {
    /// Terminal stages accept no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, ScanStage::Complete | ScanStage::Canceled | ScanStage::Error)
    }
}

/// One scan job record, JSON-encoded as the job store value
///
/// Mutated only by the orchestrator's sequential processing line and by
/// the readiness/cancel handlers; cross-stage races within one job do
/// not occur.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanJob {
    /// Unique job identifier, primary key in the job store
    pub job_id: Uuid,

    /// Current workflow stage
    pub stage: ScanStage,

    /// Set when the client signals it is listening on the progress channel
    pub channel_ready: bool,

    /// When readiness was signaled; set exactly once
    pub channel_ready_at: Option<DateTime<Utc>>,

    /// Job creation time
    pub started_at: DateTime<Utc>,

    /// Last record write
    pub last_updated: DateTime<Utc>,

    /// Spine count, set after the detection stage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub books_detected: Option<usize>,

    /// Batch scans: photo count submitted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_photos: Option<usize>,

    /// Batch scans: photos fully processed so far
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photos_processed: Option<usize>,

    /// Final payload, present only when stage == Complete
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ScanResult>,

    /// Failure message, present only when stage == Error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Failure classification ("detection", "enrichment", ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
}

impl ScanJob {
    /// Create a new job record waiting for its progress channel
    pub fn new(job_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            stage: ScanStage::WaitingForChannel,
            channel_ready: false,
            channel_ready_at: None,
            started_at: now,
            last_updated: now,
            books_detected: None,
            total_photos: None,
            photos_processed: None,
            result: None,
            error: None,
            error_type: None,
        }
    }

    /// New batch job with a known photo count
    pub fn new_batch(job_id: Uuid, total_photos: usize) -> Self {
        let mut job = Self::new(job_id);
        job.total_photos = Some(total_photos);
        job.photos_processed = Some(0);
        job
    }

    /// Seconds since creation (frozen at the last write for terminal jobs)
    pub fn elapsed_seconds(&self) -> u64 {
        let end = if self.stage.is_terminal() {
            self.last_updated
        } else {
            Utc::now()
        };
        (end - self.started_at).num_seconds().max(0) as u64
    }
}
