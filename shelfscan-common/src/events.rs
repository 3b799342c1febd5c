//! Progress event types for the scan pipeline
//!
//! Progress events are ephemeral: they are fanned out to currently
//! connected listeners and never stored. A listener that connects late
//! misses prior events and polls the job record instead.

use serde::{Deserialize, Serialize};

/// One incremental progress update for a scan job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    /// Overall job progress in [0.0, 1.0], non-decreasing in normal operation
    pub progress: f64,
    /// Items completed within the current stage
    pub processed_items: usize,
    /// Total items in the current stage (0 when the stage has no sub-items)
    pub total_items: usize,
    /// Human-readable stage description
    pub current_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProgressEvent {
    /// Coarse stage marker with no per-item breakdown
    pub fn stage(progress: f64, status: impl Into<String>) -> Self {
        Self {
            progress,
            processed_items: 0,
            total_items: 0,
            current_status: status.into(),
            error: None,
        }
    }

    /// Per-item progress within a discrete stage
    pub fn items(
        progress: f64,
        processed_items: usize,
        total_items: usize,
        status: impl Into<String>,
    ) -> Self {
        Self {
            progress,
            processed_items,
            total_items,
            current_status: status.into(),
            error: None,
        }
    }

    /// Failure marker; `progress` is the value reached when the failure occurred
    pub fn failed(progress: f64, status: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            progress,
            processed_items: 0,
            total_items: 0,
            current_status: status.into(),
            error: Some(error.into()),
        }
    }
}

/// Messages carried by a per-job progress channel
///
/// Serialized for SSE transmission; `event_type()` supplies the SSE
/// event name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ScanEvent {
    /// Incremental progress update
    Progress(ProgressEvent),
    /// Final event before the channel shuts down
    Closed { reason: String },
}

impl ScanEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            ScanEvent::Progress(_) => "progress",
            ScanEvent::Closed { .. } => "close",
        }
    }
}
