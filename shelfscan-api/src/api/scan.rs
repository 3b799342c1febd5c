//! Scan job API handlers
//!
//! POST /scan, POST /scan/ready/{jobId}, GET /scan/status/{jobId},
//! POST /scan/cancel

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::db::jobs;
use crate::error::{ApiError, ApiResult};
use crate::models::{ScanJob, ScanStage};
use crate::services::orchestrator;
use crate::AppState;
use shelfscan_common::types::ScanResult;

// Wall-clock estimate shown to the client at job creation
const ESTIMATED_RANGE_SECONDS: [u64; 2] = [5, 30];

/// POST /scan response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartScanResponse {
    pub job_id: Uuid,
    pub stages: Vec<&'static str>,
    pub estimated_range: [u64; 2],
}

/// GET /scan/status/{jobId} response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanStatusResponse {
    pub stage: ScanStage,
    pub elapsed_time: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub books_detected: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ScanResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// POST /scan/cancel request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelScanRequest {
    pub job_id: Option<String>,
}

/// POST /scan/cancel response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelScanResponse {
    pub job_id: Uuid,
    pub stage: ScanStage,
}

fn parse_job_id(raw: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest(format!("Malformed job id: {}", raw)))
}

/// POST /scan
///
/// Accepts raw image bytes, creates the job record, opens its progress
/// channel, and schedules background processing. Returns 202 before any
/// work starts; the background task will not emit progress until the
/// client signals readiness (or the readiness wait times out).
pub async fn start_scan(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<StartScanResponse>)> {
    if body.is_empty() {
        return Err(ApiError::BadRequest("Image body is required".to_string()));
    }
    if body.len() > state.config.max_image_bytes {
        return Err(ApiError::PayloadTooLarge(format!(
            "Image exceeds the maximum size of {} bytes",
            state.config.max_image_bytes
        )));
    }

    let job = ScanJob::new(Uuid::new_v4());
    jobs::create_job(&state.db, &job, state.config.job_ttl_secs).await?;
    state.channels.open(job.job_id).await;

    tracing::info!(
        job_id = %job.job_id,
        image_bytes = body.len(),
        "Scan job created"
    );

    let task_state = state.clone();
    let job_id = job.job_id;
    let image = body.to_vec();
    tokio::spawn(async move {
        orchestrator::run_scan_job(task_state, job_id, image).await;
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(StartScanResponse {
            job_id: job.job_id,
            stages: vec!["analyzing", "enriching", "complete"],
            estimated_range: ESTIMATED_RANGE_SECONDS,
        }),
    ))
}

/// POST /scan/ready/{jobId}
///
/// The client calls this once it is attached to the progress channel.
/// Idempotent: a second call is a no-op success. The readiness time is
/// set exactly once.
pub async fn signal_ready(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<StatusCode> {
    let job_id = parse_job_id(&job_id)?;

    let Some(job) = jobs::load_job(&state.db, job_id).await? else {
        return Err(ApiError::NotFound(format!(
            "Scan job not found or expired: {}",
            job_id
        )));
    };

    if let Some(channel) = state.channels.get(job_id).await {
        channel.mark_ready();
    }

    if !job.channel_ready {
        // Best-effort: the record may expire between the load and the
        // merge; the silent None is fine either way.
        jobs::merge_job(
            &state.db,
            job_id,
            json!({
                "channelReady": true,
                "channelReadyAt": chrono::Utc::now().to_rfc3339(),
            }),
            state.config.job_ttl_secs,
        )
        .await?;
        tracing::info!(job_id = %job_id, "Progress channel readiness signaled");
    }

    Ok(StatusCode::NO_CONTENT)
}

/// GET /scan/status/{jobId}
///
/// The polling fallback for clients without a live progress channel,
/// and the authoritative view of the job's outcome.
pub async fn scan_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<ScanStatusResponse>> {
    let job_id = parse_job_id(&job_id)?;

    let Some(job) = jobs::load_job(&state.db, job_id).await? else {
        return Err(ApiError::NotFound(format!(
            "Scan job not found or expired: {}",
            job_id
        )));
    };

    Ok(Json(ScanStatusResponse {
        stage: job.stage,
        elapsed_time: job.elapsed_seconds(),
        books_detected: job.books_detected,
        result: job.result,
        error: job.error,
    }))
}

/// POST /scan/cancel
///
/// Sets the canceled flag; the processing line notices at its next
/// coarse-grained check. In-flight work finishes, no new photo starts.
pub async fn cancel_scan(
    State(state): State<AppState>,
    Json(request): Json<CancelScanRequest>,
) -> ApiResult<Json<CancelScanResponse>> {
    let Some(raw_id) = request.job_id else {
        return Err(ApiError::BadRequest("jobId is required".to_string()));
    };
    let job_id = parse_job_id(&raw_id)?;

    let Some(job) = jobs::load_job(&state.db, job_id).await? else {
        return Err(ApiError::NotFound(format!(
            "Scan job not found or expired: {}",
            job_id
        )));
    };

    // Canceling a finished job changes nothing
    if job.stage.is_terminal() {
        return Ok(Json(CancelScanResponse {
            job_id,
            stage: job.stage,
        }));
    }

    jobs::merge_job(
        &state.db,
        job_id,
        json!({"stage": "canceled"}),
        state.config.job_ttl_secs,
    )
    .await?;

    tracing::info!(job_id = %job_id, "Scan job canceled by client");

    Ok(Json(CancelScanResponse {
        job_id,
        stage: ScanStage::Canceled,
    }))
}

/// Build scan routes
pub fn scan_routes() -> Router<AppState> {
    Router::new()
        .route("/scan", post(start_scan))
        .route("/scan/ready/:job_id", post(signal_ready))
        .route("/scan/status/:job_id", get(scan_status))
        .route("/scan/cancel", post(cancel_scan))
}
