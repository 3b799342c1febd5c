//! Batch scan API handler
//!
//! POST /scan/batch

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::db::jobs;
use crate::error::{ApiError, ApiResult};
use crate::models::ScanJob;
use crate::services::batch as batch_coordinator;
use crate::AppState;

/// POST /scan/batch request
///
/// Fields are optional so validation failures produce specific
/// messages instead of a generic deserialization rejection.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchScanRequest {
    pub job_id: Option<String>,
    pub images: Option<Vec<BatchImage>>,
}

#[derive(Debug, Deserialize)]
pub struct BatchImage {
    pub index: Option<usize>,
    /// Base64-encoded image bytes
    pub data: Option<String>,
}

/// POST /scan/batch response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchScanResponse {
    pub job_id: Uuid,
    pub total_photos: usize,
    pub status: &'static str,
}

/// POST /scan/batch
///
/// Accepts an ordered list of photos under the per-job cap, creates the
/// job record under the client-supplied id, and schedules sequential
/// background processing.
pub async fn start_batch_scan(
    State(state): State<AppState>,
    Json(request): Json<BatchScanRequest>,
) -> ApiResult<(StatusCode, Json<BatchScanResponse>)> {
    let Some(raw_id) = request.job_id else {
        return Err(ApiError::BadRequest("jobId is required".to_string()));
    };
    let job_id = Uuid::parse_str(&raw_id)
        .map_err(|_| ApiError::BadRequest(format!("Malformed job id: {}", raw_id)))?;

    let images = request.images.unwrap_or_default();
    if images.is_empty() {
        return Err(ApiError::BadRequest(
            "At least one photo is required".to_string(),
        ));
    }
    let cap = state.config.max_batch_photos;
    if images.len() > cap {
        return Err(ApiError::BadRequest(format!(
            "A batch scan accepts a maximum {} photos, got {}",
            cap,
            images.len()
        )));
    }

    let mut photos: Vec<(usize, Vec<u8>)> = Vec::with_capacity(images.len());
    let mut seen_indexes: HashSet<usize> = HashSet::new();

    for image in images {
        let (Some(index), Some(data)) = (image.index, image.data) else {
            return Err(ApiError::BadRequest(
                "Each image must carry both index and data".to_string(),
            ));
        };
        // Duplicate indexes are ambiguous (which photo wins?), so the
        // whole request is rejected rather than silently dropping one.
        if !seen_indexes.insert(index) {
            return Err(ApiError::BadRequest(format!(
                "Duplicate photo index: {}",
                index
            )));
        }

        let bytes = BASE64
            .decode(data.as_bytes())
            .map_err(|_| ApiError::BadRequest(format!("Photo {} is not valid base64", index)))?;
        if bytes.is_empty() {
            return Err(ApiError::BadRequest(format!("Photo {} is empty", index)));
        }
        if bytes.len() > state.config.max_image_bytes {
            return Err(ApiError::PayloadTooLarge(format!(
                "Photo {} exceeds the maximum size of {} bytes",
                index, state.config.max_image_bytes
            )));
        }

        photos.push((index, bytes));
    }

    photos.sort_by_key(|(index, _)| *index);

    if jobs::job_exists(&state.db, job_id).await? {
        return Err(ApiError::Conflict(format!(
            "Job id already in use: {}",
            job_id
        )));
    }

    let total_photos = photos.len();
    let job = ScanJob::new_batch(job_id, total_photos);
    jobs::create_job(&state.db, &job, state.config.job_ttl_secs).await?;
    state.channels.open(job_id).await;

    tracing::info!(job_id = %job_id, total_photos, "Batch scan job created");

    let task_state = state.clone();
    tokio::spawn(async move {
        batch_coordinator::run_batch_job(task_state, job_id, photos).await;
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(BatchScanResponse {
            job_id,
            total_photos,
            status: "accepted",
        }),
    ))
}

/// Build batch scan routes
pub fn batch_routes() -> Router<AppState> {
    Router::new().route("/scan/batch", post(start_batch_scan))
}
