//! Server-Sent Events endpoint for scan progress
//!
//! GET /scan/events/{jobId}

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Router,
};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::AppState;
use shelfscan_common::events::ScanEvent;

/// GET /scan/events/{jobId} - SSE stream of progress events for one job
///
/// The stream ends when the job reaches a terminal stage; the final
/// `close` event carries a human-readable reason. Events are not
/// buffered: a listener attaching late misses prior events and should
/// poll the status endpoint for the current stage.
pub async fn scan_event_stream(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let job_id = Uuid::parse_str(&job_id)
        .map_err(|_| ApiError::BadRequest(format!("Malformed job id: {}", job_id)))?;

    let Some(channel) = state.channels.get(job_id).await else {
        return Err(ApiError::NotFound(format!(
            "No progress channel for job: {}",
            job_id
        )));
    };
    let Some(mut rx) = channel.attach() else {
        return Err(ApiError::NotFound(format!(
            "Progress channel already closed for job: {}",
            job_id
        )));
    };

    info!(job_id = %job_id, "SSE client attached to progress channel");

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let event_type = event.event_type();
                    let is_close = matches!(event, ScanEvent::Closed { .. });

                    match serde_json::to_string(&event) {
                        Ok(json) => {
                            debug!(job_id = %job_id, event = event_type, "SSE: forwarding event");
                            yield Ok(Event::default().event(event_type).data(json));
                        }
                        Err(e) => {
                            warn!(job_id = %job_id, error = %e, "SSE: failed to serialize event");
                        }
                    }

                    if is_close {
                        break;
                    }
                }
                // This subscriber fell behind and lost events; stale
                // progress has no value, just keep going
                Err(RecvError::Lagged(skipped)) => {
                    debug!(job_id = %job_id, skipped, "SSE subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
        info!(job_id = %job_id, "SSE stream ended");
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    ))
}

/// Build event stream routes
pub fn event_routes() -> Router<AppState> {
    Router::new().route("/scan/events/:job_id", get(scan_event_stream))
}
