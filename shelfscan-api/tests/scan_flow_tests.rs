//! End-to-end scan workflow tests
//!
//! Exercises the readiness handshake, staged progress emission,
//! cancellation, and expiry against stubbed external services.

mod helpers;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::time::Duration;
use tower::ServiceExt;
use uuid::Uuid;

use helpers::{test_config, test_state, test_state_with, StubDetector};
use shelfscan_api::build_router;
use shelfscan_common::events::ScanEvent;

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_image(uri: &str, bytes: usize) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/octet-stream")
        .body(Body::from(vec![0xFFu8; bytes]))
        .unwrap()
}

fn post_json(uri: &str, value: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(value.to_string()))
        .unwrap()
}

async fn get_status(app: &axum::Router, job_id: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/scan/status/{}", job_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    (status, body_json(response).await)
}

/// Poll the status endpoint until the job reaches a terminal stage
async fn wait_for_terminal(app: &axum::Router, job_id: &str) -> Value {
    for _ in 0..100 {
        let (status, body) = get_status(app, job_id).await;
        assert_eq!(status, StatusCode::OK);
        let stage = body["stage"].as_str().unwrap();
        if matches!(stage, "complete" | "canceled" | "error") {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("job {} never reached a terminal stage", job_id);
}

/// Drain progress events until the channel closes
async fn collect_events(
    mut rx: tokio::sync::broadcast::Receiver<ScanEvent>,
) -> (Vec<shelfscan_common::events::ProgressEvent>, String) {
    let mut events = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for progress event")
            .expect("channel dropped without close event");
        match event {
            ScanEvent::Progress(progress) => events.push(progress),
            ScanEvent::Closed { reason } => return (events, reason),
        }
    }
}

#[tokio::test]
async fn happy_path_streams_staged_progress_then_completes() {
    let state = test_state().await;
    let app = build_router(state.clone());

    // Create the job; background work is scheduled but gated on readiness
    let response = app.clone().oneshot(post_image("/scan", 512)).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let job_id = body_json(response).await["jobId"]
        .as_str()
        .unwrap()
        .to_string();

    // Attach to the progress channel before signaling readiness
    let channel = state
        .channels
        .get(Uuid::parse_str(&job_id).unwrap())
        .await
        .expect("channel should exist after job creation");
    let rx = channel.attach().unwrap();

    let ready = app
        .clone()
        .oneshot(post_json(&format!("/scan/ready/{}", job_id), json!({})))
        .await
        .unwrap();
    assert_eq!(ready.status(), StatusCode::NO_CONTENT);

    // Readiness is idempotent: a second signal is a no-op success
    let ready_again = app
        .clone()
        .oneshot(post_json(&format!("/scan/ready/{}", job_id), json!({})))
        .await
        .unwrap();
    assert_eq!(ready_again.status(), StatusCode::NO_CONTENT);

    let (events, close_reason) = collect_events(rx).await;
    assert_eq!(close_reason, "Scan complete");

    // Stage markers arrive in order with monotonically non-decreasing progress
    assert!(events.len() >= 4);
    assert_eq!(events.first().unwrap().progress, 0.1);
    assert!(events.iter().any(|e| e.progress == 0.3));
    assert_eq!(events.last().unwrap().progress, 1.0);
    assert!(events.windows(2).all(|w| w[0].progress <= w[1].progress));
    assert!(events.iter().all(|e| e.error.is_none()));

    let body = wait_for_terminal(&app, &job_id).await;
    assert_eq!(body["stage"], "complete");
    assert_eq!(body["booksDetected"], 3);

    let books = body["result"]["books"].as_array().unwrap();
    assert_eq!(books.len(), 3);

    // Readable spines got enriched, the unreadable one was skipped, not dropped
    let readable: Vec<&Value> = books.iter().filter(|b| !b["title"].is_null()).collect();
    assert_eq!(readable.len(), 2);
    for book in &readable {
        assert_eq!(book["enrichment"]["status"], "success");
    }
    let unreadable: Vec<&Value> = books.iter().filter(|b| b["title"].is_null()).collect();
    assert_eq!(unreadable.len(), 1);
    assert_eq!(unreadable[0]["enrichment"]["status"], "skipped");
}

#[tokio::test]
async fn never_ready_client_still_gets_a_complete_job() {
    let mut config = test_config();
    config.readiness_timeout_ms = 300;
    let state = test_state_with(config, StubDetector::shelf()).await;
    let app = build_router(state);

    let response = app.clone().oneshot(post_image("/scan", 512)).await.unwrap();
    let job_id = body_json(response).await["jobId"]
        .as_str()
        .unwrap()
        .to_string();

    // No readiness signal at all: after the bounded wait the job
    // proceeds, progress pushes become no-ops, and polling still
    // observes the final result.
    let body = wait_for_terminal(&app, &job_id).await;
    assert_eq!(body["stage"], "complete");
    assert!(!body["result"]["books"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn batch_cancellation_stops_before_the_next_photo() {
    let detector = StubDetector::slow_shelf(Duration::from_millis(150));
    let state = test_state_with(test_config(), detector.clone()).await;
    let app = build_router(state.clone());

    let job_id = Uuid::new_v4();
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    let images: Vec<Value> = (0..3)
        .map(|i| json!({"index": i, "data": STANDARD.encode(b"photo")}))
        .collect();

    let response = app
        .clone()
        .oneshot(post_json(
            "/scan/batch",
            json!({"jobId": job_id.to_string(), "images": images}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let channel = state.channels.get(job_id).await.unwrap();
    let mut rx = channel.attach().unwrap();

    let ready = app
        .clone()
        .oneshot(post_json(&format!("/scan/ready/{}", job_id), json!({})))
        .await
        .unwrap();
    assert_eq!(ready.status(), StatusCode::NO_CONTENT);

    // Wait for the first photo's completion event, then cancel
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for first photo event")
            .unwrap();
        if let ScanEvent::Progress(progress) = event {
            if progress.processed_items >= 1 {
                break;
            }
        }
    }

    let cancel = app
        .clone()
        .oneshot(post_json(
            "/scan/cancel",
            json!({"jobId": job_id.to_string()}),
        ))
        .await
        .unwrap();
    assert_eq!(cancel.status(), StatusCode::OK);

    // The coordinator notices the flag before its next photo and closes
    // the channel with the cancellation reason
    let reason = loop {
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for channel close")
            .unwrap();
        if let ScanEvent::Closed { reason } = event {
            break reason;
        }
    };
    assert_eq!(reason, "Scan canceled");

    let body = wait_for_terminal(&app, &job_id.to_string()).await;
    assert_eq!(body["stage"], "canceled");

    // The in-flight photo may finish, but photo 3 never starts
    let calls = detector.calls.load(std::sync::atomic::Ordering::SeqCst);
    assert!(calls <= 2, "expected at most 2 detection calls, got {}", calls);
}

#[tokio::test]
async fn canceling_a_finished_job_changes_nothing() {
    let state = test_state().await;
    let app = build_router(state);

    let response = app.clone().oneshot(post_image("/scan", 512)).await.unwrap();
    let job_id = body_json(response).await["jobId"]
        .as_str()
        .unwrap()
        .to_string();

    app.clone()
        .oneshot(post_json(&format!("/scan/ready/{}", job_id), json!({})))
        .await
        .unwrap();

    let body = wait_for_terminal(&app, &job_id).await;
    assert_eq!(body["stage"], "complete");

    let cancel = app
        .clone()
        .oneshot(post_json("/scan/cancel", json!({"jobId": job_id.clone()})))
        .await
        .unwrap();
    assert_eq!(cancel.status(), StatusCode::OK);
    assert_eq!(body_json(cancel).await["stage"], "complete");

    let (_, after) = get_status(&app, &job_id).await;
    assert_eq!(after["stage"], "complete");
}

#[tokio::test]
async fn ready_after_expiry_is_404() {
    let mut config = test_config();
    config.job_ttl_secs = 0;
    let state = test_state_with(config, StubDetector::shelf()).await;
    let app = build_router(state);

    let response = app.clone().oneshot(post_image("/scan", 512)).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let job_id = body_json(response).await["jobId"]
        .as_str()
        .unwrap()
        .to_string();

    // TTL of zero expires the record immediately
    let ready = app
        .clone()
        .oneshot(post_json(&format!("/scan/ready/{}", job_id), json!({})))
        .await
        .unwrap();
    assert_eq!(ready.status(), StatusCode::NOT_FOUND);

    let (status, _) = get_status(&app, &job_id).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn batch_happy_path_reports_per_photo_progress() {
    let state = test_state().await;
    let app = build_router(state.clone());

    let job_id = Uuid::new_v4();
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    let images: Vec<Value> = (0..2)
        .map(|i| json!({"index": i, "data": STANDARD.encode(b"photo")}))
        .collect();

    app.clone()
        .oneshot(post_json(
            "/scan/batch",
            json!({"jobId": job_id.to_string(), "images": images}),
        ))
        .await
        .unwrap();

    let channel = state.channels.get(job_id).await.unwrap();
    let rx = channel.attach().unwrap();

    app.clone()
        .oneshot(post_json(&format!("/scan/ready/{}", job_id), json!({})))
        .await
        .unwrap();

    let (events, close_reason) = collect_events(rx).await;
    assert_eq!(close_reason, "Scan complete");

    // One event per completed photo with a running book total, then the final marker
    let per_photo: Vec<_> = events.iter().filter(|e| e.total_items == 2).collect();
    assert!(per_photo.len() >= 2);
    assert_eq!(per_photo[0].processed_items, 1);
    assert!(per_photo[0].current_status.contains("photo 1 of 2"));
    assert!(per_photo.iter().any(|e| e.processed_items == 2));
    assert!(events.windows(2).all(|w| w[0].progress <= w[1].progress));

    let body = wait_for_terminal(&app, &job_id.to_string()).await;
    assert_eq!(body["stage"], "complete");
    // 3 stub detections per photo, 2 photos
    assert_eq!(body["booksDetected"], 6);
    assert_eq!(body["result"]["photosProcessed"], 2);
}
