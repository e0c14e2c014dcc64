//! Invariants under test:
//! 1. POST /register with a well-formed body enqueues and returns 202.
//! 2. A second POST for the same subdomain returns 403 (duplicate).
//! 3. A body declaring Content-Length over the 1 MiB cap returns 403 without
//!    touching the queue.
//! 4. Any unmatched route returns 404 with the documented error body.
//! 5. A body whose actual size (not just its declared Content-Length)
//!    exceeds the 1 MiB cap is rejected by the router itself.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::json;
use subreg_daemon::{routes, state::AppState};
use subreg_testkit::{FakeExistenceOracle, TempQueueStore};
use tower::ServiceExt;

async fn build_app() -> (axum::Router, TempQueueStore) {
    let temp = TempQueueStore::new().await;
    let oracle = Arc::new(FakeExistenceOracle::new());
    let state = Arc::new(AppState::new("example.id", temp.store.clone(), oracle));
    (routes::build_router(state), temp)
}

#[tokio::test]
async fn register_then_duplicate_then_health() {
    let (app, _temp) = build_app().await;

    let body = json!({
        "subdomain": "alice",
        "data_pubkey": "pubkey:data:00ff",
        "zonefile_str": "$origin alice\n$ttl 3600\n"
    });

    let req = Request::builder()
        .method("POST")
        .uri("/register")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);

    let req = Request::builder()
        .method("POST")
        .uri("/register")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let req = Request::builder().method("GET").uri("/health").body(Body::empty()).unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn oversized_content_length_is_rejected() {
    let (app, _temp) = build_app().await;

    let req = Request::builder()
        .method("POST")
        .uri("/register")
        .header("content-type", "application/json")
        .header("content-length", (2 * 1024 * 1024).to_string())
        .body(Body::from(vec![b'a'; 16]))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn actually_oversized_body_is_rejected_by_the_router() {
    let (app, _temp) = build_app().await;

    let oversized = vec![b'a'; 2 * 1024 * 1024];
    let req = Request::builder()
        .method("POST")
        .uri("/register")
        .header("content-type", "application/json")
        .body(Body::from(oversized))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn unmatched_route_returns_404() {
    let (app, _temp) = build_app().await;
    let req = Request::builder().method("GET").uri("/nope").body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
