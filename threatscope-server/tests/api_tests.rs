//! HTTP API integration tests
//!
//! Drives the real router with in-memory collaborators and asserts the wire
//! behavior: SSE framing, run retrieval, compaction, and deletion.

mod helpers;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use http_body_util::BodyExt;
use std::sync::Arc;
use threatscope_server::build_router;
use threatscope_server::store::{EventRecord, RunStore};
use tower::util::ServiceExt;
use uuid::Uuid;

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = build_router(helpers::test_state());
    let response = app.oneshot(empty_request("GET", "/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "threatscope-server");
}

#[tokio::test]
async fn test_stream_endpoint_emits_framed_events() {
    let state = helpers::test_state();
    let app = build_router(state);

    let response = app
        .oneshot(json_request(
            "POST",
            "/v1/stream",
            serde_json::json!({"thread_id": "t-sse", "message": "assess the estate"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.starts_with("text/event-stream"));

    let text = body_text(response).await;

    // Frame shape: id + event name + data, in order
    assert!(text.contains("id: 1\n"));
    assert!(text.contains("event: router_decision\n"));
    assert_eq!(text.matches("event: record_done\n").count(), 6);
    assert_eq!(text.matches("event: final_summary\n").count(), 1);
    assert!(!text.contains("event: error\n"));

    // The router decision comes before any record_done frame
    let router_pos = text.find("event: router_decision").unwrap();
    let first_done = text.find("event: record_done").unwrap();
    assert!(router_pos < first_done);

    // Payloads are full envelopes
    assert!(text.contains("\"thread_id\":\"t-sse\""));
}

#[tokio::test]
async fn test_stream_then_reload_run_state() {
    let state = helpers::test_state();
    let store = Arc::clone(&state.store);
    let app = build_router(state);

    // Run a stream to completion
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/v1/stream",
            serde_json::json!({"thread_id": "t-reload", "message": "m"}),
        ))
        .await
        .unwrap();
    body_text(response).await;

    // The run is listed
    let response = app
        .clone()
        .oneshot(empty_request("GET", "/v1/runs"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["runs"][0]["thread_id"], "t-reload");
    assert_eq!(body["runs"][0]["status"], "completed");

    // Raw events reconstruct the full stream
    let response = app
        .clone()
        .oneshot(empty_request("GET", "/v1/runs/t-reload"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["run"]["total_events"], 8);
    assert_eq!(body["events"].as_array().unwrap().len(), 8);
    assert_eq!(body["events"][0]["event_type"], "router_decision");

    // Direct store view agrees with the API view
    let run = store.get_run("t-reload").await.unwrap().unwrap();
    assert_eq!(run.total_events, 8);
}

#[tokio::test]
async fn test_missing_run_is_404() {
    let app = build_router(helpers::test_state());

    let response = app
        .clone()
        .oneshot(empty_request("GET", "/v1/runs/ghost"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let response = app
        .oneshot(empty_request("DELETE", "/v1/runs/ghost"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_run_removes_it_from_listing() {
    let state = helpers::test_state();
    let app = build_router(state);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/v1/stream",
            serde_json::json!({"thread_id": "t-del", "message": "m"}),
        ))
        .await
        .unwrap();
    body_text(response).await;

    let response = app
        .clone()
        .oneshot(empty_request("DELETE", "/v1/runs/t-del"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(empty_request("GET", "/v1/runs/t-del"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .oneshot(empty_request("GET", "/v1/runs"))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["total"], 0);
}

#[tokio::test]
async fn test_compact_endpoint_folds_orphan_chunks() {
    let state = helpers::test_state();
    let store = Arc::clone(&state.store);
    let app = build_router(state);

    // Given: a stored run whose log holds raw chunk rows from a producer
    // that never finished the record
    store
        .create_run("t-compact", "m", serde_json::json!({}))
        .await
        .unwrap();
    for (seq, text) in [(1, "first half"), (2, "second half")] {
        store
            .append_event(&EventRecord {
                id: Uuid::new_v4(),
                thread_id: "t-compact".to_string(),
                event_type: "record_chunk".to_string(),
                seq,
                timestamp: Utc::now(),
                payload: serde_json::json!({
                    "kind": "host",
                    "id": "10.9.9.9",
                    "chunk": text,
                }),
            })
            .await
            .unwrap();
    }

    // When: the compacted view is requested
    let response = app
        .clone()
        .oneshot(empty_request("GET", "/v1/runs/t-compact/compact"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;

    // Then: one synthesized terminal event replaces the chunk rows
    let events = body["events"].as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["event_type"], "record_done");
    assert_eq!(events[0]["payload"]["summary"], "first half second half");
    assert_eq!(events[0]["payload"]["confidence"], 0.85);

    // The raw view still shows the chunks untouched
    let response = app
        .oneshot(empty_request("GET", "/v1/runs/t-compact"))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["events"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_stream_generates_thread_id_when_omitted() {
    let state = helpers::test_state();
    let store = Arc::clone(&state.store);
    let app = build_router(state);

    let response = app
        .oneshot(json_request(
            "POST",
            "/v1/stream",
            serde_json::json!({"message": "m"}),
        ))
        .await
        .unwrap();
    let text = body_text(response).await;
    assert!(text.contains("event: final_summary"));

    let runs = store.list_runs(10).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert!(!runs[0].thread_id.is_empty());
}
