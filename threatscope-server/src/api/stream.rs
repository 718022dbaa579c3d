//! POST /v1/stream - one SSE stream per analysis run
//!
//! Each request starts an independent run. The response is a chunked SSE
//! stream whose frames carry the run's ordered events; every frame is
//! persisted before it is delivered, and a failed run ends with an `error`
//! event rather than a silent close.

use crate::sequencer::EventSequencer;
use crate::AppState;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::Stream;
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use threatscope_common::events::{ErrorPayload, EventName, SseEnvelope};
use tracing::{error, info};
use uuid::Uuid;

/// POST /v1/stream request body
#[derive(Debug, Deserialize)]
pub struct StreamRequest {
    /// Callers may supply their own id to correlate runs; generated otherwise
    pub thread_id: Option<String>,
    /// Natural-language query forwarded to every expert
    pub message: String,
    /// Arbitrary JSON blob stored with the run
    #[serde(default = "empty_object")]
    pub input: serde_json::Value,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

pub async fn stream_run(
    State(state): State<AppState>,
    Json(request): Json<StreamRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let StreamRequest {
        thread_id,
        message,
        input,
    } = request;
    let thread_id = thread_id.unwrap_or_else(|| Uuid::new_v4().simple().to_string());
    info!(thread_id = %thread_id, "New analysis stream");

    let stream = async_stream::stream! {
        // Durability precedes delivery: the run row must exist before the
        // first event can be appended to it.
        if let Err(e) = state.store.create_run(&thread_id, &message, input).await {
            error!(thread_id = %thread_id, error = %e, "Failed to create run");
            let envelope = SseEnvelope::new(
                EventName::Error,
                &thread_id,
                1,
                serde_json::to_value(ErrorPayload::new("EVENT_STORE", e.to_string()))
                    .unwrap_or_default(),
            );
            yield Ok(sse_frame(&envelope));
            return;
        }

        let mut sequencer = EventSequencer::new(Arc::clone(&state.store), thread_id.clone());
        let mut snapshots = state.graph.spawn(message);

        while let Some(item) = snapshots.recv().await {
            match item {
                Ok(snapshot) => match sequencer.observe(&snapshot).await {
                    Ok(envelopes) => {
                        for envelope in envelopes {
                            yield Ok(sse_frame(&envelope));
                        }
                    }
                    Err(e) => {
                        // Store refused an append; the run cannot continue
                        error!(thread_id = %thread_id, error = %e, "Event persistence failed");
                        let envelope = sequencer.fail("EVENT_STORE", &e.to_string()).await;
                        yield Ok(sse_frame(&envelope));
                        return;
                    }
                },
                Err(graph_error) => {
                    error!(thread_id = %thread_id, error = %graph_error, "Run failed");
                    let envelope = sequencer
                        .fail(graph_error.code(), &graph_error.to_string())
                        .await;
                    yield Ok(sse_frame(&envelope));
                    return;
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}

/// Encode one envelope as an SSE frame with a resumable event id.
fn sse_frame(envelope: &SseEnvelope) -> Event {
    let data = serde_json::to_string(envelope).unwrap_or_else(|_| "{}".to_string());
    Event::default()
        .id(envelope.seq.to_string())
        .event(envelope.event.as_str())
        .data(data)
}
