use std::convert::Infallible;

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::{stream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::error;
use uuid::Uuid;

use crate::api::{error::ApiError, state::AppState};
use crate::application::Answer;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub query: String,
}

pub async fn chat_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<Answer>, ApiError> {
    Ok(Json(state.verifier.ask(id, &request.query, None).await?))
}

/// Streams `token` events as the answer is generated, then one `done` event
/// with the full answer or an `error` event. The interaction runs on its own
/// task and completes even if the client disconnects.
pub async fn chat_stream_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    // Input errors get a plain status; only failures past this point become events.
    state.verifier.check_ask(id, &request.query).await?;

    let (tx, rx) = mpsc::unbounded_channel::<String>();
    let verifier = state.verifier.clone();
    let task = tokio::spawn(async move { verifier.ask(id, &request.query, Some(tx)).await });

    let tokens = stream::unfold(rx, |mut rx| async move {
        let fragment = rx.recv().await?;
        Some((sse_event("token", json!({ "text": fragment })), rx))
    });

    let finish = stream::once(async move {
        match task.await {
            Ok(Ok(answer)) => sse_event("done", &answer),
            Ok(Err(e)) => {
                let e = ApiError::from(e);
                if e.status().is_server_error() {
                    error!(error = %e, "streamed chat failed");
                }
                sse_event("error", json!({ "error": e.to_string(), "status": e.status().as_u16() }))
            }
            Err(e) => {
                error!(error = %e, "chat task panicked");
                sse_event("error", json!({ "error": "internal error", "status": 500 }))
            }
        }
    });

    let events = tokens.chain(finish).map(Ok::<_, Infallible>);
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

fn sse_event(name: &str, payload: impl Serialize) -> Event {
    Event::default()
        .event(name)
        .json_data(payload)
        .unwrap_or_else(|e| Event::default().event("error").data(e.to_string()))
}
