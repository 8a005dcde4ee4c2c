//! WebSocket stream of pipeline snapshots for one session.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use matchpro_core::PipelineController;

use super::sessions::{lookup, SessionResponse};
use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_MESSAGES_SENT};
use crate::state::AppState;

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match lookup(&state, &id) {
        Ok((id, pipeline)) => ws
            .on_upgrade(move |socket| handle_socket(socket, id, pipeline))
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// Serialize the current snapshot as a text frame.
fn snapshot_message(id: Uuid, pipeline: &PipelineController) -> Option<Message> {
    let body = SessionResponse {
        id,
        snapshot: pipeline.snapshot(),
    };
    match serde_json::to_string(&body) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            error!("Failed to serialize snapshot: {}", e);
            None
        }
    }
}

/// Handle a single WebSocket connection.
///
/// The current snapshot is sent on connect and again after every change.
/// Intermediate snapshots may be skipped if the client is slower than the
/// pipeline; the latest one is always delivered.
async fn handle_socket(socket: WebSocket, id: Uuid, pipeline: Arc<PipelineController>) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = pipeline.subscribe();

    WS_CONNECTIONS_TOTAL.inc();
    WS_CONNECTIONS_ACTIVE.inc();
    info!(session_id = %id, "WebSocket client connected");

    let send_task = tokio::spawn(async move {
        rx.mark_changed();
        loop {
            if rx.changed().await.is_err() {
                debug!(session_id = %id, "Pipeline dropped, closing stream");
                break;
            }

            let Some(msg) = snapshot_message(id, &pipeline) else {
                continue;
            };
            WS_MESSAGES_SENT.inc();
            if sender.send(msg).await.is_err() {
                debug!(session_id = %id, "WebSocket send failed, client disconnected");
                break;
            }
        }
        let _ = sender.send(Message::Close(None)).await;
    });

    // Handle incoming messages from client (ping/pong, close)
    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Close(_)) => {
                debug!(session_id = %id, "WebSocket client requested close");
                break;
            }
            Ok(Message::Text(text)) => {
                debug!(session_id = %id, "Ignoring client message: {}", text.as_str());
            }
            Ok(_) => {}
            Err(e) => {
                warn!(session_id = %id, "WebSocket receive error: {}", e);
                break;
            }
        }
    }

    send_task.abort();
    WS_CONNECTIONS_ACTIVE.dec();
    info!(session_id = %id, "WebSocket client disconnected");
}
