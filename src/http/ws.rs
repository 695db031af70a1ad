use super::state::AppState;
use crate::protocol::{Frame, Outbound};
use crate::stream::run_connection;
use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::IntoResponse,
};
use futures::{future, SinkExt, StreamExt};
use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

/// GET /v1/transcription/:transcription_session_id/stream
/// WebSocket for streaming audio chunks and receiving transcript updates
pub async fn stream_transcription(
    State(state): State<AppState>,
    Path(transcription_session_id): Path<String>,
    upgrade: WebSocketUpgrade,
) -> impl IntoResponse {
    upgrade.on_upgrade(move |socket| serve_socket(state, transcription_session_id, socket))
}

async fn serve_socket(state: AppState, session_id: String, socket: WebSocket) {
    let (mut sender, receiver) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<Outbound>(state.outbound_buffer);

    // Single writer: in-order results, inline errors and close frames all go through here
    let writer = tokio::spawn(async move {
        while let Some(item) = out_rx.recv().await {
            match item {
                Outbound::Message(message) => {
                    let payload = match serde_json::to_string(&message) {
                        Ok(payload) => payload,
                        Err(e) => {
                            error!("Failed to serialize websocket payload: {}", e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(payload)).await.is_err() {
                        break;
                    }
                }
                Outbound::Close { code, reason } => {
                    let frame = CloseFrame {
                        code,
                        reason: Cow::from(reason),
                    };
                    let _ = sender.send(Message::Close(Some(frame))).await;
                    break;
                }
            }
        }
    });

    let inbound = receiver.filter_map(|message| {
        future::ready(match message {
            Ok(Message::Text(text)) => Some(Ok(Frame::Text(text))),
            Ok(Message::Binary(data)) => Some(Ok(Frame::Binary(data))),
            Ok(Message::Close(_)) => Some(Ok(Frame::Close)),
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => None,
            Err(e) => Some(Err(e)),
        })
    });

    let outcome = run_connection(Arc::clone(&state.stream), session_id.clone(), inbound, out_tx).await;
    debug!("Stream for session {} ended: {:?}", session_id, outcome);

    if tokio::time::timeout(Duration::from_secs(5), writer).await.is_err() {
        warn!("Writer for session {} didn't finish after close", session_id);
    }
}
