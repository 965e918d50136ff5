//! WebSocket transport for a live call.
//!
//! The telephony bridge connects once per call, sends one JSON
//! [`TurnIntent`] per text frame, and receives one JSON
//! [`SpokenResponse`] back per turn. The socket closes after a response
//! with `end_call` set, and a dropped connection ends the call.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use serde::Deserialize;
use tracing::{debug, info, warn};

use homeserv_dialogue::{DialogueError, TurnIntent};
use homeserv_session::SessionError;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub caller_phone: String,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(call_id): Path<String>,
    Query(params): Query<WsParams>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_call(socket, state, call_id, params.caller_phone))
}

async fn handle_call(mut socket: WebSocket, state: AppState, call_id: String, caller_phone: String) {
    info!(call_id = %call_id, "call connected");

    match state.orchestrator.begin_call(&call_id, &caller_phone).await {
        Ok(greeting) => {
            if send_json(&mut socket, &greeting).await.is_err() {
                state.orchestrator.end_call(&call_id).await;
                return;
            }
        }
        // The call may have been started over REST already; attach to it.
        Err(DialogueError::Session(SessionError::DuplicateSession(_))) => {
            debug!(call_id = %call_id, "attaching to existing call");
        }
        Err(e) => {
            warn!(call_id = %call_id, error = %e, "could not start call");
            let _ = send_error(&mut socket, "call could not be started").await;
            return;
        }
    }

    while let Some(message) = socket.recv().await {
        let message = match message {
            Ok(m) => m,
            Err(e) => {
                debug!(call_id = %call_id, error = %e, "socket error");
                break;
            }
        };
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) | Message::Binary(_) => continue,
        };

        let intent: TurnIntent = match serde_json::from_str(&text) {
            Ok(intent) => intent,
            Err(e) => {
                if send_error(&mut socket, &format!("bad turn envelope: {e}")).await.is_err() {
                    break;
                }
                continue;
            }
        };

        match state.orchestrator.handle_turn(&call_id, intent).await {
            Ok(response) => {
                let ending = response.end_call;
                if send_json(&mut socket, &response).await.is_err() {
                    break;
                }
                if ending {
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                }
            }
            Err(DialogueError::Session(SessionError::SessionClosed(_)))
            | Err(DialogueError::Session(SessionError::SessionNotFound(_))) => {
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
            Err(e) => {
                // Recoverable turn errors keep the call going. The detail
                // stays in the logs; the bridge only learns the turn failed.
                warn!(call_id = %call_id, error = %e, "turn failed");
                if send_error(&mut socket, "turn could not be processed").await.is_err() {
                    break;
                }
            }
        }
    }

    state.orchestrator.end_call(&call_id).await;
    info!(call_id = %call_id, "call disconnected");
}

async fn send_json<T: serde::Serialize>(socket: &mut WebSocket, value: &T) -> Result<(), axum::Error> {
    let text = serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string());
    socket.send(Message::Text(text)).await
}

async fn send_error(socket: &mut WebSocket, message: &str) -> Result<(), axum::Error> {
    let payload = serde_json::json!({ "error": message });
    socket.send(Message::Text(payload.to_string())).await
}
