//! HTTP and WebSocket surface for the phone agent
//!
//! REST endpoints for call lifecycle, scheduling, and inspection, plus a
//! WebSocket that carries turn envelopes for a live call.

pub mod http;
pub mod state;
pub mod ws;

pub use http::create_router;
pub use state::AppState;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use homeserv_dialogue::DialogueError;
use homeserv_scheduling::SchedulingError;
use homeserv_session::SessionError;

/// Server errors
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Dialogue(#[from] DialogueError),

    #[error(transparent)]
    Scheduling(#[from] SchedulingError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ServerError {
    fn status(&self) -> StatusCode {
        match self {
            ServerError::Session(SessionError::SessionNotFound(_)) => StatusCode::NOT_FOUND,
            ServerError::Session(SessionError::DuplicateSession(_)) => StatusCode::CONFLICT,
            ServerError::Session(SessionError::SessionClosed(_)) => StatusCode::GONE,
            ServerError::Session(_) => StatusCode::CONFLICT,
            ServerError::Dialogue(DialogueError::Session(e)) => {
                ServerError::Session(e.clone()).status()
            }
            ServerError::Dialogue(DialogueError::Scheduling(e)) => scheduling_status(e),
            ServerError::Dialogue(DialogueError::UnknownTool(_))
            | ServerError::Dialogue(DialogueError::InvalidArguments { .. })
            | ServerError::Dialogue(DialogueError::InvalidToolCall { .. })
            | ServerError::Dialogue(DialogueError::Diagnostics(_)) => StatusCode::BAD_REQUEST,
            ServerError::Dialogue(DialogueError::UpstreamTimeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            ServerError::Dialogue(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Scheduling(e) => scheduling_status(e),
            ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

fn scheduling_status(e: &SchedulingError) -> StatusCode {
    match e {
        SchedulingError::SlotNotFound(_)
        | SchedulingError::AppointmentNotFound(_)
        | SchedulingError::CustomerNotFound(_) => StatusCode::NOT_FOUND,
        SchedulingError::SlotNoLongerAvailable(_)
        | SchedulingError::AlreadyCancelled(_)
        | SchedulingError::NotCancellable { .. } => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
