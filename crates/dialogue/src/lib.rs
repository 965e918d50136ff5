//! Turn handling for the phone agent
//!
//! The orchestrator takes one caller turn at a time, either a raw
//! transcript or a structured tool call, consults the session's phase,
//! and produces the next spoken response. Side effects (booking,
//! cancelling, upload links) go through the scheduling engine and the
//! collaborator traits.

pub mod collaborators;
pub mod orchestrator;
pub mod schema;
pub mod tools;
pub mod utterances;

pub use collaborators::{
    CollaboratorError, EmailCollaborator, ImageAnalysis, ImageCollaborator, StubUploadService,
    UploadToken,
};
pub use orchestrator::{DialogueOrchestrator, TurnIntent};
pub use schema::{InputSchema, PropertySchema, ToolSchema};
pub use tools::ToolCall;

use homeserv_core::CallPhase;
use homeserv_diagnostics::DiagnosticsError;
use homeserv_scheduling::SchedulingError;
use homeserv_session::SessionError;
use thiserror::Error;

/// Dialogue errors
#[derive(Debug, Error)]
pub enum DialogueError {
    #[error("tool {name} is not valid during the {} phase", phase.display_name())]
    InvalidToolCall { name: String, phase: CallPhase },

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("bad arguments for {tool}: {message}")]
    InvalidArguments { tool: String, message: String },

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Scheduling(#[from] SchedulingError),

    #[error(transparent)]
    Diagnostics(#[from] DiagnosticsError),

    #[error("collaborator call timed out: {0}")]
    UpstreamTimeout(String),

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
}
