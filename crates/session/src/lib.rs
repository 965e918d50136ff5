//! Per-call session state
//!
//! One [`CallSession`] per live phone call, holding the phase machine,
//! gathered facts, and turn serialization. The [`SessionManager`] owns
//! the session table and reaps idle calls in the background.

pub mod manager;
pub mod session;

pub use manager::SessionManager;
pub use session::{CallSession, SessionSnapshot};

use homeserv_core::CallPhase;
use thiserror::Error;

/// Session errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("a session already exists for call {0}")]
    DuplicateSession(String),

    #[error("no session for call {0}")]
    SessionNotFound(String),

    #[error("session for call {0} is closed")]
    SessionClosed(String),

    #[error("invalid phase transition from {} to {}", from.display_name(), to.display_name())]
    InvalidTransition { from: CallPhase, to: CallPhase },

    #[error("a tool call is already in flight: {0}")]
    PendingToolCall(String),
}
