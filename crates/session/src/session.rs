//! A single call's state.

use homeserv_core::CallPhase;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::SessionError;

#[derive(Debug, Default)]
struct SessionState {
    phase: CallPhase,
    /// Facts gathered during the call (appliance, zip code, symptom, ...).
    facts: HashMap<String, String>,
    /// Name of the tool call currently in flight, if any.
    pending_tool: Option<String>,
    /// Consecutive failed turns in the current phase.
    failure_streak: u32,
    /// Turns spent in the diagnose phase.
    diagnose_turns: u32,
    customer_id: Option<i64>,
}

/// State for one live phone call.
///
/// Cheap state sits behind a parking_lot mutex. Turn handling itself is
/// serialized by `turn_gate`, a tokio mutex because a turn holds it
/// across awaits; a second transcript arriving mid-turn waits its turn
/// instead of interleaving.
#[derive(Debug)]
pub struct CallSession {
    pub id: String,
    pub caller_phone: String,
    pub created_at: Instant,
    last_activity: RwLock<Instant>,
    state: Mutex<SessionState>,
    turn_gate: tokio::sync::Mutex<()>,
}

/// Point-in-time view of a session, for the inspection endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: String,
    pub phase: CallPhase,
    pub facts: HashMap<String, String>,
    pub customer_id: Option<i64>,
    pub failure_streak: u32,
    pub diagnose_turns: u32,
    pub pending_tool: Option<String>,
    pub idle_seconds: u64,
}

impl CallSession {
    pub fn new(id: impl Into<String>, caller_phone: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            caller_phone: caller_phone.into(),
            created_at: Instant::now(),
            last_activity: RwLock::new(Instant::now()),
            state: Mutex::new(SessionState::default()),
            turn_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Take the turn gate. Held for the whole turn.
    pub async fn begin_turn(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.turn_gate.lock().await
    }

    /// Take the turn gate without waiting. None while a turn is in flight.
    pub fn try_begin_turn(&self) -> Option<tokio::sync::MutexGuard<'_, ()>> {
        self.turn_gate.try_lock().ok()
    }

    pub fn touch(&self) {
        *self.last_activity.write() = Instant::now();
    }

    pub fn is_expired(&self, timeout: Duration) -> bool {
        self.last_activity.read().elapsed() > timeout
    }

    pub fn phase(&self) -> CallPhase {
        self.state.lock().phase
    }

    pub fn is_closed(&self) -> bool {
        self.phase().is_terminal()
    }

    /// Move to another phase. The failure streak is per phase, so it
    /// resets on every successful transition.
    pub fn transition_to(&self, to: CallPhase) -> Result<(), SessionError> {
        let mut state = self.state.lock();
        if state.phase.is_terminal() {
            return Err(SessionError::SessionClosed(self.id.clone()));
        }
        if !state.phase.can_transition_to(to) {
            return Err(SessionError::InvalidTransition {
                from: state.phase,
                to,
            });
        }
        tracing::debug!(
            call_id = %self.id,
            from = state.phase.display_name(),
            to = to.display_name(),
            "phase transition"
        );
        state.phase = to;
        state.failure_streak = 0;
        Ok(())
    }

    /// Close unconditionally. Valid from every phase and idempotent.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.phase = CallPhase::Closed;
        state.pending_tool = None;
    }

    pub fn fact(&self, key: &str) -> Option<String> {
        self.state.lock().facts.get(key).cloned()
    }

    pub fn set_fact(&self, key: impl Into<String>, value: impl Into<String>) {
        self.state.lock().facts.insert(key.into(), value.into());
    }

    pub fn clear_fact(&self, key: &str) {
        self.state.lock().facts.remove(key);
    }

    pub fn customer_id(&self) -> Option<i64> {
        self.state.lock().customer_id
    }

    pub fn set_customer_id(&self, id: i64) {
        self.state.lock().customer_id = Some(id);
    }

    /// Record a failed turn, returning the new streak length.
    pub fn record_failure(&self) -> u32 {
        let mut state = self.state.lock();
        state.failure_streak += 1;
        state.failure_streak
    }

    pub fn reset_failures(&self) {
        self.state.lock().failure_streak = 0;
    }

    pub fn failure_streak(&self) -> u32 {
        self.state.lock().failure_streak
    }

    /// Count a diagnose-phase turn, returning the total so far.
    pub fn note_diagnose_turn(&self) -> u32 {
        let mut state = self.state.lock();
        state.diagnose_turns += 1;
        state.diagnose_turns
    }

    pub fn diagnose_turns(&self) -> u32 {
        self.state.lock().diagnose_turns
    }

    /// Mark a tool call as in flight. Only one at a time.
    pub fn begin_tool_call(&self, name: &str) -> Result<(), SessionError> {
        let mut state = self.state.lock();
        if let Some(pending) = &state.pending_tool {
            return Err(SessionError::PendingToolCall(pending.clone()));
        }
        state.pending_tool = Some(name.to_string());
        Ok(())
    }

    pub fn finish_tool_call(&self) {
        self.state.lock().pending_tool = None;
    }

    pub fn pending_tool(&self) -> Option<String> {
        self.state.lock().pending_tool.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.lock();
        SessionSnapshot {
            id: self.id.clone(),
            phase: state.phase,
            facts: state.facts.clone(),
            customer_id: state.customer_id,
            failure_streak: state.failure_streak,
            diagnose_turns: state.diagnose_turns,
            pending_tool: state.pending_tool.clone(),
            idle_seconds: self.last_activity.read().elapsed().as_secs(),
        }
    }
}
