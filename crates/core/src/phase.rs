//! Call Phase State Machine
//!
//! Defines the phases of a diagnostic/booking call and their valid transitions.

use serde::{Deserialize, Serialize};

/// Phase of the conversation state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CallPhase {
    /// Initial greeting, caller identity not yet captured
    #[default]
    Greeting,
    /// Capturing customer identity and appliance category
    Identify,
    /// Symptom gathering and troubleshooting
    Diagnose,
    /// Finding and choosing an appointment slot
    Schedule,
    /// Reading a tentative slot back for confirmation
    Confirm,
    /// Call over, no further turns accepted
    Closed,
}

impl CallPhase {
    pub fn display_name(&self) -> &'static str {
        match self {
            CallPhase::Greeting => "Greeting",
            CallPhase::Identify => "Identify",
            CallPhase::Diagnose => "Diagnose",
            CallPhase::Schedule => "Schedule",
            CallPhase::Confirm => "Confirm",
            CallPhase::Closed => "Closed",
        }
    }

    /// Valid transitions out of this phase.
    ///
    /// Forward-only, with two explicit corrections: Diagnose may fall back to
    /// Identify when the appliance was misidentified, and Confirm returns to
    /// Schedule when the caller declines the read-back. Closed is reachable
    /// from every phase (call-end signal, unrecoverable error).
    pub fn valid_transitions(&self) -> &'static [CallPhase] {
        match self {
            CallPhase::Greeting => &[CallPhase::Identify, CallPhase::Closed],
            CallPhase::Identify => &[CallPhase::Diagnose, CallPhase::Closed],
            CallPhase::Diagnose => &[
                CallPhase::Schedule,
                CallPhase::Identify,
                CallPhase::Closed,
            ],
            CallPhase::Schedule => &[CallPhase::Confirm, CallPhase::Closed],
            CallPhase::Confirm => &[CallPhase::Schedule, CallPhase::Closed],
            CallPhase::Closed => &[],
        }
    }

    pub fn can_transition_to(&self, to: CallPhase) -> bool {
        self.valid_transitions().contains(&to)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CallPhase::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_transitions() {
        assert!(CallPhase::Greeting.can_transition_to(CallPhase::Identify));
        assert!(CallPhase::Identify.can_transition_to(CallPhase::Diagnose));
        assert!(CallPhase::Diagnose.can_transition_to(CallPhase::Schedule));
        assert!(CallPhase::Schedule.can_transition_to(CallPhase::Confirm));
        assert!(CallPhase::Confirm.can_transition_to(CallPhase::Closed));
    }

    #[test]
    fn correction_transitions() {
        assert!(CallPhase::Diagnose.can_transition_to(CallPhase::Identify));
        assert!(CallPhase::Confirm.can_transition_to(CallPhase::Schedule));
    }

    #[test]
    fn no_regressions() {
        assert!(!CallPhase::Schedule.can_transition_to(CallPhase::Diagnose));
        assert!(!CallPhase::Confirm.can_transition_to(CallPhase::Greeting));
        assert!(!CallPhase::Greeting.can_transition_to(CallPhase::Schedule));
    }

    #[test]
    fn closed_is_terminal() {
        assert!(CallPhase::Closed.is_terminal());
        assert!(CallPhase::Closed.valid_transitions().is_empty());
        for phase in [
            CallPhase::Greeting,
            CallPhase::Identify,
            CallPhase::Diagnose,
            CallPhase::Schedule,
            CallPhase::Confirm,
        ] {
            assert!(phase.can_transition_to(CallPhase::Closed));
        }
    }
}
