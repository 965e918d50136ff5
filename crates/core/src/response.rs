//! Spoken response envelope produced by every turn.

use serde::{Deserialize, Serialize};

/// Category of recovery behavior attached to a turn that could not
/// proceed normally. Downstream voice layers may map these onto
/// different prosody or transfer behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackCategory {
    /// Re-ask the same question, possibly rephrased.
    RetryAsk,
    /// The chosen slot was lost, fresh alternatives are being offered.
    OfferAlternativeSlot,
    /// Too many consecutive failures, offer a human callback.
    OfferCallback,
    /// Unrecoverable, apologize and end the call.
    ApologizeAndEnd,
}

/// What the agent says back for one turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpokenResponse {
    /// Utterance for the voice layer to synthesize.
    pub text: String,
    /// When true the call should be hung up after speaking.
    pub end_call: bool,
    /// Present when this turn is a recovery rather than a normal reply.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackCategory>,
}

impl SpokenResponse {
    pub fn say(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            end_call: false,
            fallback: None,
        }
    }

    pub fn hangup(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            end_call: true,
            fallback: None,
        }
    }

    pub fn fallback(text: impl Into<String>, category: FallbackCategory) -> Self {
        Self {
            text: text.into(),
            end_call: matches!(category, FallbackCategory::ApologizeAndEnd),
            fallback: Some(category),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apologize_ends_call() {
        let r = SpokenResponse::fallback("sorry", FallbackCategory::ApologizeAndEnd);
        assert!(r.end_call);
        let r = SpokenResponse::fallback("again?", FallbackCategory::RetryAsk);
        assert!(!r.end_call);
    }

    #[test]
    fn fallback_omitted_when_absent() {
        let json = serde_json::to_value(SpokenResponse::say("hi")).unwrap();
        assert!(json.get("fallback").is_none());
    }
}
