//! Symptom matching and dispatch heuristics.

use homeserv_core::ApplianceCategory;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::{common_symptoms, DiagnosticsError};

/// A matched symptom with a word-overlap confidence score in (0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymptomMatch {
    pub symptom: &'static str,
    pub score: f32,
}

/// Caller-reported severity of a symptom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SymptomSeverity {
    Low,
    #[default]
    Medium,
    High,
}

/// Match a caller's description against the known symptoms for an appliance.
///
/// Scoring is word overlap between the description and each symptom,
/// normalized by the symptom's word count. The best-scoring symptom wins.
pub fn match_symptom(
    appliance: ApplianceCategory,
    description: &str,
) -> Result<SymptomMatch, DiagnosticsError> {
    let description_words: HashSet<String> = description
        .to_lowercase()
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'').to_string())
        .filter(|w| !w.is_empty())
        .collect();

    let mut best: Option<SymptomMatch> = None;
    for &symptom in common_symptoms(appliance) {
        let symptom_words: Vec<&str> = symptom.split_whitespace().collect();
        let overlap = symptom_words
            .iter()
            .filter(|w| description_words.contains(**w))
            .count();
        if overlap == 0 {
            continue;
        }
        let score = overlap as f32 / symptom_words.len() as f32;
        if best.as_ref().map_or(true, |b| score > b.score) {
            best = Some(SymptomMatch { symptom, score });
        }
    }

    best.ok_or_else(|| DiagnosticsError::UnknownSymptom {
        appliance,
        description: description.trim().to_string(),
    })
}

/// Whether a technician visit should be recommended.
///
/// High-severity symptoms always get a dispatch. Otherwise, two or more
/// troubleshooting steps attempted without resolution does.
pub fn should_dispatch_technician(
    steps_attempted: usize,
    issue_resolved: bool,
    severity: SymptomSeverity,
) -> bool {
    if issue_resolved {
        return false;
    }
    if severity == SymptomSeverity::High {
        return true;
    }
    steps_attempted >= 2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_exact_symptom() {
        let m = match_symptom(ApplianceCategory::Refrigerator, "it's not cooling").unwrap();
        assert_eq!(m.symptom, "not cooling");
        assert!(m.score >= 1.0);
    }

    #[test]
    fn matches_partial_overlap() {
        let m = match_symptom(
            ApplianceCategory::Washer,
            "there is water leaking all over the floor",
        )
        .unwrap();
        assert_eq!(m.symptom, "leaking water");
    }

    #[test]
    fn prefers_higher_overlap() {
        let m = match_symptom(ApplianceCategory::Dryer, "it takes too long to dry").unwrap();
        assert_eq!(m.symptom, "takes too long to dry");
    }

    #[test]
    fn unknown_symptom_errors() {
        let err = match_symptom(ApplianceCategory::Washer, "it glows purple").unwrap_err();
        assert!(matches!(err, DiagnosticsError::UnknownSymptom { .. }));
    }

    #[test]
    fn dispatch_heuristic() {
        assert!(!should_dispatch_technician(5, true, SymptomSeverity::High));
        assert!(should_dispatch_technician(0, false, SymptomSeverity::High));
        assert!(should_dispatch_technician(2, false, SymptomSeverity::Medium));
        assert!(!should_dispatch_technician(1, false, SymptomSeverity::Low));
    }
}
