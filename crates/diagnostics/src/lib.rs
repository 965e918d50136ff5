//! Appliance diagnostic knowledge and symptom matching
//!
//! A static knowledge base of common symptoms, diagnostic questions and
//! troubleshooting checklists per appliance category, plus the matching
//! logic that maps a caller's free-form description onto a known symptom.

pub mod knowledge;
pub mod matcher;

pub use knowledge::{knowledge_for, ApplianceKnowledge, DEFAULT_TROUBLESHOOTING};
pub use matcher::{match_symptom, should_dispatch_technician, SymptomMatch, SymptomSeverity};

use homeserv_core::ApplianceCategory;
use thiserror::Error;

/// Diagnostics errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DiagnosticsError {
    #[error("unrecognized appliance: {0}")]
    UnknownAppliance(String),

    #[error("no known symptom of a {appliance} matches \"{description}\"")]
    UnknownSymptom {
        appliance: ApplianceCategory,
        description: String,
    },
}

/// Resolve a caller's phrasing to a canonical appliance category.
pub fn resolve_appliance(raw: &str) -> Result<ApplianceCategory, DiagnosticsError> {
    ApplianceCategory::normalize(raw)
        .ok_or_else(|| DiagnosticsError::UnknownAppliance(raw.trim().to_string()))
}

/// Common symptoms for an appliance, empty for categories we have no
/// dedicated knowledge for.
pub fn common_symptoms(appliance: ApplianceCategory) -> &'static [&'static str] {
    knowledge_for(appliance).map_or(&[], |k| k.common_symptoms)
}

/// Questions worth asking the caller while diagnosing.
pub fn diagnostic_questions(appliance: ApplianceCategory) -> &'static [&'static str] {
    knowledge_for(appliance).map_or(&[], |k| k.diagnostic_questions)
}

/// Troubleshooting checklist for a symptom.
///
/// Matching is bidirectional substring over the known symptom keys. When
/// nothing matches, the generic power/reset checklist is returned so the
/// caller always gets something actionable.
pub fn troubleshooting_steps(
    appliance: ApplianceCategory,
    symptom: &str,
) -> &'static [&'static str] {
    let symptom = symptom.to_lowercase();
    if let Some(k) = knowledge_for(appliance) {
        for (key, steps) in k.troubleshooting {
            if symptom.contains(key) || key.contains(symptom.as_str()) {
                return steps;
            }
        }
    }
    DEFAULT_TROUBLESHOOTING
}
