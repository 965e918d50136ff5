//! Appliance categories and name normalization.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical appliance category serviced by technicians.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplianceCategory {
    Washer,
    Dryer,
    Refrigerator,
    Dishwasher,
    Oven,
    Microwave,
    Hvac,
    GarbageDisposal,
    WaterHeater,
    Freezer,
}

impl ApplianceCategory {
    pub const ALL: [ApplianceCategory; 10] = [
        ApplianceCategory::Washer,
        ApplianceCategory::Dryer,
        ApplianceCategory::Refrigerator,
        ApplianceCategory::Dishwasher,
        ApplianceCategory::Oven,
        ApplianceCategory::Microwave,
        ApplianceCategory::Hvac,
        ApplianceCategory::GarbageDisposal,
        ApplianceCategory::WaterHeater,
        ApplianceCategory::Freezer,
    ];

    /// Snake-case identifier used in storage and tool arguments.
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplianceCategory::Washer => "washer",
            ApplianceCategory::Dryer => "dryer",
            ApplianceCategory::Refrigerator => "refrigerator",
            ApplianceCategory::Dishwasher => "dishwasher",
            ApplianceCategory::Oven => "oven",
            ApplianceCategory::Microwave => "microwave",
            ApplianceCategory::Hvac => "hvac",
            ApplianceCategory::GarbageDisposal => "garbage_disposal",
            ApplianceCategory::WaterHeater => "water_heater",
            ApplianceCategory::Freezer => "freezer",
        }
    }

    /// Name spoken back to the caller.
    pub fn display_name(&self) -> &'static str {
        match self {
            ApplianceCategory::Washer => "washer",
            ApplianceCategory::Dryer => "dryer",
            ApplianceCategory::Refrigerator => "refrigerator",
            ApplianceCategory::Dishwasher => "dishwasher",
            ApplianceCategory::Oven => "oven",
            ApplianceCategory::Microwave => "microwave",
            ApplianceCategory::Hvac => "heating and cooling system",
            ApplianceCategory::GarbageDisposal => "garbage disposal",
            ApplianceCategory::WaterHeater => "water heater",
            ApplianceCategory::Freezer => "freezer",
        }
    }

    /// Map a caller's phrasing onto a canonical category.
    ///
    /// Handles common synonyms ("fridge", "AC", "washing machine") and a few
    /// frequent misspellings from transcription. Returns None for anything
    /// unrecognized so the caller can be re-asked.
    pub fn normalize(raw: &str) -> Option<ApplianceCategory> {
        let cleaned = raw.trim().to_lowercase().replace(['-', '_'], " ");
        let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
        match cleaned.as_str() {
            "washer" | "washing machine" | "clothes washer" | "laundry machine" => {
                Some(ApplianceCategory::Washer)
            }
            "dryer" | "clothes dryer" | "tumble dryer" => Some(ApplianceCategory::Dryer),
            "refrigerator" | "fridge" | "refridgerator" | "icebox" => {
                Some(ApplianceCategory::Refrigerator)
            }
            "dishwasher" | "dish washer" => Some(ApplianceCategory::Dishwasher),
            "oven" | "stove" | "range" | "cooktop" | "stovetop" => Some(ApplianceCategory::Oven),
            "microwave" | "microwave oven" => Some(ApplianceCategory::Microwave),
            "hvac" | "ac" | "a c" | "air conditioner" | "air conditioning" | "furnace"
            | "heater" | "heat pump" | "central air" => Some(ApplianceCategory::Hvac),
            "garbage disposal" | "disposal" | "disposer" => {
                Some(ApplianceCategory::GarbageDisposal)
            }
            "water heater" | "hot water heater" | "hot water tank" => {
                Some(ApplianceCategory::WaterHeater)
            }
            "freezer" | "deep freezer" | "chest freezer" => Some(ApplianceCategory::Freezer),
            _ => None,
        }
    }

    /// Scan a free-form utterance for the first recognizable appliance mention.
    pub fn scan(utterance: &str) -> Option<ApplianceCategory> {
        let lowered = utterance.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric() && c != '/')
            .filter(|w| !w.is_empty())
            .collect();
        // Two-word phrases first so "washing machine" beats nothing and
        // "water heater" beats "heater".
        for pair in words.windows(2) {
            if let Some(cat) = Self::normalize(&format!("{} {}", pair[0], pair[1])) {
                return Some(cat);
            }
        }
        for word in &words {
            if let Some(cat) = Self::normalize(word) {
                return Some(cat);
            }
        }
        None
    }
}

impl fmt::Display for ApplianceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_synonyms() {
        assert_eq!(
            ApplianceCategory::normalize("fridge"),
            Some(ApplianceCategory::Refrigerator)
        );
        assert_eq!(
            ApplianceCategory::normalize("Washing Machine"),
            Some(ApplianceCategory::Washer)
        );
        assert_eq!(
            ApplianceCategory::normalize("AC"),
            Some(ApplianceCategory::Hvac)
        );
        assert_eq!(
            ApplianceCategory::normalize("stove"),
            Some(ApplianceCategory::Oven)
        );
    }

    #[test]
    fn normalizes_misspellings() {
        assert_eq!(
            ApplianceCategory::normalize("refridgerator"),
            Some(ApplianceCategory::Refrigerator)
        );
    }

    #[test]
    fn rejects_unknown() {
        assert_eq!(ApplianceCategory::normalize("lawnmower"), None);
        assert_eq!(ApplianceCategory::normalize(""), None);
    }

    #[test]
    fn scans_utterances() {
        assert_eq!(
            ApplianceCategory::scan("my fridge stopped cooling yesterday"),
            Some(ApplianceCategory::Refrigerator)
        );
        assert_eq!(
            ApplianceCategory::scan("the washing machine leaks"),
            Some(ApplianceCategory::Washer)
        );
        assert_eq!(
            ApplianceCategory::scan("it's the water heater in the basement"),
            Some(ApplianceCategory::WaterHeater)
        );
        assert_eq!(ApplianceCategory::scan("hello there"), None);
    }
}
