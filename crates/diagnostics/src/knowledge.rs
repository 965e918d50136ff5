//! Static diagnostic knowledge base.

use homeserv_core::ApplianceCategory;
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Knowledge we hold for one appliance category.
#[derive(Debug, Clone, Copy)]
pub struct ApplianceKnowledge {
    pub common_symptoms: &'static [&'static str],
    pub diagnostic_questions: &'static [&'static str],
    /// Symptom key to checklist. Keys are matched by substring.
    pub troubleshooting: &'static [(&'static str, &'static [&'static str])],
}

/// Generic checklist for symptoms or appliances without a dedicated entry.
pub static DEFAULT_TROUBLESHOOTING: &[&str] = &[
    "Ensure the appliance is properly plugged in and receiving power",
    "Check if the circuit breaker hasn't tripped",
    "Look for any error codes or warning lights",
    "Try unplugging the appliance for 1 minute, then plugging it back in",
    "Review the user manual for troubleshooting guidance",
];

static KNOWLEDGE: Lazy<HashMap<ApplianceCategory, ApplianceKnowledge>> = Lazy::new(|| {
    let mut map = HashMap::new();

    map.insert(
        ApplianceCategory::Washer,
        ApplianceKnowledge {
            common_symptoms: &[
                "won't start",
                "won't spin",
                "not draining",
                "leaking water",
                "making loud noise",
                "shaking or vibrating",
                "door won't open",
                "not filling with water",
                "clothes still wet after cycle",
                "error code displayed",
            ],
            diagnostic_questions: &[
                "Is the washer plugged in and is the outlet working?",
                "Is the water supply turned on?",
                "Is the door or lid properly closed?",
                "What cycle were you trying to run?",
                "Are there any error codes displayed?",
                "How old is the washing machine?",
                "When did this problem first start?",
                "Is it a top-loader or front-loader?",
            ],
            troubleshooting: &[
                (
                    "won't start",
                    &[
                        "Check that the washer is plugged in and the outlet has power",
                        "Ensure the door or lid is completely closed and latched",
                        "Check if the water supply valves are open",
                        "Try resetting by unplugging for 1 minute, then plugging back in",
                        "Check if the child lock feature is enabled",
                    ],
                ),
                (
                    "not draining",
                    &[
                        "Check the drain hose for kinks or clogs",
                        "Clean the drain pump filter (usually at the front bottom)",
                        "Ensure the drain hose height is correct (not too high)",
                        "Check for small items that may have blocked the pump",
                    ],
                ),
                (
                    "leaking water",
                    &[
                        "Check door seal for damage or debris",
                        "Inspect inlet hoses for cracks or loose connections",
                        "Don't overload the washer",
                        "Use the correct amount of HE detergent if required",
                        "Check the drain hose connection",
                    ],
                ),
                (
                    "making loud noise",
                    &[
                        "Check if the washer is level using a spirit level",
                        "Ensure shipping bolts have been removed (new washers)",
                        "Check for foreign objects in the drum",
                        "Avoid overloading the washer",
                        "Check if anything is caught between the drum and tub",
                    ],
                ),
            ],
        },
    );

    map.insert(
        ApplianceCategory::Dryer,
        ApplianceKnowledge {
            common_symptoms: &[
                "won't start",
                "not heating",
                "takes too long to dry",
                "making loud noise",
                "drum not spinning",
                "shuts off too soon",
                "burning smell",
                "clothes too hot",
            ],
            diagnostic_questions: &[
                "Is it a gas or electric dryer?",
                "Is the dryer plugged in?",
                "When did you last clean the lint trap?",
                "Is the vent hose connected and clear?",
                "What heat setting are you using?",
                "How old is the dryer?",
                "Are there any error codes?",
            ],
            troubleshooting: &[
                (
                    "not heating",
                    &[
                        "Check that the dryer is properly plugged in (electric needs 240V)",
                        "For gas dryers, ensure the gas supply valve is open",
                        "Clean the lint trap thoroughly",
                        "Check and clean the dryer vent duct",
                        "Make sure the vent isn't kinked or blocked",
                    ],
                ),
                (
                    "takes too long to dry",
                    &[
                        "Clean the lint trap before every load",
                        "Check the vent system for blockages",
                        "Don't overload the dryer",
                        "Make sure clothes are properly spun in the washer first",
                        "Check that the vent flap outside opens when dryer is running",
                    ],
                ),
                (
                    "making loud noise",
                    &[
                        "Check for coins or objects in the drum",
                        "Ensure the dryer is level",
                        "Check if the drum rollers need replacement",
                        "Listen for where the noise is coming from",
                    ],
                ),
            ],
        },
    );

    map.insert(
        ApplianceCategory::Refrigerator,
        ApplianceKnowledge {
            common_symptoms: &[
                "not cooling",
                "too cold",
                "making loud noise",
                "leaking water",
                "ice maker not working",
                "frost buildup",
                "water dispenser not working",
                "running constantly",
                "not running at all",
            ],
            diagnostic_questions: &[
                "Is the refrigerator plugged in?",
                "What temperature is it set to?",
                "How long has it been having issues?",
                "Is the freezer working properly?",
                "Are the condenser coils dirty?",
                "Is there frost buildup inside?",
                "Can you hear the compressor running?",
            ],
            troubleshooting: &[
                (
                    "not cooling",
                    &[
                        "Check the temperature settings (should be 37°F fridge, 0°F freezer)",
                        "Ensure vents inside aren't blocked by food items",
                        "Clean the condenser coils (usually at the back or bottom)",
                        "Check that the door seals are clean and sealing properly",
                        "Make sure there's clearance around the unit for airflow",
                    ],
                ),
                (
                    "ice maker not working",
                    &[
                        "Check that the ice maker is turned on",
                        "Ensure the water supply line is connected and valve is open",
                        "Check the water filter - replace if older than 6 months",
                        "Make sure the freezer is cold enough (0°F or below)",
                        "Check for ice jams in the mechanism",
                    ],
                ),
                (
                    "leaking water",
                    &[
                        "Check if the defrost drain is clogged",
                        "Inspect the water supply line for leaks",
                        "Make sure the fridge is level (slightly higher in front)",
                        "Check the drain pan under the unit",
                    ],
                ),
            ],
        },
    );

    map.insert(
        ApplianceCategory::Dishwasher,
        ApplianceKnowledge {
            common_symptoms: &[
                "not cleaning dishes",
                "not draining",
                "leaking",
                "won't start",
                "making noise",
                "not drying dishes",
                "door won't latch",
                "bad odor",
            ],
            diagnostic_questions: &[
                "Is the dishwasher getting water?",
                "Are you using the right detergent?",
                "Is the drain clear?",
                "How are you loading the dishes?",
                "What cycle are you using?",
                "When was it last cleaned?",
            ],
            troubleshooting: &[
                (
                    "not cleaning dishes",
                    &[
                        "Run hot water at the sink before starting the dishwasher",
                        "Don't pre-rinse dishes, but scrape off large food particles",
                        "Check that spray arms can spin freely",
                        "Clean the filter at the bottom of the dishwasher",
                        "Use fresh detergent and rinse aid",
                        "Don't overload - water needs to reach all dishes",
                    ],
                ),
                (
                    "not draining",
                    &[
                        "Check and clean the filter and drain basket",
                        "Ensure the garbage disposal knockout plug is removed",
                        "Check the drain hose for kinks",
                        "Run the garbage disposal before the dishwasher",
                        "Clean the air gap if you have one",
                    ],
                ),
                (
                    "bad odor",
                    &[
                        "Run a cleaning cycle with dishwasher cleaner",
                        "Clean the filter and drain area",
                        "Wipe down the door gasket",
                        "Leave the door slightly open between uses",
                    ],
                ),
            ],
        },
    );

    map.insert(
        ApplianceCategory::Oven,
        ApplianceKnowledge {
            common_symptoms: &[
                "not heating",
                "uneven cooking",
                "temperature inaccurate",
                "burners won't ignite",
                "self-clean not working",
                "door won't open",
                "display not working",
            ],
            diagnostic_questions: &[
                "Is it a gas or electric oven?",
                "Which part isn't working - oven, stovetop, or both?",
                "Is the oven heating at all or just not reaching temperature?",
                "When did you last calibrate the temperature?",
                "Are there any error codes?",
            ],
            troubleshooting: &[
                (
                    "not heating",
                    &[
                        "Check that the oven is properly plugged in",
                        "For gas ovens, ensure the gas supply is on",
                        "Try the broiler to see if it's just the bake element",
                        "Check if the oven light comes on",
                        "Make sure the oven isn't in self-clean mode",
                    ],
                ),
                (
                    "uneven cooking",
                    &[
                        "Use an oven thermometer to check actual temperature",
                        "Avoid using dark pans which absorb more heat",
                        "Allow proper air circulation - don't cover racks with foil",
                        "Calibrate the oven temperature if needed",
                        "Rotate dishes halfway through cooking",
                    ],
                ),
                (
                    "burners won't ignite",
                    &[
                        "Clean the burner caps and grates",
                        "Make sure burner caps are properly seated",
                        "Clean the igniter with a toothbrush",
                        "Check if other burners work to isolate the issue",
                    ],
                ),
            ],
        },
    );

    map.insert(
        ApplianceCategory::Hvac,
        ApplianceKnowledge {
            common_symptoms: &[
                "not cooling",
                "not heating",
                "weak airflow",
                "strange noises",
                "bad smell",
                "constantly running",
                "short cycling",
                "high energy bills",
            ],
            diagnostic_questions: &[
                "Is it a central system, mini-split, or window unit?",
                "When was the filter last changed?",
                "Is the thermostat set correctly?",
                "Are all vents open?",
                "Is the outdoor unit running?",
                "How old is the system?",
            ],
            troubleshooting: &[
                (
                    "not cooling",
                    &[
                        "Check and replace the air filter if dirty",
                        "Make sure the thermostat is set to cool and below room temp",
                        "Check that the outdoor unit isn't blocked by debris",
                        "Ensure all vents inside are open and unobstructed",
                        "Check if the outdoor unit fan is running",
                        "Check circuit breakers for both indoor and outdoor units",
                    ],
                ),
                (
                    "weak airflow",
                    &[
                        "Replace the air filter",
                        "Check if vents are open and unblocked",
                        "Have ductwork inspected for leaks",
                        "Make sure the blower fan is running",
                    ],
                ),
                (
                    "strange noises",
                    &[
                        "Rattling might mean loose panels - check and tighten",
                        "Squealing could indicate belt issues",
                        "Clicking at startup is normal; continuous clicking is not",
                        "Banging might indicate a broken component",
                    ],
                ),
            ],
        },
    );

    map
});

/// Knowledge entry for an appliance, if we carry one.
pub fn knowledge_for(appliance: ApplianceCategory) -> Option<&'static ApplianceKnowledge> {
    KNOWLEDGE.get(&appliance)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn covered_appliances() {
        for cat in [
            ApplianceCategory::Washer,
            ApplianceCategory::Dryer,
            ApplianceCategory::Refrigerator,
            ApplianceCategory::Dishwasher,
            ApplianceCategory::Oven,
            ApplianceCategory::Hvac,
        ] {
            let k = knowledge_for(cat).unwrap();
            assert!(!k.common_symptoms.is_empty());
            assert!(!k.diagnostic_questions.is_empty());
            assert!(!k.troubleshooting.is_empty());
        }
    }

    #[test]
    fn every_checklist_has_steps() {
        for k in [
            ApplianceCategory::Washer,
            ApplianceCategory::Dryer,
            ApplianceCategory::Refrigerator,
            ApplianceCategory::Dishwasher,
            ApplianceCategory::Oven,
            ApplianceCategory::Hvac,
        ]
        .into_iter()
        .filter_map(knowledge_for)
        {
            for (symptom, steps) in k.troubleshooting {
                assert!(!symptom.is_empty());
                assert!(steps.len() >= 3, "thin checklist for {}", symptom);
            }
        }
    }
}
