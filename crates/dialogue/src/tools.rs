//! Structured tool calls the voice layer may issue.

use chrono::NaiveDate;
use homeserv_core::{ApplianceCategory, CallPhase};
use homeserv_diagnostics::resolve_appliance;
use homeserv_scheduling::{CustomerUpdate, DayPart};
use serde::Deserialize;
use serde_json::Value;

use crate::schema::{InputSchema, PropertySchema, ToolSchema};
use crate::DialogueError;

pub const FETCH_SYMPTOMS: &str = "fetch_symptoms";
pub const FETCH_TROUBLESHOOTING: &str = "fetch_troubleshooting";
pub const FETCH_AVAILABILITY: &str = "fetch_availability";
pub const BOOK_SLOT: &str = "book_slot";
pub const CANCEL_APPOINTMENT: &str = "cancel_appointment";
pub const REQUEST_IMAGE_UPLOAD: &str = "request_image_upload";
pub const UPDATE_CUSTOMER_INFO: &str = "update_customer_info";

/// A parsed, validated tool call.
#[derive(Debug, Clone)]
pub enum ToolCall {
    FetchSymptoms {
        appliance: ApplianceCategory,
    },
    FetchTroubleshooting {
        appliance: ApplianceCategory,
        symptom: String,
    },
    FetchAvailability {
        zip_code: String,
        appliance: ApplianceCategory,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
        day_part: Option<DayPart>,
    },
    BookSlot {
        slot_id: i64,
        issue_description: Option<String>,
    },
    CancelAppointment {
        confirmation_code: String,
    },
    RequestImageUpload {
        email: String,
    },
    UpdateCustomerInfo {
        update: CustomerUpdate,
    },
}

#[derive(Deserialize)]
struct FetchSymptomsArgs {
    appliance: String,
}

#[derive(Deserialize)]
struct FetchTroubleshootingArgs {
    appliance: String,
    symptom: String,
}

#[derive(Deserialize)]
struct FetchAvailabilityArgs {
    zip_code: String,
    appliance: String,
    start_date: Option<String>,
    end_date: Option<String>,
    time_preference: Option<String>,
}

#[derive(Deserialize)]
struct BookSlotArgs {
    slot_id: i64,
    issue_description: Option<String>,
}

#[derive(Deserialize)]
struct CancelAppointmentArgs {
    confirmation_code: String,
}

#[derive(Deserialize)]
struct RequestImageUploadArgs {
    email: String,
}

fn bad_args(tool: &str, message: impl ToString) -> DialogueError {
    DialogueError::InvalidArguments {
        tool: tool.to_string(),
        message: message.to_string(),
    }
}

fn args<T: serde::de::DeserializeOwned>(tool: &str, arguments: &Value) -> Result<T, DialogueError> {
    serde_json::from_value(arguments.clone()).map_err(|e| bad_args(tool, e))
}

fn parse_arg_date(tool: &str, field: &str, raw: &str) -> Result<NaiveDate, DialogueError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| bad_args(tool, format!("{field} must be YYYY-MM-DD, got {raw:?}")))
}

impl ToolCall {
    /// Parse a named tool call. Arguments are validated here, before any
    /// session state is touched.
    pub fn parse(name: &str, arguments: &Value) -> Result<ToolCall, DialogueError> {
        match name {
            FETCH_SYMPTOMS => {
                let a: FetchSymptomsArgs = args(name, arguments)?;
                Ok(ToolCall::FetchSymptoms {
                    appliance: resolve_appliance(&a.appliance)?,
                })
            }
            FETCH_TROUBLESHOOTING => {
                let a: FetchTroubleshootingArgs = args(name, arguments)?;
                Ok(ToolCall::FetchTroubleshooting {
                    appliance: resolve_appliance(&a.appliance)?,
                    symptom: a.symptom,
                })
            }
            FETCH_AVAILABILITY => {
                let a: FetchAvailabilityArgs = args(name, arguments)?;
                let start_date = a
                    .start_date
                    .as_deref()
                    .map(|d| parse_arg_date(name, "start_date", d))
                    .transpose()?;
                let end_date = a
                    .end_date
                    .as_deref()
                    .map(|d| parse_arg_date(name, "end_date", d))
                    .transpose()?;
                let day_part = match a.time_preference.as_deref() {
                    None | Some("any") => None,
                    Some(raw) => Some(
                        DayPart::parse(raw)
                            .ok_or_else(|| bad_args(name, format!("bad time_preference {raw:?}")))?,
                    ),
                };
                Ok(ToolCall::FetchAvailability {
                    zip_code: a.zip_code,
                    appliance: resolve_appliance(&a.appliance)?,
                    start_date,
                    end_date,
                    day_part,
                })
            }
            BOOK_SLOT => {
                let a: BookSlotArgs = args(name, arguments)?;
                Ok(ToolCall::BookSlot {
                    slot_id: a.slot_id,
                    issue_description: a.issue_description,
                })
            }
            CANCEL_APPOINTMENT => {
                let a: CancelAppointmentArgs = args(name, arguments)?;
                Ok(ToolCall::CancelAppointment {
                    confirmation_code: a.confirmation_code,
                })
            }
            REQUEST_IMAGE_UPLOAD => {
                let a: RequestImageUploadArgs = args(name, arguments)?;
                if !a.email.contains('@') {
                    return Err(bad_args(name, "email must contain @"));
                }
                Ok(ToolCall::RequestImageUpload { email: a.email })
            }
            UPDATE_CUSTOMER_INFO => {
                let update: CustomerUpdate = args(name, arguments)?;
                if update.is_empty() {
                    return Err(bad_args(name, "at least one field must be set"));
                }
                Ok(ToolCall::UpdateCustomerInfo { update })
            }
            other => Err(DialogueError::UnknownTool(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ToolCall::FetchSymptoms { .. } => FETCH_SYMPTOMS,
            ToolCall::FetchTroubleshooting { .. } => FETCH_TROUBLESHOOTING,
            ToolCall::FetchAvailability { .. } => FETCH_AVAILABILITY,
            ToolCall::BookSlot { .. } => BOOK_SLOT,
            ToolCall::CancelAppointment { .. } => CANCEL_APPOINTMENT,
            ToolCall::RequestImageUpload { .. } => REQUEST_IMAGE_UPLOAD,
            ToolCall::UpdateCustomerInfo { .. } => UPDATE_CUSTOMER_INFO,
        }
    }

    /// Phase gating. Booking needs the call to be in (or confirming) the
    /// scheduling phase; troubleshooting and upload links belong to
    /// diagnosis; contact updates and cancellations are allowed almost
    /// anywhere once the caller is identified.
    pub fn permitted_in(&self, phase: CallPhase) -> bool {
        use CallPhase::*;
        match self {
            ToolCall::FetchSymptoms { .. } => matches!(phase, Identify | Diagnose),
            ToolCall::FetchTroubleshooting { .. } => matches!(phase, Diagnose),
            ToolCall::FetchAvailability { .. } => matches!(phase, Schedule | Confirm),
            ToolCall::BookSlot { .. } => matches!(phase, Schedule | Confirm),
            ToolCall::CancelAppointment { .. } => {
                matches!(phase, Identify | Diagnose | Schedule | Confirm)
            }
            ToolCall::RequestImageUpload { .. } => matches!(phase, Diagnose),
            ToolCall::UpdateCustomerInfo { .. } => !matches!(phase, Closed),
        }
    }
}

fn appliance_property() -> PropertySchema {
    PropertySchema::enum_type(
        "Appliance category",
        ApplianceCategory::ALL
            .iter()
            .map(|a| a.as_str().to_string())
            .collect(),
    )
}

/// Schemas for every tool, for advertising to the voice layer.
pub fn tool_catalog() -> Vec<ToolSchema> {
    vec![
        ToolSchema {
            name: FETCH_SYMPTOMS.to_string(),
            description: "List common symptoms for an appliance so the caller can pick one"
                .to_string(),
            input_schema: InputSchema::object().property("appliance", appliance_property(), true),
        },
        ToolSchema {
            name: FETCH_TROUBLESHOOTING.to_string(),
            description: "Get troubleshooting steps for a specific symptom".to_string(),
            input_schema: InputSchema::object()
                .property("appliance", appliance_property(), true)
                .property(
                    "symptom",
                    PropertySchema::string("Symptom in the caller's words"),
                    true,
                ),
        },
        ToolSchema {
            name: FETCH_AVAILABILITY.to_string(),
            description: "Find open technician slots for a zip code and appliance".to_string(),
            input_schema: InputSchema::object()
                .property(
                    "zip_code",
                    PropertySchema::string("5-digit service zip code"),
                    true,
                )
                .property("appliance", appliance_property(), true)
                .property(
                    "start_date",
                    PropertySchema::string("Earliest date, YYYY-MM-DD, defaults to tomorrow"),
                    false,
                )
                .property(
                    "end_date",
                    PropertySchema::string("Latest date, YYYY-MM-DD"),
                    false,
                )
                .property(
                    "time_preference",
                    PropertySchema::enum_type(
                        "Preferred part of day",
                        vec!["morning".into(), "afternoon".into(), "any".into()],
                    )
                    .with_default(Value::String("any".into())),
                    false,
                ),
        },
        ToolSchema {
            name: BOOK_SLOT.to_string(),
            description: "Book a slot offered earlier in this call".to_string(),
            input_schema: InputSchema::object()
                .property(
                    "slot_id",
                    PropertySchema::integer("Slot id from fetch_availability"),
                    true,
                )
                .property(
                    "issue_description",
                    PropertySchema::string("Short description of the problem"),
                    false,
                ),
        },
        ToolSchema {
            name: CANCEL_APPOINTMENT.to_string(),
            description: "Cancel an existing appointment by confirmation code".to_string(),
            input_schema: InputSchema::object().property(
                "confirmation_code",
                PropertySchema::string("Code like SHS-ABCD1234"),
                true,
            ),
        },
        ToolSchema {
            name: REQUEST_IMAGE_UPLOAD.to_string(),
            description: "Email the caller a link to upload a photo of the appliance".to_string(),
            input_schema: InputSchema::object().property(
                "email",
                PropertySchema::string("Caller's email address"),
                true,
            ),
        },
        ToolSchema {
            name: UPDATE_CUSTOMER_INFO.to_string(),
            description: "Record contact details the caller has provided".to_string(),
            input_schema: InputSchema::object()
                .property("first_name", PropertySchema::string("First name"), false)
                .property("last_name", PropertySchema::string("Last name"), false)
                .property("email", PropertySchema::string("Email address"), false)
                .property("address", PropertySchema::string("Street address"), false)
                .property("city", PropertySchema::string("City"), false)
                .property("state", PropertySchema::string("Two-letter state"), false)
                .property("zip_code", PropertySchema::string("5-digit zip code"), false),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_fetch_availability() {
        let call = ToolCall::parse(
            FETCH_AVAILABILITY,
            &json!({
                "zip_code": "10001",
                "appliance": "fridge",
                "time_preference": "morning"
            }),
        )
        .unwrap();
        match call {
            ToolCall::FetchAvailability {
                zip_code,
                appliance,
                day_part,
                ..
            } => {
                assert_eq!(zip_code, "10001");
                assert_eq!(appliance, ApplianceCategory::Refrigerator);
                assert_eq!(day_part, Some(DayPart::Morning));
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_tool() {
        let err = ToolCall::parse("launch_rocket", &json!({})).unwrap_err();
        assert!(matches!(err, DialogueError::UnknownTool(_)));
    }

    #[test]
    fn rejects_bad_date() {
        let err = ToolCall::parse(
            FETCH_AVAILABILITY,
            &json!({
                "zip_code": "10001",
                "appliance": "washer",
                "start_date": "March 4th"
            }),
        )
        .unwrap_err();
        assert!(matches!(err, DialogueError::InvalidArguments { .. }));
    }

    #[test]
    fn rejects_unknown_appliance() {
        let err = ToolCall::parse(FETCH_SYMPTOMS, &json!({ "appliance": "time machine" }))
            .unwrap_err();
        assert!(matches!(err, DialogueError::Diagnostics(_)));
    }

    #[test]
    fn phase_gating() {
        let book = ToolCall::parse(BOOK_SLOT, &json!({ "slot_id": 7 })).unwrap();
        assert!(book.permitted_in(CallPhase::Schedule));
        assert!(book.permitted_in(CallPhase::Confirm));
        assert!(!book.permitted_in(CallPhase::Diagnose));
        assert!(!book.permitted_in(CallPhase::Greeting));

        let cancel = ToolCall::parse(
            CANCEL_APPOINTMENT,
            &json!({ "confirmation_code": "SHS-ABCD1234" }),
        )
        .unwrap();
        assert!(cancel.permitted_in(CallPhase::Identify));
        assert!(!cancel.permitted_in(CallPhase::Greeting));
    }

    #[test]
    fn empty_customer_update_rejected() {
        let err = ToolCall::parse(UPDATE_CUSTOMER_INFO, &json!({})).unwrap_err();
        assert!(matches!(err, DialogueError::InvalidArguments { .. }));
    }

    #[test]
    fn catalog_covers_every_tool() {
        let names: Vec<String> = tool_catalog().into_iter().map(|t| t.name).collect();
        for expected in [
            FETCH_SYMPTOMS,
            FETCH_TROUBLESHOOTING,
            FETCH_AVAILABILITY,
            BOOK_SLOT,
            CANCEL_APPOINTMENT,
            REQUEST_IMAGE_UPLOAD,
            UPDATE_CUSTOMER_INFO,
        ] {
            assert!(names.iter().any(|n| n == expected), "missing {expected}");
        }
    }
}
