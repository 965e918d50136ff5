//! Scheduling domain models.

use chrono::{NaiveDate, NaiveTime};
use homeserv_core::ApplianceCategory;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A customer reachable at a phone number. Everything beyond the phone
/// number is filled in as the caller volunteers it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: i64,
    pub phone: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
}

/// Partial customer update, None fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomerUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
}

impl CustomerUpdate {
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.email.is_none()
            && self.address.is_none()
            && self.city.is_none()
            && self.state.is_none()
            && self.zip_code.is_none()
    }
}

/// A service technician.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Technician {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub employee_id: String,
    pub email: String,
    pub phone: String,
    pub years_experience: u32,
    pub is_active: bool,
    /// Appliance categories this technician is certified for.
    pub specialties: Vec<ApplianceCategory>,
    /// Zip codes this technician covers.
    pub service_areas: Vec<String>,
}

impl Technician {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// A bookable two-hour visit window on a technician's calendar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSlot {
    pub id: i64,
    pub technician_id: i64,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub is_available: bool,
}

/// An available slot joined with its technician, shaped for reading back
/// to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotOffer {
    pub slot_id: i64,
    pub technician_id: i64,
    pub technician_name: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

impl SlotOffer {
    /// "Tuesday, March 4 from 8 to 10 AM" style phrasing for speech.
    pub fn spoken(&self) -> String {
        format!(
            "{} from {} to {} with {}",
            self.date.format("%A, %B %-d"),
            format_spoken_time(self.start_time),
            format_spoken_time(self.end_time),
            self.technician_name,
        )
    }
}

fn format_spoken_time(t: NaiveTime) -> String {
    t.format("%-I:%M %p").to_string()
}

/// Morning/afternoon preference for slot searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayPart {
    Morning,
    Afternoon,
}

impl DayPart {
    /// Noon is the morning/afternoon boundary.
    pub fn matches(&self, start: NaiveTime) -> bool {
        let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap_or_default();
        match self {
            DayPart::Morning => start < noon,
            DayPart::Afternoon => start >= noon,
        }
    }

    pub fn parse(raw: &str) -> Option<DayPart> {
        match raw.trim().to_lowercase().as_str() {
            "morning" => Some(DayPart::Morning),
            "afternoon" | "evening" => Some(DayPart::Afternoon),
            _ => None,
        }
    }
}

/// Criteria for an availability search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotQuery {
    pub zip_code: String,
    pub appliance: ApplianceCategory,
    /// Inclusive, defaults to tomorrow when None.
    pub start_date: Option<NaiveDate>,
    /// Inclusive, defaults to start + window when None.
    pub end_date: Option<NaiveDate>,
    pub day_part: Option<DayPart>,
}

impl SlotQuery {
    pub fn new(zip_code: impl Into<String>, appliance: ApplianceCategory) -> Self {
        Self {
            zip_code: zip_code.into(),
            appliance,
            start_date: None,
            end_date: None,
            day_part: None,
        }
    }
}

/// Appointment lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::InProgress => "in_progress",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::NoShow => "no_show",
        }
    }

    pub fn parse(raw: &str) -> Option<AppointmentStatus> {
        match raw {
            "scheduled" => Some(AppointmentStatus::Scheduled),
            "confirmed" => Some(AppointmentStatus::Confirmed),
            "in_progress" => Some(AppointmentStatus::InProgress),
            "completed" => Some(AppointmentStatus::Completed),
            "cancelled" => Some(AppointmentStatus::Cancelled),
            "no_show" => Some(AppointmentStatus::NoShow),
            _ => None,
        }
    }

    /// Cancellation is allowed until work starts or the visit is over.
    pub fn is_cancellable(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Scheduled | AppointmentStatus::Confirmed
        )
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A booked appointment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: i64,
    pub confirmation_code: String,
    pub customer_id: i64,
    pub technician_id: i64,
    pub time_slot_id: i64,
    pub status: AppointmentStatus,
    pub appliance: ApplianceCategory,
    pub issue_description: String,
    pub symptoms: Option<String>,
    /// The call that produced this booking, when it came through the agent.
    pub call_id: Option<String>,
}

/// Appointment joined with its slot and technician, for read-back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentDetails {
    pub appointment: Appointment,
    pub slot: TimeSlot,
    pub technician_name: String,
}

impl AppointmentDetails {
    pub fn spoken(&self) -> String {
        format!(
            "{} from {} to {} with {}, confirmation code {}",
            self.slot.date.format("%A, %B %-d"),
            format_spoken_time(self.slot.start_time),
            format_spoken_time(self.slot.end_time),
            self.technician_name,
            self.appointment.confirmation_code,
        )
    }
}

/// Everything needed to book one slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingRequest {
    pub customer_id: i64,
    pub slot_id: i64,
    pub appliance: ApplianceCategory,
    pub issue_description: String,
    pub symptoms: Option<String>,
    pub call_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_part_boundary() {
        let eleven = NaiveTime::from_hms_opt(11, 0, 0).unwrap();
        let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap();
        assert!(DayPart::Morning.matches(eleven));
        assert!(!DayPart::Morning.matches(noon));
        assert!(DayPart::Afternoon.matches(noon));
    }

    #[test]
    fn status_round_trip() {
        for s in [
            AppointmentStatus::Scheduled,
            AppointmentStatus::Cancelled,
            AppointmentStatus::NoShow,
        ] {
            assert_eq!(AppointmentStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(AppointmentStatus::parse("unknown"), None);
    }

    #[test]
    fn cancellable_statuses() {
        assert!(AppointmentStatus::Scheduled.is_cancellable());
        assert!(AppointmentStatus::Confirmed.is_cancellable());
        assert!(!AppointmentStatus::Completed.is_cancellable());
        assert!(!AppointmentStatus::Cancelled.is_cancellable());
    }
}
