//! Slot reservation and appointment booking
//!
//! Technicians advertise two-hour time slots. Booking atomically claims a
//! slot and creates an appointment under a unique confirmation code, so a
//! slot can never be double-booked no matter how many calls race for it.
//! Storage is pluggable behind [`store::SchedulingStore`]; the SQLite
//! implementation is the production one, the in-memory one backs tests.

pub mod engine;
pub mod memory;
pub mod models;
pub mod seed;
pub mod sqlite;
pub mod store;

pub use engine::SchedulingEngine;
pub use memory::MemoryStore;
pub use models::{
    Appointment, AppointmentDetails, AppointmentStatus, BookingRequest, Customer, CustomerUpdate,
    DayPart, SlotOffer, SlotQuery, Technician, TimeSlot,
};
pub use sqlite::SqliteStore;
pub use store::SchedulingStore;

use thiserror::Error;

/// Scheduling errors
#[derive(Debug, Error)]
pub enum SchedulingError {
    #[error("time slot {0} not found")]
    SlotNotFound(i64),

    #[error("time slot {0} is no longer available")]
    SlotNoLongerAvailable(i64),

    #[error("confirmation code already in use")]
    ConfirmationCollision,

    #[error("could not generate a unique confirmation code after {0} attempts")]
    ConfirmationGenerationExhausted(u32),

    #[error("no appointment found for confirmation code {0}")]
    AppointmentNotFound(String),

    #[error("appointment {0} is already cancelled")]
    AlreadyCancelled(String),

    #[error("appointment {code} cannot be cancelled from status {status}")]
    NotCancellable {
        code: String,
        status: models::AppointmentStatus,
    },

    #[error("customer {0} not found")]
    CustomerNotFound(i64),

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<rusqlite::Error> for SchedulingError {
    fn from(e: rusqlite::Error) -> Self {
        SchedulingError::Storage(e.to_string())
    }
}
