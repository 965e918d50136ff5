//! Storage abstraction for scheduling state.

use crate::models::{
    Appointment, AppointmentDetails, BookingRequest, Customer, CustomerUpdate, SlotOffer,
    SlotQuery, Technician, TimeSlot,
};
use crate::SchedulingError;
use chrono::NaiveDate;

/// Backing store for customers, technicians, slots, and appointments.
///
/// Implementations must make [`book`](SchedulingStore::book) atomic: the
/// slot flips to unavailable and the appointment row appears together, or
/// neither happens. Concurrent bookings of the same slot must produce
/// exactly one winner; every loser gets `SlotNoLongerAvailable`.
pub trait SchedulingStore: Send + Sync {
    fn find_customer_by_phone(&self, phone: &str) -> Result<Option<Customer>, SchedulingError>;

    fn insert_customer(&self, phone: &str) -> Result<Customer, SchedulingError>;

    fn update_customer(
        &self,
        customer_id: i64,
        update: &CustomerUpdate,
    ) -> Result<Customer, SchedulingError>;

    fn insert_technician(&self, technician: &Technician) -> Result<Technician, SchedulingError>;

    /// Available slots for a zip code and appliance, already resolved to
    /// the given inclusive date range, ordered by date then start time.
    fn find_available_slots(
        &self,
        query: &SlotQuery,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<SlotOffer>, SchedulingError>;

    fn slot(&self, slot_id: i64) -> Result<Option<TimeSlot>, SchedulingError>;

    fn insert_slot(&self, slot: &TimeSlot) -> Result<TimeSlot, SchedulingError>;

    /// Atomically claim the slot and create the appointment.
    fn book(
        &self,
        request: &BookingRequest,
        confirmation_code: &str,
    ) -> Result<Appointment, SchedulingError>;

    fn appointment_by_confirmation(
        &self,
        confirmation_code: &str,
    ) -> Result<Option<AppointmentDetails>, SchedulingError>;

    /// Cancel an appointment and release its slot.
    fn cancel(&self, confirmation_code: &str) -> Result<AppointmentDetails, SchedulingError>;

    /// Non-cancelled appointments for a customer, newest first.
    fn appointments_for_customer(
        &self,
        customer_id: i64,
    ) -> Result<Vec<AppointmentDetails>, SchedulingError>;

    fn technician_count(&self) -> Result<u64, SchedulingError>;
}
