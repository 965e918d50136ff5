//! Booking engine over a scheduling store.

use chrono::{Duration, Local, NaiveDate};
use homeserv_config::SchedulingConfig;
use rand::Rng;
use std::sync::Arc;
use tracing::{info, warn};

use crate::models::{
    Appointment, AppointmentDetails, BookingRequest, Customer, CustomerUpdate, SlotOffer,
    SlotQuery,
};
use crate::store::SchedulingStore;
use crate::SchedulingError;

/// Confirmation codes are "SHS-" plus eight of these.
const CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const CODE_TAIL_LEN: usize = 8;

fn generate_confirmation_code() -> String {
    let mut rng = rand::thread_rng();
    let tail: String = (0..CODE_TAIL_LEN)
        .map(|_| CODE_CHARSET[rng.gen_range(0..CODE_CHARSET.len())] as char)
        .collect();
    format!("SHS-{tail}")
}

/// Appointment booking and lookup on top of a [`SchedulingStore`].
#[derive(Clone)]
pub struct SchedulingEngine {
    store: Arc<dyn SchedulingStore>,
    config: SchedulingConfig,
}

impl SchedulingEngine {
    pub fn new(store: Arc<dyn SchedulingStore>, config: SchedulingConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<dyn SchedulingStore> {
        &self.store
    }

    pub fn config(&self) -> &SchedulingConfig {
        &self.config
    }

    /// Look up a customer by phone, creating a bare record on first call.
    pub fn get_or_create_customer(&self, phone: &str) -> Result<Customer, SchedulingError> {
        if let Some(existing) = self.store.find_customer_by_phone(phone)? {
            return Ok(existing);
        }
        let created = self.store.insert_customer(phone)?;
        info!(customer_id = created.id, "created customer record");
        Ok(created)
    }

    pub fn update_customer(
        &self,
        customer_id: i64,
        update: &CustomerUpdate,
    ) -> Result<Customer, SchedulingError> {
        self.store.update_customer(customer_id, update)
    }

    /// Available slots for the query, with unset dates defaulted to the
    /// configured search window starting tomorrow.
    pub fn find_availability(&self, query: &SlotQuery) -> Result<Vec<SlotOffer>, SchedulingError> {
        let (start, end) = self.resolve_window(query.start_date, query.end_date);
        self.store.find_available_slots(query, start, end)
    }

    fn resolve_window(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> (NaiveDate, NaiveDate) {
        let start = start.unwrap_or_else(|| Local::now().date_naive() + Duration::days(1));
        let end = end.unwrap_or(start + Duration::days(self.config.window_days as i64));
        (start, end)
    }

    /// Book a slot under a freshly generated confirmation code.
    ///
    /// Code collisions roll the whole booking back, so we just draw again,
    /// up to the configured attempt cap. Any other failure surfaces as-is.
    pub fn book_slot(&self, request: &BookingRequest) -> Result<Appointment, SchedulingError> {
        for attempt in 1..=self.config.max_code_attempts {
            let code = generate_confirmation_code();
            match self.store.book(request, &code) {
                Ok(appointment) => {
                    info!(
                        confirmation_code = %appointment.confirmation_code,
                        slot_id = request.slot_id,
                        customer_id = request.customer_id,
                        "booked appointment"
                    );
                    return Ok(appointment);
                }
                Err(SchedulingError::ConfirmationCollision) => {
                    warn!(attempt, "confirmation code collision, retrying");
                }
                Err(other) => return Err(other),
            }
        }
        Err(SchedulingError::ConfirmationGenerationExhausted(
            self.config.max_code_attempts,
        ))
    }

    pub fn appointment_by_confirmation(
        &self,
        code: &str,
    ) -> Result<AppointmentDetails, SchedulingError> {
        self.store
            .appointment_by_confirmation(code)?
            .ok_or_else(|| SchedulingError::AppointmentNotFound(code.to_string()))
    }

    /// Cancel an appointment; its slot becomes bookable again.
    pub fn cancel_appointment(&self, code: &str) -> Result<AppointmentDetails, SchedulingError> {
        let details = self.store.cancel(code)?;
        info!(confirmation_code = %code, "cancelled appointment");
        Ok(details)
    }

    pub fn appointments_for_customer(
        &self,
        customer_id: i64,
    ) -> Result<Vec<AppointmentDetails>, SchedulingError> {
        self.store.appointments_for_customer(customer_id)
    }
}
