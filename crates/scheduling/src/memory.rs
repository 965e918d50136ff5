//! In-memory scheduling store.
//!
//! All tables live behind one mutex, so every operation, booking
//! included, is naturally atomic. Used by tests and by demos that don't
//! want a database file.

use chrono::NaiveDate;
use parking_lot::Mutex;
use std::collections::HashMap;

use crate::models::{
    Appointment, AppointmentDetails, AppointmentStatus, BookingRequest, Customer, CustomerUpdate,
    SlotOffer, SlotQuery, Technician, TimeSlot,
};
use crate::store::SchedulingStore;
use crate::SchedulingError;

#[derive(Default)]
struct Tables {
    customers: HashMap<i64, Customer>,
    technicians: HashMap<i64, Technician>,
    slots: HashMap<i64, TimeSlot>,
    appointments: HashMap<i64, Appointment>,
    next_customer_id: i64,
    next_technician_id: i64,
    next_slot_id: i64,
    next_appointment_id: i64,
}

impl Tables {
    fn details_for(&self, appointment: &Appointment) -> Result<AppointmentDetails, SchedulingError> {
        let slot = self
            .slots
            .get(&appointment.time_slot_id)
            .ok_or(SchedulingError::SlotNotFound(appointment.time_slot_id))?;
        let technician_name = self
            .technicians
            .get(&appointment.technician_id)
            .map(Technician::full_name)
            .unwrap_or_else(|| "a technician".to_string());
        Ok(AppointmentDetails {
            appointment: appointment.clone(),
            slot: slot.clone(),
            technician_name,
        })
    }
}

/// Mutex-backed store with the same semantics as the SQLite one.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SchedulingStore for MemoryStore {
    fn find_customer_by_phone(&self, phone: &str) -> Result<Option<Customer>, SchedulingError> {
        let tables = self.tables.lock();
        let mut matches: Vec<&Customer> = tables
            .customers
            .values()
            .filter(|c| c.phone == phone)
            .collect();
        matches.sort_by_key(|c| c.id);
        Ok(matches.first().map(|c| (*c).clone()))
    }

    fn insert_customer(&self, phone: &str) -> Result<Customer, SchedulingError> {
        let mut tables = self.tables.lock();
        tables.next_customer_id += 1;
        let customer = Customer {
            id: tables.next_customer_id,
            phone: phone.to_string(),
            first_name: None,
            last_name: None,
            email: None,
            address: None,
            city: None,
            state: None,
            zip_code: None,
        };
        tables.customers.insert(customer.id, customer.clone());
        Ok(customer)
    }

    fn update_customer(
        &self,
        customer_id: i64,
        update: &CustomerUpdate,
    ) -> Result<Customer, SchedulingError> {
        let mut tables = self.tables.lock();
        let customer = tables
            .customers
            .get_mut(&customer_id)
            .ok_or(SchedulingError::CustomerNotFound(customer_id))?;
        if let Some(v) = &update.first_name {
            customer.first_name = Some(v.clone());
        }
        if let Some(v) = &update.last_name {
            customer.last_name = Some(v.clone());
        }
        if let Some(v) = &update.email {
            customer.email = Some(v.clone());
        }
        if let Some(v) = &update.address {
            customer.address = Some(v.clone());
        }
        if let Some(v) = &update.city {
            customer.city = Some(v.clone());
        }
        if let Some(v) = &update.state {
            customer.state = Some(v.clone());
        }
        if let Some(v) = &update.zip_code {
            customer.zip_code = Some(v.clone());
        }
        Ok(customer.clone())
    }

    fn insert_technician(&self, technician: &Technician) -> Result<Technician, SchedulingError> {
        let mut tables = self.tables.lock();
        tables.next_technician_id += 1;
        let mut created = technician.clone();
        created.id = tables.next_technician_id;
        tables.technicians.insert(created.id, created.clone());
        Ok(created)
    }

    fn find_available_slots(
        &self,
        query: &SlotQuery,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<SlotOffer>, SchedulingError> {
        let tables = self.tables.lock();
        let mut offers: Vec<SlotOffer> = tables
            .slots
            .values()
            .filter(|s| s.is_available && s.date >= start && s.date <= end)
            .filter(|s| {
                query
                    .day_part
                    .map_or(true, |part| part.matches(s.start_time))
            })
            .filter_map(|s| {
                let tech = tables.technicians.get(&s.technician_id)?;
                let qualified = tech.is_active
                    && tech.specialties.contains(&query.appliance)
                    && tech.service_areas.iter().any(|z| *z == query.zip_code);
                qualified.then(|| SlotOffer {
                    slot_id: s.id,
                    technician_id: tech.id,
                    technician_name: tech.full_name(),
                    date: s.date,
                    start_time: s.start_time,
                    end_time: s.end_time,
                })
            })
            .collect();
        offers.sort_by_key(|o| (o.date, o.start_time, o.technician_id, o.slot_id));
        Ok(offers)
    }

    fn slot(&self, slot_id: i64) -> Result<Option<TimeSlot>, SchedulingError> {
        Ok(self.tables.lock().slots.get(&slot_id).cloned())
    }

    fn insert_slot(&self, slot: &TimeSlot) -> Result<TimeSlot, SchedulingError> {
        let mut tables = self.tables.lock();
        tables.next_slot_id += 1;
        let mut created = slot.clone();
        created.id = tables.next_slot_id;
        tables.slots.insert(created.id, created.clone());
        Ok(created)
    }

    fn book(
        &self,
        request: &BookingRequest,
        confirmation_code: &str,
    ) -> Result<Appointment, SchedulingError> {
        let mut tables = self.tables.lock();

        if tables
            .appointments
            .values()
            .any(|a| a.confirmation_code == confirmation_code)
        {
            return Err(SchedulingError::ConfirmationCollision);
        }

        let slot = tables
            .slots
            .get_mut(&request.slot_id)
            .ok_or(SchedulingError::SlotNotFound(request.slot_id))?;
        if !slot.is_available {
            return Err(SchedulingError::SlotNoLongerAvailable(request.slot_id));
        }
        slot.is_available = false;
        let technician_id = slot.technician_id;

        tables.next_appointment_id += 1;
        let appointment = Appointment {
            id: tables.next_appointment_id,
            confirmation_code: confirmation_code.to_string(),
            customer_id: request.customer_id,
            technician_id,
            time_slot_id: request.slot_id,
            status: AppointmentStatus::Scheduled,
            appliance: request.appliance,
            issue_description: request.issue_description.clone(),
            symptoms: request.symptoms.clone(),
            call_id: request.call_id.clone(),
        };
        tables
            .appointments
            .insert(appointment.id, appointment.clone());
        Ok(appointment)
    }

    fn appointment_by_confirmation(
        &self,
        confirmation_code: &str,
    ) -> Result<Option<AppointmentDetails>, SchedulingError> {
        let tables = self.tables.lock();
        let appointment = tables
            .appointments
            .values()
            .find(|a| a.confirmation_code == confirmation_code)
            .cloned();
        match appointment {
            None => Ok(None),
            Some(a) => Ok(Some(tables.details_for(&a)?)),
        }
    }

    fn cancel(&self, confirmation_code: &str) -> Result<AppointmentDetails, SchedulingError> {
        let mut tables = self.tables.lock();
        let appointment_id = tables
            .appointments
            .values()
            .find(|a| a.confirmation_code == confirmation_code)
            .map(|a| a.id)
            .ok_or_else(|| SchedulingError::AppointmentNotFound(confirmation_code.to_string()))?;

        let (status, slot_id) = {
            let a = &tables.appointments[&appointment_id];
            (a.status, a.time_slot_id)
        };
        if status == AppointmentStatus::Cancelled {
            return Err(SchedulingError::AlreadyCancelled(
                confirmation_code.to_string(),
            ));
        }
        if !status.is_cancellable() {
            return Err(SchedulingError::NotCancellable {
                code: confirmation_code.to_string(),
                status,
            });
        }

        if let Some(a) = tables.appointments.get_mut(&appointment_id) {
            a.status = AppointmentStatus::Cancelled;
        }
        if let Some(slot) = tables.slots.get_mut(&slot_id) {
            slot.is_available = true;
        }

        let appointment = tables.appointments[&appointment_id].clone();
        tables.details_for(&appointment)
    }

    fn appointments_for_customer(
        &self,
        customer_id: i64,
    ) -> Result<Vec<AppointmentDetails>, SchedulingError> {
        let tables = self.tables.lock();
        let mut live: Vec<&Appointment> = tables
            .appointments
            .values()
            .filter(|a| a.customer_id == customer_id && a.status != AppointmentStatus::Cancelled)
            .collect();
        live.sort_by_key(|a| std::cmp::Reverse(a.id));
        live.into_iter()
            .map(|a| tables.details_for(a))
            .collect()
    }

    fn technician_count(&self) -> Result<u64, SchedulingError> {
        Ok(self.tables.lock().technicians.len() as u64)
    }
}
