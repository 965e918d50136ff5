//! SQLite-backed scheduling store.
//!
//! Booking runs inside an IMMEDIATE transaction with a compare-and-set on
//! the slot's availability flag, and a partial unique index on live
//! appointments per slot backs that up at the schema level. Either the
//! claim and the appointment row land together or the transaction rolls
//! back.

use chrono::{NaiveDate, NaiveTime};
use homeserv_core::ApplianceCategory;
use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, TransactionBehavior};
use std::path::Path;
use tracing::debug;

use crate::models::{
    Appointment, AppointmentDetails, AppointmentStatus, BookingRequest, Customer, CustomerUpdate,
    SlotOffer, SlotQuery, Technician, TimeSlot,
};
use crate::store::SchedulingStore;
use crate::SchedulingError;

const DATE_FMT: &str = "%Y-%m-%d";
const TIME_FMT: &str = "%H:%M:%S";

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS customers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    phone TEXT NOT NULL,
    first_name TEXT,
    last_name TEXT,
    email TEXT,
    address TEXT,
    city TEXT,
    state TEXT,
    zip_code TEXT
);
CREATE INDEX IF NOT EXISTS idx_customers_phone ON customers(phone);

CREATE TABLE IF NOT EXISTS technicians (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    first_name TEXT NOT NULL,
    last_name TEXT NOT NULL,
    employee_id TEXT NOT NULL UNIQUE,
    email TEXT NOT NULL UNIQUE,
    phone TEXT NOT NULL,
    years_experience INTEGER NOT NULL DEFAULT 0,
    is_active INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS technician_specialties (
    technician_id INTEGER NOT NULL REFERENCES technicians(id),
    appliance TEXT NOT NULL,
    PRIMARY KEY (technician_id, appliance)
);

CREATE TABLE IF NOT EXISTS technician_service_areas (
    technician_id INTEGER NOT NULL REFERENCES technicians(id),
    zip_code TEXT NOT NULL,
    is_primary INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (technician_id, zip_code)
);

CREATE TABLE IF NOT EXISTS time_slots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    technician_id INTEGER NOT NULL REFERENCES technicians(id),
    slot_date TEXT NOT NULL,
    start_time TEXT NOT NULL,
    end_time TEXT NOT NULL,
    is_available INTEGER NOT NULL DEFAULT 1
);
CREATE INDEX IF NOT EXISTS idx_slots_date_avail ON time_slots(slot_date, is_available);

CREATE TABLE IF NOT EXISTS appointments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    confirmation_code TEXT NOT NULL UNIQUE,
    customer_id INTEGER NOT NULL REFERENCES customers(id),
    technician_id INTEGER NOT NULL REFERENCES technicians(id),
    time_slot_id INTEGER NOT NULL REFERENCES time_slots(id),
    status TEXT NOT NULL DEFAULT 'scheduled',
    appliance TEXT NOT NULL,
    issue_description TEXT NOT NULL,
    symptoms TEXT,
    call_id TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_one_live_appointment_per_slot
    ON appointments(time_slot_id) WHERE status != 'cancelled';
"#;

/// SQLite-backed store. The connection is behind a mutex; SQLite itself
/// serializes writers anyway, and call volume here is human-paced.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SchedulingError> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, SchedulingError> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, SchedulingError> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate, SchedulingError> {
    NaiveDate::parse_from_str(raw, DATE_FMT)
        .map_err(|e| SchedulingError::Storage(format!("bad date {raw:?}: {e}")))
}

fn parse_time(raw: &str) -> Result<NaiveTime, SchedulingError> {
    NaiveTime::parse_from_str(raw, TIME_FMT)
        .map_err(|e| SchedulingError::Storage(format!("bad time {raw:?}: {e}")))
}

fn parse_appliance(raw: &str) -> Result<ApplianceCategory, SchedulingError> {
    ApplianceCategory::normalize(raw)
        .ok_or_else(|| SchedulingError::Storage(format!("bad appliance {raw:?}")))
}

fn parse_status(raw: &str) -> Result<AppointmentStatus, SchedulingError> {
    AppointmentStatus::parse(raw)
        .ok_or_else(|| SchedulingError::Storage(format!("bad appointment status {raw:?}")))
}

fn is_unique_violation(err: &rusqlite::Error, column: &str) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, Some(msg)) => {
            e.code == ErrorCode::ConstraintViolation && msg.contains(column)
        }
        _ => false,
    }
}

/// Raw appointment row before date/enum parsing.
struct AppointmentRow {
    id: i64,
    confirmation_code: String,
    customer_id: i64,
    technician_id: i64,
    time_slot_id: i64,
    status: String,
    appliance: String,
    issue_description: String,
    symptoms: Option<String>,
    call_id: Option<String>,
    slot_date: String,
    start_time: String,
    end_time: String,
    slot_available: bool,
    technician_name: String,
}

impl AppointmentRow {
    fn into_details(self) -> Result<AppointmentDetails, SchedulingError> {
        Ok(AppointmentDetails {
            appointment: Appointment {
                id: self.id,
                confirmation_code: self.confirmation_code,
                customer_id: self.customer_id,
                technician_id: self.technician_id,
                time_slot_id: self.time_slot_id,
                status: parse_status(&self.status)?,
                appliance: parse_appliance(&self.appliance)?,
                issue_description: self.issue_description,
                symptoms: self.symptoms,
                call_id: self.call_id,
            },
            slot: TimeSlot {
                id: self.time_slot_id,
                technician_id: self.technician_id,
                date: parse_date(&self.slot_date)?,
                start_time: parse_time(&self.start_time)?,
                end_time: parse_time(&self.end_time)?,
                is_available: self.slot_available,
            },
            technician_name: self.technician_name,
        })
    }
}

const APPOINTMENT_DETAILS_SQL: &str = "\
    SELECT a.id, a.confirmation_code, a.customer_id, a.technician_id, a.time_slot_id, \
           a.status, a.appliance, a.issue_description, a.symptoms, a.call_id, \
           s.slot_date, s.start_time, s.end_time, s.is_available, \
           t.first_name || ' ' || t.last_name \
    FROM appointments a \
    JOIN time_slots s ON s.id = a.time_slot_id \
    JOIN technicians t ON t.id = a.technician_id";

fn appointment_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AppointmentRow> {
    Ok(AppointmentRow {
        id: row.get(0)?,
        confirmation_code: row.get(1)?,
        customer_id: row.get(2)?,
        technician_id: row.get(3)?,
        time_slot_id: row.get(4)?,
        status: row.get(5)?,
        appliance: row.get(6)?,
        issue_description: row.get(7)?,
        symptoms: row.get(8)?,
        call_id: row.get(9)?,
        slot_date: row.get(10)?,
        start_time: row.get(11)?,
        end_time: row.get(12)?,
        slot_available: row.get(13)?,
        technician_name: row.get(14)?,
    })
}

fn customer_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Customer> {
    Ok(Customer {
        id: row.get(0)?,
        phone: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        email: row.get(4)?,
        address: row.get(5)?,
        city: row.get(6)?,
        state: row.get(7)?,
        zip_code: row.get(8)?,
    })
}

const CUSTOMER_SQL: &str = "SELECT id, phone, first_name, last_name, email, address, city, state, zip_code FROM customers";

impl SchedulingStore for SqliteStore {
    fn find_customer_by_phone(&self, phone: &str) -> Result<Option<Customer>, SchedulingError> {
        let conn = self.conn.lock();
        let customer = conn
            .query_row(
                &format!("{CUSTOMER_SQL} WHERE phone = ?1 ORDER BY id LIMIT 1"),
                params![phone],
                customer_row,
            )
            .optional()?;
        Ok(customer)
    }

    fn insert_customer(&self, phone: &str) -> Result<Customer, SchedulingError> {
        let conn = self.conn.lock();
        conn.execute("INSERT INTO customers (phone) VALUES (?1)", params![phone])?;
        let id = conn.last_insert_rowid();
        Ok(Customer {
            id,
            phone: phone.to_string(),
            first_name: None,
            last_name: None,
            email: None,
            address: None,
            city: None,
            state: None,
            zip_code: None,
        })
    }

    fn update_customer(
        &self,
        customer_id: i64,
        update: &CustomerUpdate,
    ) -> Result<Customer, SchedulingError> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE customers SET \
                first_name = COALESCE(?2, first_name), \
                last_name = COALESCE(?3, last_name), \
                email = COALESCE(?4, email), \
                address = COALESCE(?5, address), \
                city = COALESCE(?6, city), \
                state = COALESCE(?7, state), \
                zip_code = COALESCE(?8, zip_code) \
             WHERE id = ?1",
            params![
                customer_id,
                update.first_name,
                update.last_name,
                update.email,
                update.address,
                update.city,
                update.state,
                update.zip_code,
            ],
        )?;
        if changed == 0 {
            return Err(SchedulingError::CustomerNotFound(customer_id));
        }
        let customer = conn.query_row(
            &format!("{CUSTOMER_SQL} WHERE id = ?1"),
            params![customer_id],
            customer_row,
        )?;
        Ok(customer)
    }

    fn insert_technician(&self, technician: &Technician) -> Result<Technician, SchedulingError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO technicians (first_name, last_name, employee_id, email, phone, years_experience, is_active) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                technician.first_name,
                technician.last_name,
                technician.employee_id,
                technician.email,
                technician.phone,
                technician.years_experience,
                technician.is_active,
            ],
        )?;
        let id = tx.last_insert_rowid();
        for specialty in &technician.specialties {
            tx.execute(
                "INSERT INTO technician_specialties (technician_id, appliance) VALUES (?1, ?2)",
                params![id, specialty.as_str()],
            )?;
        }
        for (i, zip) in technician.service_areas.iter().enumerate() {
            tx.execute(
                "INSERT INTO technician_service_areas (technician_id, zip_code, is_primary) \
                 VALUES (?1, ?2, ?3)",
                params![id, zip, i == 0],
            )?;
        }
        tx.commit()?;
        let mut created = technician.clone();
        created.id = id;
        Ok(created)
    }

    fn find_available_slots(
        &self,
        query: &SlotQuery,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<SlotOffer>, SchedulingError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT s.id, s.technician_id, \
                    t.first_name || ' ' || t.last_name, \
                    s.slot_date, s.start_time, s.end_time \
             FROM time_slots s \
             JOIN technicians t ON t.id = s.technician_id \
             JOIN technician_service_areas a ON a.technician_id = t.id \
             JOIN technician_specialties p ON p.technician_id = t.id \
             WHERE s.is_available = 1 \
               AND t.is_active = 1 \
               AND a.zip_code = ?1 \
               AND p.appliance = ?2 \
               AND s.slot_date >= ?3 AND s.slot_date <= ?4 \
             ORDER BY s.slot_date, s.start_time, s.technician_id",
        )?;
        let rows = stmt.query_map(
            params![
                query.zip_code,
                query.appliance.as_str(),
                start.format(DATE_FMT).to_string(),
                end.format(DATE_FMT).to_string(),
            ],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            },
        )?;

        let mut offers = Vec::new();
        for row in rows {
            let (slot_id, technician_id, technician_name, date, start_time, end_time) = row?;
            let offer = SlotOffer {
                slot_id,
                technician_id,
                technician_name,
                date: parse_date(&date)?,
                start_time: parse_time(&start_time)?,
                end_time: parse_time(&end_time)?,
            };
            if let Some(part) = query.day_part {
                if !part.matches(offer.start_time) {
                    continue;
                }
            }
            offers.push(offer);
        }
        Ok(offers)
    }

    fn slot(&self, slot_id: i64) -> Result<Option<TimeSlot>, SchedulingError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT id, technician_id, slot_date, start_time, end_time, is_available \
                 FROM time_slots WHERE id = ?1",
                params![slot_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, bool>(5)?,
                    ))
                },
            )
            .optional()?;
        match row {
            None => Ok(None),
            Some((id, technician_id, date, start_time, end_time, is_available)) => {
                Ok(Some(TimeSlot {
                    id,
                    technician_id,
                    date: parse_date(&date)?,
                    start_time: parse_time(&start_time)?,
                    end_time: parse_time(&end_time)?,
                    is_available,
                }))
            }
        }
    }

    fn insert_slot(&self, slot: &TimeSlot) -> Result<TimeSlot, SchedulingError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO time_slots (technician_id, slot_date, start_time, end_time, is_available) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                slot.technician_id,
                slot.date.format(DATE_FMT).to_string(),
                slot.start_time.format(TIME_FMT).to_string(),
                slot.end_time.format(TIME_FMT).to_string(),
                slot.is_available,
            ],
        )?;
        let mut created = slot.clone();
        created.id = conn.last_insert_rowid();
        Ok(created)
    }

    fn book(
        &self,
        request: &BookingRequest,
        confirmation_code: &str,
    ) -> Result<Appointment, SchedulingError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let technician_id: Option<i64> = tx
            .query_row(
                "SELECT technician_id FROM time_slots WHERE id = ?1",
                params![request.slot_id],
                |row| row.get(0),
            )
            .optional()?;
        let technician_id =
            technician_id.ok_or(SchedulingError::SlotNotFound(request.slot_id))?;

        // Compare-and-set claim. Zero rows changed means someone else won.
        let claimed = tx.execute(
            "UPDATE time_slots SET is_available = 0 WHERE id = ?1 AND is_available = 1",
            params![request.slot_id],
        )?;
        if claimed == 0 {
            debug!(slot_id = request.slot_id, "slot already claimed");
            return Err(SchedulingError::SlotNoLongerAvailable(request.slot_id));
        }

        let inserted = tx.execute(
            "INSERT INTO appointments \
                (confirmation_code, customer_id, technician_id, time_slot_id, status, \
                 appliance, issue_description, symptoms, call_id) \
             VALUES (?1, ?2, ?3, ?4, 'scheduled', ?5, ?6, ?7, ?8)",
            params![
                confirmation_code,
                request.customer_id,
                technician_id,
                request.slot_id,
                request.appliance.as_str(),
                request.issue_description,
                request.symptoms,
                request.call_id,
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e, "confirmation_code") => {
                return Err(SchedulingError::ConfirmationCollision);
            }
            Err(e) if is_unique_violation(&e, "time_slot_id") => {
                return Err(SchedulingError::SlotNoLongerAvailable(request.slot_id));
            }
            Err(e) => return Err(e.into()),
        }
        let id = tx.last_insert_rowid();
        tx.commit()?;

        Ok(Appointment {
            id,
            confirmation_code: confirmation_code.to_string(),
            customer_id: request.customer_id,
            technician_id,
            time_slot_id: request.slot_id,
            status: AppointmentStatus::Scheduled,
            appliance: request.appliance,
            issue_description: request.issue_description.clone(),
            symptoms: request.symptoms.clone(),
            call_id: request.call_id.clone(),
        })
    }

    fn appointment_by_confirmation(
        &self,
        confirmation_code: &str,
    ) -> Result<Option<AppointmentDetails>, SchedulingError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                &format!("{APPOINTMENT_DETAILS_SQL} WHERE a.confirmation_code = ?1"),
                params![confirmation_code],
                appointment_row,
            )
            .optional()?;
        row.map(AppointmentRow::into_details).transpose()
    }

    fn cancel(&self, confirmation_code: &str) -> Result<AppointmentDetails, SchedulingError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let row = tx
            .query_row(
                &format!("{APPOINTMENT_DETAILS_SQL} WHERE a.confirmation_code = ?1"),
                params![confirmation_code],
                appointment_row,
            )
            .optional()?;
        let row = row.ok_or_else(|| {
            SchedulingError::AppointmentNotFound(confirmation_code.to_string())
        })?;
        let mut details = row.into_details()?;

        match details.appointment.status {
            AppointmentStatus::Cancelled => {
                return Err(SchedulingError::AlreadyCancelled(
                    confirmation_code.to_string(),
                ));
            }
            status if !status.is_cancellable() => {
                return Err(SchedulingError::NotCancellable {
                    code: confirmation_code.to_string(),
                    status,
                });
            }
            _ => {}
        }

        tx.execute(
            "UPDATE appointments SET status = 'cancelled' WHERE id = ?1",
            params![details.appointment.id],
        )?;
        tx.execute(
            "UPDATE time_slots SET is_available = 1 WHERE id = ?1",
            params![details.appointment.time_slot_id],
        )?;
        tx.commit()?;

        details.appointment.status = AppointmentStatus::Cancelled;
        details.slot.is_available = true;
        Ok(details)
    }

    fn appointments_for_customer(
        &self,
        customer_id: i64,
    ) -> Result<Vec<AppointmentDetails>, SchedulingError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "{APPOINTMENT_DETAILS_SQL} \
             WHERE a.customer_id = ?1 AND a.status != 'cancelled' \
             ORDER BY a.id DESC"
        ))?;
        let rows = stmt.query_map(params![customer_id], appointment_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?.into_details()?);
        }
        Ok(out)
    }

    fn technician_count(&self) -> Result<u64, SchedulingError> {
        let conn = self.conn.lock();
        let count: u64 = conn.query_row("SELECT COUNT(*) FROM technicians", [], |r| r.get(0))?;
        Ok(count)
    }
}
