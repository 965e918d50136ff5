//! Demo data: a roster of technicians with service areas and two weeks of
//! open slots. Loaded at startup when `scheduling.seed_demo_data` is set.

use chrono::{Datelike, Duration, Local, NaiveTime, Weekday};
use homeserv_core::ApplianceCategory;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::info;

use crate::models::{Technician, TimeSlot};
use crate::store::SchedulingStore;
use crate::SchedulingError;

struct SeedTechnician {
    first_name: &'static str,
    last_name: &'static str,
    employee_id: &'static str,
    email: &'static str,
    phone: &'static str,
    years_experience: u32,
    specialties: &'static [ApplianceCategory],
    zip_codes: &'static [&'static str],
}

use ApplianceCategory as A;

const TECHNICIANS: &[SeedTechnician] = &[
    SeedTechnician {
        first_name: "Michael",
        last_name: "Johnson",
        employee_id: "TECH001",
        email: "mjohnson@homeserv.example",
        phone: "555-101-0001",
        years_experience: 12,
        specialties: &[A::Washer, A::Dryer, A::Dishwasher],
        zip_codes: &["90210", "90211", "90212", "90213"],
    },
    SeedTechnician {
        first_name: "Sarah",
        last_name: "Williams",
        employee_id: "TECH002",
        email: "swilliams@homeserv.example",
        phone: "555-101-0002",
        years_experience: 8,
        specialties: &[A::Refrigerator, A::Freezer, A::Dishwasher],
        zip_codes: &["90210", "90214", "90215", "90216"],
    },
    SeedTechnician {
        first_name: "David",
        last_name: "Martinez",
        employee_id: "TECH003",
        email: "dmartinez@homeserv.example",
        phone: "555-101-0003",
        years_experience: 15,
        specialties: &[A::Hvac, A::WaterHeater],
        zip_codes: &["90210", "90211", "90217", "90218"],
    },
    SeedTechnician {
        first_name: "Jennifer",
        last_name: "Brown",
        employee_id: "TECH004",
        email: "jbrown@homeserv.example",
        phone: "555-101-0004",
        years_experience: 6,
        specialties: &[A::Oven, A::Microwave, A::Dishwasher],
        zip_codes: &["90215", "90216", "90219", "90220"],
    },
    SeedTechnician {
        first_name: "Robert",
        last_name: "Davis",
        employee_id: "TECH005",
        email: "rdavis@homeserv.example",
        phone: "555-101-0005",
        years_experience: 10,
        specialties: &[A::Washer, A::Dryer, A::Refrigerator, A::Freezer],
        zip_codes: &["90211", "90212", "90221", "90222"],
    },
    SeedTechnician {
        first_name: "Emily",
        last_name: "Wilson",
        employee_id: "TECH006",
        email: "ewilson@homeserv.example",
        phone: "555-101-0006",
        years_experience: 4,
        specialties: &[A::GarbageDisposal, A::Dishwasher, A::Microwave],
        zip_codes: &["90213", "90214", "90223", "90224"],
    },
    SeedTechnician {
        first_name: "James",
        last_name: "Anderson",
        employee_id: "TECH007",
        email: "janderson@homeserv.example",
        phone: "555-101-0007",
        years_experience: 20,
        specialties: &[A::Hvac, A::WaterHeater, A::Refrigerator],
        zip_codes: &["90217", "90218", "90225", "90226"],
    },
    SeedTechnician {
        first_name: "Lisa",
        last_name: "Thomas",
        employee_id: "TECH008",
        email: "lthomas@homeserv.example",
        phone: "555-101-0008",
        years_experience: 7,
        specialties: &[A::Washer, A::Dryer, A::Oven],
        zip_codes: &["90219", "90220", "90227", "90228"],
    },
    SeedTechnician {
        first_name: "Daniel",
        last_name: "Garcia",
        employee_id: "TECH009",
        email: "dgarcia@homeserv.example",
        phone: "555-101-0009",
        years_experience: 11,
        specialties: &[A::Refrigerator, A::Freezer, A::Hvac],
        zip_codes: &["90221", "90222", "90229", "90230"],
    },
    SeedTechnician {
        first_name: "Amanda",
        last_name: "Miller",
        employee_id: "TECH010",
        email: "amiller@homeserv.example",
        phone: "555-101-0010",
        years_experience: 9,
        specialties: &[A::Dishwasher, A::GarbageDisposal, A::Microwave, A::Oven],
        zip_codes: &["90223", "90224", "90210", "90211"],
    },
    // Two refrigerator techs share zip 10001, handy for demoing contention.
    SeedTechnician {
        first_name: "Nina",
        last_name: "Patel",
        employee_id: "TECH011",
        email: "npatel@homeserv.example",
        phone: "555-101-0011",
        years_experience: 13,
        specialties: &[A::Refrigerator, A::Freezer],
        zip_codes: &["10001", "10002"],
    },
    SeedTechnician {
        first_name: "Carlos",
        last_name: "Reyes",
        employee_id: "TECH012",
        email: "creyes@homeserv.example",
        phone: "555-101-0012",
        years_experience: 5,
        specialties: &[A::Refrigerator, A::Dishwasher],
        zip_codes: &["10001", "10003"],
    },
];

/// Standard two-hour appointment windows.
const SLOT_WINDOWS: &[(u32, u32)] = &[(8, 10), (10, 12), (13, 15), (15, 17)];

/// Seed technicians and two weeks of weekday slots. No-op when the store
/// already has technicians.
pub fn seed_demo_data(store: &dyn SchedulingStore) -> Result<(), SchedulingError> {
    if store.technician_count()? > 0 {
        info!("store already seeded, skipping");
        return Ok(());
    }

    let mut rng = rand::thread_rng();
    let today = Local::now().date_naive();

    for seed in TECHNICIANS {
        let technician = store.insert_technician(&Technician {
            id: 0,
            first_name: seed.first_name.to_string(),
            last_name: seed.last_name.to_string(),
            employee_id: seed.employee_id.to_string(),
            email: seed.email.to_string(),
            phone: seed.phone.to_string(),
            years_experience: seed.years_experience,
            is_active: true,
            specialties: seed.specialties.to_vec(),
            service_areas: seed.zip_codes.iter().map(|z| z.to_string()).collect(),
        })?;

        for day_offset in 1..=14 {
            let date = today + Duration::days(day_offset);
            if matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
                continue;
            }
            // Leave some windows closed to simulate existing bookings.
            let open = rng.gen_range(2..=SLOT_WINDOWS.len());
            let mut windows = SLOT_WINDOWS.to_vec();
            windows.shuffle(&mut rng);
            for &(start_h, end_h) in windows.iter().take(open) {
                let (Some(start_time), Some(end_time)) = (
                    NaiveTime::from_hms_opt(start_h, 0, 0),
                    NaiveTime::from_hms_opt(end_h, 0, 0),
                ) else {
                    continue;
                };
                store.insert_slot(&TimeSlot {
                    id: 0,
                    technician_id: technician.id,
                    date,
                    start_time,
                    end_time,
                    is_available: true,
                })?;
            }
        }
    }

    info!(technicians = TECHNICIANS.len(), "seeded demo data");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::models::SlotQuery;

    #[test]
    fn seeding_is_idempotent() {
        let store = MemoryStore::new();
        seed_demo_data(&store).unwrap();
        let count = store.technician_count().unwrap();
        seed_demo_data(&store).unwrap();
        assert_eq!(store.technician_count().unwrap(), count);
    }

    #[test]
    fn seeded_slots_are_searchable() {
        let store = MemoryStore::new();
        seed_demo_data(&store).unwrap();

        let start = Local::now().date_naive() + Duration::days(1);
        let end = start + Duration::days(14);
        let offers = store
            .find_available_slots(
                &SlotQuery::new("10001", ApplianceCategory::Refrigerator),
                start,
                end,
            )
            .unwrap();
        assert!(!offers.is_empty());
        // Both 10001 refrigerator techs should show up.
        let techs: std::collections::HashSet<i64> =
            offers.iter().map(|o| o.technician_id).collect();
        assert_eq!(techs.len(), 2);
        // Ordered by date then start time.
        for pair in offers.windows(2) {
            assert!((pair[0].date, pair[0].start_time) <= (pair[1].date, pair[1].start_time));
        }
    }
}
