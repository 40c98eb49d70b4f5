use chrono::{Duration, NaiveDate, NaiveDateTime};
use rusqlite::Connection;

use crate::config::AppConfig;
use crate::db::queries;
use crate::errors::BookingError;
use crate::models::{SlotAvailability, SlotGrid};

/// Days either side of a booking in which the same customer may not book again.
pub const WEEKLY_WINDOW_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotCheck {
    Available,
    Conflict { booking_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WeeklyLimit {
    Allowed,
    Denied { existing_booking_id: String },
}

/// Static booking rules derived from configuration.
#[derive(Debug, Clone, Copy)]
pub struct BookingRules {
    pub grid: SlotGrid,
    pub min_lead: Duration,
}

impl Default for BookingRules {
    fn default() -> Self {
        Self {
            grid: SlotGrid::default(),
            min_lead: Duration::hours(24),
        }
    }
}

impl BookingRules {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            grid: config.slot_grid,
            min_lead: Duration::hours(config.min_lead_hours),
        }
    }

    /// Checks that `start` is a grid slot far enough ahead of `now`.
    pub fn validate_slot(&self, start: &NaiveDateTime, now: &NaiveDateTime) -> Result<(), BookingError> {
        if !self.grid.contains(start) {
            return Err(BookingError::InvalidSlot(self.grid.to_human_readable()));
        }
        if *start < *now + self.min_lead {
            return Err(BookingError::TooSoon {
                min_lead_hours: self.min_lead.num_hours(),
            });
        }
        Ok(())
    }

    fn is_bookable_from(&self, start: &NaiveDateTime, now: &NaiveDateTime) -> bool {
        *start >= *now + self.min_lead
    }
}

/// Whether any pending or confirmed booking occupies the slot starting at `start`.
pub fn check_availability(conn: &Connection, start: &NaiveDateTime) -> anyhow::Result<SlotCheck> {
    Ok(match queries::find_live_booking_at(conn, start)? {
        Some(booking_id) => SlotCheck::Conflict { booking_id },
        None => SlotCheck::Available,
    })
}

/// Whether the customer already holds a live booking within
/// [`WEEKLY_WINDOW_DAYS`] calendar days of `date`, counting both ends.
pub fn check_weekly_limit(conn: &Connection, customer_id: &str, date: &NaiveDate) -> anyhow::Result<WeeklyLimit> {
    Ok(
        match queries::find_live_booking_in_window(conn, customer_id, date, WEEKLY_WINDOW_DAYS)? {
            Some(existing_booking_id) => WeeklyLimit::Denied { existing_booking_id },
            None => WeeklyLimit::Allowed,
        },
    )
}

/// Every grid slot on `date`; a slot is available when it is free and not
/// inside the minimum lead time.
pub fn list_open_slots(
    conn: &Connection,
    rules: &BookingRules,
    date: NaiveDate,
    now: &NaiveDateTime,
) -> anyhow::Result<Vec<SlotAvailability>> {
    let taken = queries::live_slot_starts_on(conn, &date)?;

    Ok(rules
        .grid
        .slots_on(date)
        .into_iter()
        .map(|start| SlotAvailability {
            start,
            end: rules.grid.end_of(&start),
            available: !taken.contains(&start) && rules.is_bookable_from(&start, now),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::{Booking, BookingStatus, ContactDetails, Service, ServiceStatus};

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn setup_db() -> (Connection, String) {
        let conn = db::init_db(":memory:").unwrap();
        let now = dt("2025-06-01 08:00");
        queries::create_service(
            &conn,
            &Service {
                id: "svc-1".to_string(),
                name: "Detail".to_string(),
                description: None,
                price_cents: 7500,
                status: ServiceStatus::Active,
                provider_price_id: None,
                archived: false,
                created_at: now,
            },
        )
        .unwrap();
        let customer = queries::upsert_customer(
            &conn,
            &ContactDetails {
                name: "Alice".to_string(),
                email: "alice@example.com".to_string(),
                phone: "5551110000".to_string(),
            },
            &now,
        )
        .unwrap();
        (conn, customer.id)
    }

    fn insert(conn: &Connection, id: &str, customer_id: &str, start: &str, status: BookingStatus) {
        let start_at = dt(start);
        let now = dt("2025-06-01 08:00");
        queries::insert_booking(
            conn,
            &Booking {
                id: id.to_string(),
                customer_id: customer_id.to_string(),
                service_id: "svc-1".to_string(),
                start_at,
                end_at: start_at + Duration::hours(2),
                notes: None,
                status,
                created_at: now,
                updated_at: now,
            },
        )
        .unwrap();
    }

    #[test]
    fn test_free_slot_is_available() {
        let (conn, _) = setup_db();
        assert_eq!(check_availability(&conn, &dt("2025-06-16 09:00")).unwrap(), SlotCheck::Available);
    }

    #[test]
    fn test_taken_slot_conflicts() {
        let (conn, alice) = setup_db();
        insert(&conn, "b1", &alice, "2025-06-16 09:00", BookingStatus::PendingPayment);
        assert_eq!(
            check_availability(&conn, &dt("2025-06-16 09:00")).unwrap(),
            SlotCheck::Conflict {
                booking_id: "b1".to_string()
            }
        );
        // Neighbouring slot is unaffected.
        assert_eq!(check_availability(&conn, &dt("2025-06-16 11:00")).unwrap(), SlotCheck::Available);
    }

    #[test]
    fn test_cancelled_booking_frees_slot() {
        let (conn, alice) = setup_db();
        insert(&conn, "b1", &alice, "2025-06-16 09:00", BookingStatus::Cancelled);
        assert_eq!(check_availability(&conn, &dt("2025-06-16 09:00")).unwrap(), SlotCheck::Available);
    }

    #[test]
    fn test_weekly_limit_exactly_seven_days_denied() {
        let (conn, alice) = setup_db();
        insert(&conn, "b1", &alice, "2025-06-16 09:00", BookingStatus::Confirmed);

        assert_eq!(
            check_weekly_limit(&conn, &alice, &day("2025-06-23")).unwrap(),
            WeeklyLimit::Denied {
                existing_booking_id: "b1".to_string()
            }
        );
        assert_eq!(
            check_weekly_limit(&conn, &alice, &day("2025-06-09")).unwrap(),
            WeeklyLimit::Denied {
                existing_booking_id: "b1".to_string()
            }
        );
    }

    #[test]
    fn test_weekly_limit_eight_days_allowed() {
        let (conn, alice) = setup_db();
        insert(&conn, "b1", &alice, "2025-06-16 09:00", BookingStatus::Confirmed);

        assert_eq!(check_weekly_limit(&conn, &alice, &day("2025-06-24")).unwrap(), WeeklyLimit::Allowed);
        assert_eq!(check_weekly_limit(&conn, &alice, &day("2025-06-08")).unwrap(), WeeklyLimit::Allowed);
    }

    #[test]
    fn test_weekly_limit_ignores_cancelled_and_other_customers() {
        let (conn, alice) = setup_db();
        insert(&conn, "b1", &alice, "2025-06-16 09:00", BookingStatus::Cancelled);
        assert_eq!(check_weekly_limit(&conn, &alice, &day("2025-06-17")).unwrap(), WeeklyLimit::Allowed);

        insert(&conn, "b2", &alice, "2025-06-16 11:00", BookingStatus::PendingPayment);
        assert_eq!(check_weekly_limit(&conn, "someone-else", &day("2025-06-17")).unwrap(), WeeklyLimit::Allowed);
    }

    #[test]
    fn test_validate_slot_rules() {
        let rules = BookingRules::default();
        let now = dt("2025-06-15 10:00");

        assert!(rules.validate_slot(&dt("2025-06-16 11:00"), &now).is_ok());
        assert!(matches!(
            rules.validate_slot(&dt("2025-06-16 09:00"), &now),
            Err(BookingError::TooSoon { min_lead_hours: 24 })
        ));
        assert!(matches!(
            rules.validate_slot(&dt("2025-06-14 09:00"), &now),
            Err(BookingError::TooSoon { .. })
        ));
        assert!(matches!(
            rules.validate_slot(&dt("2025-06-20 10:00"), &now),
            Err(BookingError::InvalidSlot(_))
        ));
    }

    #[test]
    fn test_list_open_slots_marks_taken_and_too_soon() {
        let (conn, alice) = setup_db();
        insert(&conn, "b1", &alice, "2025-06-16 09:00", BookingStatus::Confirmed);
        let rules = BookingRules::default();

        let slots = list_open_slots(&conn, &rules, day("2025-06-16"), &dt("2025-06-15 06:00")).unwrap();
        let open: Vec<String> = slots
            .iter()
            .filter(|s| s.available)
            .map(|s| s.start.format("%H:%M").to_string())
            .collect();

        // 05:00 is inside the 24h lead time, 09:00 is taken.
        assert_eq!(open, vec!["07:00", "11:00", "13:00", "15:00", "17:00"]);
        assert_eq!(slots.len(), 7);
    }
}
