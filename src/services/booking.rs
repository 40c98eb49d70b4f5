use chrono::NaiveDateTime;
use rusqlite::{Connection, TransactionBehavior};

use crate::db::queries;
use crate::errors::BookingError;
use crate::models::{Booking, BookingStatus, ContactDetails, Customer, PaymentStatus, Service};
use crate::services::notifications::{self, DispatchReport};
use crate::services::payments;
use crate::services::scheduling::{self, BookingRules, SlotCheck, WeeklyLimit};
use crate::state::AppState;

const MAX_NOTES_LEN: usize = 500;

#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub service_id: String,
    pub start: NaiveDateTime,
    pub contact: ContactDetails,
    pub notes: Option<String>,
}

impl BookingRequest {
    fn normalized(&self) -> Result<Self, BookingError> {
        let contact = self.contact.normalized();
        contact.validate().map_err(BookingError::Validation)?;

        let notes = self
            .notes
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);
        if notes.as_deref().map(|n| n.chars().count()).unwrap_or(0) > MAX_NOTES_LEN {
            return Err(BookingError::Validation(format!(
                "notes must be at most {MAX_NOTES_LEN} characters"
            )));
        }

        Ok(Self {
            service_id: self.service_id.trim().to_string(),
            start: self.start,
            contact,
            notes,
        })
    }
}

/// A booking that has been written as `pending_payment`.
#[derive(Debug, Clone)]
pub struct PlacedBooking {
    pub booking: Booking,
    pub service: Service,
    pub customer: Customer,
}

/// Result of a status transition request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied,
    /// The booking was already in the target state; nothing changed.
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct CheckoutStarted {
    pub booking_id: String,
    pub checkout_url: String,
}

/// Runs the availability check, the weekly-limit check and the write.
///
/// The early checks give the customer a precise rejection; the write repeats
/// both under an immediate transaction, so a request that lost a race is
/// still refused.
pub fn place_booking(
    conn: &mut Connection,
    rules: &BookingRules,
    request: &BookingRequest,
    now: &NaiveDateTime,
) -> Result<PlacedBooking, BookingError> {
    let request = request.normalized()?;
    rules.validate_slot(&request.start, now)?;

    let service = queries::get_service(conn, &request.service_id)?
        .filter(Service::is_bookable)
        .ok_or(BookingError::ServiceUnavailable)?;

    if let SlotCheck::Conflict { booking_id } = scheduling::check_availability(conn, &request.start)? {
        return Err(BookingError::SlotConflict {
            existing_booking_id: booking_id,
        });
    }

    if let Some(customer) = queries::get_customer_by_email(conn, &request.contact.email)? {
        if !customer.active {
            return Err(BookingError::CustomerInactive);
        }
        if let WeeklyLimit::Denied { existing_booking_id } =
            scheduling::check_weekly_limit(conn, &customer.id, &request.start.date())?
        {
            return Err(BookingError::WeeklyLimitExceeded { existing_booking_id });
        }
    }

    let (booking, customer) = write_booking(conn, rules, &request, &service, now)?;
    Ok(PlacedBooking {
        booking,
        service,
        customer,
    })
}

/// Inserts the booking as `pending_payment`, re-validating both invariants
/// inside the same transaction. Constraint violations raised by the store
/// itself surface as [`BookingError::TransactionConflict`].
pub fn write_booking(
    conn: &mut Connection,
    rules: &BookingRules,
    request: &BookingRequest,
    service: &Service,
    now: &NaiveDateTime,
) -> Result<(Booking, Customer), BookingError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let customer = queries::upsert_customer(&tx, &request.contact, now)?;
    if !customer.active {
        return Err(BookingError::CustomerInactive);
    }

    if let SlotCheck::Conflict { booking_id } = scheduling::check_availability(&tx, &request.start)? {
        return Err(BookingError::SlotConflict {
            existing_booking_id: booking_id,
        });
    }
    if let WeeklyLimit::Denied { existing_booking_id } =
        scheduling::check_weekly_limit(&tx, &customer.id, &request.start.date())?
    {
        return Err(BookingError::WeeklyLimitExceeded { existing_booking_id });
    }

    let booking = Booking {
        id: uuid::Uuid::new_v4().to_string(),
        customer_id: customer.id.clone(),
        service_id: service.id.clone(),
        start_at: request.start,
        end_at: rules.grid.end_of(&request.start),
        notes: request.notes.clone(),
        status: BookingStatus::PendingPayment,
        created_at: *now,
        updated_at: *now,
    };

    insert_pending(&tx, &booking)?;

    tx.commit()?;
    Ok((booking, customer))
}

/// Inserts a row the store's own guards may still reject; a rejection means
/// a concurrent writer got there first.
fn insert_pending(conn: &Connection, booking: &Booking) -> Result<(), BookingError> {
    match queries::insert_booking(conn, booking) {
        Ok(()) => Ok(()),
        Err(e) if queries::is_constraint_violation(&e) => {
            tracing::warn!(start = %booking.start_at, error = %e, "booking rejected by store constraint");
            Err(BookingError::TransactionConflict)
        }
        Err(e) => Err(e.into()),
    }
}

/// Customer-facing booking flow: persist the booking, then hand off to the
/// payment provider.
pub async fn create_booking(
    state: &AppState,
    request: &BookingRequest,
    now: NaiveDateTime,
) -> Result<CheckoutStarted, BookingError> {
    let rules = BookingRules::from_config(&state.config);
    let placed = {
        let mut conn = state.conn();
        place_booking(&mut conn, &rules, request, &now)?
    };

    tracing::info!(
        booking_id = %placed.booking.id,
        customer_id = %placed.customer.id,
        start = %placed.booking.start_at,
        "booking placed, awaiting payment"
    );

    let checkout_url = payments::initiate_checkout(state, &placed.booking.id, now).await?;
    Ok(CheckoutStarted {
        booking_id: placed.booking.id,
        checkout_url,
    })
}

/// Moves a pending booking to `confirmed` and marks its payment paid.
/// Confirming an already-confirmed booking is a no-op.
pub fn confirm_booking(
    conn: &mut Connection,
    booking_id: &str,
    payment_intent_id: Option<&str>,
    now: &NaiveDateTime,
) -> Result<(Transition, Booking), BookingError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let booking = queries::get_booking_by_id(&tx, booking_id)?.ok_or(BookingError::NotFound)?;

    let transition = match booking.status {
        BookingStatus::PendingPayment => {
            queries::transition_booking_status(
                &tx,
                booking_id,
                BookingStatus::PendingPayment,
                BookingStatus::Confirmed,
                now,
            )?;
            queries::update_payment_status(&tx, booking_id, PaymentStatus::Paid, payment_intent_id, now)?;
            Transition::Applied
        }
        BookingStatus::Confirmed => Transition::Unchanged,
        BookingStatus::Cancelled => {
            return Err(BookingError::InvalidTransition {
                from: booking.status.to_string(),
                to: BookingStatus::Confirmed.to_string(),
            });
        }
    };

    let booking = queries::get_booking_by_id(&tx, booking_id)?.ok_or(BookingError::NotFound)?;
    tx.commit()?;
    Ok((transition, booking))
}

/// Moves a pending booking to `cancelled`, freeing its slot, and marks any
/// pending payment failed. Cancelling an already-cancelled booking is a no-op;
/// a confirmed booking cannot be cancelled.
pub fn cancel_pending_booking(
    conn: &mut Connection,
    booking_id: &str,
    now: &NaiveDateTime,
) -> Result<Transition, BookingError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let booking = queries::get_booking_by_id(&tx, booking_id)?.ok_or(BookingError::NotFound)?;

    let transition = match booking.status {
        BookingStatus::PendingPayment => {
            queries::transition_booking_status(
                &tx,
                booking_id,
                BookingStatus::PendingPayment,
                BookingStatus::Cancelled,
                now,
            )?;
            queries::update_payment_status(&tx, booking_id, PaymentStatus::Failed, None, now)?;
            Transition::Applied
        }
        BookingStatus::Cancelled => Transition::Unchanged,
        BookingStatus::Confirmed => {
            return Err(BookingError::InvalidTransition {
                from: booking.status.to_string(),
                to: BookingStatus::Cancelled.to_string(),
            });
        }
    };

    tx.commit()?;
    Ok(transition)
}

/// Payment-success path: confirm, then notify. Notification runs only when
/// this call performed the transition, and its failure never reverts it.
pub async fn finalize_paid_booking(
    state: &AppState,
    booking_id: &str,
    payment_intent_id: Option<&str>,
    now: NaiveDateTime,
) -> Result<(Transition, Option<DispatchReport>), BookingError> {
    let (transition, loaded) = {
        let mut conn = state.conn();
        let (transition, booking) = confirm_booking(&mut conn, booking_id, payment_intent_id, &now)?;
        let loaded = match transition {
            Transition::Applied => Some(load_parties(&conn, booking)?),
            Transition::Unchanged => None,
        };
        (transition, loaded)
    };

    let Some((booking, service, customer)) = loaded else {
        tracing::info!(booking_id = %booking_id, "booking already confirmed, skipping notifications");
        return Ok((transition, None));
    };

    tracing::info!(booking_id = %booking_id, "booking confirmed");
    let report = notifications::dispatch_confirmation(state, &booking, &service, &customer, payment_intent_id).await;
    Ok((transition, Some(report)))
}

/// Admin-entered booking taken outside online checkout. It passes the same
/// checks and write path as a customer booking, then is recorded as paid.
pub async fn create_manual_booking(
    state: &AppState,
    request: &BookingRequest,
    now: NaiveDateTime,
) -> Result<Booking, BookingError> {
    let rules = BookingRules::from_config(&state.config);
    let placed = {
        let mut conn = state.conn();
        place_booking(&mut conn, &rules, request, &now)?
    };
    tracing::info!(booking_id = %placed.booking.id, "manual booking placed");

    finalize_paid_booking(state, &placed.booking.id, None, now).await?;

    let conn = state.conn();
    queries::get_booking_by_id(&conn, &placed.booking.id)?.ok_or(BookingError::NotFound)
}

fn load_parties(conn: &Connection, booking: Booking) -> Result<(Booking, Service, Customer), BookingError> {
    let service = queries::get_service(conn, &booking.service_id)?
        .ok_or_else(|| anyhow::anyhow!("booking {} references missing service", booking.id))?;
    let customer = queries::get_customer(conn, &booking.customer_id)?
        .ok_or_else(|| anyhow::anyhow!("booking {} references missing customer", booking.id))?;
    Ok((booking, service, customer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::ServiceStatus;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn now() -> NaiveDateTime {
        dt("2025-06-01 08:00")
    }

    fn setup_db() -> Connection {
        let conn = db::init_db(":memory:").unwrap();
        for (id, status) in [("svc-1", ServiceStatus::Active), ("svc-soon", ServiceStatus::ComingSoon)] {
            queries::create_service(
                &conn,
                &Service {
                    id: id.to_string(),
                    name: "Detail".to_string(),
                    description: None,
                    price_cents: 7500,
                    status,
                    provider_price_id: None,
                    archived: false,
                    created_at: now(),
                },
            )
            .unwrap();
        }
        conn
    }

    fn request(email: &str, start: &str) -> BookingRequest {
        BookingRequest {
            service_id: "svc-1".to_string(),
            start: dt(start),
            contact: ContactDetails {
                name: "Alice".to_string(),
                email: email.to_string(),
                phone: "5551110000".to_string(),
            },
            notes: None,
        }
    }

    fn place(conn: &mut Connection, email: &str, start: &str) -> Result<PlacedBooking, BookingError> {
        place_booking(conn, &BookingRules::default(), &request(email, start), &now())
    }

    #[test]
    fn test_place_booking_pending_payment() {
        let mut conn = setup_db();
        let placed = place(&mut conn, "Alice@Example.com", "2025-06-16 09:00").unwrap();

        assert_eq!(placed.booking.status, BookingStatus::PendingPayment);
        assert_eq!(placed.booking.end_at, dt("2025-06-16 11:00"));
        assert_eq!(placed.customer.email, "alice@example.com");

        let stored = queries::get_booking_by_id(&conn, &placed.booking.id).unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::PendingPayment);
    }

    #[test]
    fn test_same_slot_rejected_for_other_customer() {
        let mut conn = setup_db();
        let first = place(&mut conn, "alice@example.com", "2025-06-16 09:00").unwrap();

        let err = place(&mut conn, "bob@example.com", "2025-06-16 09:00").unwrap_err();
        match err {
            BookingError::SlotConflict { existing_booking_id } => {
                assert_eq!(existing_booking_id, first.booking.id)
            }
            other => panic!("expected slot conflict, got {other:?}"),
        }
    }

    #[test]
    fn test_weekly_limit_boundaries() {
        let mut conn = setup_db();
        place(&mut conn, "alice@example.com", "2025-06-16 09:00").unwrap();

        assert!(matches!(
            place(&mut conn, "alice@example.com", "2025-06-23 09:00"),
            Err(BookingError::WeeklyLimitExceeded { .. })
        ));
        assert!(matches!(
            place(&mut conn, "alice@example.com", "2025-06-09 09:00"),
            Err(BookingError::WeeklyLimitExceeded { .. })
        ));
        assert!(place(&mut conn, "alice@example.com", "2025-06-24 09:00").is_ok());
    }

    #[test]
    fn test_writer_rechecks_inside_transaction() {
        let mut conn = setup_db();
        let rules = BookingRules::default();
        let first = place(&mut conn, "alice@example.com", "2025-06-16 09:00").unwrap();

        // Skip the early checks, as a request that passed them before the
        // first booking committed would.
        let late = request("bob@example.com", "2025-06-16 09:00");
        let err = write_booking(&mut conn, &rules, &late, &first.service, &now()).unwrap_err();
        assert!(matches!(err, BookingError::SlotConflict { .. }));

        let late = request("alice@example.com", "2025-06-20 09:00");
        let err = write_booking(&mut conn, &rules, &late, &first.service, &now()).unwrap_err();
        assert!(matches!(err, BookingError::WeeklyLimitExceeded { .. }));
    }

    #[test]
    fn test_store_guards_surface_as_transaction_conflict() {
        let mut conn = setup_db();
        let first = place(&mut conn, "alice@example.com", "2025-06-16 09:00").unwrap();
        let bob = queries::upsert_customer(
            &conn,
            &ContactDetails {
                name: "Bob".to_string(),
                email: "bob@example.com".to_string(),
                phone: "5552220000".to_string(),
            },
            &now(),
        )
        .unwrap();

        let row = |id: &str, customer_id: &str, start: &str| Booking {
            id: id.to_string(),
            customer_id: customer_id.to_string(),
            service_id: "svc-1".to_string(),
            start_at: dt(start),
            end_at: dt(start) + chrono::Duration::hours(2),
            notes: None,
            status: BookingStatus::PendingPayment,
            created_at: now(),
            updated_at: now(),
        };

        // Same slot, written without the in-transaction re-check.
        let err = insert_pending(&conn, &row("b-slot", &bob.id, "2025-06-16 09:00")).unwrap_err();
        assert!(matches!(err, BookingError::TransactionConflict));

        // Same customer three days later.
        let err = insert_pending(&conn, &row("b-week", &first.customer.id, "2025-06-19 09:00")).unwrap_err();
        assert!(matches!(err, BookingError::TransactionConflict));

        insert_pending(&conn, &row("b-ok", &bob.id, "2025-06-16 11:00")).unwrap();
        assert!(queries::get_booking_by_id(&conn, "b-slot").unwrap().is_none());
    }

    #[test]
    fn test_rejected_write_leaves_no_customer_row() {
        let mut conn = setup_db();
        place(&mut conn, "alice@example.com", "2025-06-16 09:00").unwrap();
        let rules = BookingRules::default();
        let service = queries::get_service(&conn, "svc-1").unwrap().unwrap();

        let late = request("bob@example.com", "2025-06-16 09:00");
        assert!(write_booking(&mut conn, &rules, &late, &service, &now()).is_err());
        assert!(queries::get_customer_by_email(&conn, "bob@example.com").unwrap().is_none());
    }

    #[test]
    fn test_unbookable_service_rejected() {
        let mut conn = setup_db();
        let mut req = request("alice@example.com", "2025-06-16 09:00");
        req.service_id = "svc-soon".to_string();
        assert!(matches!(
            place_booking(&mut conn, &BookingRules::default(), &req, &now()),
            Err(BookingError::ServiceUnavailable)
        ));

        req.service_id = "missing".to_string();
        assert!(matches!(
            place_booking(&mut conn, &BookingRules::default(), &req, &now()),
            Err(BookingError::ServiceUnavailable)
        ));
    }

    #[test]
    fn test_inactive_customer_rejected() {
        let mut conn = setup_db();
        let placed = place(&mut conn, "alice@example.com", "2025-06-16 09:00").unwrap();
        queries::set_customer_active(&conn, &placed.customer.id, false).unwrap();

        assert!(matches!(
            place(&mut conn, "alice@example.com", "2025-07-16 09:00"),
            Err(BookingError::CustomerInactive)
        ));
    }

    #[test]
    fn test_invalid_contact_rejected() {
        let mut conn = setup_db();
        assert!(matches!(
            place(&mut conn, "not-an-email", "2025-06-16 09:00"),
            Err(BookingError::Validation(_))
        ));
    }

    #[test]
    fn test_confirm_is_idempotent() {
        let mut conn = setup_db();
        let placed = place(&mut conn, "alice@example.com", "2025-06-16 09:00").unwrap();

        let (t, booking) = confirm_booking(&mut conn, &placed.booking.id, Some("pi_1"), &now()).unwrap();
        assert_eq!(t, Transition::Applied);
        assert_eq!(booking.status, BookingStatus::Confirmed);

        let (t, _) = confirm_booking(&mut conn, &placed.booking.id, Some("pi_1"), &now()).unwrap();
        assert_eq!(t, Transition::Unchanged);
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut conn = setup_db();
        let confirmed = place(&mut conn, "alice@example.com", "2025-06-16 09:00").unwrap();
        confirm_booking(&mut conn, &confirmed.booking.id, None, &now()).unwrap();
        assert!(matches!(
            cancel_pending_booking(&mut conn, &confirmed.booking.id, &now()),
            Err(BookingError::InvalidTransition { .. })
        ));

        let cancelled = place(&mut conn, "bob@example.com", "2025-06-16 11:00").unwrap();
        assert_eq!(
            cancel_pending_booking(&mut conn, &cancelled.booking.id, &now()).unwrap(),
            Transition::Applied
        );
        assert_eq!(
            cancel_pending_booking(&mut conn, &cancelled.booking.id, &now()).unwrap(),
            Transition::Unchanged
        );
        assert!(matches!(
            confirm_booking(&mut conn, &cancelled.booking.id, None, &now()),
            Err(BookingError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_cancel_frees_slot_and_window() {
        let mut conn = setup_db();
        let placed = place(&mut conn, "alice@example.com", "2025-06-16 09:00").unwrap();
        cancel_pending_booking(&mut conn, &placed.booking.id, &now()).unwrap();

        assert!(place(&mut conn, "bob@example.com", "2025-06-16 09:00").is_ok());
        assert!(place(&mut conn, "alice@example.com", "2025-06-18 09:00").is_ok());
    }

    #[test]
    fn test_missing_booking() {
        let mut conn = setup_db();
        assert!(matches!(
            confirm_booking(&mut conn, "nope", None, &now()),
            Err(BookingError::NotFound)
        ));
        assert!(matches!(
            cancel_pending_booking(&mut conn, "nope", &now()),
            Err(BookingError::NotFound)
        ));
    }
}
