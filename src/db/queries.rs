use anyhow::Context;
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};

use crate::models::{
    Booking, BookingStatus, ContactDetails, ContactForm, ContactMessage, Customer,
    PaymentReference, PaymentStatus, Service, ServiceInput, ServiceStatus,
};

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn format_ts(dt: &NaiveDateTime) -> String {
    dt.format(TS_FORMAT).to_string()
}

fn parse_ts(s: &str) -> anyhow::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, TS_FORMAT).with_context(|| format!("bad timestamp: {s}"))
}

/// True when the error is SQLite refusing a write because of a unique index,
/// check constraint or a trigger's `RAISE(ABORT)`.
pub fn is_constraint_violation(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<rusqlite::Error>(),
        Some(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation
    )
}

// ── Customers ──

const CUSTOMER_COLUMNS: &str = "id, name, email, phone, active, created_at";

/// Finds the customer by email or creates one. Stored details are kept; a
/// later booking only fills a name or phone that was left empty.
pub fn upsert_customer(
    conn: &Connection,
    details: &ContactDetails,
    now: &NaiveDateTime,
) -> anyhow::Result<Customer> {
    let id = uuid::Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO customers (id, name, email, phone, active, created_at)
         VALUES (?1, ?2, ?3, ?4, 1, ?5)
         ON CONFLICT(email) DO UPDATE SET
            name = CASE WHEN customers.name = '' THEN excluded.name ELSE customers.name END,
            phone = CASE WHEN customers.phone = '' THEN excluded.phone ELSE customers.phone END",
        params![id, details.name, details.email, details.phone, format_ts(now)],
    )?;

    get_customer_by_email(conn, &details.email)?
        .ok_or_else(|| anyhow::anyhow!("customer vanished after upsert: {}", details.email))
}

pub fn get_customer(conn: &Connection, id: &str) -> anyhow::Result<Option<Customer>> {
    let sql = format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = ?1");
    let row = conn
        .query_row(&sql, params![id], |row| Ok(parse_customer_row(row)))
        .optional()?;
    row.transpose()
}

pub fn get_customer_by_email(conn: &Connection, email: &str) -> anyhow::Result<Option<Customer>> {
    let sql = format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE email = ?1");
    let row = conn
        .query_row(&sql, params![email], |row| Ok(parse_customer_row(row)))
        .optional()?;
    row.transpose()
}

pub fn list_customers(conn: &Connection, limit: i64) -> anyhow::Result<Vec<Customer>> {
    let sql = format!("SELECT {CUSTOMER_COLUMNS} FROM customers ORDER BY created_at DESC LIMIT ?1");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![limit], |row| Ok(parse_customer_row(row)))?;

    let mut customers = vec![];
    for row in rows {
        customers.push(row??);
    }
    Ok(customers)
}

pub fn set_customer_active(conn: &Connection, id: &str, active: bool) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE customers SET active = ?1 WHERE id = ?2",
        params![active, id],
    )?;
    Ok(count > 0)
}

fn parse_customer_row(row: &rusqlite::Row) -> anyhow::Result<Customer> {
    let created_at: String = row.get(5)?;
    Ok(Customer {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        phone: row.get(3)?,
        active: row.get(4)?,
        created_at: parse_ts(&created_at)?,
    })
}

// ── Services ──

const SERVICE_COLUMNS: &str =
    "id, name, description, price_cents, status, provider_price_id, archived, created_at";

pub fn create_service(conn: &Connection, service: &Service) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO services (id, name, description, price_cents, status, provider_price_id, archived, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            service.id,
            service.name,
            service.description,
            service.price_cents,
            service.status.as_str(),
            service.provider_price_id,
            service.archived,
            format_ts(&service.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_service(conn: &Connection, id: &str) -> anyhow::Result<Option<Service>> {
    let sql = format!("SELECT {SERVICE_COLUMNS} FROM services WHERE id = ?1");
    let row = conn
        .query_row(&sql, params![id], |row| Ok(parse_service_row(row)))
        .optional()?;
    row.transpose()
}

pub fn list_services(conn: &Connection, include_archived: bool) -> anyhow::Result<Vec<Service>> {
    let sql = if include_archived {
        format!("SELECT {SERVICE_COLUMNS} FROM services ORDER BY created_at DESC, name ASC")
    } else {
        format!(
            "SELECT {SERVICE_COLUMNS} FROM services WHERE archived = 0
             ORDER BY CASE status WHEN 'active' THEN 0 ELSE 1 END, name ASC"
        )
    };
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], |row| Ok(parse_service_row(row)))?;

    let mut services = vec![];
    for row in rows {
        services.push(row??);
    }
    Ok(services)
}

pub fn update_service(conn: &Connection, id: &str, input: &ServiceInput) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE services SET name = ?1, description = ?2, price_cents = ?3, status = ?4, provider_price_id = ?5
         WHERE id = ?6",
        params![
            input.name.trim(),
            input.description,
            input.price_cents,
            input.status.as_str(),
            input.provider_price_id,
            id,
        ],
    )?;
    Ok(count > 0)
}

pub fn archive_service(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    let count = conn.execute("UPDATE services SET archived = 1 WHERE id = ?1", params![id])?;
    Ok(count > 0)
}

/// Inserts the launch catalogue into an empty `services` table.
pub fn seed_default_services(conn: &Connection, now: &NaiveDateTime) -> anyhow::Result<usize> {
    let existing: i64 = conn.query_row("SELECT COUNT(*) FROM services", [], |row| row.get(0))?;
    if existing > 0 {
        return Ok(0);
    }

    let catalogue = [
        (
            "Premium Mobile Detail",
            "Complete interior and exterior detailing service. Includes wash, wax, interior cleaning, and tire shine.",
            7500,
            ServiceStatus::Active,
        ),
        (
            "Ceramic Coating Package",
            "Professional ceramic coating application for long-lasting protection.",
            29900,
            ServiceStatus::ComingSoon,
        ),
        (
            "Paint Correction Service",
            "Multi-stage paint correction to remove swirl marks and scratches.",
            45000,
            ServiceStatus::ComingSoon,
        ),
    ];

    for (name, description, price_cents, status) in catalogue {
        create_service(
            conn,
            &Service {
                id: uuid::Uuid::new_v4().to_string(),
                name: name.to_string(),
                description: Some(description.to_string()),
                price_cents,
                status,
                provider_price_id: None,
                archived: false,
                created_at: *now,
            },
        )?;
    }
    Ok(catalogue.len())
}

fn parse_service_row(row: &rusqlite::Row) -> anyhow::Result<Service> {
    let status_str: String = row.get(4)?;
    let created_at: String = row.get(7)?;
    Ok(Service {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        price_cents: row.get(3)?,
        status: ServiceStatus::parse(&status_str)
            .with_context(|| format!("unknown service status: {status_str}"))?,
        provider_price_id: row.get(5)?,
        archived: row.get(6)?,
        created_at: parse_ts(&created_at)?,
    })
}

// ── Bookings ──

const BOOKING_COLUMNS: &str =
    "id, customer_id, service_id, start_at, end_at, notes, status, created_at, updated_at";

pub fn insert_booking(conn: &Connection, booking: &Booking) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO bookings (id, customer_id, service_id, start_at, end_at, notes, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            booking.id,
            booking.customer_id,
            booking.service_id,
            format_ts(&booking.start_at),
            format_ts(&booking.end_at),
            booking.notes,
            booking.status.as_str(),
            format_ts(&booking.created_at),
            format_ts(&booking.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_booking_by_id(conn: &Connection, id: &str) -> anyhow::Result<Option<Booking>> {
    let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?1");
    let row = conn
        .query_row(&sql, params![id], |row| Ok(parse_booking_row(row)))
        .optional()?;
    row.transpose()
}

/// Id of the non-cancelled booking holding the slot starting at `start`.
pub fn find_live_booking_at(conn: &Connection, start: &NaiveDateTime) -> anyhow::Result<Option<String>> {
    let id = conn
        .query_row(
            "SELECT id FROM bookings WHERE start_at = ?1 AND status != 'cancelled' LIMIT 1",
            params![format_ts(start)],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

/// Id of a non-cancelled booking by `customer_id` whose start date lies within
/// `days` calendar days of `date`, both ends inclusive.
pub fn find_live_booking_in_window(
    conn: &Connection,
    customer_id: &str,
    date: &NaiveDate,
    days: i64,
) -> anyhow::Result<Option<String>> {
    let id = conn
        .query_row(
            "SELECT id FROM bookings
             WHERE customer_id = ?1
               AND status != 'cancelled'
               AND date(start_at) BETWEEN date(?2, ?3) AND date(?2, ?4)
             ORDER BY start_at ASC LIMIT 1",
            params![
                customer_id,
                date.format("%Y-%m-%d").to_string(),
                format!("-{days} days"),
                format!("+{days} days"),
            ],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

/// Start times of every non-cancelled booking on `date`.
pub fn live_slot_starts_on(conn: &Connection, date: &NaiveDate) -> anyhow::Result<Vec<NaiveDateTime>> {
    let mut stmt = conn.prepare(
        "SELECT start_at FROM bookings
         WHERE date(start_at) = ?1 AND status != 'cancelled' ORDER BY start_at ASC",
    )?;
    let rows = stmt.query_map(params![date.format("%Y-%m-%d").to_string()], |row| {
        row.get::<_, String>(0)
    })?;

    let mut starts = vec![];
    for row in rows {
        starts.push(parse_ts(&row?)?);
    }
    Ok(starts)
}

/// Moves a booking from `from` to `to`. Returns false when the booking is
/// missing or no longer in `from`, so concurrent transitions cannot both win.
pub fn transition_booking_status(
    conn: &Connection,
    id: &str,
    from: BookingStatus,
    to: BookingStatus,
    now: &NaiveDateTime,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
        params![to.as_str(), format_ts(now), id, from.as_str()],
    )?;
    Ok(count > 0)
}

pub fn update_booking_notes(
    conn: &Connection,
    id: &str,
    notes: Option<&str>,
    now: &NaiveDateTime,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET notes = ?1, updated_at = ?2 WHERE id = ?3",
        params![notes, format_ts(now), id],
    )?;
    Ok(count > 0)
}

pub fn get_all_bookings(
    conn: &Connection,
    status_filter: Option<BookingStatus>,
    limit: i64,
) -> anyhow::Result<Vec<Booking>> {
    let (sql, params_vec): (String, Vec<Box<dyn rusqlite::types::ToSql>>) = match status_filter {
        Some(status) => (
            format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE status = ?1 ORDER BY start_at DESC LIMIT ?2"),
            vec![
                Box::new(status.as_str()) as Box<dyn rusqlite::types::ToSql>,
                Box::new(limit),
            ],
        ),
        None => (
            format!("SELECT {BOOKING_COLUMNS} FROM bookings ORDER BY start_at DESC LIMIT ?1"),
            vec![Box::new(limit) as Box<dyn rusqlite::types::ToSql>],
        ),
    };

    let mut stmt = conn.prepare(&sql)?;
    let params_refs: Vec<&dyn rusqlite::types::ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
    let rows = stmt.query_map(params_refs.as_slice(), |row| Ok(parse_booking_row(row)))?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

/// Pending bookings whose hold has lapsed, oldest first: those whose checkout
/// session expired before `expired_before`, and those created before
/// `created_before` that never got a session.
pub fn get_stale_pending_bookings(
    conn: &Connection,
    created_before: &NaiveDateTime,
    expired_before: &NaiveDateTime,
) -> anyhow::Result<Vec<Booking>> {
    let sql = format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings
         WHERE status = 'pending_payment'
           AND CASE
                 WHEN EXISTS (SELECT 1 FROM payments p WHERE p.booking_id = bookings.id)
                 THEN id IN (SELECT booking_id FROM payments WHERE expires_at < ?2)
                 ELSE created_at < ?1
               END
         ORDER BY created_at ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![format_ts(created_before), format_ts(expired_before)], |row| {
        Ok(parse_booking_row(row))
    })?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

pub struct DashboardStats {
    pub total_bookings: i64,
    pub pending_bookings: i64,
    pub confirmed_bookings: i64,
    pub cancelled_bookings: i64,
    pub upcoming_confirmed: i64,
    pub revenue_cents: i64,
}

pub fn get_dashboard_stats(conn: &Connection, now: &NaiveDateTime) -> anyhow::Result<DashboardStats> {
    let (total_bookings, pending_bookings, confirmed_bookings, cancelled_bookings): (i64, i64, i64, i64) = conn.query_row(
        "SELECT COUNT(*),
                COALESCE(SUM(status = 'pending_payment'), 0),
                COALESCE(SUM(status = 'confirmed'), 0),
                COALESCE(SUM(status = 'cancelled'), 0)
         FROM bookings",
        [],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
    )?;

    let upcoming_confirmed: i64 = conn.query_row(
        "SELECT COUNT(*) FROM bookings WHERE start_at > ?1 AND status = 'confirmed'",
        params![format_ts(now)],
        |row| row.get(0),
    )?;

    let revenue_cents: i64 = conn.query_row(
        "SELECT COALESCE(SUM(s.price_cents), 0)
         FROM bookings b JOIN services s ON s.id = b.service_id
         WHERE b.status = 'confirmed'",
        [],
        |row| row.get(0),
    )?;

    Ok(DashboardStats {
        total_bookings,
        pending_bookings,
        confirmed_bookings,
        cancelled_bookings,
        upcoming_confirmed,
        revenue_cents,
    })
}

fn parse_booking_row(row: &rusqlite::Row) -> anyhow::Result<Booking> {
    let start_at: String = row.get(3)?;
    let end_at: String = row.get(4)?;
    let status_str: String = row.get(6)?;
    let created_at: String = row.get(7)?;
    let updated_at: String = row.get(8)?;

    Ok(Booking {
        id: row.get(0)?,
        customer_id: row.get(1)?,
        service_id: row.get(2)?,
        start_at: parse_ts(&start_at)?,
        end_at: parse_ts(&end_at)?,
        notes: row.get(5)?,
        status: BookingStatus::parse(&status_str)
            .with_context(|| format!("unknown booking status: {status_str}"))?,
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
    })
}

// ── Payments ──

const PAYMENT_COLUMNS: &str =
    "booking_id, checkout_session_id, payment_intent_id, amount_cents, currency, status, expires_at, created_at, updated_at";

/// Records the checkout session for a booking, replacing the reference from
/// an earlier attempt.
pub fn upsert_payment(conn: &Connection, payment: &PaymentReference) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO payments (booking_id, checkout_session_id, payment_intent_id, amount_cents, currency, status, expires_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT(booking_id) DO UPDATE SET
            checkout_session_id = excluded.checkout_session_id,
            payment_intent_id = excluded.payment_intent_id,
            amount_cents = excluded.amount_cents,
            currency = excluded.currency,
            status = excluded.status,
            expires_at = excluded.expires_at,
            updated_at = excluded.updated_at",
        params![
            payment.booking_id,
            payment.checkout_session_id,
            payment.payment_intent_id,
            payment.amount_cents,
            payment.currency,
            payment.status.as_str(),
            format_ts(&payment.expires_at),
            format_ts(&payment.created_at),
            format_ts(&payment.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_payment_for_booking(conn: &Connection, booking_id: &str) -> anyhow::Result<Option<PaymentReference>> {
    let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE booking_id = ?1");
    let row = conn
        .query_row(&sql, params![booking_id], |row| Ok(parse_payment_row(row)))
        .optional()?;
    row.transpose()
}

pub fn get_payment_by_session(conn: &Connection, session_id: &str) -> anyhow::Result<Option<PaymentReference>> {
    let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE checkout_session_id = ?1");
    let row = conn
        .query_row(&sql, params![session_id], |row| Ok(parse_payment_row(row)))
        .optional()?;
    row.transpose()
}

pub fn update_payment_status(
    conn: &Connection,
    booking_id: &str,
    status: PaymentStatus,
    payment_intent_id: Option<&str>,
    now: &NaiveDateTime,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE payments SET status = ?1, payment_intent_id = COALESCE(?2, payment_intent_id), updated_at = ?3
         WHERE booking_id = ?4",
        params![status.as_str(), payment_intent_id, format_ts(now), booking_id],
    )?;
    Ok(count > 0)
}

fn parse_payment_row(row: &rusqlite::Row) -> anyhow::Result<PaymentReference> {
    let status_str: String = row.get(5)?;
    let expires_at: String = row.get(6)?;
    let created_at: String = row.get(7)?;
    let updated_at: String = row.get(8)?;
    Ok(PaymentReference {
        booking_id: row.get(0)?,
        checkout_session_id: row.get(1)?,
        payment_intent_id: row.get(2)?,
        amount_cents: row.get(3)?,
        currency: row.get(4)?,
        status: PaymentStatus::parse(&status_str)
            .with_context(|| format!("unknown payment status: {status_str}"))?,
        expires_at: parse_ts(&expires_at)?,
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
    })
}

// ── Contact Messages ──

pub fn insert_contact_message(
    conn: &Connection,
    form: &ContactForm,
    email_sent: bool,
    now: &NaiveDateTime,
) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO contact_messages (name, email, phone, message, email_sent, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            form.name.trim(),
            form.email.trim(),
            form.phone.trim(),
            form.message.trim(),
            email_sent,
            format_ts(now),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn list_contact_messages(conn: &Connection, limit: i64) -> anyhow::Result<Vec<ContactMessage>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, email, phone, message, email_sent, created_at
         FROM contact_messages ORDER BY created_at DESC, id DESC LIMIT ?1",
    )?;
    let rows = stmt.query_map(params![limit], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, bool>(5)?,
            row.get::<_, String>(6)?,
        ))
    })?;

    let mut messages = vec![];
    for row in rows {
        let (id, name, email, phone, message, email_sent, created_at) = row?;
        messages.push(ContactMessage {
            id,
            name,
            email,
            phone,
            message,
            email_sent,
            created_at: parse_ts(&created_at)?,
        });
    }
    Ok(messages)
}
