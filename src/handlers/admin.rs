use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::{AppError, BookingError};
use crate::models::service::format_price;
use crate::models::{Booking, BookingStatus, ContactMessage, Customer, PaymentReference, Service, ServiceInput};
use crate::services::booking::{self as booking_service, Transition};
use crate::state::AppState;

use super::booking::CreateBookingBody;
use super::now;

const DEFAULT_LIMIT: i64 = 50;
const MAX_NOTES_LEN: usize = 500;

fn check_auth(headers: &HeaderMap, expected_token: &str) -> Result<(), AppError> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth.strip_prefix("Bearer ").unwrap_or("");
    // An unset secret locks the admin API rather than opening it.
    if expected_token.is_empty() || token != expected_token {
        return Err(AppError::Unauthorized);
    }
    Ok(())
}

#[derive(Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

// ── Dashboard ──

// GET /api/admin/status
#[derive(Serialize)]
pub struct StatusResponse {
    total_bookings: i64,
    pending_bookings: i64,
    confirmed_bookings: i64,
    cancelled_bookings: i64,
    upcoming_confirmed: i64,
    revenue_cents: i64,
    revenue: String,
}

pub async fn get_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<StatusResponse>, AppError> {
    check_auth(&headers, &state.config.session_secret)?;

    let stats = {
        let conn = state.conn();
        queries::get_dashboard_stats(&conn, &now())?
    };

    Ok(Json(StatusResponse {
        total_bookings: stats.total_bookings,
        pending_bookings: stats.pending_bookings,
        confirmed_bookings: stats.confirmed_bookings,
        cancelled_bookings: stats.cancelled_bookings,
        upcoming_confirmed: stats.upcoming_confirmed,
        revenue_cents: stats.revenue_cents,
        revenue: format_price(stats.revenue_cents),
    }))
}

// ── Services ──

// GET /api/admin/services
pub async fn get_services(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Service>>, AppError> {
    check_auth(&headers, &state.config.session_secret)?;

    let conn = state.conn();
    Ok(Json(queries::list_services(&conn, true)?))
}

// POST /api/admin/services
pub async fn create_service(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(input): Json<ServiceInput>,
) -> Result<(StatusCode, Json<Service>), AppError> {
    check_auth(&headers, &state.config.session_secret)?;
    input.validate().map_err(AppError::BadRequest)?;

    let service = Service {
        id: uuid::Uuid::new_v4().to_string(),
        name: input.name.trim().to_string(),
        description: input.description.clone(),
        price_cents: input.price_cents,
        status: input.status,
        provider_price_id: input.provider_price_id.clone(),
        archived: false,
        created_at: now(),
    };
    {
        let conn = state.conn();
        queries::create_service(&conn, &service)?;
    }

    tracing::info!(service_id = %service.id, name = %service.name, "service created");
    Ok((StatusCode::CREATED, Json(service)))
}

// PUT /api/admin/services/:id
pub async fn update_service(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(input): Json<ServiceInput>,
) -> Result<Json<Service>, AppError> {
    check_auth(&headers, &state.config.session_secret)?;
    input.validate().map_err(AppError::BadRequest)?;

    let conn = state.conn();
    if !queries::update_service(&conn, &id, &input)? {
        return Err(AppError::NotFound(format!("service {id}")));
    }
    let service = queries::get_service(&conn, &id)?.ok_or_else(|| AppError::NotFound(format!("service {id}")))?;

    tracing::info!(service_id = %id, "service updated");
    Ok(Json(service))
}

// POST /api/admin/services/:id/deactivate
pub async fn deactivate_service(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_auth(&headers, &state.config.session_secret)?;

    let archived = {
        let conn = state.conn();
        queries::archive_service(&conn, &id)?
    };
    if !archived {
        return Err(AppError::NotFound(format!("service {id}")));
    }

    tracing::info!(service_id = %id, "service archived");
    Ok(Json(serde_json::json!({"id": id, "archived": true})))
}

// ── Bookings ──

#[derive(Deserialize)]
pub struct BookingsQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Serialize)]
pub struct BookingResponse {
    #[serde(flatten)]
    booking: Booking,
    holds_slot: bool,
    service_name: Option<String>,
    customer_name: Option<String>,
    customer_email: Option<String>,
    customer_phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    payment: Option<PaymentReference>,
}

fn booking_response(conn: &Connection, booking: Booking, with_payment: bool) -> Result<BookingResponse, AppError> {
    let service = queries::get_service(conn, &booking.service_id)?;
    let customer = queries::get_customer(conn, &booking.customer_id)?;
    let payment = if with_payment {
        queries::get_payment_for_booking(conn, &booking.id)?
    } else {
        None
    };

    Ok(BookingResponse {
        holds_slot: booking.is_live(),
        service_name: service.map(|s| s.name),
        customer_name: customer.as_ref().map(|c| c.name.clone()),
        customer_email: customer.as_ref().map(|c| c.email.clone()),
        customer_phone: customer.map(|c| c.phone),
        payment,
        booking,
    })
}

// GET /api/admin/bookings
pub async fn get_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<BookingsQuery>,
) -> Result<Json<Vec<BookingResponse>>, AppError> {
    check_auth(&headers, &state.config.session_secret)?;

    let status_filter = match query.status.as_deref().filter(|s| !s.is_empty()) {
        Some(s) => Some(BookingStatus::parse(s).ok_or_else(|| AppError::BadRequest(format!("unknown status: {s}")))?),
        None => None,
    };
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);

    let conn = state.conn();
    let bookings = queries::get_all_bookings(&conn, status_filter, limit)?;
    let response = bookings
        .into_iter()
        .map(|b| booking_response(&conn, b, false))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(response))
}

// GET /api/admin/bookings/:id
pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<BookingResponse>, AppError> {
    check_auth(&headers, &state.config.session_secret)?;

    let conn = state.conn();
    let booking = queries::get_booking_by_id(&conn, &id)?.ok_or(BookingError::NotFound)?;
    Ok(Json(booking_response(&conn, booking, true)?))
}

// POST /api/admin/bookings
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateBookingBody>,
) -> Result<(StatusCode, Json<Booking>), AppError> {
    check_auth(&headers, &state.config.session_secret)?;

    let request = body.into_request()?;
    let booking = booking_service::create_manual_booking(&state, &request, now()).await?;

    Ok((StatusCode::CREATED, Json(booking)))
}

// PUT /api/admin/bookings/:id
#[derive(Deserialize)]
pub struct UpdateBookingBody {
    pub notes: Option<String>,
}

pub async fn update_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<UpdateBookingBody>,
) -> Result<Json<Booking>, AppError> {
    check_auth(&headers, &state.config.session_secret)?;

    let notes = body.notes.as_deref().map(str::trim).filter(|n| !n.is_empty());
    if notes.map(|n| n.chars().count()).unwrap_or(0) > MAX_NOTES_LEN {
        return Err(AppError::BadRequest(format!(
            "notes must be at most {MAX_NOTES_LEN} characters"
        )));
    }

    let conn = state.conn();
    if !queries::update_booking_notes(&conn, &id, notes, &now())? {
        return Err(BookingError::NotFound.into());
    }
    let booking = queries::get_booking_by_id(&conn, &id)?.ok_or(BookingError::NotFound)?;
    Ok(Json(booking))
}

// POST /api/admin/bookings/:id/cancel
pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_auth(&headers, &state.config.session_secret)?;

    let transition = {
        let mut conn = state.conn();
        booking_service::cancel_pending_booking(&mut conn, &id, &now())?
    };

    if transition == Transition::Applied {
        tracing::info!(booking_id = %id, "booking cancelled by admin");
    }
    Ok(Json(serde_json::json!({"cancelled": true, "id": id})))
}

// ── Customers ──

// GET /api/admin/customers
pub async fn get_customers(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<Customer>>, AppError> {
    check_auth(&headers, &state.config.session_secret)?;

    let conn = state.conn();
    Ok(Json(queries::list_customers(&conn, query.limit.unwrap_or(DEFAULT_LIMIT))?))
}

// POST /api/admin/customers/:id/deactivate
pub async fn deactivate_customer(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_auth(&headers, &state.config.session_secret)?;

    let updated = {
        let conn = state.conn();
        queries::set_customer_active(&conn, &id, false)?
    };
    if !updated {
        return Err(AppError::NotFound(format!("customer {id}")));
    }

    tracing::info!(customer_id = %id, "customer deactivated");
    Ok(Json(serde_json::json!({"id": id, "active": false})))
}

// ── Contact Messages ──

// GET /api/admin/contacts
pub async fn get_contacts(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<ContactMessage>>, AppError> {
    check_auth(&headers, &state.config.session_secret)?;

    let conn = state.conn();
    Ok(Json(queries::list_contact_messages(&conn, query.limit.unwrap_or(DEFAULT_LIMIT))?))
}
