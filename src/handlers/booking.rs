use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::{AppError, BookingError};
use crate::models::service::format_price;
use crate::models::{BookingStatus, ContactDetails, SlotAvailability};
use crate::services::booking::{self as booking_service, BookingRequest, Transition};
use crate::services::payments;
use crate::services::scheduling::{self, BookingRules};
use crate::state::AppState;

use super::{now, parse_start};

// GET /api/services
#[derive(Serialize)]
pub struct ServiceResponse {
    id: String,
    name: String,
    description: Option<String>,
    price: String,
    price_cents: i64,
    status: String,
    bookable: bool,
}

pub async fn list_services(State(state): State<Arc<AppState>>) -> Result<Json<Vec<ServiceResponse>>, AppError> {
    let services = {
        let conn = state.conn();
        queries::list_services(&conn, false)?
    };

    Ok(Json(
        services
            .into_iter()
            .map(|s| ServiceResponse {
                bookable: s.is_bookable(),
                price: format_price(s.price_cents),
                price_cents: s.price_cents,
                status: s.status.as_str().to_string(),
                id: s.id,
                name: s.name,
                description: s.description,
            })
            .collect(),
    ))
}

// GET /api/availability?date=YYYY-MM-DD
#[derive(Deserialize)]
pub struct AvailabilityQuery {
    pub date: String,
}

#[derive(Serialize)]
pub struct AvailabilityResponse {
    date: String,
    hours: String,
    slots: Vec<SlotAvailability>,
}

pub async fn availability(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<AvailabilityResponse>, AppError> {
    let date = NaiveDate::parse_from_str(query.date.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::BadRequest("date must be YYYY-MM-DD".to_string()))?;

    let rules = BookingRules::from_config(&state.config);
    let slots = {
        let conn = state.conn();
        scheduling::list_open_slots(&conn, &rules, date, &now())?
    };

    Ok(Json(AvailabilityResponse {
        date: date.format("%Y-%m-%d").to_string(),
        hours: rules.grid.to_human_readable(),
        slots,
    }))
}

// POST /api/bookings
#[derive(Deserialize)]
pub struct CreateBookingBody {
    pub service_id: String,
    pub start: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub notes: Option<String>,
}

impl CreateBookingBody {
    pub(crate) fn into_request(self) -> Result<BookingRequest, AppError> {
        let start = parse_start(&self.start)
            .ok_or_else(|| AppError::BadRequest("start must be YYYY-MM-DDTHH:MM".to_string()))?;
        Ok(BookingRequest {
            service_id: self.service_id,
            start,
            contact: ContactDetails {
                name: self.name,
                email: self.email,
                phone: self.phone,
            },
            notes: self.notes,
        })
    }
}

#[derive(Serialize)]
pub struct CheckoutResponse {
    booking_id: String,
    checkout_url: String,
}

pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateBookingBody>,
) -> Result<(StatusCode, Json<CheckoutResponse>), AppError> {
    let request = body.into_request()?;

    let started = booking_service::create_booking(&state, &request, now()).await?;

    Ok((
        StatusCode::CREATED,
        Json(CheckoutResponse {
            booking_id: started.booking_id,
            checkout_url: started.checkout_url,
        }),
    ))
}

// GET /api/bookings/:id
#[derive(Serialize)]
pub struct PublicBookingResponse {
    id: String,
    service_name: String,
    start: String,
    end: String,
    status: BookingStatus,
}

pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<PublicBookingResponse>, AppError> {
    let conn = state.conn();
    let booking = queries::get_booking_by_id(&conn, &id)?.ok_or(BookingError::NotFound)?;
    let service_name = queries::get_service(&conn, &booking.service_id)?
        .map(|s| s.name)
        .unwrap_or_default();

    Ok(Json(PublicBookingResponse {
        id: booking.id,
        service_name,
        start: booking.start_at.format("%Y-%m-%dT%H:%M").to_string(),
        end: booking.end_at.format("%Y-%m-%dT%H:%M").to_string(),
        status: booking.status,
    }))
}

// POST /api/bookings/:id/checkout
pub async fn retry_checkout(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<CheckoutResponse>, AppError> {
    let checkout_url = payments::initiate_checkout(&state, &id, now()).await?;
    Ok(Json(CheckoutResponse {
        booking_id: id,
        checkout_url,
    }))
}

// GET /booking/success, GET /booking/cancel
#[derive(Deserialize)]
pub struct ReturnQuery {
    pub booking_id: String,
}

#[derive(Serialize)]
pub struct ReturnResponse {
    booking_id: String,
    status: BookingStatus,
    message: &'static str,
}

/// Landing page after checkout. Confirmation only ever comes from the
/// provider callback, so this just reports where the booking stands.
pub async fn checkout_success(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ReturnQuery>,
) -> Result<Json<ReturnResponse>, AppError> {
    let booking = {
        let conn = state.conn();
        queries::get_booking_by_id(&conn, &query.booking_id)?.ok_or(BookingError::NotFound)?
    };

    let message = match booking.status {
        BookingStatus::Confirmed => "Your booking is confirmed. A confirmation email is on its way.",
        BookingStatus::PendingPayment => "We are waiting for your payment to be confirmed.",
        BookingStatus::Cancelled => "This booking was cancelled.",
    };

    Ok(Json(ReturnResponse {
        booking_id: booking.id,
        status: booking.status,
        message,
    }))
}

pub async fn checkout_cancel(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ReturnQuery>,
) -> Result<Json<ReturnResponse>, AppError> {
    let transition = {
        let mut conn = state.conn();
        booking_service::cancel_pending_booking(&mut conn, &query.booking_id, &now())?
    };

    if transition == Transition::Applied {
        tracing::info!(booking_id = %query.booking_id, "checkout abandoned, booking cancelled");
    }

    Ok(Json(ReturnResponse {
        booking_id: query.booking_id,
        status: BookingStatus::Cancelled,
        message: "Your booking was cancelled and the time slot released.",
    }))
}
