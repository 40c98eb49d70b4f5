pub mod stripe;

use async_trait::async_trait;
use chrono::{Duration, NaiveDateTime};

use crate::db::queries;
use crate::errors::BookingError;
use crate::models::{PaymentReference, PaymentStatus};
use crate::state::AppState;

/// Bounds the provider accepts for a session's `expires_at`.
const MIN_CHECKOUT_MINUTES: i64 = 30;
const MAX_CHECKOUT_MINUTES: i64 = 24 * 60;

/// What the provider needs to host a one-off checkout for a booking.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub booking_id: String,
    pub customer_email: String,
    pub item_name: String,
    pub item_description: Option<String>,
    pub amount_cents: i64,
    pub currency: String,
    pub provider_price_id: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
    /// Unix timestamp after which the session can no longer be paid.
    pub expires_at: i64,
}

#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_checkout_session(&self, request: &CheckoutRequest) -> anyhow::Result<CheckoutSession>;
}

/// How long a checkout session stays payable: the pending timeout, kept
/// within the range the provider accepts.
pub fn checkout_ttl(pending_timeout_minutes: i64) -> Duration {
    Duration::minutes(pending_timeout_minutes.clamp(MIN_CHECKOUT_MINUTES, MAX_CHECKOUT_MINUTES))
}

/// Starts a hosted checkout for a pending booking and records the session as
/// its pending payment reference. Returns the redirect URL.
///
/// On provider failure the booking stays `pending_payment` so it can be
/// retried or swept.
pub async fn initiate_checkout(
    state: &AppState,
    booking_id: &str,
    now: NaiveDateTime,
) -> Result<String, BookingError> {
    let request = {
        let conn = state.conn();
        let booking = queries::get_booking_by_id(&conn, booking_id)?.ok_or(BookingError::NotFound)?;
        if booking.status.is_terminal() {
            return Err(BookingError::InvalidTransition {
                from: booking.status.to_string(),
                to: "checkout".to_string(),
            });
        }
        let service = queries::get_service(&conn, &booking.service_id)?
            .ok_or_else(|| anyhow::anyhow!("booking {booking_id} references missing service"))?;
        let customer = queries::get_customer(&conn, &booking.customer_id)?
            .ok_or_else(|| anyhow::anyhow!("booking {booking_id} references missing customer"))?;

        let ttl = checkout_ttl(state.config.pending_timeout_minutes);
        let base = &state.config.public_base_url;
        CheckoutRequest {
            booking_id: booking.id.clone(),
            customer_email: customer.email,
            item_name: service.name,
            item_description: service.description,
            amount_cents: service.price_cents,
            currency: state.config.currency.clone(),
            provider_price_id: service.provider_price_id,
            success_url: format!("{base}/booking/success?booking_id={}", booking.id),
            cancel_url: format!("{base}/booking/cancel?booking_id={}", booking.id),
            expires_at: chrono::Utc::now().timestamp() + ttl.num_seconds(),
        }
    };

    let session = match state.payments.create_checkout_session(&request).await {
        Ok(session) => session,
        Err(e) => {
            tracing::error!(booking_id = %booking_id, error = %e, "checkout session creation failed");
            return Err(BookingError::PaymentInitiationFailed {
                booking_id: booking_id.to_string(),
            });
        }
    };

    {
        let conn = state.conn();
        queries::upsert_payment(
            &conn,
            &PaymentReference {
                booking_id: request.booking_id.clone(),
                checkout_session_id: session.id.clone(),
                payment_intent_id: None,
                amount_cents: request.amount_cents,
                currency: request.currency.clone(),
                status: PaymentStatus::Pending,
                expires_at: now + checkout_ttl(state.config.pending_timeout_minutes),
                created_at: now,
                updated_at: now,
            },
        )?;
    }

    tracing::info!(booking_id = %booking_id, session_id = %session.id, "checkout session created");
    Ok(session.url)
}
