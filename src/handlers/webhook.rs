use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;

use crate::db::queries;
use crate::errors::{AppError, BookingError};
use crate::services::booking::{self as booking_service, Transition};
use crate::services::payments::stripe::{self, PaymentEvent};
use crate::state::AppState;

use super::now;

/// Payment provider callback. Unknown bookings and events that arrive after
/// the booking already settled are acknowledged so the provider stops
/// retrying; they are logged for follow-up.
pub async fn payment_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, AppError> {
    // Skip verification when no webhook secret is configured (dev mode)
    if !state.config.stripe_webhook_secret.is_empty() {
        let signature = headers
            .get("stripe-signature")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        if signature.is_empty() {
            tracing::warn!("missing Stripe-Signature header");
            return Err(AppError::InvalidSignature);
        }

        let now_ts = chrono::Utc::now().timestamp();
        if let Err(e) = stripe::verify_signature(&state.config.stripe_webhook_secret, &body, signature, now_ts) {
            tracing::warn!(error = %e, "rejected payment webhook");
            return Err(AppError::InvalidSignature);
        }
    }

    let event = stripe::parse_event(&body).map_err(|e| AppError::BadRequest(e.to_string()))?;

    let handled = match event {
        PaymentEvent::Succeeded {
            session_id,
            booking_id,
            payment_intent_id,
        } => {
            let Some(booking_id) = resolve_booking(&state, &session_id, booking_id)? else {
                return Ok(acknowledge(false));
            };
            match booking_service::finalize_paid_booking(&state, &booking_id, payment_intent_id.as_deref(), now())
                .await
            {
                Ok(_) => true,
                Err(BookingError::InvalidTransition { from, .. }) => {
                    tracing::error!(
                        booking_id = %booking_id,
                        session_id = %session_id,
                        status = %from,
                        "payment received for a booking that can no longer be confirmed, refund required"
                    );
                    false
                }
                Err(e) => return Err(e.into()),
            }
        }
        PaymentEvent::Failed { session_id, booking_id } => {
            let Some(booking_id) = resolve_booking(&state, &session_id, booking_id)? else {
                return Ok(acknowledge(false));
            };
            // A retry replaced this session; the booking's current one may still be paid.
            if is_superseded(&state, &booking_id, &session_id)? {
                tracing::warn!(booking_id = %booking_id, session_id = %session_id, "ignoring failure of superseded checkout session");
                return Ok(acknowledge(false));
            }
            let result = {
                let mut conn = state.conn();
                booking_service::cancel_pending_booking(&mut conn, &booking_id, &now())
            };
            match result {
                Ok(Transition::Applied) => {
                    tracing::info!(booking_id = %booking_id, "payment failed, booking cancelled");
                    true
                }
                Ok(Transition::Unchanged) => true,
                Err(BookingError::InvalidTransition { from, .. }) => {
                    tracing::warn!(booking_id = %booking_id, status = %from, "ignoring payment failure for settled booking");
                    false
                }
                Err(e) => return Err(e.into()),
            }
        }
        PaymentEvent::Ignored { kind } => {
            tracing::debug!(kind = %kind, "ignoring payment event");
            false
        }
    };

    Ok(acknowledge(handled))
}

/// Finds the booking behind a checkout session, preferring our own payment
/// record over the id echoed back in event metadata.
fn resolve_booking(
    state: &AppState,
    session_id: &str,
    event_booking_id: Option<String>,
) -> Result<Option<String>, AppError> {
    let conn = state.conn();
    if let Some(payment) = queries::get_payment_by_session(&conn, session_id)? {
        return Ok(Some(payment.booking_id));
    }

    let Some(booking_id) = event_booking_id else {
        tracing::warn!(session_id = %session_id, "payment event for unknown checkout session");
        return Ok(None);
    };
    if queries::get_booking_by_id(&conn, &booking_id)?.is_none() {
        tracing::warn!(session_id = %session_id, booking_id = %booking_id, "payment event for unknown booking");
        return Ok(None);
    }
    Ok(Some(booking_id))
}

/// True when the booking's payment record points at a different session.
fn is_superseded(state: &AppState, booking_id: &str, session_id: &str) -> Result<bool, AppError> {
    let conn = state.conn();
    let current = queries::get_payment_for_booking(&conn, booking_id)?;
    Ok(current.is_some_and(|p| p.checkout_session_id != session_id))
}

fn acknowledge(handled: bool) -> Json<serde_json::Value> {
    Json(serde_json::json!({"received": true, "handled": handled}))
}
