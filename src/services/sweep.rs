use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use rusqlite::Connection;

use crate::db::queries;
use crate::errors::BookingError;
use crate::services::booking::{self, Transition};
use crate::state::AppState;

/// Leaves room for a completion webhook from a session that closed just now.
const EXPIRY_GRACE_MINUTES: i64 = 2;

/// Periodically cancels bookings whose checkout was abandoned, releasing
/// their slots. Runs until the process exits.
pub async fn run_pending_sweep(state: Arc<AppState>) {
    let timeout = chrono::Duration::minutes(state.config.pending_timeout_minutes);
    let mut interval = tokio::time::interval(Duration::from_secs(state.config.sweep_interval_secs.max(1)));

    tracing::info!(
        timeout_minutes = state.config.pending_timeout_minutes,
        interval_secs = state.config.sweep_interval_secs,
        "pending booking sweep started"
    );

    loop {
        interval.tick().await;
        let now = chrono::Local::now().naive_local();
        let result = {
            let mut conn = state.conn();
            sweep_stale_pending(&mut conn, &(now - timeout), &now)
        };
        match result {
            Ok(0) => {}
            Ok(n) => tracing::info!(cancelled = n, "swept stale pending bookings"),
            Err(e) => tracing::error!(error = %e, "pending booking sweep failed"),
        }
    }
}

/// Cancels every `pending_payment` booking whose checkout session has expired,
/// plus those created before `cutoff` that never got a session. Returns how
/// many were cancelled by this call.
pub fn sweep_stale_pending(
    conn: &mut Connection,
    cutoff: &NaiveDateTime,
    now: &NaiveDateTime,
) -> anyhow::Result<usize> {
    let expired_before = *now - chrono::Duration::minutes(EXPIRY_GRACE_MINUTES);
    let stale = queries::get_stale_pending_bookings(conn, cutoff, &expired_before)?;

    let mut cancelled = 0;
    for b in stale {
        match booking::cancel_pending_booking(conn, &b.id, now) {
            Ok(Transition::Applied) => {
                tracing::info!(booking_id = %b.id, created_at = %b.created_at, "cancelled unpaid booking");
                cancelled += 1;
            }
            Ok(Transition::Unchanged) => {}
            // Confirmed between the scan and the cancel.
            Err(BookingError::InvalidTransition { .. }) => {}
            Err(e) => return Err(anyhow::anyhow!(e)),
        }
    }
    Ok(cancelled)
}
