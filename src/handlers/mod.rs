pub mod admin;
pub mod booking;
pub mod contact;
pub mod health;
pub mod webhook;

use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;
use chrono::NaiveDateTime;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/services", get(booking::list_services))
        .route("/api/availability", get(booking::availability))
        .route("/api/bookings", post(booking::create_booking))
        .route("/api/bookings/:id", get(booking::get_booking))
        .route("/api/bookings/:id/checkout", post(booking::retry_checkout))
        .route("/booking/success", get(booking::checkout_success))
        .route("/booking/cancel", get(booking::checkout_cancel))
        .route("/api/contact", post(contact::submit_contact))
        .route("/webhook/payments", post(webhook::payment_webhook))
        .route("/api/admin/status", get(admin::get_status))
        .route(
            "/api/admin/services",
            get(admin::get_services).post(admin::create_service),
        )
        .route("/api/admin/services/:id", put(admin::update_service))
        .route(
            "/api/admin/services/:id/deactivate",
            post(admin::deactivate_service),
        )
        .route(
            "/api/admin/bookings",
            get(admin::get_bookings).post(admin::create_booking),
        )
        .route(
            "/api/admin/bookings/:id",
            get(admin::get_booking).put(admin::update_booking),
        )
        .route("/api/admin/bookings/:id/cancel", post(admin::cancel_booking))
        .route("/api/admin/customers", get(admin::get_customers))
        .route(
            "/api/admin/customers/:id/deactivate",
            post(admin::deactivate_customer),
        )
        .route("/api/admin/contacts", get(admin::get_contacts))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Wall-clock time in the server's zone, the same zone slot times are
/// expressed in.
pub(crate) fn now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

/// Accepts `YYYY-MM-DDTHH:MM`, with or without seconds.
pub(crate) fn parse_start(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_start_formats() {
        let expected = NaiveDateTime::parse_from_str("2025-06-16 09:00", "%Y-%m-%d %H:%M").unwrap();
        assert_eq!(parse_start("2025-06-16T09:00"), Some(expected));
        assert_eq!(parse_start(" 2025-06-16T09:00:00 "), Some(expected));
        assert_eq!(parse_start("2025-06-16 09:00"), None);
        assert_eq!(parse_start("tomorrow"), None);
    }

    #[test]
    fn test_now_is_local_wall_clock() {
        let drift = now() - chrono::Local::now().naive_local();
        assert!(drift.num_seconds().abs() <= 1);
    }
}
