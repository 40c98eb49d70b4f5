use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Reasons a booking request or booking transition is refused.
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("that time slot is already booked")]
    SlotConflict { existing_booking_id: String },

    #[error("you can only book one service per 7-day period")]
    WeeklyLimitExceeded { existing_booking_id: String },

    #[error("another booking was made at the same time, please try again")]
    TransactionConflict,

    #[error("payment processing is currently unavailable, please try again later")]
    PaymentInitiationFailed { booking_id: String },

    #[error("requested time is not a bookable slot ({0})")]
    InvalidSlot(String),

    #[error("bookings must be made at least {min_lead_hours} hours in advance")]
    TooSoon { min_lead_hours: i64 },

    #[error("service is not available for booking")]
    ServiceUnavailable,

    #[error("customer account is deactivated")]
    CustomerInactive,

    #[error("booking is {from} and cannot become {to}")]
    InvalidTransition { from: String, to: String },

    #[error("booking not found")]
    NotFound,

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for BookingError {
    fn from(e: rusqlite::Error) -> Self {
        BookingError::Storage(e.into())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Booking(#[from] BookingError),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("invalid request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("invalid signature")]
    InvalidSignature,
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Booking(e) => match e {
                BookingError::SlotConflict { .. }
                | BookingError::WeeklyLimitExceeded { .. }
                | BookingError::TransactionConflict
                | BookingError::InvalidTransition { .. } => StatusCode::CONFLICT,
                BookingError::InvalidSlot(_)
                | BookingError::TooSoon { .. }
                | BookingError::ServiceUnavailable
                | BookingError::CustomerInactive
                | BookingError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                BookingError::PaymentInitiationFailed { .. } => StatusCode::BAD_GATEWAY,
                BookingError::NotFound => StatusCode::NOT_FOUND,
                BookingError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::InvalidSignature => StatusCode::BAD_REQUEST,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::Booking(e) => match e {
                BookingError::SlotConflict { .. } => "slot_conflict",
                BookingError::WeeklyLimitExceeded { .. } => "weekly_limit_exceeded",
                BookingError::TransactionConflict => "transaction_conflict",
                BookingError::PaymentInitiationFailed { .. } => "payment_initiation_failed",
                BookingError::InvalidSlot(_) => "invalid_slot",
                BookingError::TooSoon { .. } => "too_soon",
                BookingError::ServiceUnavailable => "service_unavailable",
                BookingError::CustomerInactive => "customer_inactive",
                BookingError::InvalidTransition { .. } => "invalid_transition",
                BookingError::NotFound => "not_found",
                BookingError::Validation(_) => "validation",
                BookingError::Storage(_) => "internal",
            },
            AppError::Database(_) | AppError::Internal(_) => "internal",
            AppError::BadRequest(_) => "bad_request",
            AppError::NotFound(_) => "not_found",
            AppError::Unauthorized => "unauthorized",
            AppError::InvalidSignature => "invalid_signature",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        // Internal details stay in the log.
        let message = match status {
            StatusCode::INTERNAL_SERVER_ERROR => "internal error".to_string(),
            _ => self.to_string(),
        };

        let mut body = serde_json::json!({ "error": message, "code": self.code() });
        if let AppError::Booking(BookingError::PaymentInitiationFailed { booking_id }) = &self {
            body["booking_id"] = serde_json::json!(booking_id);
        }
        (status, axum::Json(body)).into_response()
    }
}
