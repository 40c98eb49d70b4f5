use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: String,
    pub customer_id: String,
    pub service_id: String,
    pub start_at: NaiveDateTime,
    pub end_at: NaiveDateTime,
    pub notes: Option<String>,
    pub status: BookingStatus,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Booking {
    /// Whether the booking still holds its slot and counts toward the weekly limit.
    pub fn is_live(&self) -> bool {
        self.status != BookingStatus::Cancelled
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    PendingPayment,
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::PendingPayment => "pending_payment",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending_payment" => Some(BookingStatus::PendingPayment),
            "confirmed" => Some(BookingStatus::Confirmed),
            "cancelled" => Some(BookingStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Confirmed | BookingStatus::Cancelled)
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_column_text() {
        for status in [
            BookingStatus::PendingPayment,
            BookingStatus::Confirmed,
            BookingStatus::Cancelled,
        ] {
            assert_eq!(BookingStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(BookingStatus::parse("pending"), None);
    }

    #[test]
    fn test_only_pending_is_not_terminal() {
        assert!(!BookingStatus::PendingPayment.is_terminal());
        assert!(BookingStatus::Confirmed.is_terminal());
        assert!(BookingStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_serializes_snake_case() {
        let json = serde_json::to_string(&BookingStatus::PendingPayment).unwrap();
        assert_eq!(json, "\"pending_payment\"");
    }
}
