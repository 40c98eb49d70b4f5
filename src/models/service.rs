use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i64,
    pub status: ServiceStatus,
    pub provider_price_id: Option<String>,
    pub archived: bool,
    pub created_at: NaiveDateTime,
}

impl Service {
    pub fn is_bookable(&self) -> bool {
        self.status == ServiceStatus::Active && !self.archived
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Active,
    ComingSoon,
}

impl ServiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::Active => "active",
            ServiceStatus::ComingSoon => "coming_soon",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(ServiceStatus::Active),
            "coming_soon" => Some(ServiceStatus::ComingSoon),
            _ => None,
        }
    }
}

/// Fields an admin supplies when creating or replacing a service.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceInput {
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i64,
    pub status: ServiceStatus,
    pub provider_price_id: Option<String>,
}

impl ServiceInput {
    pub fn validate(&self) -> Result<(), String> {
        let name_len = self.name.trim().chars().count();
        if !(2..=100).contains(&name_len) {
            return Err("name must be between 2 and 100 characters".to_string());
        }
        if self.description.as_deref().map(str::len).unwrap_or(0) > 500 {
            return Err("description must be at most 500 characters".to_string());
        }
        if self.price_cents < 0 {
            return Err("price must not be negative".to_string());
        }
        if self.provider_price_id.as_deref().map(str::len).unwrap_or(0) > 100 {
            return Err("provider price id must be at most 100 characters".to_string());
        }
        Ok(())
    }
}

/// Formats an amount in minor units as `12.34`.
pub fn format_price(cents: i64) -> String {
    format!("{}.{:02}", cents / 100, cents % 100)
}
