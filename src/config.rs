use std::env;

use crate::models::SlotGrid;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    /// Bearer token that gates the admin API.
    pub session_secret: String,
    /// Absolute origin used to build checkout return URLs.
    pub public_base_url: String,
    pub stripe_secret_key: String,
    pub stripe_webhook_secret: String,
    pub currency: String,
    pub mail_api_base: String,
    pub mail_domain: String,
    pub mail_api_key: String,
    pub mail_default_sender: String,
    pub business_email: String,
    pub slot_grid: SlotGrid,
    pub min_lead_hours: i64,
    pub pending_timeout_minutes: i64,
    pub sweep_interval_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = SlotGrid::default();
        let slot_grid = SlotGrid::new(
            parse_or("OPENING_HOUR", defaults.opening_hour),
            parse_or("CLOSING_HOUR", defaults.closing_hour),
            parse_or("SLOT_MINUTES", defaults.slot_minutes),
        )?;

        Ok(Self {
            port: parse_or("PORT", 5000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "slotbook.db".to_string()),
            session_secret: env::var("SESSION_SECRET").unwrap_or_default(),
            public_base_url: env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:5000".to_string())
                .trim_end_matches('/')
                .to_string(),
            stripe_secret_key: env::var("STRIPE_SECRET_KEY").unwrap_or_default(),
            stripe_webhook_secret: env::var("STRIPE_WEBHOOK_SECRET").unwrap_or_default(),
            currency: env::var("CURRENCY").unwrap_or_else(|_| "usd".to_string()),
            mail_api_base: env::var("MAIL_API_BASE")
                .unwrap_or_else(|_| "https://api.mailgun.net/v3".to_string()),
            mail_domain: env::var("MAIL_DOMAIN").unwrap_or_default(),
            mail_api_key: env::var("MAIL_API_KEY").unwrap_or_default(),
            mail_default_sender: env::var("MAIL_DEFAULT_SENDER").unwrap_or_default(),
            business_email: env::var("BUSINESS_EMAIL").unwrap_or_default(),
            slot_grid,
            min_lead_hours: parse_or("MIN_LEAD_HOURS", 24),
            pending_timeout_minutes: parse_or("PENDING_TIMEOUT_MINUTES", 30),
            sweep_interval_secs: parse_or("SWEEP_INTERVAL_SECS", 60),
        })
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
