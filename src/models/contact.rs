use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::customer::looks_like_email;

#[derive(Debug, Clone, Serialize)]
pub struct ContactMessage {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub message: String,
    pub email_sent: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContactForm {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub message: String,
}

impl ContactForm {
    pub fn validate(&self) -> Result<(), String> {
        if !(2..=100).contains(&self.name.trim().chars().count()) {
            return Err("name must be between 2 and 100 characters".to_string());
        }
        if !looks_like_email(self.email.trim()) {
            return Err("a valid email address is required".to_string());
        }
        if !(10..=20).contains(&self.phone.trim().chars().count()) {
            return Err("phone must be between 10 and 20 characters".to_string());
        }
        if !(10..=500).contains(&self.message.trim().chars().count()) {
            return Err("message must be between 10 and 500 characters".to_string());
        }
        Ok(())
    }
}
