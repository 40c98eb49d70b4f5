use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub active: bool,
    pub created_at: NaiveDateTime,
}

/// Contact details captured on every booking request.
#[derive(Debug, Clone, Deserialize)]
pub struct ContactDetails {
    pub name: String,
    pub email: String,
    pub phone: String,
}

impl ContactDetails {
    pub fn normalized(&self) -> Self {
        Self {
            name: self.name.trim().to_string(),
            email: self.email.trim().to_lowercase(),
            phone: self.phone.trim().to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        let name_len = self.name.chars().count();
        if !(2..=100).contains(&name_len) {
            return Err("name must be between 2 and 100 characters".to_string());
        }
        if !looks_like_email(&self.email) {
            return Err("a valid email address is required".to_string());
        }
        let phone_len = self.phone.chars().count();
        if !(10..=20).contains(&phone_len) {
            return Err("phone must be between 10 and 20 characters".to_string());
        }
        Ok(())
    }
}

pub(crate) fn looks_like_email(s: &str) -> bool {
    match s.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !s.contains(char::is_whitespace)
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn details(name: &str, email: &str, phone: &str) -> ContactDetails {
        ContactDetails {
            name: name.to_string(),
            email: email.to_string(),
            phone: phone.to_string(),
        }
    }

    #[test]
    fn test_normalized_lowercases_email() {
        let d = details(" Dana ", " Dana@Example.COM ", " 5551234567 ").normalized();
        assert_eq!(d.name, "Dana");
        assert_eq!(d.email, "dana@example.com");
        assert_eq!(d.phone, "5551234567");
    }

    #[test]
    fn test_validate_rejects_bad_fields() {
        assert!(details("D", "dana@example.com", "5551234567").validate().is_err());
        assert!(details("Dana", "dana.example.com", "5551234567").validate().is_err());
        assert!(details("Dana", "dana@example", "5551234567").validate().is_err());
        assert!(details("Dana", "dana@example.com", "555").validate().is_err());
        assert!(details("Dana", "dana@example.com", "5551234567").validate().is_ok());
    }
}
