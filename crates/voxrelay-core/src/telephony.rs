//! Shapes shared by the telephony adapter and the gateway's whitelist gate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllowedPhoneNumber {
    pub phone_number: String,
    pub label: Option<String>,
    pub added_at: DateTime<Utc>,
}

/// Redacts all but the last 4 digits of a phone number for logging (
/// "PII ... is redacted in logs").
pub fn redact_phone_number(phone: &str) -> String {
    let digits: Vec<char> = phone.chars().collect();
    if digits.len() <= 4 {
        return "*".repeat(digits.len());
    }
    let tail: String = digits[digits.len() - 4..].iter().collect();
    format!("{}{}", "*".repeat(digits.len() - 4), tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_all_but_last_four() {
        assert_eq!(redact_phone_number("+15551234567"), "********4567");
    }

    #[test]
    fn short_numbers_fully_redacted() {
        assert_eq!(redact_phone_number("123"), "***");
    }
}
