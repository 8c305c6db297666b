//! DTMF digit validation: reject anything outside
//! `^[0-9*#wW]+$` before it reaches the carrier, rather than forwarding
//! agent-supplied text straight into carrier markup.

use crate::error::{Result, TelephonyError};

pub fn validate_dtmf(digits: &str) -> Result<()> {
    if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit() || matches!(c, '*' | '#' | 'w' | 'W')) {
        Ok(())
    } else {
        Err(TelephonyError::invalid(format!("invalid DTMF digits: {digits:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_digits() {
        assert!(validate_dtmf("123*#ww").is_ok());
    }

    #[test]
    fn rejects_empty() {
        assert!(validate_dtmf("").is_err());
    }

    #[test]
    fn rejects_markup_injection() {
        assert!(validate_dtmf("1<Hangup/>").is_err());
    }
}
