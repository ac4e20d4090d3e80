//! Client-side input validation for the login wizard.
//!
//! These checks run before any backend call; a failure surfaces as a field
//! error on the current step and no network request is made. The backend
//! performs its own authoritative validation on top.

use thiserror::Error;

const PHONE_MAX_LEN: usize = 20;
const PHONE_MIN_DIGITS: usize = 7;
const ACCOUNT_NAME_MAX_LEN: usize = 100;

/// A rejected wizard input, with the field it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: &str) -> Self {
        Self {
            field,
            message: message.to_string(),
        }
    }
}

/// Validate and normalize a phone number.
///
/// Accepts digits plus `+`, `-`, `(`, `)` and spaces, at most 20 characters
/// after trimming, with at least 7 digits among them.
pub fn validate_phone(raw: &str) -> Result<String, ValidationError> {
    let phone = raw.trim();

    if phone.is_empty() {
        return Err(ValidationError::new("phone", "Phone number cannot be empty"));
    }
    if phone.chars().count() > PHONE_MAX_LEN {
        return Err(ValidationError::new(
            "phone",
            "Phone number exceeds maximum length of 20 characters",
        ));
    }
    if !phone
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '(' | ')' | ' '))
    {
        return Err(ValidationError::new(
            "phone",
            "Phone number contains invalid characters",
        ));
    }
    if phone.chars().filter(char::is_ascii_digit).count() < PHONE_MIN_DIGITS {
        return Err(ValidationError::new(
            "phone",
            "Phone number must contain at least 7 digits",
        ));
    }

    Ok(phone.to_string())
}

/// Validate and normalize the verification code.
pub fn validate_code(raw: &str) -> Result<String, ValidationError> {
    let code = raw.trim();
    if code.is_empty() {
        return Err(ValidationError::new("code", "Verification code is required"));
    }
    Ok(code.to_string())
}

/// Validate and normalize a local account name.
pub fn validate_account_label(raw: &str) -> Result<String, ValidationError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(ValidationError::new("account_name", "Account name cannot be empty"));
    }
    if name.chars().count() > ACCOUNT_NAME_MAX_LEN {
        return Err(ValidationError::new(
            "account_name",
            "Account name exceeds maximum length of 100 characters",
        ));
    }
    Ok(name.to_string())
}
