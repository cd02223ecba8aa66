//! Input validation rules shared by account creation and updates.

use once_cell::sync::Lazy;
use regex::Regex;
use validator::{Validate, ValidationErrors};

use crate::constants::USERNAME_PATTERN;
use crate::error::{DomainError, DomainResult};

static USERNAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(USERNAME_PATTERN).expect("username pattern is a valid regex"));

/// Check that a username is non-empty and alphanumeric.
pub fn is_valid_username(username: &str) -> bool {
    USERNAME_REGEX.is_match(username)
}

/// Run the derived field rules and the username pattern on a value.
pub fn validate_account<T: Validate>(value: &T, username: &str) -> DomainResult<()> {
    value.validate().map_err(validation_message)?;

    if !is_valid_username(username) {
        return Err(DomainError::validation(
            "username: must contain only letters and digits",
        ));
    }

    Ok(())
}

/// Flatten validator output into a single stable message, sorted by field.
fn validation_message(errors: ValidationErrors) -> DomainError {
    let mut fields: Vec<String> = errors
        .field_errors()
        .into_iter()
        .map(|(field, errs)| {
            let reasons: Vec<String> = errs
                .iter()
                .map(|e| {
                    e.message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string())
                })
                .collect();
            format!("{}: {}", field, reasons.join(", "))
        })
        .collect();
    fields.sort();

    DomainError::validation(fields.join("; "))
}
