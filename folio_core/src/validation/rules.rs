//! Validation rules and custom validators

use lazy_static::lazy_static;
use regex::Regex;
use std::borrow::Cow;
use validator::ValidationError;

lazy_static! {
    // Deliberately loose: `local@domain.tld` shape with no whitespace.
    static ref CONTACT_EMAIL_REGEX: Regex = Regex::new(
        r"^[^\s@]+@[^\s@]+\.[^\s@]+$"
    ).unwrap();

    static ref URL_REGEX: Regex = Regex::new(
        r"^https?://[^\s/$.?#].[^\s]*$"
    ).unwrap();

    static ref SETTING_KEY_REGEX: Regex = Regex::new(
        r"^[a-z][a-z0-9_]{0,63}$"
    ).unwrap();

    static ref HEX_COLOR_REGEX: Regex = Regex::new(
        r"^#(?:[0-9a-fA-F]{3}|[0-9a-fA-F]{6})$"
    ).unwrap();
}

pub const REQUIRED_CODE: &str = "required";
pub const EMAIL_FORMAT_CODE: &str = "email_format";

fn error(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(Cow::Borrowed(message));
    err
}

pub fn is_valid_email(email: &str) -> bool {
    CONTACT_EMAIL_REGEX.is_match(email)
}

pub fn validate_required(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(error(REQUIRED_CODE, "This field is required"));
    }
    Ok(())
}

pub fn validate_contact_email(email: &str) -> Result<(), ValidationError> {
    if email.trim().is_empty() {
        return Ok(());
    }

    if email.len() > 254 {
        return Err(error(EMAIL_FORMAT_CODE, "Email is too long"));
    }

    if !is_valid_email(email) {
        return Err(error(EMAIL_FORMAT_CODE, "Invalid email format"));
    }

    Ok(())
}

pub fn validate_url(url: &str) -> Result<(), ValidationError> {
    if url.len() > 2048 {
        return Err(error("url", "URL is too long"));
    }

    if !URL_REGEX.is_match(url) {
        return Err(error("url", "Invalid URL format"));
    }

    Ok(())
}

pub fn validate_setting_key(key: &str) -> Result<(), ValidationError> {
    if !SETTING_KEY_REGEX.is_match(key) {
        return Err(error(
            "setting_key",
            "Setting keys must be lowercase snake_case and at most 64 characters",
        ));
    }
    Ok(())
}

pub fn validate_hex_color(color: &str) -> Result<(), ValidationError> {
    if !HEX_COLOR_REGEX.is_match(color) {
        return Err(error("color", "Colors must be #rgb or #rrggbb"));
    }
    Ok(())
}

pub fn validate_tech_stack(tech_stack: &Vec<String>) -> Result<(), ValidationError> {
    if tech_stack.len() > 30 {
        return Err(error("tech_stack", "Too many technology labels"));
    }

    if tech_stack.iter().any(|label| label.trim().is_empty() || label.len() > 50) {
        return Err(error(
            "tech_stack",
            "Technology labels must be between 1 and 50 characters",
        ));
    }

    Ok(())
}
