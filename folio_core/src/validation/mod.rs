//! Input validation for contact submissions and admin payloads

pub mod rules;

pub use rules::*;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::{Validate, ValidationErrors};

/// Reason a payload was refused. The two contact-form variants carry the
/// exact wording shown to visitors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationFailure {
    #[error("Name, email and message are required")]
    MissingFields,

    #[error("Invalid email format")]
    InvalidEmail,

    #[error("{field}: {message}")]
    Field { field: String, message: String },
}

impl ValidationFailure {
    /// Collapse validator output into a single failure. Missing contact fields
    /// take precedence over a malformed email, which takes precedence over
    /// anything else.
    pub fn from_errors(errors: &ValidationErrors) -> Self {
        let mut missing = false;
        let mut bad_email = false;
        let mut other: Vec<(String, String)> = Vec::new();

        for (field, field_errors) in errors.field_errors() {
            let field: &str = &field;
            for error in field_errors.iter() {
                match error.code.as_ref() {
                    REQUIRED_CODE => missing = true,
                    EMAIL_FORMAT_CODE => bad_email = true,
                    _ => {
                        let message = error
                            .message
                            .as_ref()
                            .map(|m| m.to_string())
                            .unwrap_or_else(|| format!("invalid value for '{}'", field));
                        other.push((field.to_string(), message));
                    }
                }
            }
        }

        if missing {
            return ValidationFailure::MissingFields;
        }
        if bad_email {
            return ValidationFailure::InvalidEmail;
        }

        other.sort();
        match other.into_iter().next() {
            Some((field, message)) => ValidationFailure::Field { field, message },
            None => ValidationFailure::Field {
                field: "payload".to_string(),
                message: "invalid payload".to_string(),
            },
        }
    }
}

/// Run the derived validators on any payload.
pub fn check<T: Validate>(payload: &T) -> Result<(), ValidationFailure> {
    payload
        .validate()
        .map_err(|errors| ValidationFailure::from_errors(&errors))
}

/// A visitor's contact form as received, before trimming.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct ContactSubmission {
    #[serde(default)]
    #[validate(
        custom(function = "validate_required"),
        length(max = 100, message = "Name is too long")
    )]
    pub name: String,

    #[serde(default)]
    #[validate(
        custom(function = "validate_required"),
        custom(function = "validate_contact_email")
    )]
    pub email: String,

    #[serde(default)]
    #[validate(length(max = 200, message = "Subject is too long"))]
    pub subject: Option<String>,

    #[serde(default)]
    #[validate(
        custom(function = "validate_required"),
        length(max = 5000, message = "Message is too long")
    )]
    pub message: String,

    #[serde(default, alias = "pageUrl")]
    pub page_url: Option<String>,
}

impl ContactSubmission {
    pub fn new(name: &str, email: &str, subject: Option<&str>, message: &str) -> Self {
        Self {
            name: name.to_string(),
            email: email.to_string(),
            subject: subject.map(str::to_string),
            message: message.to_string(),
            page_url: None,
        }
    }

    /// Trim every field; blank optional fields become `None`.
    pub fn normalized(&self) -> Self {
        fn optional(value: &Option<String>) -> Option<String> {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        }

        Self {
            name: self.name.trim().to_string(),
            email: self.email.trim().to_string(),
            subject: optional(&self.subject),
            message: self.message.trim().to_string(),
            page_url: optional(&self.page_url),
        }
    }

    /// Normalize then validate, returning the cleaned submission.
    pub fn check(&self) -> Result<Self, ValidationFailure> {
        let cleaned = self.normalized();
        check(&cleaned)?;
        Ok(cleaned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_submission_is_trimmed() {
        let submission = ContactSubmission {
            name: "  Ann ".to_string(),
            email: " a@x.com ".to_string(),
            subject: Some("   ".to_string()),
            message: " hi ".to_string(),
            page_url: Some("".to_string()),
        };

        let cleaned = submission.check().unwrap();
        assert_eq!(cleaned.name, "Ann");
        assert_eq!(cleaned.email, "a@x.com");
        assert_eq!(cleaned.subject, None);
        assert_eq!(cleaned.message, "hi");
        assert_eq!(cleaned.page_url, None);
    }

    #[test]
    fn test_missing_fields() {
        let submission = ContactSubmission::new("Ann", "   ", None, "hello");
        assert_eq!(submission.check().unwrap_err(), ValidationFailure::MissingFields);

        let submission = ContactSubmission::new("", "not-an-email", None, "hello");
        assert_eq!(submission.check().unwrap_err(), ValidationFailure::MissingFields);
    }

    #[test]
    fn test_invalid_email() {
        let submission = ContactSubmission::new("Ann", "not-an-email", None, "hello");
        let failure = submission.check().unwrap_err();
        assert_eq!(failure, ValidationFailure::InvalidEmail);
        assert_eq!(failure.to_string(), "Invalid email format");
    }

    #[test]
    fn test_length_limits_report_field() {
        let submission = ContactSubmission::new("Ann", "a@x.com", None, &"x".repeat(5001));
        match submission.check().unwrap_err() {
            ValidationFailure::Field { field, message } => {
                assert_eq!(field, "message");
                assert_eq!(message, "Message is too long");
            }
            other => panic!("unexpected failure: {:?}", other),
        }
    }

    #[test]
    fn test_deserializes_camel_case_page_url() {
        let submission: ContactSubmission = serde_json::from_str(
            r#"{"name":"Bo","email":"b@y.org","message":"yo","pageUrl":"/about"}"#,
        )
        .unwrap();
        assert_eq!(submission.page_url.as_deref(), Some("/about"));
        assert!(submission.subject.is_none());
    }
}
