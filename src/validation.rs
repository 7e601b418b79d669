use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use crate::error::AppError;

pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_PASSWORD_LEN: usize = 128;

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    static ref PHONE_RE: Regex = Regex::new(r"^[0-9+()\-\s]{5,20}$").unwrap();
}

/// A single field-level validation failure, surfaced in the `errors` array.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn is_valid_email(email: &str) -> bool {
    email.len() <= 254 && EMAIL_RE.is_match(email)
}

/// Returns the reason a password is unacceptable, if any.
pub fn password_problem(password: &str) -> Option<&'static str> {
    if password.len() < MIN_PASSWORD_LEN {
        return Some("Password must be at least 8 characters long");
    }
    if password.len() > MAX_PASSWORD_LEN {
        return Some("Password must be at most 128 characters long");
    }
    let has_letter = password.chars().any(|c| c.is_alphabetic());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    if !has_letter || !has_digit {
        return Some("Password must contain at least one letter and one number");
    }
    None
}

/// Collects field errors so a request reports every problem at once.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<FieldError>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&mut self, ok: bool, field: &str, message: &str) -> &mut Self {
        if !ok {
            self.errors.push(FieldError {
                field: field.to_string(),
                message: message.to_string(),
            });
        }
        self
    }

    pub fn required(&mut self, field: &str, value: &str) -> &mut Self {
        self.check(!value.trim().is_empty(), field, "This field is required")
    }

    pub fn email(&mut self, field: &str, value: &str) -> &mut Self {
        self.check(is_valid_email(value), field, "Please provide a valid email address")
    }

    pub fn password(&mut self, field: &str, value: &str) -> &mut Self {
        if let Some(problem) = password_problem(value) {
            self.check(false, field, problem);
        }
        self
    }

    pub fn max_len(&mut self, field: &str, value: Option<&str>, max: usize) -> &mut Self {
        let ok = value.map_or(true, |v| v.chars().count() <= max);
        let message = format!("Must be at most {max} characters");
        self.check(ok, field, &message)
    }

    pub fn phone(&mut self, field: &str, value: Option<&str>) -> &mut Self {
        let ok = value.map_or(true, |v| v.is_empty() || PHONE_RE.is_match(v));
        self.check(ok, field, "Please provide a valid phone number")
    }

    pub fn url(&mut self, field: &str, value: Option<&str>) -> &mut Self {
        let ok = value.map_or(true, |v| {
            v.is_empty() || v.starts_with("https://") || v.starts_with("http://")
        });
        self.check(ok, field, "Must be an http(s) URL")
    }

    pub fn finish(self) -> Result<(), AppError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(self.errors))
        }
    }
}
