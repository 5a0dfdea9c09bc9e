//! Client-side form validation
//!
//! Checks run before a create/update request is sent. A failure blocks the
//! request and reports errors per field so they can be shown inline.

use crate::record::{FieldValue, Record};
use crate::schema::EntitySchema;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::OnceLock;

/// A rule attached to one form field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldRule {
    /// Field must be present and non-blank
    Required,
    /// If present, must look like an email address
    Email,
    /// If present, must look like a phone number (digits, spaces, + - ( ))
    Phone,
    /// If present, text must have at least this many characters
    MinLength(usize),
    /// If present, must be numeric
    Number,
    /// If present, must be a number >= 0
    NonNegative,
}

/// One failed check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// All failed checks of one submission, in rule order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.0
    }

    /// First message for a field, for inline display next to it
    pub fn for_field(&self, field: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|e| e.field == field)
            .map(|e| e.message.as_str())
    }

    fn push(&mut self, field: &str, message: String) {
        // One message per field is enough for inline display
        if self.for_field(field).is_none() {
            self.0.push(FieldError {
                field: field.to_string(),
                message,
            });
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect();
        f.write_str(&parts.join("; "))
    }
}

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email pattern"))
}

fn phone_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\+?[0-9\s\-()]{7,20}$").expect("valid phone pattern"))
}

fn present(value: Option<&FieldValue>) -> Option<&FieldValue> {
    value.filter(|v| match v {
        FieldValue::Null => false,
        FieldValue::Text(s) => !s.trim().is_empty(),
        _ => true,
    })
}

fn check(rule: &FieldRule, label: &str, value: Option<&FieldValue>) -> Option<String> {
    let value = match (rule, present(value)) {
        (FieldRule::Required, None) => return Some(format!("{} is required", label)),
        (_, None) => return None,
        (_, Some(v)) => v,
    };
    let text = value.to_string();
    let text = text.trim();

    match rule {
        FieldRule::Required => None,
        FieldRule::Email if !email_regex().is_match(text) => {
            Some("Please enter a valid email address".to_string())
        }
        FieldRule::Phone if !phone_regex().is_match(text) => {
            Some("Please enter a valid phone number".to_string())
        }
        FieldRule::MinLength(n) if text.chars().count() < *n => {
            Some(format!("{} must be at least {} characters", label, n))
        }
        FieldRule::Number if value.as_f64().is_none() => Some(format!("{} must be a number", label)),
        FieldRule::NonNegative => match value.as_f64() {
            None => Some(format!("{} must be a number", label)),
            Some(n) if n < 0.0 => Some(format!("{} cannot be negative", label)),
            Some(_) => None,
        },
        _ => None,
    }
}

/// Validates a full form submission (create) against the schema's rules
pub fn validate(schema: &EntitySchema, fields: &Record) -> Result<(), ValidationErrors> {
    validate_with(schema, fields, false)
}

/// Validates a partial submission (update): `Required` only applies to
/// fields that are being changed.
pub fn validate_partial(schema: &EntitySchema, fields: &Record) -> Result<(), ValidationErrors> {
    validate_with(schema, fields, true)
}

fn validate_with(schema: &EntitySchema, fields: &Record, partial: bool) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::default();

    for (field, rule) in schema.rules() {
        if partial && !fields.contains(field) {
            continue;
        }
        let label = schema
            .get_column(field)
            .map(|c| c.label.as_str())
            .unwrap_or(field.as_str());
        if let Some(message) = check(rule, label, fields.get(field)) {
            errors.push(field, message);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
