//! Pre-submission checks for the report form.
//!
//! These run on the caller's side of the store: a submission that fails
//! here never reaches [`ReportDbState`](crate::local_db_state::ReportDbState).

use chrono::{NaiveDate, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::evidence_blob::EvidenceBlob;
use crate::local_db_model::{
    FileCategory, ReportFields, FIELD_CADASTRAL_REFERENCE, FIELD_CONTACTED_OPERATORS, FIELD_CONTACT_METHODS,
    FIELD_DECLARING_OPERATOR, FIELD_EMAIL,
};

pub const MAX_FILE_SIZE_MB: u64 = 10;

pub const REQUIRED_FIELDS: [&str; 3] = [FIELD_EMAIL, FIELD_CADASTRAL_REFERENCE, FIELD_DECLARING_OPERATOR];

pub const ALLOWED_MIME_TYPES: [&str; 8] = [
    "application/pdf",
    "image/png",
    "image/jpeg",
    "image/gif",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "audio/mpeg",
    "video/mp4",
];

lazy_static! {
    /// Something, `@`, something, `.`, something; no whitespace.
    pub static ref EMAIL_REGEX: Regex = Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap();

    /// Spanish cadastral reference, 20 characters, e.g. `1234567CS1234S0001WX`.
    pub static ref CADASTRAL_REGEX: Regex =
        Regex::new(r"^[0-9]{7}[A-Z]{2}[0-9]{4}[A-Z][0-9]{4}[A-Z]{2}$").unwrap();

    pub static ref PHONE_REGEX: Regex = Regex::new(r"^[+]?[0-9\s\-()]{9,}$").unwrap();

    static ref WHITESPACE_REGEX: Regex = Regex::new(r"\s").unwrap();
}

/// One problem found in a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// What validation needs to know about one attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentSummary {
    pub category: FileCategory,
    pub file_name: String,
    pub mime_type: String,
    pub size: u64,
}

impl AttachmentSummary {
    pub fn of<B: EvidenceBlob + ?Sized>(category: FileCategory, blob: &B) -> Self {
        Self {
            category,
            file_name: blob.name().to_string(),
            mime_type: blob.mime_type().to_string(),
            size: blob.size(),
        }
    }
}

pub fn validate_email(email: &str) -> bool {
    EMAIL_REGEX.is_match(email)
}

/// Whitespace is ignored.
pub fn validate_cadastral_reference(reference: &str) -> bool {
    let compact = WHITESPACE_REGEX.replace_all(reference, "");
    CADASTRAL_REGEX.is_match(&compact)
}

/// Optional: empty is valid.
pub fn validate_phone(phone: &str) -> bool {
    phone.is_empty() || PHONE_REGEX.is_match(phone)
}

pub fn validate_required(value: &str) -> bool {
    !value.trim().is_empty()
}

/// Optional `YYYY-MM-DD` that must not be in the future.
pub fn validate_date(date: &str) -> bool {
    if date.is_empty() {
        return true;
    }
    match NaiveDate::parse_from_str(date, "%Y-%m-%d") {
        Ok(date) => date <= Utc::now().date_naive(),
        Err(_) => false,
    }
}

pub fn validate_file_size(size: u64, max_size_mb: u64) -> bool {
    size <= max_size_mb * 1024 * 1024
}

pub fn validate_file_type(mime_type: &str) -> bool {
    ALLOWED_MIME_TYPES.contains(&mime_type)
}

/// Checks one form field, choosing the rule from its name.
pub fn validate_field(name: &str, value: &str) -> Result<(), String> {
    if REQUIRED_FIELDS.contains(&name) && !validate_required(value) {
        return Err("This field is required".to_string());
    }
    if value.is_empty() {
        return Ok(());
    }

    if name == FIELD_EMAIL && !validate_email(value) {
        Err("Enter a valid email address".to_string())
    } else if name == FIELD_CADASTRAL_REFERENCE && !validate_cadastral_reference(value) {
        Err("Enter a valid cadastral reference (format: 1234567CS1234S0001WX)".to_string())
    } else if name.to_lowercase().contains("telefono") && !validate_phone(value) {
        Err("Enter a valid phone number".to_string())
    } else if name.starts_with("fecha") && !validate_date(value) {
        Err("The date cannot be in the future".to_string())
    } else {
        Ok(())
    }
}

pub fn validate_attachment(attachment: &AttachmentSummary) -> Result<(), String> {
    if !validate_file_size(attachment.size, MAX_FILE_SIZE_MB) {
        return Err(format!(
            "File \"{}\" is too large (maximum {MAX_FILE_SIZE_MB}MB)",
            attachment.file_name
        ));
    }
    if !validate_file_type(&attachment.mime_type) {
        return Err(format!("File \"{}\" is not an allowed type", attachment.file_name));
    }
    Ok(())
}

/// Checks a whole submission and returns every problem found.
pub fn validate_submission(fields: &ReportFields, attachments: &[AttachmentSummary]) -> Vec<FieldError> {
    let mut errors = Vec::new();

    for name in REQUIRED_FIELDS {
        let value = fields.get(name).and_then(JsonValue::as_str).unwrap_or("");
        if let Err(message) = validate_field(name, value) {
            errors.push(FieldError::new(name, message));
        }
    }

    for (name, value) in fields {
        if REQUIRED_FIELDS.contains(&name.as_str()) {
            continue;
        }
        if let Some(value) = value.as_str() {
            if let Err(message) = validate_field(name, value) {
                errors.push(FieldError::new(name.as_str(), message));
            }
        }
    }

    for category in FileCategory::ALL {
        if !attachments.iter().any(|a| a.category == category) {
            errors.push(FieldError::new(
                category.form_slot(),
                format!("At least one {category} evidence file is required"),
            ));
        }
    }

    for attachment in attachments {
        if let Err(message) = validate_attachment(attachment) {
            errors.push(FieldError::new(attachment.category.form_slot(), message));
        }
    }

    for (name, label) in [
        (FIELD_CONTACTED_OPERATORS, "contacted operator"),
        (FIELD_CONTACT_METHODS, "contact method"),
    ] {
        if !has_selection(fields.get(name)) {
            errors.push(FieldError::new(name, format!("Select at least one {label}")));
        }
    }

    errors
}

fn has_selection(value: Option<&JsonValue>) -> bool {
    match value {
        Some(JsonValue::Array(items)) => items.iter().any(|v| v.as_str().is_some_and(validate_required)),
        Some(JsonValue::String(s)) => validate_required(s),
        _ => false,
    }
}
