//! File acceptance rules
//!
//! Checked in order, first failure wins:
//! 1. the file must have a name
//! 2. the file must not exceed the size limit
//! 3. the file must be a PDF by MIME type or by `.pdf` extension

use super::types::{RawFile, ValidationError, MAX_FILE_SIZE, PDF_MIME_TYPE};

/// Validate against the default 100MB limit
pub fn validate_file(file: &RawFile) -> Option<ValidationError> {
    validate(file, MAX_FILE_SIZE)
}

/// Validate against a custom size limit
pub fn validate(file: &RawFile, max_size: u64) -> Option<ValidationError> {
    if file.name.trim().is_empty() {
        return Some(ValidationError::invalid_file("Invalid file object"));
    }

    if file.size() > max_size {
        return Some(ValidationError::invalid_file(format!(
            "File \"{}\" exceeds maximum size of {}",
            file.name,
            format_limit(max_size)
        )));
    }

    if !is_pdf(file) {
        return Some(ValidationError::unsupported_type(format!(
            "File \"{}\" is not a PDF file. Only PDF files can be processed.",
            file.name
        )));
    }

    None
}

/// PDF by MIME type or by extension (case-insensitive)
pub fn is_pdf(file: &RawFile) -> bool {
    file.mime_type == PDF_MIME_TYPE || file.name.to_lowercase().ends_with(".pdf")
}

/// Render a byte limit the way it is shown to users ("100MB")
fn format_limit(bytes: u64) -> String {
    const MB: u64 = 1024 * 1024;
    if bytes % MB == 0 {
        format!("{}MB", bytes / MB)
    } else {
        format!("{:.1}MB", bytes as f64 / MB as f64)
    }
}
