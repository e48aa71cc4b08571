//! Intake types: raw files, managed files and intake errors

use std::fmt;
use std::io;

use axum::body::Bytes;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::preview::PreviewHandle;

// ============================================================================
// Constants
// ============================================================================

/// Maximum file size: 100MB
pub const MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Content type of everything the extractor produces
pub const PDF_MIME_TYPE: &str = "application/pdf";

/// Extensions advertised to the upload surface.
///
/// Only PDF passes validation; the office formats are advertised but rejected
/// with `UNSUPPORTED_TYPE`.
pub const ADVERTISED_EXTENSIONS: &[&str] = &[".pdf", ".doc", ".docx", ".xls", ".xlsx", ".msg"];

/// Length of the random base36 suffix of a file id
const ID_RANDOM_LEN: usize = 9;

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

// ============================================================================
// Error Types
// ============================================================================

/// Category of an intake or processing failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Not a usable file, or over the size limit
    InvalidFile,
    /// Wrong MIME type and extension
    UnsupportedType,
    /// Same content as a file already in the collection
    DuplicateFile,
    /// Hashing, PDF parsing or serialization failed
    ProcessingError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidFile => "INVALID_FILE",
            Self::UnsupportedType => "UNSUPPORTED_TYPE",
            Self::DuplicateFile => "DUPLICATE_FILE",
            Self::ProcessingError => "PROCESSING_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tagged, human-readable intake failure.
///
/// Produced by the validator, hasher, duplicate check and extractor; never
/// stored on a [`ManagedFile`] (only its message is).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{message}")]
pub struct ValidationError {
    pub code: ErrorCode,
    pub message: String,
}

impl ValidationError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_file(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidFile, message)
    }

    pub fn unsupported_type(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::UnsupportedType, message)
    }

    pub fn duplicate_file(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DuplicateFile, message)
    }

    pub fn processing(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ProcessingError, message)
    }

    /// Get HTTP status code for this error
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self.code {
            ErrorCode::InvalidFile if self.message.contains("exceeds maximum size") => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            ErrorCode::InvalidFile => StatusCode::BAD_REQUEST,
            ErrorCode::UnsupportedType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ErrorCode::DuplicateFile => StatusCode::CONFLICT,
            ErrorCode::ProcessingError => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

// ============================================================================
// File Identity
// ============================================================================

/// Session-unique file identifier: `<unix millis>-<9 base36 chars>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(String);

impl FileId {
    /// Generate a fresh id from the current time plus a random component
    pub fn generate() -> Self {
        let millis = Utc::now().timestamp_millis();
        let mut rng = rand::rng();
        let suffix: String = (0..ID_RANDOM_LEN)
            .map(|_| BASE36[rng.random_range(0..BASE36.len())] as char)
            .collect();
        Self(format!("{}-{}", millis, suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for FileId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for FileId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

// ============================================================================
// Byte Sources
// ============================================================================

/// Anything whose full content can be (re-)read for hashing or parsing
pub trait ByteSource {
    fn read_bytes(&self) -> io::Result<Bytes>;
}

// ============================================================================
// Raw Files
// ============================================================================

/// An uploaded file exactly as received. Immutable.
#[derive(Debug, Clone)]
pub struct RawFile {
    /// Original file name
    pub name: String,

    /// MIME type reported by the client (may be empty)
    pub mime_type: String,

    /// File content
    pub content: Bytes,

    /// Last-modified time reported by the client
    pub last_modified: Option<DateTime<Utc>>,
}

impl RawFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            content: content.into(),
            last_modified: None,
        }
    }

    pub fn with_last_modified(mut self, last_modified: DateTime<Utc>) -> Self {
        self.last_modified = Some(last_modified);
        self
    }

    /// Size in bytes
    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }
}

impl ByteSource for RawFile {
    fn read_bytes(&self) -> io::Result<Bytes> {
        Ok(self.content.clone())
    }
}

// ============================================================================
// Managed Files
// ============================================================================

/// A raw file wrapped with identity, preview access and display state.
///
/// Not `Clone`: the preview handle is owned, and dropping the file releases it.
#[derive(Debug)]
pub struct ManagedFile {
    pub id: FileId,

    /// The file as uploaded
    pub source: RawFile,

    /// Revocable handle for re-reading the bytes; `None` if intake failed
    pub preview: Option<PreviewHandle>,

    /// Why intake failed, if it did
    pub error: Option<String>,

    /// Display rotation in degrees, always in [0, 360)
    pub rotation: i32,

    /// Page count, when the PDF could be parsed
    pub page_count: Option<u32>,
}

impl ManagedFile {
    /// A file that failed intake: error set, no preview handle
    pub fn failed(source: RawFile, error: impl Into<String>) -> Self {
        Self {
            id: FileId::generate(),
            source,
            preview: None,
            error: Some(error.into()),
            rotation: 0,
            page_count: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.source.name
    }

    pub fn size(&self) -> u64 {
        self.source.size()
    }

    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.source.last_modified
    }

    /// Whether the file may be previewed or extracted
    pub fn is_usable(&self) -> bool {
        self.error.is_none() && self.preview.is_some()
    }

    /// Apply a display rotation. Does not touch the PDF bytes.
    pub fn rotate(&mut self, degrees: i32) -> i32 {
        self.rotation = normalize_rotation(self.rotation + normalize_rotation(degrees));
        self.rotation
    }

    /// Revoke the preview handle, if any
    pub fn release_preview(&mut self) -> bool {
        match self.preview.take() {
            Some(handle) => handle.release(),
            None => false,
        }
    }
}

impl ByteSource for ManagedFile {
    /// Reads through the preview handle when there is one, else the raw source
    fn read_bytes(&self) -> io::Result<Bytes> {
        match &self.preview {
            Some(handle) => handle.read_bytes(),
            None => self.source.read_bytes(),
        }
    }
}

/// Map any rotation in degrees into [0, 360)
pub fn normalize_rotation(degrees: i32) -> i32 {
    degrees.rem_euclid(360)
}

// ============================================================================
// Tests
// ============================================================================
