//! PDF editing types

use axum::body::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::intake::{ValidationError, PDF_MIME_TYPE};

/// A serialized PDF ready to be sent to the client
#[derive(Debug, Clone)]
pub struct PdfBlob {
    /// Serialized document
    pub bytes: Bytes,
    /// Always `application/pdf`
    pub content_type: &'static str,
    /// Pages in the serialized document
    pub page_count: u32,
}

impl PdfBlob {
    pub fn new(bytes: Vec<u8>, page_count: u32) -> Self {
        Self {
            bytes: Bytes::from(bytes),
            content_type: PDF_MIME_TYPE,
            page_count,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Where the merged-in document's pages go relative to the target's
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergePosition {
    Before,
    After,
}

/// PDF editing errors
#[derive(Error, Debug)]
pub enum PdfEditError {
    #[error("Failed to read the PDF file: {0}")]
    Read(String),

    #[error("Failed to load the PDF document: {0}")]
    Load(String),

    #[error("Malformed page tree: {0}")]
    Structure(String),

    #[error("Rotation must be a multiple of 90 degrees, got {0}")]
    InvalidRotation(i32),

    #[error("Failed to save the PDF document: {0}")]
    Save(String),
}

impl From<lopdf::Error> for PdfEditError {
    fn from(err: lopdf::Error) -> Self {
        PdfEditError::Structure(err.to_string())
    }
}

impl From<PdfEditError> for ValidationError {
    fn from(err: PdfEditError) -> Self {
        match err {
            PdfEditError::Read(_) => ValidationError::processing(err.to_string()),
            _ => ValidationError::processing(format!("Failed to process PDF file: {}", err)),
        }
    }
}
