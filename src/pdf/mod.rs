//! PDF editing module
//!
//! Page counting, rotation, extraction and merging on top of lopdf.
//! No rendering happens here; the client renders from the raw bytes.

pub mod editor;
mod types;

pub use editor::{
    extract, merge, merge_documents, page_count, page_rotations, rotate_bytes, rotate_document,
};
pub use types::{MergePosition, PdfBlob, PdfEditError};
