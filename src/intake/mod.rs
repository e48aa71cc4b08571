//! File Intake Module
//!
//! Accepts uploaded files into the working collection:
//! - Validation (size limit, PDF-only)
//! - SHA-256 content hashing
//! - Duplicate detection against files already accepted
//! - Managed file construction (id, preview handle, page count)
//!
//! Flow:
//! 1. Validate the raw file
//! 2. Build a managed file (allocates a preview handle, counts pages)
//! 3. Check the collection for a file with the same content
//! 4. Append to the collection or report a rejection

pub mod builder;
pub mod duplicate;
pub mod hasher;
pub mod types;
pub mod validator;

pub use builder::{IntakeOptions, MetadataBuilder};
pub use duplicate::{check as check_duplicate, is_duplicate, ComparisonOutcome, DuplicateReport};
pub use hasher::{compute_hash, hash_source};
pub use types::*;
pub use validator::{validate, validate_file};
