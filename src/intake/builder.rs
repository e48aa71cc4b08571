//! Metadata Builder
//!
//! Turns a raw upload into a [`ManagedFile`]. Never fails: anything that goes
//! wrong is recorded on the returned file's `error` field, with no preview
//! handle, so one bad file cannot abort a batch.

use crate::pdf;
use crate::preview::PreviewStore;

use super::types::{FileId, ManagedFile, RawFile, MAX_FILE_SIZE};
use super::validator;

/// Knobs for intake
#[derive(Debug, Clone, Copy)]
pub struct IntakeOptions {
    /// Size limit in bytes
    pub max_file_size: u64,

    /// Treat a PDF that fails to parse as an intake failure instead of
    /// accepting it with an unknown page count
    pub reject_unparsable: bool,
}

impl Default for IntakeOptions {
    fn default() -> Self {
        Self {
            max_file_size: MAX_FILE_SIZE,
            reject_unparsable: true,
        }
    }
}

/// Builds managed files, allocating their preview handles from a store
#[derive(Clone)]
pub struct MetadataBuilder {
    previews: PreviewStore,
    options: IntakeOptions,
}

impl MetadataBuilder {
    pub fn new(previews: PreviewStore) -> Self {
        Self::with_options(previews, IntakeOptions::default())
    }

    pub fn with_options(previews: PreviewStore, options: IntakeOptions) -> Self {
        Self { previews, options }
    }

    pub fn options(&self) -> &IntakeOptions {
        &self.options
    }

    /// Validate, allocate a preview handle and count pages
    pub fn build(&self, file: RawFile) -> ManagedFile {
        if let Some(validation_error) = validator::validate(&file, self.options.max_file_size) {
            tracing::debug!(
                file_name = %file.name,
                code = %validation_error.code,
                "File failed validation"
            );
            return ManagedFile::failed(file, validation_error.message);
        }

        let preview = match self.previews.acquire(file.content.clone()) {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!(file_name = %file.name, error = %e, "Error creating file with metadata");
                let message = format!("Failed to process file \"{}\": {}", file.name, e);
                return ManagedFile::failed(file, message);
            }
        };

        let page_count = match pdf::page_count(&file.content) {
            Ok(count) => Some(count),
            Err(e) if self.options.reject_unparsable => {
                tracing::warn!(file_name = %file.name, error = %e, "Error reading PDF");
                // Dropping the handle here revokes it
                drop(preview);
                let message = format!("Failed to process file \"{}\": {}", file.name, e);
                return ManagedFile::failed(file, message);
            }
            Err(e) => {
                tracing::debug!(file_name = %file.name, error = %e, "Page count unavailable");
                None
            }
        };

        let managed = ManagedFile {
            id: FileId::generate(),
            source: file,
            preview: Some(preview),
            error: None,
            rotation: 0,
            page_count,
        };

        tracing::debug!(
            file_id = %managed.id,
            file_name = %managed.name(),
            pages = ?managed.page_count,
            "Built managed file"
        );

        managed
    }
}
