//! Working Collection
//!
//! The ordered, user-visible list of accepted files. Order is significant
//! (drag-reorder), identity is by [`FileId`], not by content.
//!
//! Removing a file from the collection releases its preview handle.

pub mod metadata;

use crate::intake::{FileId, ManagedFile};

pub use metadata::{format_date, format_size, pages_label, FileMetadataView, FileSummary};

/// Collection errors
#[derive(Debug, thiserror::Error)]
pub enum CollectionError {
    #[error("File not found: {0}")]
    NotFound(FileId),

    #[error("File already in collection: {0}")]
    DuplicateId(FileId),

    #[error("Index out of bounds: {index} (len: {len})")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("Invalid order: {0}")]
    InvalidOrder(String),
}

/// Ordered set of managed files
#[derive(Debug, Default)]
pub struct WorkingCollection {
    files: Vec<ManagedFile>,
}

impl WorkingCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Files in display order
    pub fn files(&self) -> &[ManagedFile] {
        &self.files
    }

    pub fn iter(&self) -> impl Iterator<Item = &ManagedFile> {
        self.files.iter()
    }

    pub fn ids(&self) -> Vec<FileId> {
        self.files.iter().map(|f| f.id.clone()).collect()
    }

    pub fn position(&self, id: &FileId) -> Option<usize> {
        self.files.iter().position(|f| &f.id == id)
    }

    pub fn get(&self, id: &FileId) -> Result<&ManagedFile, CollectionError> {
        self.files
            .iter()
            .find(|f| &f.id == id)
            .ok_or_else(|| CollectionError::NotFound(id.clone()))
    }

    pub fn get_mut(&mut self, id: &FileId) -> Result<&mut ManagedFile, CollectionError> {
        self.files
            .iter_mut()
            .find(|f| &f.id == id)
            .ok_or_else(|| CollectionError::NotFound(id.clone()))
    }

    /// Append a file at the end
    pub fn push(&mut self, file: ManagedFile) -> Result<&ManagedFile, CollectionError> {
        if self.position(&file.id).is_some() {
            return Err(CollectionError::DuplicateId(file.id.clone()));
        }
        self.files.push(file);
        Ok(&self.files[self.files.len() - 1])
    }

    /// Take a file out of the collection. The preview handle goes with it and
    /// is released when the returned file is dropped.
    pub fn remove(&mut self, id: &FileId) -> Result<ManagedFile, CollectionError> {
        let index = self
            .position(id)
            .ok_or_else(|| CollectionError::NotFound(id.clone()))?;
        Ok(self.files.remove(index))
    }

    /// Remove a file and release its preview handle now
    pub fn delete(&mut self, id: &FileId) -> Result<(), CollectionError> {
        let mut file = self.remove(id)?;
        let released = file.release_preview();
        tracing::info!(
            file_id = %file.id,
            file_name = %file.name(),
            released = released,
            "Removed file from collection"
        );
        Ok(())
    }

    /// Apply a display rotation; returns the new normalized rotation
    pub fn rotate(&mut self, id: &FileId, degrees: i32) -> Result<i32, CollectionError> {
        let file = self.get_mut(id)?;
        Ok(file.rotate(degrees))
    }

    /// Move one file to a new index, shifting the others (drag-and-drop)
    pub fn move_item(&mut self, id: &FileId, to_index: usize) -> Result<(), CollectionError> {
        let from = self
            .position(id)
            .ok_or_else(|| CollectionError::NotFound(id.clone()))?;

        if to_index >= self.files.len() {
            return Err(CollectionError::IndexOutOfBounds {
                index: to_index,
                len: self.files.len(),
            });
        }

        let file = self.files.remove(from);
        self.files.insert(to_index, file);
        Ok(())
    }

    /// Replace the order wholesale. `order` must be a permutation of the
    /// current ids.
    pub fn reorder(&mut self, order: &[FileId]) -> Result<(), CollectionError> {
        if order.len() != self.files.len() {
            return Err(CollectionError::InvalidOrder(format!(
                "expected {} ids, got {}",
                self.files.len(),
                order.len()
            )));
        }

        let mut remaining: Vec<Option<ManagedFile>> = Vec::new();
        let mut indices = Vec::with_capacity(order.len());
        for id in order {
            let index = self
                .position(id)
                .ok_or_else(|| CollectionError::InvalidOrder(format!("unknown id {}", id)))?;
            if indices.contains(&index) {
                return Err(CollectionError::InvalidOrder(format!("repeated id {}", id)));
            }
            indices.push(index);
        }

        remaining.extend(self.files.drain(..).map(Some));
        self.files = indices
            .into_iter()
            .filter_map(|i| remaining[i].take())
            .collect();
        Ok(())
    }

    /// Remove everything, releasing all preview handles. Returns the count.
    pub fn clear(&mut self) -> usize {
        let count = self.files.len();
        self.files.clear();
        count
    }
}
