//! Duplicate Detection
//!
//! Decides whether a candidate upload has the same content as a file already
//! in the working collection.
//!
//! Only files sharing both name and size with the candidate are hashed. Each
//! of those comparisons yields its own [`ComparisonOutcome`]; an existing file
//! that can no longer be read is recorded as `Unreadable` and skipped, so one
//! bad entry never blocks detection against the rest.

use super::hasher::{compute_hash, hash_source};
use super::types::{ByteSource, FileId, ManagedFile, RawFile, ValidationError};

// ============================================================================
// Report Types
// ============================================================================

/// Result of comparing the candidate against one existing file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComparisonOutcome {
    /// Same content hash
    Matched,
    /// Different content hash
    Differs,
    /// The existing file's bytes could not be read
    Unreadable(ValidationError),
}

/// One existing file that passed the name/size prefilter
#[derive(Debug, Clone)]
pub struct Comparison {
    pub id: FileId,
    pub outcome: ComparisonOutcome,
}

/// Aggregated duplicate check result
#[derive(Debug, Clone, Default)]
pub struct DuplicateReport {
    /// The existing file the candidate duplicates, if any
    pub matched: Option<FileId>,

    /// Per-file outcomes, in collection order, up to the first match
    pub comparisons: Vec<Comparison>,

    /// Number of digests computed (candidate included)
    pub hashes_computed: usize,
}

impl DuplicateReport {
    pub fn is_duplicate(&self) -> bool {
        self.matched.is_some()
    }

    /// Comparisons that were skipped because the existing file was unreadable
    pub fn skipped(&self) -> impl Iterator<Item = &Comparison> {
        self.comparisons
            .iter()
            .filter(|c| matches!(c.outcome, ComparisonOutcome::Unreadable(_)))
    }
}

// ============================================================================
// Checks
// ============================================================================

/// Existing files sharing both name and size with the candidate
pub fn prefilter<'a>(candidate: &RawFile, existing: &'a [ManagedFile]) -> Vec<&'a ManagedFile> {
    existing
        .iter()
        .filter(|f| f.name() == candidate.name && f.size() == candidate.size())
        .collect()
}

/// Full duplicate check with per-file outcomes.
///
/// Fails only when the candidate itself cannot be hashed.
pub fn check(candidate: &RawFile, existing: &[ManagedFile]) -> Result<DuplicateReport, ValidationError> {
    let potential = prefilter(candidate, existing);

    if potential.is_empty() {
        return Ok(DuplicateReport::default());
    }

    let candidate_hash = hash_source(candidate).map_err(|e| {
        ValidationError::processing(format!("Failed to check for duplicate file: {}", e))
    })?;

    let mut report = DuplicateReport {
        hashes_computed: 1,
        ..Default::default()
    };

    // Sequential: collections are small and each comparison is independent
    for existing_file in potential {
        let outcome = match existing_file.read_bytes() {
            Ok(content) => {
                report.hashes_computed += 1;
                if compute_hash(&content) == candidate_hash {
                    ComparisonOutcome::Matched
                } else {
                    ComparisonOutcome::Differs
                }
            }
            Err(e) => {
                tracing::warn!(
                    file_id = %existing_file.id,
                    file_name = %existing_file.name(),
                    error = %e,
                    "Error comparing file, skipping"
                );
                ComparisonOutcome::Unreadable(ValidationError::processing(format!(
                    "Failed to read \"{}\": {}",
                    existing_file.name(),
                    e
                )))
            }
        };

        let matched = outcome == ComparisonOutcome::Matched;
        report.comparisons.push(Comparison {
            id: existing_file.id.clone(),
            outcome,
        });

        if matched {
            report.matched = Some(existing_file.id.clone());
            break;
        }
    }

    tracing::debug!(
        file_name = %candidate.name,
        compared = report.comparisons.len(),
        hashes = report.hashes_computed,
        duplicate = report.is_duplicate(),
        "Duplicate check complete"
    );

    Ok(report)
}

/// Whether the candidate duplicates any existing file
pub fn is_duplicate(candidate: &RawFile, existing: &[ManagedFile]) -> Result<bool, ValidationError> {
    Ok(check(candidate, existing)?.is_duplicate())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::{ErrorCode, PDF_MIME_TYPE};
    use crate::preview::PreviewStore;

    fn accepted(store: &PreviewStore, name: &str, content: &[u8]) -> ManagedFile {
        let source = RawFile::new(name, PDF_MIME_TYPE, content.to_vec());
        ManagedFile {
            id: FileId::generate(),
            preview: Some(store.acquire(source.content.clone()).unwrap()),
            source,
            error: None,
            rotation: 0,
            page_count: None,
        }
    }

    #[test]
    fn test_no_prefilter_match_computes_no_hash() {
        let store = PreviewStore::new();
        let existing = vec![
            accepted(&store, "a.pdf", b"same-bytes"),
            accepted(&store, "b.pdf", b"other"),
        ];

        // Same bytes as a.pdf but a different name
        let candidate = RawFile::new("c.pdf", PDF_MIME_TYPE, b"same-bytes".to_vec());
        let report = check(&candidate, &existing).unwrap();

        assert!(!report.is_duplicate());
        assert_eq!(report.hashes_computed, 0);
        assert!(report.comparisons.is_empty());
    }

    #[test]
    fn test_identical_file_is_duplicate() {
        let store = PreviewStore::new();
        let existing = vec![accepted(&store, "report.pdf", b"%PDF-1.4 body")];

        let candidate = RawFile::new("report.pdf", PDF_MIME_TYPE, b"%PDF-1.4 body".to_vec());
        let report = check(&candidate, &existing).unwrap();

        assert!(report.is_duplicate());
        assert_eq!(report.matched.as_ref(), Some(&existing[0].id));
        assert_eq!(report.hashes_computed, 2);
    }

    #[test]
    fn test_same_name_and_size_different_content() {
        let store = PreviewStore::new();
        let existing = vec![accepted(&store, "report.pdf", b"aaaa")];

        let candidate = RawFile::new("report.pdf", PDF_MIME_TYPE, b"bbbb".to_vec());
        let report = check(&candidate, &existing).unwrap();

        assert!(!report.is_duplicate());
        assert_eq!(report.comparisons[0].outcome, ComparisonOutcome::Differs);
        assert!(!is_duplicate(&candidate, &existing).unwrap());
    }

    #[test]
    fn test_unreadable_file_is_skipped() {
        let store = PreviewStore::new();
        let existing = vec![
            accepted(&store, "report.pdf", b"xxxx"),
            accepted(&store, "report.pdf", b"data"),
        ];
        store.revoke(existing[0].preview.as_ref().unwrap().id());

        let candidate = RawFile::new("report.pdf", PDF_MIME_TYPE, b"data".to_vec());
        let report = check(&candidate, &existing).unwrap();

        assert!(report.is_duplicate());
        assert_eq!(report.matched.as_ref(), Some(&existing[1].id));
        assert_eq!(report.skipped().count(), 1);
        match &report.comparisons[0].outcome {
            ComparisonOutcome::Unreadable(e) => assert_eq!(e.code, ErrorCode::ProcessingError),
            other => panic!("expected unreadable, got {:?}", other),
        }
    }

    #[test]
    fn test_file_without_preview_uses_raw_source() {
        let existing = vec![ManagedFile::failed(
            RawFile::new("report.pdf", PDF_MIME_TYPE, b"data".to_vec()),
            "parse failed",
        )];

        let candidate = RawFile::new("report.pdf", PDF_MIME_TYPE, b"data".to_vec());
        assert!(is_duplicate(&candidate, &existing).unwrap());
    }

    #[test]
    fn test_stops_at_first_match() {
        let store = PreviewStore::new();
        let existing = vec![
            accepted(&store, "r.pdf", b"same"),
            accepted(&store, "r.pdf", b"same"),
        ];

        let candidate = RawFile::new("r.pdf", PDF_MIME_TYPE, b"same".to_vec());
        let report = check(&candidate, &existing).unwrap();

        assert_eq!(report.comparisons.len(), 1);
        assert_eq!(report.matched.as_ref(), Some(&existing[0].id));
    }
}
