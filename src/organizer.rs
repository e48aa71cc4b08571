//! Organizer service
//!
//! Async front for the working collection. Intake (validation, page counting,
//! duplicate hashing) and PDF rewriting are CPU-bound, so they run on the
//! blocking pool under a timeout; the collection lock is taken from inside
//! the blocking task so "check for duplicates, then append" is atomic.
//! A timed-out intake races its blocking task through an [`IntakeTicket`]:
//! whichever side claims it first decides whether the file is appended.
//!
//! Display rotation and file rotation stay separate: `rotate` only updates
//! the record, `extract` bakes a rotation into new PDF bytes.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use axum::body::Bytes;
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::JoinError;
use tokio::time::{timeout, Duration};

use crate::collection::{FileMetadataView, FileSummary, WorkingCollection};
use crate::error::{AppError, Result};
use crate::intake::{
    duplicate, validator, ErrorCode, FileId, IntakeOptions, MetadataBuilder, RawFile,
    ValidationError,
};
use crate::pdf::{self, MergePosition, PdfBlob};
use crate::preview::PreviewStore;

/// Timeout for intake of one file (hashing + parsing)
const INTAKE_TIMEOUT_SECS: u64 = 30;
/// Timeout for extraction and merging
const PROCESSING_TIMEOUT_SECS: u64 = 30;

/// The collection as shared between requests
pub type SharedCollection = Arc<RwLock<WorkingCollection>>;

// ============================================================================
// Intake Results
// ============================================================================

/// Why one uploaded file was not accepted
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Rejection {
    pub file_name: String,
    pub code: ErrorCode,
    pub message: String,
}

impl Rejection {
    fn new(file_name: impl Into<String>, error: ValidationError) -> Self {
        Self {
            file_name: file_name.into(),
            code: error.code,
            message: error.message,
        }
    }
}

/// Result of taking in one file
#[derive(Debug, Clone)]
pub enum IntakeOutcome {
    Accepted(FileSummary),
    Rejected(Rejection),
}

/// Results of a batch, in upload order within each list
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntakeReport {
    pub accepted: Vec<FileSummary>,
    pub rejected: Vec<Rejection>,
}

impl IntakeReport {
    fn push(&mut self, outcome: IntakeOutcome) {
        match outcome {
            IntakeOutcome::Accepted(summary) => self.accepted.push(summary),
            IntakeOutcome::Rejected(rejection) => self.rejected.push(rejection),
        }
    }
}

// ============================================================================
// Organizer
// ============================================================================

/// Owns the working collection and the preview store
#[derive(Clone)]
pub struct Organizer {
    inner: Arc<OrganizerInner>,
}

struct OrganizerInner {
    builder: MetadataBuilder,
    previews: PreviewStore,
    collection: SharedCollection,
    intake_timeout: Duration,
}

impl Organizer {
    pub fn new(previews: PreviewStore, options: IntakeOptions) -> Self {
        Self::with_intake_timeout(previews, options, Duration::from_secs(INTAKE_TIMEOUT_SECS))
    }

    pub fn with_intake_timeout(
        previews: PreviewStore,
        options: IntakeOptions,
        intake_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(OrganizerInner {
                builder: MetadataBuilder::with_options(previews.clone(), options),
                previews,
                collection: Arc::new(RwLock::new(WorkingCollection::new())),
                intake_timeout,
            }),
        }
    }

    pub fn previews(&self) -> &PreviewStore {
        &self.inner.previews
    }

    pub fn options(&self) -> &IntakeOptions {
        self.inner.builder.options()
    }

    // ========================================================================
    // Intake
    // ========================================================================

    /// Take in one file: validate, build, check for duplicates, append
    pub async fn intake(&self, file: RawFile) -> IntakeOutcome {
        let file_name = file.name.clone();
        let builder = self.inner.builder.clone();
        let collection = self.inner.collection.clone();

        let ticket = Arc::new(IntakeTicket::default());
        let task_ticket = ticket.clone();
        let intake_timeout = self.inner.intake_timeout;

        let mut task = tokio::task::spawn_blocking(move || {
            intake_blocking(&builder, &collection, file, &task_ticket)
        });

        let outcome = match timeout(intake_timeout, &mut task).await {
            Ok(joined) => joined_outcome(&file_name, joined),
            Err(_) if ticket.cancel() => {
                tracing::error!(
                    file_name = %file_name,
                    timeout_ms = intake_timeout.as_millis() as u64,
                    "Intake timed out"
                );
                timed_out(&file_name, intake_timeout)
            }
            // The task already committed; its append is done or about to be
            Err(_) => joined_outcome(&file_name, task.await),
        };

        match &outcome {
            IntakeOutcome::Accepted(summary) => tracing::info!(
                file_id = %summary.id,
                file_name = %summary.name,
                pages = ?summary.page_count,
                "File accepted"
            ),
            IntakeOutcome::Rejected(rejection) => tracing::info!(
                file_name = %rejection.file_name,
                code = %rejection.code,
                "File rejected: {}",
                rejection.message
            ),
        }

        outcome
    }

    /// Take in several files one after another. One failure never stops the
    /// rest.
    pub async fn intake_batch(&self, files: Vec<RawFile>) -> IntakeReport {
        let mut report = IntakeReport::default();
        for file in files {
            report.push(self.intake(file).await);
        }
        report
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub async fn list(&self) -> Vec<FileSummary> {
        let files = self.inner.collection.read().await;
        files.iter().map(FileSummary::from).collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.collection.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.collection.read().await.is_empty()
    }

    pub async fn summary(&self, id: &FileId) -> Result<FileSummary> {
        let files = self.inner.collection.read().await;
        Ok(FileSummary::from(files.get(id)?))
    }

    pub async fn metadata(&self, id: &FileId) -> Result<FileMetadataView> {
        let files = self.inner.collection.read().await;
        Ok(FileMetadataView::from(files.get(id)?))
    }

    /// Raw bytes through the preview handle, with the file name
    pub async fn content(&self, id: &FileId) -> Result<(String, Bytes)> {
        let files = self.inner.collection.read().await;
        let file = files.get(id)?;
        let handle = usable_preview(file)?;
        let data = handle
            .read()
            .map_err(|e| ValidationError::processing(format!("Failed to read the PDF file: {}", e)))?;
        Ok((file.name().to_string(), data))
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Display rotation only
    pub async fn rotate(&self, id: &FileId, degrees: i32) -> Result<FileSummary> {
        if degrees % 90 != 0 {
            return Err(AppError::BadRequest(format!(
                "Rotation must be a multiple of 90 degrees, got {}",
                degrees
            )));
        }
        let mut files = self.inner.collection.write().await;
        let rotation = files.rotate(id, degrees)?;
        tracing::debug!(file_id = %id, rotation = rotation, "Rotated file");
        Ok(FileSummary::from(files.get(id)?))
    }

    pub async fn move_item(&self, id: &FileId, to_index: usize) -> Result<Vec<FileSummary>> {
        let mut files = self.inner.collection.write().await;
        files.move_item(id, to_index)?;
        Ok(files.iter().map(FileSummary::from).collect())
    }

    pub async fn reorder(&self, order: &[FileId]) -> Result<Vec<FileSummary>> {
        let mut files = self.inner.collection.write().await;
        files.reorder(order)?;
        tracing::debug!(count = order.len(), "Reordered collection");
        Ok(files.iter().map(FileSummary::from).collect())
    }

    /// Remove a file and release its preview handle
    pub async fn delete(&self, id: &FileId) -> Result<()> {
        let mut files = self.inner.collection.write().await;
        files.delete(id)?;
        Ok(())
    }

    /// Remove every file. Returns how many were removed.
    pub async fn clear(&self) -> usize {
        let mut files = self.inner.collection.write().await;
        files.clear()
    }

    // ========================================================================
    // PDF Output
    // ========================================================================

    /// Rebuild a file's PDF with a rotation baked into every page.
    ///
    /// `rotation` defaults to the file's current display rotation.
    pub async fn extract(&self, id: &FileId, rotation: Option<i32>) -> Result<PdfBlob> {
        let collection = self.inner.collection.clone();
        let id = id.clone();

        run_blocking(move || {
            let files = collection.blocking_read();
            let file = files.get(&id)?;
            usable_preview(file)?;
            let rotation = rotation.unwrap_or(file.rotation);
            Ok(pdf::extract(file, rotation)?)
        })
        .await
    }

    /// Merge `source_id`'s pages into `target_id`'s document
    pub async fn merge(
        &self,
        target_id: &FileId,
        source_id: &FileId,
        position: MergePosition,
    ) -> Result<PdfBlob> {
        if target_id == source_id {
            return Err(AppError::BadRequest("Cannot merge a file with itself".to_string()));
        }

        let collection = self.inner.collection.clone();
        let target_id = target_id.clone();
        let source_id = source_id.clone();

        run_blocking(move || {
            let files = collection.blocking_read();
            let target = files.get(&target_id)?;
            let source = files.get(&source_id)?;
            usable_preview(target)?;
            usable_preview(source)?;
            Ok(pdf::merge(target, source, position)?)
        })
        .await
    }
}

// ============================================================================
// Helpers
// ============================================================================

// ============================================================================
// Intake Ticket
// ============================================================================

const TICKET_PENDING: u8 = 0;
const TICKET_COMMITTED: u8 = 1;
const TICKET_CANCELLED: u8 = 2;

/// One-shot claim shared by an intake and its blocking task. Exactly one of
/// `commit` and `cancel` succeeds.
#[derive(Debug, Default)]
struct IntakeTicket(AtomicU8);

impl IntakeTicket {
    fn commit(&self) -> bool {
        self.claim(TICKET_COMMITTED)
    }

    fn cancel(&self) -> bool {
        self.claim(TICKET_CANCELLED)
    }

    fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire) == TICKET_CANCELLED
    }

    fn claim(&self, state: u8) -> bool {
        self.0
            .compare_exchange(TICKET_PENDING, state, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

fn joined_outcome(
    file_name: &str,
    joined: std::result::Result<IntakeOutcome, JoinError>,
) -> IntakeOutcome {
    match joined {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!(file_name = %file_name, error = %e, "Intake task failed");
            IntakeOutcome::Rejected(Rejection::new(
                file_name,
                ValidationError::processing(format!(
                    "Failed to process file \"{}\": {}",
                    file_name, e
                )),
            ))
        }
    }
}

fn timed_out(file_name: &str, after: Duration) -> IntakeOutcome {
    IntakeOutcome::Rejected(Rejection::new(
        file_name,
        ValidationError::processing(format!(
            "Failed to process file \"{}\": timed out after {} seconds",
            file_name,
            after.as_secs()
        )),
    ))
}

fn cancelled(file_name: &str) -> IntakeOutcome {
    IntakeOutcome::Rejected(Rejection::new(
        file_name,
        ValidationError::processing(format!(
            "Failed to process file \"{}\": intake was cancelled",
            file_name
        )),
    ))
}

fn intake_blocking(
    builder: &MetadataBuilder,
    collection: &SharedCollection,
    file: RawFile,
    ticket: &IntakeTicket,
) -> IntakeOutcome {
    let file_name = file.name.clone();

    // Validated here as well as in the builder to keep the error code
    if let Some(error) = validator::validate(&file, builder.options().max_file_size) {
        return IntakeOutcome::Rejected(Rejection::new(file_name, error));
    }

    let managed = builder.build(file);
    if let Some(message) = managed.error.clone() {
        return IntakeOutcome::Rejected(Rejection::new(
            file_name,
            ValidationError::processing(message),
        ));
    }

    if ticket.is_cancelled() {
        return cancelled(&file_name);
    }

    let mut files = collection.blocking_write();
    match duplicate::check(&managed.source, files.files()) {
        Ok(report) if report.is_duplicate() => {
            tracing::debug!(
                file_name = %file_name,
                existing = ?report.matched,
                "Duplicate upload"
            );
            IntakeOutcome::Rejected(Rejection::new(
                &file_name,
                ValidationError::duplicate_file(format!(
                    "File \"{}\" is already in the list",
                    file_name
                )),
            ))
        }
        // Dropping `managed` releases its preview handle
        Ok(_) if !ticket.commit() => {
            tracing::warn!(file_name = %file_name, "Intake cancelled before append");
            cancelled(&file_name)
        }
        Ok(_) => match files.push(managed) {
            Ok(added) => IntakeOutcome::Accepted(FileSummary::from(added)),
            Err(e) => IntakeOutcome::Rejected(Rejection::new(
                file_name,
                ValidationError::processing(e.to_string()),
            )),
        },
        Err(error) => IntakeOutcome::Rejected(Rejection::new(file_name, error)),
    }
}

/// Files that failed intake are never previewed or extracted
fn usable_preview(file: &crate::intake::ManagedFile) -> Result<&crate::preview::PreviewHandle> {
    match (&file.error, &file.preview) {
        (None, Some(handle)) => Ok(handle),
        (Some(error), _) => Err(AppError::BadRequest(format!(
            "File \"{}\" failed intake: {}",
            file.name(),
            error
        ))),
        (None, None) => Err(ValidationError::processing(format!(
            "File \"{}\" has no preview",
            file.name()
        ))
        .into()),
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    match timeout(
        Duration::from_secs(PROCESSING_TIMEOUT_SECS),
        tokio::task::spawn_blocking(f),
    )
    .await
    {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => Err(AppError::Internal(format!("Processing task failed: {}", e))),
        Err(_) => Err(ValidationError::processing(format!(
            "Processing timed out after {} seconds",
            PROCESSING_TIMEOUT_SECS
        ))
        .into()),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::PDF_MIME_TYPE;
    use crate::pdf::editor::tests::sample_pdf;

    fn organizer() -> Organizer {
        Organizer::new(PreviewStore::new(), IntakeOptions::default())
    }

    fn accepted(outcome: IntakeOutcome) -> FileSummary {
        match outcome {
            IntakeOutcome::Accepted(summary) => summary,
            IntakeOutcome::Rejected(r) => panic!("unexpected rejection: {:?}", r),
        }
    }

    fn rejected(outcome: IntakeOutcome) -> Rejection {
        match outcome {
            IntakeOutcome::Rejected(r) => r,
            IntakeOutcome::Accepted(s) => panic!("unexpected acceptance: {:?}", s),
        }
    }

    #[tokio::test]
    async fn test_intake_accepts_pdf() {
        let organizer = organizer();
        let summary = accepted(
            organizer
                .intake(RawFile::new("report.pdf", PDF_MIME_TYPE, sample_pdf(5, None)))
                .await,
        );

        assert_eq!(summary.page_count, Some(5));
        assert_eq!(summary.error, None);
        assert_eq!(organizer.len().await, 1);
        assert_eq!(organizer.previews().live_handles(), 1);
    }

    #[test]
    fn test_ticket_claims_once() {
        let ticket = IntakeTicket::default();
        assert!(ticket.cancel());
        assert!(!ticket.commit());
        assert!(ticket.is_cancelled());

        let ticket = IntakeTicket::default();
        assert!(ticket.commit());
        assert!(!ticket.cancel());
        assert!(!ticket.is_cancelled());
    }

    #[test]
    fn test_cancelled_intake_is_not_appended() {
        let previews = PreviewStore::new();
        let builder = MetadataBuilder::with_options(previews.clone(), IntakeOptions::default());
        let collection: SharedCollection = Arc::new(RwLock::new(WorkingCollection::new()));

        let ticket = IntakeTicket::default();
        assert!(ticket.cancel());

        let file = RawFile::new("late.pdf", PDF_MIME_TYPE, sample_pdf(1, None));
        let rejection = rejected(intake_blocking(&builder, &collection, file, &ticket));

        assert_eq!(rejection.code, ErrorCode::ProcessingError);
        assert!(rejection.message.contains("cancelled"));
        assert!(collection.blocking_read().is_empty());
        assert_eq!(previews.live_handles(), 0);
    }

    #[tokio::test]
    async fn test_timed_out_intake_agrees_with_collection() {
        let organizer = Organizer::with_intake_timeout(
            PreviewStore::new(),
            IntakeOptions::default(),
            Duration::ZERO,
        );

        for i in 0..8 {
            let name = format!("race-{}.pdf", i);
            let outcome = organizer
                .intake(RawFile::new(name.as_str(), PDF_MIME_TYPE, sample_pdf(i + 1, None)))
                .await;
            let listed = organizer.list().await.iter().any(|f| f.name == name);

            match outcome {
                IntakeOutcome::Accepted(_) => assert!(listed),
                IntakeOutcome::Rejected(r) => {
                    assert!(!listed);
                    assert_eq!(r.code, ErrorCode::ProcessingError);
                }
            }
        }

        // Let any cancelled task finish dropping its handle
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(organizer.previews().live_handles(), organizer.len().await);
    }

    #[tokio::test]
    async fn test_duplicate_is_rejected_and_released() {
        let organizer = organizer();
        let pdf = sample_pdf(2, None);
        accepted(organizer.intake(RawFile::new("a.pdf", PDF_MIME_TYPE, pdf.clone())).await);

        let rejection = rejected(organizer.intake(RawFile::new("a.pdf", PDF_MIME_TYPE, pdf)).await);

        assert_eq!(rejection.code, ErrorCode::DuplicateFile);
        assert_eq!(organizer.len().await, 1);
        assert_eq!(organizer.previews().live_handles(), 1);
    }

    #[tokio::test]
    async fn test_batch_keeps_going_after_failures() {
        let organizer = organizer();
        let report = organizer
            .intake_batch(vec![
                RawFile::new("notes.docx", "", b"PK".to_vec()),
                RawFile::new("broken.pdf", PDF_MIME_TYPE, b"garbage".to_vec()),
                RawFile::new("good.pdf", PDF_MIME_TYPE, sample_pdf(1, None)),
            ])
            .await;

        assert_eq!(report.accepted.len(), 1);
        assert_eq!(report.accepted[0].name, "good.pdf");
        let codes: Vec<ErrorCode> = report.rejected.iter().map(|r| r.code).collect();
        assert_eq!(codes, vec![ErrorCode::UnsupportedType, ErrorCode::ProcessingError]);
    }

    #[tokio::test]
    async fn test_rotate_then_extract_uses_display_rotation() {
        let organizer = organizer();
        let summary = accepted(
            organizer
                .intake(RawFile::new("r.pdf", PDF_MIME_TYPE, sample_pdf(2, None)))
                .await,
        );

        organizer.rotate(&summary.id, -90).await.unwrap();
        let rotated = organizer.rotate(&summary.id, -90).await.unwrap();
        assert_eq!(rotated.rotation, 180);

        let blob = organizer.extract(&summary.id, None).await.unwrap();
        assert_eq!(pdf::page_rotations(&blob.bytes).unwrap(), vec![180, 180]);

        // Explicit rotation wins over display rotation
        let blob = organizer.extract(&summary.id, Some(0)).await.unwrap();
        assert_eq!(pdf::page_rotations(&blob.bytes).unwrap(), vec![0, 0]);
    }

    #[tokio::test]
    async fn test_rotate_and_extract_huge_angles() {
        let organizer = organizer();
        let summary = accepted(
            organizer
                .intake(RawFile::new("r.pdf", PDF_MIME_TYPE, sample_pdf(2, None)))
                .await,
        );

        // 2147483610 is 90 mod 360
        organizer.rotate(&summary.id, 2147483610).await.unwrap();
        let rotated = organizer.rotate(&summary.id, 2147483610).await.unwrap();
        assert_eq!(rotated.rotation, 180);

        let blob = organizer.extract(&summary.id, Some(2147483610)).await.unwrap();
        assert_eq!(pdf::page_rotations(&blob.bytes).unwrap(), vec![90, 90]);
    }

    #[tokio::test]
    async fn test_rotate_rejects_odd_angles() {
        let organizer = organizer();
        let summary = accepted(
            organizer
                .intake(RawFile::new("r.pdf", PDF_MIME_TYPE, sample_pdf(1, None)))
                .await,
        );
        assert!(matches!(
            organizer.rotate(&summary.id, 45).await,
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_releases_handle() {
        let organizer = organizer();
        let summary = accepted(
            organizer
                .intake(RawFile::new("r.pdf", PDF_MIME_TYPE, sample_pdf(1, None)))
                .await,
        );

        organizer.delete(&summary.id).await.unwrap();

        assert!(organizer.is_empty().await);
        assert_eq!(organizer.previews().live_handles(), 0);
        assert!(matches!(organizer.delete(&summary.id).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_merge_combines_pages() {
        let organizer = organizer();
        let a = accepted(organizer.intake(RawFile::new("a.pdf", PDF_MIME_TYPE, sample_pdf(2, None))).await);
        let b = accepted(organizer.intake(RawFile::new("b.pdf", PDF_MIME_TYPE, sample_pdf(3, None))).await);

        let blob = organizer.merge(&a.id, &b.id, MergePosition::After).await.unwrap();
        assert_eq!(blob.page_count, 5);
        assert_eq!(pdf::page_count(&blob.bytes).unwrap(), 5);

        assert!(matches!(
            organizer.merge(&a.id, &a.id, MergePosition::Before).await,
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_extract_unknown_file() {
        let organizer = organizer();
        assert!(matches!(
            organizer.extract(&FileId::from("missing"), None).await,
            Err(AppError::NotFound(_))
        ));
    }
}
