//! Page tree editing with lopdf
//!
//! Everything here is synchronous and CPU-bound; async callers go through
//! `tokio::task::spawn_blocking` (see `organizer`).

use lopdf::{Dictionary, Document, Object, ObjectId};

use crate::intake::{normalize_rotation, ByteSource, ManagedFile, ValidationError};

use super::types::{MergePosition, PdfBlob, PdfEditError};

/// Page attributes a page inherits from its ancestors in the page tree
const INHERITABLE_KEYS: &[&[u8]] = &[b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Guard against cyclic /Parent chains in broken files
const MAX_TREE_DEPTH: usize = 64;

// ============================================================================
// Loading and Saving
// ============================================================================

/// Parse bytes into an editable document
pub fn load(data: &[u8]) -> Result<Document, PdfEditError> {
    Document::load_mem(data).map_err(|e| PdfEditError::Load(e.to_string()))
}

/// Serialize a document back to bytes
pub fn save(doc: &mut Document) -> Result<PdfBlob, PdfEditError> {
    let page_count = doc.get_pages().len() as u32;
    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)
        .map_err(|e| PdfEditError::Save(e.to_string()))?;
    Ok(PdfBlob::new(buffer, page_count))
}

/// Number of pages, for metadata
pub fn page_count(data: &[u8]) -> Result<u32, PdfEditError> {
    Ok(load(data)?.get_pages().len() as u32)
}

/// Effective /Rotate of every page, in page order
pub fn page_rotations(data: &[u8]) -> Result<Vec<i32>, PdfEditError> {
    let doc = load(data)?;
    doc.get_pages()
        .values()
        .map(|&page_id| effective_rotation(&doc, page_id))
        .collect()
}

// ============================================================================
// Rotation
// ============================================================================

/// Add `degrees` to every page's rotation, wrapping into [0, 360)
pub fn rotate_document(doc: &mut Document, degrees: i32) -> Result<(), PdfEditError> {
    if degrees % 90 != 0 {
        return Err(PdfEditError::InvalidRotation(degrees));
    }
    if degrees == 0 {
        return Ok(());
    }

    let degrees = normalize_rotation(degrees);
    let page_ids: Vec<ObjectId> = doc.get_pages().values().copied().collect();
    for page_id in page_ids {
        let current = effective_rotation(doc, page_id)?;
        let rotated = normalize_rotation(current + degrees);
        page_dict_mut(doc, page_id)?.set("Rotate", rotated as i64);
    }

    Ok(())
}

/// Rotate raw PDF bytes and serialize the result
pub fn rotate_bytes(data: &[u8], degrees: i32) -> Result<PdfBlob, PdfEditError> {
    let mut doc = load(data)?;
    rotate_document(&mut doc, degrees)?;
    save(&mut doc)
}

/// Rebuild a managed file's PDF with `rotation_degrees` applied to every page.
///
/// The file's display rotation is not consulted; the caller passes the
/// rotation it wants baked in.
pub fn extract(file: &ManagedFile, rotation_degrees: i32) -> Result<PdfBlob, ValidationError> {
    let handle = file
        .preview
        .as_ref()
        .ok_or_else(|| PdfEditError::Read(format!("\"{}\" has no preview", file.name())))?;
    let data = handle
        .read_bytes()
        .map_err(|e| PdfEditError::Read(e.to_string()))?;

    let blob = rotate_bytes(&data, rotation_degrees).map_err(|e| {
        tracing::error!(file_id = %file.id, error = %e, "Error extracting PDF");
        e
    })?;

    tracing::info!(
        file_id = %file.id,
        rotation = rotation_degrees,
        pages = blob.page_count,
        size = blob.len(),
        "Extracted PDF"
    );

    Ok(blob)
}

// ============================================================================
// Merging
// ============================================================================

/// Combine two documents' pages into one, `secondary` placed before or after
/// the pages of `primary`
pub fn merge_documents(
    mut primary: Document,
    mut secondary: Document,
    position: MergePosition,
) -> Result<Document, PdfEditError> {
    // Pin inherited attributes on the pages that are about to be re-parented
    let secondary_page_ids: Vec<ObjectId> = secondary.get_pages().values().copied().collect();
    for &page_id in &secondary_page_ids {
        pin_inherited_attributes(&mut secondary, page_id)?;
    }

    secondary.renumber_objects_with(primary.max_id + 1);
    let secondary_page_ids: Vec<ObjectId> = secondary.get_pages().values().copied().collect();

    let pages_root_id = pages_root(&primary)?;

    primary.max_id = primary.max_id.max(secondary.max_id);
    primary.objects.extend(secondary.objects);

    {
        let pages_dict = primary
            .get_object_mut(pages_root_id)
            .and_then(Object::as_dict_mut)
            .map_err(|_| PdfEditError::Structure("missing pages dictionary".into()))?;

        let kids = pages_dict
            .get_mut(b"Kids")
            .and_then(Object::as_array_mut)
            .map_err(|_| PdfEditError::Structure("missing /Kids".into()))?;

        let added = secondary_page_ids.iter().map(|&id| Object::Reference(id));
        match position {
            MergePosition::After => kids.extend(added),
            MergePosition::Before => {
                let existing = std::mem::take(kids);
                kids.extend(added);
                kids.extend(existing);
            }
        }

        let count = pages_dict.get(b"Count").and_then(Object::as_i64).unwrap_or(0);
        pages_dict.set("Count", count + secondary_page_ids.len() as i64);
    }

    for page_id in secondary_page_ids {
        page_dict_mut(&mut primary, page_id)?.set("Parent", pages_root_id);
    }

    // The secondary catalog and page tree nodes are unreachable now
    primary.prune_objects();

    Ok(primary)
}

/// Merge `source` into `target` and serialize the result
pub fn merge(
    target: &ManagedFile,
    source: &ManagedFile,
    position: MergePosition,
) -> Result<PdfBlob, ValidationError> {
    let read = |file: &ManagedFile| -> Result<Document, PdfEditError> {
        let handle = file
            .preview
            .as_ref()
            .ok_or_else(|| PdfEditError::Read(format!("\"{}\" has no preview", file.name())))?;
        let data = handle
            .read_bytes()
            .map_err(|e| PdfEditError::Read(e.to_string()))?;
        load(&data)
    };

    let primary = read(target)?;
    let secondary = read(source)?;
    let mut merged = merge_documents(primary, secondary, position)?;
    let blob = save(&mut merged)?;

    tracing::info!(
        target_id = %target.id,
        source_id = %source.id,
        position = ?position,
        pages = blob.page_count,
        "Merged PDFs"
    );

    Ok(blob)
}

// ============================================================================
// Page Tree Helpers
// ============================================================================

fn pages_root(doc: &Document) -> Result<ObjectId, PdfEditError> {
    let root_id = doc
        .trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .map_err(|_| PdfEditError::Structure("missing /Root".into()))?;

    doc.get_object(root_id)
        .and_then(Object::as_dict)
        .and_then(|catalog| catalog.get(b"Pages"))
        .and_then(Object::as_reference)
        .map_err(|_| PdfEditError::Structure("missing /Pages".into()))
}

fn page_dict_mut(doc: &mut Document, page_id: ObjectId) -> Result<&mut Dictionary, PdfEditError> {
    doc.get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(|e| PdfEditError::Structure(format!("page {:?}: {}", page_id, e)))
}

/// Look a key up on the page, then on each ancestor
fn resolve_inherited<'a>(
    doc: &'a Document,
    page_id: ObjectId,
    key: &[u8],
) -> Result<Option<&'a Object>, PdfEditError> {
    let mut current_id = page_id;
    for _ in 0..MAX_TREE_DEPTH {
        let dict = doc
            .get_object(current_id)
            .and_then(Object::as_dict)
            .map_err(|e| PdfEditError::Structure(format!("failed to get page dictionary: {}", e)))?;

        if let Ok(value) = dict.get(key) {
            return Ok(Some(value));
        }

        match dict.get(b"Parent").and_then(Object::as_reference) {
            Ok(parent_id) => current_id = parent_id,
            Err(_) => return Ok(None),
        }
    }

    Err(PdfEditError::Structure("page tree too deep".into()))
}

/// Rotation of a page after inheritance, normalized into [0, 360)
fn effective_rotation(doc: &Document, page_id: ObjectId) -> Result<i32, PdfEditError> {
    let value = match resolve_inherited(doc, page_id, b"Rotate")? {
        Some(Object::Reference(id)) => doc.get_object(*id).ok(),
        other => other,
    };

    let degrees = match value {
        Some(Object::Integer(i)) => *i,
        Some(Object::Real(r)) => r.round() as i64,
        _ => 0,
    };

    Ok(normalize_rotation((degrees % 360) as i32))
}

fn pin_inherited_attributes(doc: &mut Document, page_id: ObjectId) -> Result<(), PdfEditError> {
    let mut pinned = Vec::new();
    {
        let page = doc
            .get_object(page_id)
            .and_then(Object::as_dict)
            .map_err(|e| PdfEditError::Structure(e.to_string()))?;
        for key in INHERITABLE_KEYS {
            if page.has(key) {
                continue;
            }
            // Without a value of its own the page would inherit from the new parent
            match resolve_inherited(doc, page_id, key)? {
                Some(value) => pinned.push((key.to_vec(), value.clone())),
                None => {
                    if let Some(value) = inherited_default(key) {
                        pinned.push((key.to_vec(), value));
                    }
                }
            }
        }
    }

    let page = page_dict_mut(doc, page_id)?;
    for (key, value) in pinned {
        page.set(key, value);
    }
    Ok(())
}

/// Value a page takes when neither it nor its ancestors set `key`
fn inherited_default(key: &[u8]) -> Option<Object> {
    match key {
        b"Rotate" => Some(Object::Integer(0)),
        b"Resources" => Some(Object::Dictionary(Dictionary::new())),
        _ => None,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use lopdf::dictionary;

    /// Build an N-page PDF, optionally with a /Rotate on the page tree root
    pub(crate) fn sample_pdf(pages: usize, root_rotate: Option<i64>) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id: ObjectId = doc.new_object_id();

        let kids: Vec<Object> = (0..pages)
            .map(|_| {
                doc.add_object(dictionary! {
                    "Type" => "Page",
                    "Parent" => pages_id,
                    "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                })
                .into()
            })
            .collect();

        let mut pages_dict = dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages as i64,
        };
        if let Some(rotate) = root_rotate {
            pages_dict.set("Rotate", rotate);
        }
        doc.objects.insert(pages_id, Object::Dictionary(pages_dict));

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf).expect("failed to save test PDF");
        buf
    }

    /// A PDF whose pages carry distinct widths so order can be checked
    fn sized_pdf(widths: &[i64]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id: ObjectId = doc.new_object_id();
        let kids: Vec<Object> = widths
            .iter()
            .map(|&w| {
                doc.add_object(dictionary! {
                    "Type" => "Page",
                    "Parent" => pages_id,
                    "MediaBox" => vec![0.into(), 0.into(), w.into(), 792.into()],
                })
                .into()
            })
            .collect();
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => widths.len() as i64,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf).expect("failed to save test PDF");
        buf
    }

    fn page_widths(data: &[u8]) -> Vec<i64> {
        let doc = load(data).unwrap();
        doc.get_pages()
            .values()
            .map(|&id| {
                let media_box = resolve_inherited(&doc, id, b"MediaBox").unwrap().unwrap();
                media_box.as_array().unwrap()[2].as_i64().unwrap()
            })
            .collect()
    }

    #[test]
    fn test_page_count() {
        assert_eq!(page_count(&sample_pdf(5, None)).unwrap(), 5);
    }

    #[test]
    fn test_corrupt_bytes_fail_to_load() {
        assert!(matches!(
            page_count(b"%PDF-1.4 this is not a pdf"),
            Err(PdfEditError::Load(_))
        ));
    }

    #[test]
    fn test_rotation_zero_preserves_pages() {
        let blob = rotate_bytes(&sample_pdf(3, None), 0).unwrap();
        assert_eq!(blob.page_count, 3);
        assert_eq!(page_count(&blob.bytes).unwrap(), 3);
        assert_eq!(page_rotations(&blob.bytes).unwrap(), vec![0, 0, 0]);
    }

    #[test]
    fn test_negative_rotation_wraps() {
        let blob = rotate_bytes(&sample_pdf(2, None), -90).unwrap();
        assert_eq!(page_rotations(&blob.bytes).unwrap(), vec![270, 270]);
    }

    #[test]
    fn test_rotation_is_cumulative_across_calls() {
        let once = rotate_bytes(&sample_pdf(2, None), 90).unwrap();
        assert_eq!(page_rotations(&once.bytes).unwrap(), vec![90, 90]);

        let twice = rotate_bytes(&once.bytes, 270).unwrap();
        assert_eq!(page_rotations(&twice.bytes).unwrap(), vec![0, 0]);
    }

    #[test]
    fn test_rotation_near_i32_max_wraps() {
        let rotated = rotate_bytes(&sample_pdf(2, None), 270).unwrap();
        let blob = rotate_bytes(&rotated.bytes, 2147483610).unwrap();
        assert_eq!(page_rotations(&blob.bytes).unwrap(), vec![0, 0]);
    }

    #[test]
    fn test_rotation_respects_inherited_value() {
        let blob = rotate_bytes(&sample_pdf(2, Some(180)), 90).unwrap();
        assert_eq!(page_rotations(&blob.bytes).unwrap(), vec![270, 270]);
    }

    #[test]
    fn test_rejects_non_right_angle() {
        assert!(matches!(
            rotate_bytes(&sample_pdf(1, None), 45),
            Err(PdfEditError::InvalidRotation(45))
        ));
    }

    #[test]
    fn test_merge_after() {
        let primary = load(&sized_pdf(&[100, 200])).unwrap();
        let secondary = load(&sized_pdf(&[300])).unwrap();

        let mut merged = merge_documents(primary, secondary, MergePosition::After).unwrap();
        let blob = save(&mut merged).unwrap();

        assert_eq!(blob.page_count, 3);
        assert_eq!(page_widths(&blob.bytes), vec![100, 200, 300]);
    }

    #[test]
    fn test_merge_before() {
        let primary = load(&sized_pdf(&[100, 200])).unwrap();
        let secondary = load(&sized_pdf(&[300, 400])).unwrap();

        let mut merged = merge_documents(primary, secondary, MergePosition::Before).unwrap();
        let blob = save(&mut merged).unwrap();

        assert_eq!(page_widths(&blob.bytes), vec![300, 400, 100, 200]);
    }

    #[test]
    fn test_merge_keeps_inherited_rotation() {
        let primary = load(&sample_pdf(1, None)).unwrap();
        let secondary = load(&sample_pdf(1, Some(90))).unwrap();

        let mut merged = merge_documents(primary, secondary, MergePosition::After).unwrap();
        let blob = save(&mut merged).unwrap();

        assert_eq!(page_rotations(&blob.bytes).unwrap(), vec![0, 90]);
    }

    #[test]
    fn test_merge_does_not_inherit_target_rotation() {
        for (position, expected) in [
            (MergePosition::After, vec![90, 90, 0]),
            (MergePosition::Before, vec![0, 90, 90]),
        ] {
            let primary = load(&sample_pdf(2, Some(90))).unwrap();
            let secondary = load(&sample_pdf(1, None)).unwrap();

            let mut merged = merge_documents(primary, secondary, position).unwrap();
            let blob = save(&mut merged).unwrap();

            assert_eq!(page_rotations(&blob.bytes).unwrap(), expected);
        }
    }
}
