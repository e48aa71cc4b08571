//! File details panel: name, size, modified date and page count of one file

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::intake::{FileId, ManagedFile};

/// Read-only view of a file's details, labels pre-formatted for display
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadataView {
    pub id: FileId,
    pub name: String,
    pub size: u64,
    pub size_label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
    pub modified_label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pages_label: Option<String>,
    pub rotation: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Summary of a file for the thumbnail grid
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSummary {
    pub id: FileId,
    pub name: String,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<u32>,
    pub rotation: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&ManagedFile> for FileSummary {
    fn from(file: &ManagedFile) -> Self {
        Self {
            id: file.id.clone(),
            name: file.name().to_string(),
            size: file.size(),
            page_count: file.page_count,
            rotation: file.rotation,
            error: file.error.clone(),
        }
    }
}

impl From<&ManagedFile> for FileMetadataView {
    fn from(file: &ManagedFile) -> Self {
        let name = if file.name().is_empty() {
            "Unnamed file".to_string()
        } else {
            file.name().to_string()
        };

        Self {
            id: file.id.clone(),
            name,
            size: file.size(),
            size_label: format_size(file.size()),
            modified: file.last_modified(),
            modified_label: format_date(file.last_modified()),
            page_count: file.page_count,
            pages_label: file.page_count.map(pages_label),
            rotation: file.rotation,
            error: file.error.clone(),
        }
    }
}

/// Human-readable size with one decimal: "2.0 MB"
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    format!("{:.1} {}", size, UNITS[unit])
}

/// Medium date, short time: "Oct 19, 2026, 3:04 PM"
pub fn format_date(date: Option<DateTime<Utc>>) -> String {
    match date {
        Some(date) => date.format("%b %-d, %Y, %-I:%M %p").to_string(),
        None => "Unknown date".to_string(),
    }
}

pub fn pages_label(count: u32) -> String {
    if count == 1 {
        "1 page".to_string()
    } else {
        format!("{} pages", count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0.0 B");
        assert_eq!(format_size(512), "512.0 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(2 * 1024 * 1024), "2.0 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.0 GB");
        // Stays in GB past the last unit
        assert_eq!(format_size(2048 * 1024 * 1024 * 1024), "2048.0 GB");
    }

    #[test]
    fn test_format_date() {
        let date = Utc.with_ymd_and_hms(2026, 10, 19, 15, 4, 0).unwrap();
        assert_eq!(format_date(Some(date)), "Oct 19, 2026, 3:04 PM");
        assert_eq!(format_date(None), "Unknown date");
    }

    #[test]
    fn test_pages_label() {
        assert_eq!(pages_label(1), "1 page");
        assert_eq!(pages_label(5), "5 pages");
        assert_eq!(pages_label(0), "0 pages");
    }
}
