//! Attachment model (spec.md §3 "File").

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileMetadata {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub size: Option<u64>,
    pub duration: Option<u32>,
    pub filename: Option<String>,
    pub alt: Option<String>,
    #[serde(default)]
    pub is_spoiler: bool,
    pub description: Option<String>,
}

/// Platform-neutral kind of an attachment, used to decide how a sender
/// partitions files (e.g. Telegram albums vs. standalone documents).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Image,
    Photo,
    Video,
    Gif,
    Sticker,
    Voice,
    Document,
    Unsupported,
}

impl FileKind {
    /// Whether this kind belongs in an image/video album rather than being
    /// sent as a standalone document (spec.md §4.5.1 Telegram contract).
    pub fn is_image_like(self) -> bool {
        matches!(self, FileKind::Image | FileKind::Photo | FileKind::Video)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct File {
    #[serde(rename = "type")]
    pub kind: FileKind,
    pub local_path: String,
    pub public_url: String,
    pub extension: String,
    #[serde(default)]
    pub metadata: FileMetadata,
}

impl File {
    pub fn new(kind: FileKind, local_path: impl Into<String>) -> Self {
        Self {
            kind,
            local_path: local_path.into(),
            public_url: String::new(),
            extension: String::new(),
            metadata: FileMetadata::default(),
        }
    }

    /// A `File` with no local path is the sentinel for "download/upload
    /// failed, continue without it" (spec.md §7).
    pub fn is_empty(&self) -> bool {
        self.local_path.is_empty()
    }

    pub fn is_image(&self) -> bool {
        self.kind.is_image_like()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_has_no_local_path() {
        let file = File::new(FileKind::Photo, "");
        assert!(file.is_empty());
    }

    #[test]
    fn non_empty_file_reports_its_kind() {
        let file = File::new(FileKind::Document, "/tmp/report.pdf");
        assert!(!file.is_empty());
        assert!(!file.is_image());
        assert!(File::new(FileKind::Photo, "/tmp/a.jpg").is_image());
    }
}
