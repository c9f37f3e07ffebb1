//! Result types returned by filesystem operations.
//!
//! All of these serialize cleanly so tool engines can hand them to callers
//! as JSON.

use std::fs::Metadata;
use std::os::unix::fs::PermissionsExt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// File type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Symbolic link.
    Symlink,
}

impl FileType {
    pub fn is_file(&self) -> bool {
        matches!(self, FileType::File)
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, FileType::Directory)
    }

    pub fn is_symlink(&self) -> bool {
        matches!(self, FileType::Symlink)
    }
}

impl From<std::fs::FileType> for FileType {
    fn from(ft: std::fs::FileType) -> Self {
        if ft.is_dir() {
            FileType::Directory
        } else if ft.is_symlink() {
            FileType::Symlink
        } else {
            FileType::File
        }
    }
}

/// Directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    pub kind: FileType,
}

impl DirEntry {
    /// `[DIR] name` / `[FILE] name` listing line.
    pub fn listing_line(&self) -> String {
        let tag = if self.kind.is_dir() { "[DIR]" } else { "[FILE]" };
        format!("{tag} {}", self.name)
    }
}

/// Directory entry with its size (zero for directories).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizedEntry {
    pub name: String,
    pub kind: FileType,
    pub size_bytes: u64,
}

/// Ordering for sized listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    #[default]
    Name,
    /// Largest first.
    Size,
}

/// Node of a recursive directory tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: TreeKind,
    /// Present for directories only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<TreeNode>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeKind {
    File,
    Directory,
}

/// File metadata exposed to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub size_bytes: u64,
    pub created_at: Option<SystemTime>,
    pub modified_at: SystemTime,
    pub accessed_at: Option<SystemTime>,
    pub is_directory: bool,
    pub is_file: bool,
    /// Permission bits, e.g. `0o644`.
    pub permission_bits: u32,
}

impl FileInfo {
    pub fn from_metadata(meta: &Metadata) -> Self {
        Self {
            size_bytes: meta.len(),
            created_at: meta.created().ok(),
            modified_at: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            accessed_at: meta.accessed().ok(),
            is_directory: meta.is_dir(),
            is_file: meta.is_file(),
            permission_bits: meta.permissions().mode() & 0o7777,
        }
    }

    /// `key: value` lines, one per field.
    pub fn to_lines(&self) -> String {
        let stamp = |t: Option<SystemTime>| {
            t.and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
                .map(|d| d.as_secs().to_string())
                .unwrap_or_else(|| "unknown".to_string())
        };
        format!(
            "size: {}\ncreated: {}\nmodified: {}\naccessed: {}\nisDirectory: {}\nisFile: {}\npermissions: {:o}",
            self.size_bytes,
            stamp(self.created_at),
            stamp(Some(self.modified_at)),
            stamp(self.accessed_at),
            self.is_directory,
            self.is_file,
            self.permission_bits,
        )
    }
}

/// Kind of binary payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Audio,
    Blob,
}

/// Base64-encoded file payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaFile {
    pub kind: MediaKind,
    pub mime_type: String,
    /// Standard base64 of the file bytes.
    pub data: String,
}

/// MIME type and media kind guessed from a file extension.
pub fn mime_for_extension(ext: &str) -> (&'static str, MediaKind) {
    match ext.to_ascii_lowercase().as_str() {
        "png" => ("image/png", MediaKind::Image),
        "jpg" | "jpeg" => ("image/jpeg", MediaKind::Image),
        "gif" => ("image/gif", MediaKind::Image),
        "webp" => ("image/webp", MediaKind::Image),
        "bmp" => ("image/bmp", MediaKind::Image),
        "svg" => ("image/svg+xml", MediaKind::Image),
        "mp3" => ("audio/mpeg", MediaKind::Audio),
        "wav" => ("audio/wav", MediaKind::Audio),
        "ogg" => ("audio/ogg", MediaKind::Audio),
        "flac" => ("audio/flac", MediaKind::Audio),
        _ => ("application/octet-stream", MediaKind::Blob),
    }
}
