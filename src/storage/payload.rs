//! Stored Payloads
//!
//! A record's payload is either a text message or a set of files written to
//! the upload directory. File payloads own their files on disk: when the
//! record is evicted, the files go with it.

use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::{trace, warn};

/// Content that can live in an [`ExpiringStore`](crate::storage::ExpiringStore).
pub trait Payload: Send + Sync + 'static {
    /// Frees any resources owned by this payload.
    ///
    /// Called exactly once, after the record has left the store and with no
    /// store lock held. Must not fail: individual errors are logged.
    fn release(&self) {}
}

impl Payload for String {}

/// One uploaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Location on disk, `{upload_dir}/{pin}_{name}`
    pub storage_path: PathBuf,
    /// Name shown to recipients (storage file name minus the `{pin}_` prefix)
    pub display_name: String,
    pub size_bytes: u64,
    /// Lowercase hex SHA-256 of the content
    pub sha256: String,
}

impl FileEntry {
    /// Builds an entry, deriving the display name from the storage path.
    pub fn new(pin: &str, storage_path: PathBuf, size_bytes: u64, sha256: String) -> Self {
        let display_name = storage_path
            .file_name()
            .map(|name| name.to_string_lossy())
            .map(|name| {
                name.strip_prefix(pin)
                    .and_then(|rest| rest.strip_prefix('_'))
                    .unwrap_or(&*name)
                    .to_string()
            })
            .unwrap_or_default();

        Self {
            storage_path,
            display_name,
            size_bytes,
            sha256,
        }
    }

    /// Human-readable size: always kilobytes with two decimals.
    pub fn size_display(&self) -> String {
        format!("{:.2} KB", self.size_bytes as f64 / 1024.0)
    }
}

/// The ordered files of one upload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileSet {
    pub entries: Vec<FileEntry>,
}

impl FileSet {
    pub fn new(entries: Vec<FileEntry>) -> Self {
        Self { entries }
    }

    /// Finds an entry by the name recipients see.
    pub fn find(&self, display_name: &str) -> Option<&FileEntry> {
        self.entries.iter().find(|e| e.display_name == display_name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.entries.iter().map(|e| e.size_bytes).sum()
    }
}

impl Payload for FileSet {
    fn release(&self) {
        for entry in &self.entries {
            match std::fs::remove_file(&entry.storage_path) {
                Ok(()) => trace!(path = %entry.storage_path.display(), "Removed expired file"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!(
                    path = %entry.storage_path.display(),
                    error = %e,
                    "Failed to remove expired file"
                ),
            }
        }
    }
}
