//! File Sharing
//!
//! Uploaded files are written to the upload directory as
//! `{pin}_{name}`, where `name` is the uploaded file name stripped of any
//! directory components. The record in the store owns those files: when the
//! record expires, the sweep deletes them.
//!
//! ## Share Sequence
//!
//! ```text
//! 1. Resolve the link host         (fail early, nothing stored yet)
//! 2. Sweep + reserve a PIN         (paths derived from the new PIN)
//! 3. Write every file              (on failure: cancel, delete files)
//! 4. Render the QR code            (on failure: same rollback)
//! 5. Publish the reservation       (readers see the share from here on)
//! ```
//!
//! A reservation is invisible to `list` and the downloads, so a share is
//! never served before all of its files are on disk.

use crate::services::{
    parse_pin, whole_minutes, ContentKind, LinkBuilder, Result, ShareError, ShareReceipt,
};
use crate::storage::{ExpiringStore, FileEntry, FileSet, Payload, Pin, PinAllocator, Reservation};
use bytes::Bytes;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::io::{self, Cursor, ErrorKind, Write};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Name used when an upload carries no usable file name.
const FALLBACK_NAME: &str = "file";

/// One file as received from the client.
#[derive(Debug, Clone)]
pub struct Upload {
    pub name: String,
    pub data: Bytes,
}

impl Upload {
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

/// One entry of a file listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileInfo {
    pub name: String,
    pub size: String,
    pub sha256: String,
}

/// What a recipient sees for a file share.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileListing {
    pub files: Vec<FileInfo>,
    pub expires_in_min: u64,
}

/// A zip of every file in a share.
#[derive(Debug, Clone)]
pub struct Archive {
    pub filename: String,
    pub bytes: Bytes,
}

/// Keeps only the final path component of an uploaded file name.
///
/// Both `/` and `\` count as separators so Windows-style names cannot smuggle
/// directories either.
pub fn sanitize_file_name(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default().trim();

    match base {
        "" | "." | ".." => FALLBACK_NAME.to_string(),
        name => name.to_string(),
    }
}

/// Makes `name` unique within one upload by inserting a counter before the
/// extension: `a.txt`, `a-1.txt`, `a-2.txt`, ...
fn deduplicate(name: String, used: &mut HashSet<String>) -> String {
    if used.insert(name.clone()) {
        return name;
    }

    let (stem, ext) = match name.rfind('.') {
        Some(dot) if dot > 0 => name.split_at(dot),
        _ => (name.as_str(), ""),
    };

    let mut n = 1;
    loop {
        let candidate = format!("{}-{}{}", stem, n, ext);
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// A shared file vanishing between lookup and read means its record expired
/// and was swept in between.
fn read_error(e: io::Error) -> ShareError {
    if e.kind() == ErrorKind::NotFound {
        ShareError::NotFoundOrExpired
    } else {
        ShareError::StorageIo(e)
    }
}

/// Shares sets of files under a PIN.
#[derive(Debug, Clone)]
pub struct FileService {
    store: Arc<ExpiringStore<FileSet>>,
    allocator: PinAllocator,
    links: LinkBuilder,
    upload_dir: PathBuf,
}

impl FileService {
    /// Creates the service, creating `upload_dir` if needed.
    pub async fn open(
        store: Arc<ExpiringStore<FileSet>>,
        allocator: PinAllocator,
        links: LinkBuilder,
        upload_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        let upload_dir = upload_dir.into();
        tokio::fs::create_dir_all(&upload_dir).await?;

        Ok(Self {
            store,
            allocator,
            links,
            upload_dir,
        })
    }

    /// The store backing this service.
    pub fn store(&self) -> &Arc<ExpiringStore<FileSet>> {
        &self.store
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    /// Sweeps on the blocking pool, since evicting file shares deletes files.
    async fn sweep(&self) -> Result<()> {
        let store = Arc::clone(&self.store);
        let expired = tokio::task::spawn_blocking(move || store.sweep(Instant::now())).await?;
        if expired > 0 {
            debug!(expired = expired, "Swept expired file shares");
        }
        Ok(())
    }

    async fn live_files(&self, pin: &Pin) -> Result<FileSet> {
        self.sweep().await?;
        Ok(self.store.get(pin)?.payload)
    }

    /// Stores `uploads` under a fresh PIN.
    pub async fn share(&self, uploads: Vec<Upload>) -> Result<ShareReceipt> {
        if uploads.is_empty() {
            return Err(ShareError::InvalidRequest("no files uploaded".to_string()));
        }

        let host = self.links.host().await?;

        // (name, size, checksum) for each upload, in upload order
        let mut used = HashSet::new();
        let prepared: Vec<(String, u64, String)> = uploads
            .iter()
            .map(|upload| {
                let name = deduplicate(sanitize_file_name(&upload.name), &mut used);
                (name, upload.data.len() as u64, sha256_hex(&upload.data))
            })
            .collect();
        let file_count = prepared.len();

        self.sweep().await?;
        let upload_dir = &self.upload_dir;
        let mut planned = FileSet::default();
        let reservation = self.store.reserve(&self.allocator, Instant::now(), |pin| {
            planned = FileSet::new(
                prepared
                    .into_iter()
                    .map(|(name, size, sha256)| {
                        let path = upload_dir.join(format!("{}_{}", pin, name));
                        FileEntry::new(pin.as_str(), path, size, sha256)
                    })
                    .collect(),
            );
            planned.clone()
        })?;
        let pin = reservation.pin().clone();

        match self.finish_share(&reservation, host, &planned, uploads).await {
            Ok(qr_code_base64) => {
                info!(pin = %pin, files = file_count, "Files shared");
                Ok(ShareReceipt {
                    pin: pin.to_string(),
                    expires_in_min: whole_minutes(self.store.ttl()),
                    qr_code_base64,
                })
            }
            Err(e) => {
                error!(pin = %pin, error = %e, "File share failed, rolling back");
                self.store.cancel(&reservation);
                if let Err(join) = tokio::task::spawn_blocking(move || planned.release()).await {
                    warn!(pin = %pin, error = %join, "Cleanup after failed share did not finish");
                }
                Err(e)
            }
        }
    }

    /// Writes the uploaded bytes to their planned paths, renders the QR code
    /// and publishes the reservation.
    async fn finish_share(
        &self,
        reservation: &Reservation,
        host: IpAddr,
        planned: &FileSet,
        uploads: Vec<Upload>,
    ) -> Result<String> {
        for (entry, upload) in planned.entries.iter().zip(uploads) {
            tokio::fs::write(&entry.storage_path, &upload.data).await?;
        }

        let qr = self.links.qr_for(host, ContentKind::File, reservation.pin()).await?;
        self.store.publish(reservation, Instant::now())?;
        Ok(qr)
    }

    /// Lists the files shared under `pin`.
    pub async fn list(&self, pin: &str) -> Result<FileListing> {
        let pin = parse_pin(pin)?;
        self.sweep().await?;

        let record = self.store.get(&pin)?;
        let files = record
            .payload
            .entries
            .iter()
            .map(|entry| FileInfo {
                name: entry.display_name.clone(),
                size: entry.size_display(),
                sha256: entry.sha256.clone(),
            })
            .collect();

        Ok(FileListing {
            files,
            expires_in_min: whole_minutes(record.remaining_at(Instant::now())),
        })
    }

    /// Reads one shared file by the name recipients see.
    pub async fn fetch_one(&self, pin: &str, name: &str) -> Result<(String, Bytes)> {
        let pin = parse_pin(pin)?;
        let files = self.live_files(&pin).await?;

        let entry = files.find(name).ok_or(ShareError::FileNotFound)?;
        let data = tokio::fs::read(&entry.storage_path).await.map_err(read_error)?;

        debug!(pin = %pin, file = %entry.display_name, bytes = data.len(), "File downloaded");
        Ok((entry.display_name.clone(), Bytes::from(data)))
    }

    /// Bundles every file shared under `pin` into a zip.
    pub async fn fetch_archive(&self, pin: &str) -> Result<Archive> {
        let pin = parse_pin(pin)?;
        let files = self.live_files(&pin).await?;

        let bytes = tokio::task::spawn_blocking(move || build_archive(&files)).await??;

        debug!(pin = %pin, bytes = bytes.len(), "Archive downloaded");
        Ok(Archive {
            filename: format!("files_{}.zip", pin),
            bytes,
        })
    }
}

/// Zips every entry under its display name.
fn build_archive(files: &FileSet) -> Result<Bytes> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for entry in &files.entries {
        let data = std::fs::read(&entry.storage_path).map_err(read_error)?;
        zip.start_file(entry.display_name.as_str(), options)?;
        zip.write_all(&data)?;
    }

    let cursor = zip.finish()?;
    Ok(Bytes::from(cursor.into_inner()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::Ipv4Addr;
    use std::time::Duration;
    use tempfile::TempDir;
    use zip::ZipArchive;

    async fn service(dir: &TempDir, ttl: Duration) -> FileService {
        service_with(dir, ttl, PinAllocator::new()).await
    }

    async fn service_with(dir: &TempDir, ttl: Duration, allocator: PinAllocator) -> FileService {
        let store = Arc::new(ExpiringStore::new(ttl));
        let links = LinkBuilder::new(8000, Some(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20))));
        FileService::open(store, allocator, links, dir.path().join("uploads"))
            .await
            .unwrap()
    }

    fn hello_world() -> Vec<Upload> {
        vec![Upload::new("a.txt", "hello"), Upload::new("b.txt", "world")]
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("report.pdf"), "report.pdf");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\Users\\me\\notes.txt"), "notes.txt");
        assert_eq!(sanitize_file_name("dir/"), "file");
        assert_eq!(sanitize_file_name(".."), "file");
        assert_eq!(sanitize_file_name(""), "file");
    }

    #[test]
    fn test_deduplicate() {
        let mut used = HashSet::new();
        assert_eq!(deduplicate("a.txt".to_string(), &mut used), "a.txt");
        assert_eq!(deduplicate("a.txt".to_string(), &mut used), "a-1.txt");
        assert_eq!(deduplicate("a.txt".to_string(), &mut used), "a-2.txt");
        assert_eq!(deduplicate("README".to_string(), &mut used), "README");
        assert_eq!(deduplicate("README".to_string(), &mut used), "README-1");
        assert_eq!(deduplicate(".env".to_string(), &mut used), ".env");
        assert_eq!(deduplicate(".env".to_string(), &mut used), ".env-1");
    }

    #[tokio::test]
    async fn test_share_round_trip() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, Duration::from_secs(300)).await;

        let receipt = service.share(hello_world()).await.unwrap();
        assert_eq!(receipt.pin.len(), 6);
        assert_eq!(receipt.expires_in_min, 5);

        let listing = service.list(&receipt.pin).await.unwrap();
        let names: Vec<&str> = listing.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt"]);
        assert_eq!(listing.files[0].size, "0.00 KB");
        assert_eq!(listing.files[1].size, "0.00 KB");
        assert_eq!(
            listing.files[0].sha256,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert!(listing.expires_in_min <= 5);

        let (name, data) = service.fetch_one(&receipt.pin, "a.txt").await.unwrap();
        assert_eq!(name, "a.txt");
        assert_eq!(&data[..], b"hello");

        let archive = service.fetch_archive(&receipt.pin).await.unwrap();
        assert_eq!(archive.filename, format!("files_{}.zip", receipt.pin));

        let mut zip = ZipArchive::new(Cursor::new(archive.bytes.to_vec())).unwrap();
        assert_eq!(zip.len(), 2);
        for (name, expected) in [("a.txt", "hello"), ("b.txt", "world")] {
            let mut content = String::new();
            zip.by_name(name).unwrap().read_to_string(&mut content).unwrap();
            assert_eq!(content, expected);
        }
    }

    #[tokio::test]
    async fn test_files_stored_with_pin_prefix() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, Duration::from_secs(300)).await;

        let receipt = service.share(hello_world()).await.unwrap();

        let stored = service.upload_dir().join(format!("{}_a.txt", receipt.pin));
        assert_eq!(std::fs::read(stored).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_path_traversal_is_neutralised() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, Duration::from_secs(300)).await;

        let receipt = service
            .share(vec![Upload::new("../../etc/passwd", "root:x:0:0")])
            .await
            .unwrap();

        let listing = service.list(&receipt.pin).await.unwrap();
        assert_eq!(listing.files[0].name, "passwd");
        assert!(!listing.files[0].name.contains('/'));

        let stored = service.upload_dir().join(format!("{}_passwd", receipt.pin));
        assert!(stored.exists());
        assert!(!dir.path().join("etc").exists());
    }

    #[tokio::test]
    async fn test_duplicate_names_get_own_files() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, Duration::from_secs(300)).await;

        let receipt = service
            .share(vec![Upload::new("a.txt", "one"), Upload::new("x/a.txt", "two")])
            .await
            .unwrap();

        let (_, first) = service.fetch_one(&receipt.pin, "a.txt").await.unwrap();
        let (_, second) = service.fetch_one(&receipt.pin, "a-1.txt").await.unwrap();
        assert_eq!(&first[..], b"one");
        assert_eq!(&second[..], b"two");
    }

    #[tokio::test]
    async fn test_empty_upload_rejected() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, Duration::from_secs(300)).await;

        assert!(matches!(
            service.share(vec![]).await,
            Err(ShareError::InvalidRequest(_))
        ));
        assert!(service.store().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_pin_and_file() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, Duration::from_secs(300)).await;

        assert!(matches!(
            service.list("000000").await,
            Err(ShareError::NotFoundOrExpired)
        ));
        assert!(matches!(
            service.fetch_archive("bad").await,
            Err(ShareError::NotFoundOrExpired)
        ));

        let receipt = service.share(hello_world()).await.unwrap();
        assert!(matches!(
            service.fetch_one(&receipt.pin, "c.txt").await,
            Err(ShareError::FileNotFound)
        ));
    }

    #[tokio::test]
    async fn test_expired_files_are_deleted() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, Duration::from_millis(300)).await;

        let receipt = service.share(hello_world()).await.unwrap();
        let stored = service.upload_dir().join(format!("{}_a.txt", receipt.pin));
        assert!(stored.exists());

        tokio::time::sleep(Duration::from_millis(400)).await;

        assert!(matches!(
            service.list(&receipt.pin).await,
            Err(ShareError::NotFoundOrExpired)
        ));
        assert!(!stored.exists());
    }

    #[tokio::test]
    async fn test_failed_write_rolls_back() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, Duration::from_secs(300)).await;

        // A plain file squatting on the upload directory makes every write fail
        std::fs::remove_dir_all(service.upload_dir()).unwrap();
        std::fs::write(service.upload_dir(), b"not a directory").unwrap();

        let result = service.share(hello_world()).await;
        assert!(matches!(result, Err(ShareError::StorageIo(_))));
        assert!(service.store().is_empty());
    }

    #[tokio::test]
    async fn test_vanished_file_reads_as_expired() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, Duration::from_secs(300)).await;

        let receipt = service.share(hello_world()).await.unwrap();
        std::fs::remove_file(service.upload_dir().join(format!("{}_a.txt", receipt.pin))).unwrap();

        assert!(matches!(
            service.fetch_one(&receipt.pin, "a.txt").await,
            Err(ShareError::NotFoundOrExpired)
        ));
        assert!(matches!(
            service.fetch_archive(&receipt.pin).await,
            Err(ShareError::NotFoundOrExpired)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_share_invisible_until_files_written() {
        let dir = TempDir::new().unwrap();
        let allocator = PinAllocator::scripted(1, vec![42]);
        let service = Arc::new(service_with(&dir, Duration::from_secs(300), allocator).await);

        let big = vec![7u8; 16 * 1024 * 1024];
        let uploads: Vec<Upload> = ["a.bin", "b.bin", "c.bin", "d.bin"]
            .into_iter()
            .map(|name| Upload::new(name, big.clone()))
            .collect();

        let sharing = {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.share(uploads).await })
        };

        while !sharing.is_finished() {
            match service.fetch_one("000042", "a.bin").await {
                Ok((_, data)) => assert_eq!(data.len(), big.len()),
                Err(e) => assert!(matches!(e, ShareError::NotFoundOrExpired), "{}", e),
            }
            match service.list("000042").await {
                Ok(listing) => assert_eq!(listing.files.len(), 4),
                Err(e) => assert!(matches!(e, ShareError::NotFoundOrExpired), "{}", e),
            }
            tokio::task::yield_now().await;
        }

        let receipt = sharing.await.unwrap().unwrap();
        assert_eq!(receipt.pin, "000042");
        let (_, data) = service.fetch_one("000042", "d.bin").await.unwrap();
        assert_eq!(data, big);
    }
}
