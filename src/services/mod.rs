//! Share Services
//!
//! One service per content kind sits between the HTTP handlers and the
//! storage layer. Each call follows the same shape:
//!
//! ```text
//!   request ──> sweep expired ──> store operation ──> response
//!                                      │
//!                 (share only)         ▼
//!                           LinkBuilder: URL ──> QR PNG ──> base64
//! ```
//!
//! - [`TextService`]: share, fetch and replace a text message
//! - [`FileService`]: share a set of files, list them, download one or all
//! - [`LinkBuilder`]: the retrieval URL and its QR code

pub mod file;
pub mod link;
pub mod text;

pub use file::{Archive, FileInfo, FileListing, FileService, Upload};
pub use link::{ContentKind, LinkBuilder};
pub use text::TextService;

use crate::storage::{Pin, StoreError};
use serde::Serialize;
use std::time::Duration;

/// Errors surfaced by the share services.
///
/// Unknown and expired PINs are reported the same way.
#[derive(Debug, thiserror::Error)]
pub enum ShareError {
    #[error("Invalid or expired PIN")]
    NotFoundOrExpired,

    #[error("File not found")]
    FileNotFound,

    #[error("{0}")]
    InvalidRequest(String),

    /// The allocator handed out a PIN that was already stored
    #[error("PIN {0} issued twice")]
    DuplicateKey(Pin),

    #[error("no free PIN after {attempts} attempts")]
    CapacityExceeded { attempts: u32 },

    #[error("storage error: {0}")]
    StorageIo(#[from] std::io::Error),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("could not determine a network address for share links: {0}")]
    NetworkAddressUnresolvable(String),

    #[error("QR code generation failed: {0}")]
    QrEncoding(String),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl From<StoreError> for ShareError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => ShareError::NotFoundOrExpired,
            StoreError::DuplicateKey(pin) => ShareError::DuplicateKey(pin),
            StoreError::CapacityExceeded { attempts } => ShareError::CapacityExceeded { attempts },
        }
    }
}

/// Convenience type alias for service results.
pub type Result<T> = std::result::Result<T, ShareError>;

/// What a successful share hands back to the sharer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShareReceipt {
    pub pin: String,
    pub expires_in_min: u64,
    pub qr_code_base64: String,
}

/// Parses a PIN from a request, folding malformed input into "not found".
pub(crate) fn parse_pin(raw: &str) -> Result<Pin> {
    Pin::parse(raw).ok_or(ShareError::NotFoundOrExpired)
}

/// Whole minutes left, rounded down.
pub(crate) fn whole_minutes(remaining: Duration) -> u64 {
    remaining.as_secs() / 60
}
