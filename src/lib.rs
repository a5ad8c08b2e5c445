//! # PinShare - Ephemeral PIN-Authenticated Sharing
//!
//! PinShare lets devices on the same network hand each other short text
//! messages or files. Every share is keyed by a random 6-digit PIN and
//! disappears after a fixed time-to-live.
//!
//! ## Features
//!
//! - **PIN Access**: Anyone holding the PIN can read a share, nobody else can find it
//! - **Expiry**: Shares expire after a TTL (5 minutes by default); expired files are deleted
//! - **QR Links**: Each share comes with a QR code of its download URL on the LAN address
//! - **Async I/O**: Built on Tokio and axum; disk and CPU-heavy work runs off the reactor
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              PinShare                                   │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ HTTP Server │───>│  Handlers   │───>│ TextService │──┐               │
//! │  │   (axum)    │    │  (api)      │───>│ FileService │──┤               │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘  │               │
//! │                                               │         ▼               │
//! │                                               │   ┌─────────────┐       │
//! │                                               │   │ LinkBuilder │       │
//! │                                               │   │ (URL + QR)  │       │
//! │                                               ▼   └─────────────┘       │
//! │  ┌─────────────┐    ┌──────────────────────────────────────────────┐   │
//! │  │    Pin      │───>│          ExpiringStore<P>                    │   │
//! │  │  Allocator  │    │   RwLock<HashMap<Pin, Record<P>>>            │   │
//! │  └─────────────┘    └──────────────────────────────────────────────┘   │
//! │                                               ▲                         │
//! │                     ┌─────────────────────────┴───────────────────────┐ │
//! │                     │           ExpirySweeper                         │ │
//! │                     │      (Background Tokio Task)                    │ │
//! │                     └─────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use pinshare::api::{router, AppState};
//! use pinshare::services::{FileService, LinkBuilder, TextService};
//! use pinshare::storage::{ExpiringStore, ExpiryConfig, ExpirySweeper, PinAllocator};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let ttl = Duration::from_secs(300);
//!     let links = LinkBuilder::new(8000, None);
//!
//!     let texts = Arc::new(ExpiringStore::new(ttl));
//!     let files = Arc::new(ExpiringStore::new(ttl));
//!     let _text_sweeper = ExpirySweeper::start("text", Arc::clone(&texts), ExpiryConfig::default());
//!     let _file_sweeper = ExpirySweeper::start("file", Arc::clone(&files), ExpiryConfig::default());
//!
//!     let text = TextService::new(texts, PinAllocator::new(), links.clone());
//!     let files = FileService::open(files, PinAllocator::new(), links, "uploads").await?;
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await?;
//!     axum::serve(listener, router(AppState::new(text, files), 100 << 20)).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Endpoints
//!
//! ### Text
//! - `POST /api/text/share` (form field `message`)
//! - `GET /api/text/{pin}`
//! - `POST /api/text/{pin}` (form field `message`)
//!
//! ### Files
//! - `POST /api/file/share` (multipart field `files`, repeatable)
//! - `GET /api/file/{pin}`
//! - `GET /api/file/{pin}/all`
//! - `GET /api/file/{pin}/{filename}`
//!
//! ## Module Overview
//!
//! - [`storage`]: PINs, the expiring store and its background sweeper
//! - [`services`]: Text and file sharing, share links and QR codes
//! - [`api`]: HTTP routes and handlers
//! - [`config`]: Command-line configuration
//!
//! ## Design Highlights
//!
//! ### Atomic Allocation
//!
//! A fresh PIN is drawn and its record inserted under one write lock, so two
//! concurrent shares can never end up with the same PIN.
//!
//! ### Lazy + Active Expiry
//!
//! Shares expire in two ways:
//! 1. **Lazy**: Every request sweeps first, and reads refuse expired records
//! 2. **Active**: A background task periodically sweeps each store
//!
//! Expired file shares have their files removed from disk when swept.

pub mod api;
pub mod config;
pub mod services;
pub mod storage;

use std::time::Duration;

// Re-export commonly used types for convenience
pub use api::{router, AppState};
pub use config::{CliAction, Config, ConfigError};
pub use services::{FileService, LinkBuilder, ShareError, ShareReceipt, TextService};
pub use storage::{ExpiringStore, ExpiryConfig, ExpirySweeper, FileSet, Pin, PinAllocator};

/// The default port PinShare listens on
pub const DEFAULT_PORT: u16 = 8000;

/// The default host PinShare binds to
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// How long a share lives unless configured otherwise
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Version of PinShare
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
