//! Storage Module
//!
//! This module provides the expiring, PIN-keyed store that every share lives
//! in, the PIN allocator that feeds it, and a background sweeper that evicts
//! expired records.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    ExpiringStore<P>                         │
//! │   insert_fresh ──> PinAllocator (OsRng, bounded retries)    │
//! │   get / update / remaining_ttl                              │
//! │   sweep ──> Payload::release (delete files)                 │
//! └─────────────────────────────────────────────────────────────┘
//!                            ▲
//!                            │
//!              ┌─────────────┴─────────────┐
//!              │     ExpirySweeper         │
//!              │  (Background Tokio Task)  │
//!              └───────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use pinshare::storage::{ExpiringStore, PinAllocator};
//! use std::time::{Duration, Instant};
//!
//! let store: ExpiringStore<String> = ExpiringStore::new(Duration::from_secs(300));
//! let pin = store
//!     .insert_fresh(&PinAllocator::new(), Instant::now(), |_| "hi".to_string())
//!     .unwrap();
//!
//! store.update(&pin, |message| message.push('!')).unwrap();
//! assert_eq!(store.get(&pin).unwrap().payload, "hi!");
//! ```

pub mod engine;
pub mod expiry;
pub mod payload;
pub mod pin;

// Re-export commonly used types
pub use engine::{ExpiringStore, Record, Reservation, StoreError, StoreStats};
pub use expiry::{ExpiryConfig, ExpirySweeper, Sweep};
pub use payload::{FileEntry, FileSet, Payload};
pub use pin::{Pin, PinAllocator};
