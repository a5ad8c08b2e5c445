//! Expiring PIN-Keyed Store
//!
//! This module implements the store every share lives in: a map from PIN to
//! record, where each record carries an absolute expiry.
//!
//! ## Design Decisions
//!
//! 1. **One lock per store**: A share service holds a single store, and the
//!    map behind it is guarded by one `RwLock`. Lookups share the lock,
//!    inserts, updates and sweeps take it exclusively.
//! 2. **Atomic issuance**: Picking a fresh PIN and inserting the record happen
//!    under the same write lock, so two concurrent shares can never be handed
//!    the same PIN.
//! 3. **Reservations**: A share whose payload is still being written to disk
//!    is inserted as a reservation. It holds its PIN but is invisible to
//!    readers until [`ExpiringStore::publish`] flips it live.
//! 4. **Explicit sweeps**: Lookups refuse expired records but never delete
//!    them. Deletion only happens in [`ExpiringStore::sweep`], which callers
//!    run before each operation (and the background sweeper runs on a timer).
//! 5. **Release outside the lock**: Evicted payloads may own files. They are
//!    pulled out under the lock and released after it has been dropped. Until
//!    that release finishes their PINs stay draining and are not reissued.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │               ExpiringStore<P>               │
//! │   RwLock<HashMap<Pin, Record<P>>>            │
//! │                                              │
//! │   "004217" ─> Record { payload, expires_at } │
//! │   "918330" ─> Record { payload, expires_at } │
//! └──────────────────────────────────────────────┘
//!             ▲                     ▲
//!        sweep-on-access      ExpirySweeper
//! ```

use crate::storage::{Payload, Pin, PinAllocator};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Errors raised by the store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No live record under this PIN (never existed, or expired)
    #[error("no live record for this PIN")]
    NotFound,

    /// A record already exists under this PIN
    #[error("PIN {0} is already in use")]
    DuplicateKey(Pin),

    /// The allocator could not find a free PIN
    #[error("no free PIN after {attempts} attempts")]
    CapacityExceeded { attempts: u32 },
}

/// A stored payload with its lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record<P> {
    pub payload: P,
    pub created_at: Instant,
    pub expires_at: Instant,
    /// Set while the record is an unpublished reservation
    ticket: Option<u64>,
}

impl<P> Record<P> {
    /// Creates a record that expires `ttl` after `now`.
    pub fn new(payload: P, now: Instant, ttl: Duration) -> Self {
        Self {
            payload,
            created_at: now,
            expires_at: now + ttl,
            ticket: None,
        }
    }

    /// A record is dead from its expiry instant onwards.
    #[inline]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    /// Published and not expired.
    #[inline]
    pub fn is_live_at(&self, now: Instant) -> bool {
        self.ticket.is_none() && !self.is_expired_at(now)
    }

    /// Time left before expiry, zero once expired.
    pub fn remaining_at(&self, now: Instant) -> Duration {
        self.expires_at.saturating_duration_since(now)
    }
}

/// Handle on a reserved PIN, redeemed with [`ExpiringStore::publish`] or
/// [`ExpiringStore::cancel`].
#[derive(Debug, PartialEq, Eq)]
pub struct Reservation {
    pin: Pin,
    ticket: u64,
}

impl Reservation {
    pub fn pin(&self) -> &Pin {
        &self.pin
    }
}

/// Counters exposed for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreStats {
    pub records: usize,
    pub inserts: u64,
    pub lookups: u64,
    pub updates: u64,
    pub expired: u64,
}

/// A PIN-keyed store whose records expire after a fixed TTL.
///
/// Wrap it in an `Arc` and share it between the service that owns the
/// content kind and the background sweeper.
///
/// # Example
///
/// ```
/// use pinshare::storage::{ExpiringStore, PinAllocator};
/// use std::time::{Duration, Instant};
///
/// let store: ExpiringStore<String> = ExpiringStore::new(Duration::from_secs(300));
/// let allocator = PinAllocator::new();
///
/// let now = Instant::now();
/// let pin = store
///     .insert_fresh(&allocator, now, |_| "hello".to_string())
///     .unwrap();
/// assert_eq!(store.get(&pin).unwrap().payload, "hello");
///
/// // Past its expiry the record is swept away
/// store.sweep(now + Duration::from_secs(300));
/// assert!(store.get(&pin).is_err());
/// ```
pub struct ExpiringStore<P> {
    entries: RwLock<HashMap<Pin, Record<P>>>,
    /// PINs evicted by a sweep whose payloads are still being released
    draining: Mutex<HashSet<Pin>>,
    ttl: Duration,
    next_ticket: AtomicU64,
    inserts: AtomicU64,
    lookups: AtomicU64,
    updates: AtomicU64,
    expired: AtomicU64,
}

impl<P> std::fmt::Debug for ExpiringStore<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpiringStore")
            .field("records", &self.entries.read().len())
            .field("ttl", &self.ttl)
            .field("inserts", &self.inserts.load(Ordering::Relaxed))
            .field("expired", &self.expired.load(Ordering::Relaxed))
            .finish()
    }
}

impl<P: Payload> ExpiringStore<P> {
    /// Creates an empty store whose records live for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            draining: Mutex::new(HashSet::new()),
            ttl,
            next_ticket: AtomicU64::new(1),
            inserts: AtomicU64::new(0),
            lookups: AtomicU64::new(0),
            updates: AtomicU64::new(0),
            expired: AtomicU64::new(0),
        }
    }

    /// The lifetime given to new records.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Inserts a record under a caller-chosen PIN.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateKey`] if any record (live or not yet
    /// swept) already holds the PIN.
    pub fn insert(&self, pin: Pin, record: Record<P>) -> Result<(), StoreError> {
        let mut entries = self.entries.write();

        if entries.contains_key(&pin) {
            return Err(StoreError::DuplicateKey(pin));
        }

        entries.insert(pin, record);
        self.inserts.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Allocates a PIN and inserts a new, immediately visible record under it
    /// in one step.
    ///
    /// `build` receives the chosen PIN so payloads that embed it (such as
    /// storage paths) can be derived from it. A record that has expired but
    /// not been swept yet does not block its PIN: it is superseded and
    /// released.
    pub fn insert_fresh<F>(
        &self,
        allocator: &PinAllocator,
        now: Instant,
        build: F,
    ) -> Result<Pin, StoreError>
    where
        F: FnOnce(&Pin) -> P,
    {
        self.issue(allocator, now, build, None)
    }

    /// Like [`insert_fresh`](Self::insert_fresh), but the record stays
    /// invisible to `get`, `update` and `remaining_ttl` until published.
    ///
    /// The reservation holds its PIN against reissue and expires like any
    /// other record, so an abandoned reservation is reclaimed by the sweep.
    pub fn reserve<F>(
        &self,
        allocator: &PinAllocator,
        now: Instant,
        build: F,
    ) -> Result<Reservation, StoreError>
    where
        F: FnOnce(&Pin) -> P,
    {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let pin = self.issue(allocator, now, build, Some(ticket))?;
        Ok(Reservation { pin, ticket })
    }

    fn issue<F>(
        &self,
        allocator: &PinAllocator,
        now: Instant,
        build: F,
        ticket: Option<u64>,
    ) -> Result<Pin, StoreError>
    where
        F: FnOnce(&Pin) -> P,
    {
        let (pin, old) = {
            let mut entries = self.entries.write();
            let draining = self.draining.lock();

            let pin = allocator.allocate(|candidate| {
                draining.contains(candidate)
                    || entries
                        .get(candidate)
                        .is_some_and(|record| !record.is_expired_at(now))
            })?;
            drop(draining);

            let mut record = Record::new(build(&pin), now, self.ttl);
            record.ticket = ticket;
            let old = entries.insert(pin.clone(), record);
            self.inserts.fetch_add(1, Ordering::Relaxed);

            (pin, old)
        };

        if let Some(old) = old {
            debug!(pin = %pin, "Reissued PIN, releasing superseded record");
            self.expired.fetch_add(1, Ordering::Relaxed);
            old.payload.release();
        }

        Ok(pin)
    }

    /// Makes a reserved record visible to readers.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the reservation expired, was
    /// swept, or its PIN now belongs to another record.
    pub fn publish(&self, reservation: &Reservation, now: Instant) -> Result<(), StoreError> {
        let mut entries = self.entries.write();
        match entries.get_mut(&reservation.pin) {
            Some(record)
                if record.ticket == Some(reservation.ticket) && !record.is_expired_at(now) =>
            {
                record.ticket = None;
                Ok(())
            }
            _ => Err(StoreError::NotFound),
        }
    }

    /// Withdraws a reservation and hands its record back, if it is still the
    /// one holding the PIN.
    ///
    /// The payload is not released; that is up to the caller.
    pub fn cancel(&self, reservation: &Reservation) -> Option<Record<P>> {
        let mut entries = self.entries.write();
        match entries.get(&reservation.pin) {
            Some(record) if record.ticket == Some(reservation.ticket) => {
                entries.remove(&reservation.pin)
            }
            _ => None,
        }
    }

    /// Looks up a live record.
    ///
    /// Expired records are refused but left in place for the next sweep.
    pub fn get(&self, pin: &Pin) -> Result<Record<P>, StoreError>
    where
        P: Clone,
    {
        self.get_at(pin, Instant::now())
    }

    /// Like [`get`](Self::get), judging expiry against `now`.
    pub fn get_at(&self, pin: &Pin, now: Instant) -> Result<Record<P>, StoreError>
    where
        P: Clone,
    {
        self.lookups.fetch_add(1, Ordering::Relaxed);

        let entries = self.entries.read();
        match entries.get(pin) {
            Some(record) if record.is_live_at(now) => Ok(record.clone()),
            _ => Err(StoreError::NotFound),
        }
    }

    /// Applies `mutator` to a live record's payload in place.
    ///
    /// The record's expiry is left untouched.
    pub fn update<F>(&self, pin: &Pin, mutator: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut P),
    {
        self.update_at(pin, Instant::now(), mutator)
    }

    /// Like [`update`](Self::update), judging expiry against `now`.
    pub fn update_at<F>(&self, pin: &Pin, now: Instant, mutator: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut P),
    {
        let mut entries = self.entries.write();
        match entries.get_mut(pin) {
            Some(record) if record.is_live_at(now) => {
                mutator(&mut record.payload);
                self.updates.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            _ => Err(StoreError::NotFound),
        }
    }

    /// Time left before the record under `pin` expires.
    pub fn remaining_ttl(&self, pin: &Pin, now: Instant) -> Result<Duration, StoreError> {
        let entries = self.entries.read();
        match entries.get(pin) {
            Some(record) if record.is_live_at(now) => Ok(record.remaining_at(now)),
            _ => Err(StoreError::NotFound),
        }
    }

    /// Removes a record regardless of its expiry and hands it back.
    ///
    /// The payload is not released; that is up to the caller.
    pub fn remove(&self, pin: &Pin) -> Option<Record<P>> {
        self.entries.write().remove(pin)
    }

    /// Evicts every record that has expired by `now` and releases its payload.
    ///
    /// Safe to call as often as needed; does nothing when nothing expired.
    /// Evicted PINs are not reissued until their payloads are released.
    ///
    /// # Returns
    ///
    /// Returns the number of records evicted.
    pub fn sweep(&self, now: Instant) -> u64 {
        let evicted: Vec<(Pin, Record<P>)> = {
            let mut entries = self.entries.write();

            let expired: Vec<Pin> = entries
                .iter()
                .filter(|(_, record)| record.is_expired_at(now))
                .map(|(pin, _)| pin.clone())
                .collect();

            if !expired.is_empty() {
                self.draining.lock().extend(expired.iter().cloned());
            }

            expired
                .into_iter()
                .filter_map(|pin| entries.remove(&pin).map(|record| (pin, record)))
                .collect()
        };

        let count = evicted.len() as u64;
        for (pin, record) in evicted {
            trace!(pin = %pin, "Evicting expired record");
            record.payload.release();
            self.draining.lock().remove(&pin);
        }

        if count > 0 {
            self.expired.fetch_add(count, Ordering::Relaxed);
        }

        count
    }

    /// Number of records held, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            records: self.len(),
            inserts: self.inserts.load(Ordering::Relaxed),
            lookups: self.lookups.load(Ordering::Relaxed),
            updates: self.updates.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
        }
    }
}
