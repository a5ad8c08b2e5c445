//! PIN Generation
//!
//! Every shared item is addressed by a 6-digit numeric PIN. The PIN is the
//! only credential a recipient needs, so it is drawn from the operating
//! system's CSPRNG rather than a seeded generator.
//!
//! ## Collisions
//!
//! The allocator itself is stateless. Callers pass a predicate telling it
//! which PINs are currently held by live records; the allocator keeps drawing
//! until it finds a free one. With 10^6 possible PINs and a handful of live
//! shares this almost always succeeds on the first draw, but the number of
//! attempts is capped so a saturated keyspace fails fast instead of spinning.

use crate::storage::StoreError;
use rand::rngs::OsRng;
use rand::Rng;
use std::fmt;

#[cfg(test)]
use parking_lot::Mutex;
#[cfg(test)]
use std::collections::VecDeque;
#[cfg(test)]
use std::sync::Arc;

/// Number of digits in a PIN.
pub const PIN_LEN: usize = 6;

/// Size of the PIN keyspace (10^PIN_LEN).
const PIN_SPACE: u32 = 1_000_000;

/// Default cap on draws before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 1000;

/// A 6-digit numeric PIN, leading zeros included.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pin(String);

impl Pin {
    /// Parses a PIN from user input.
    ///
    /// Returns `None` unless the input is exactly six ASCII digits.
    pub fn parse(s: &str) -> Option<Self> {
        if s.len() == PIN_LEN && s.bytes().all(|b| b.is_ascii_digit()) {
            Some(Self(s.to_string()))
        } else {
            None
        }
    }

    fn from_number(n: u32) -> Self {
        Self(format!("{:0width$}", n, width = PIN_LEN))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Draws PINs that are not held by any live record.
#[derive(Debug, Clone)]
pub struct PinAllocator {
    max_attempts: u32,
    /// Draws served before falling back to the OS generator
    #[cfg(test)]
    script: Option<Arc<Mutex<VecDeque<u32>>>>,
}

impl Default for PinAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl PinAllocator {
    pub fn new() -> Self {
        Self::with_max_attempts(DEFAULT_MAX_ATTEMPTS)
    }

    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            #[cfg(test)]
            script: None,
        }
    }

    /// An allocator that draws `numbers` in order before going random.
    #[cfg(test)]
    pub(crate) fn scripted(max_attempts: u32, numbers: Vec<u32>) -> Self {
        Self {
            script: Some(Arc::new(Mutex::new(numbers.into()))),
            ..Self::with_max_attempts(max_attempts)
        }
    }

    #[cfg(test)]
    fn scripted_draw(&self) -> Option<u32> {
        self.script.as_ref().and_then(|s| s.lock().pop_front())
    }

    #[cfg(not(test))]
    fn scripted_draw(&self) -> Option<u32> {
        None
    }

    /// Draws a single random PIN without checking for collisions.
    pub fn generate(&self) -> Pin {
        let n = self
            .scripted_draw()
            .unwrap_or_else(|| OsRng.gen_range(0..PIN_SPACE));
        Pin::from_number(n)
    }

    /// Allocates a PIN for which `is_taken` returns `false`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::CapacityExceeded`] if every draw collided.
    pub fn allocate<F>(&self, is_taken: F) -> Result<Pin, StoreError>
    where
        F: Fn(&Pin) -> bool,
    {
        for _ in 0..self.max_attempts {
            let pin = self.generate();
            if !is_taken(&pin) {
                return Ok(pin);
            }
        }

        Err(StoreError::CapacityExceeded {
            attempts: self.max_attempts,
        })
    }
}
