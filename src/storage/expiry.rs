//! Background Expiry Sweeper
//!
//! Services sweep their store before every operation, so an idle server would
//! never evict anything: an upload nobody retrieves would sit on disk until
//! the next request for that content kind. The background sweeper closes that
//! gap by running the same sweep on a timer.
//!
//! ## Design
//!
//! The sweeper runs as a Tokio task and:
//! 1. Sleeps for a configurable interval (default: 1s)
//! 2. Wakes up and sweeps the store on the blocking pool (evicting file
//!    records deletes files)
//! 3. Logs how many records were evicted
//!
//! ## Adaptive Frequency
//!
//! If many records are expiring, the sweeper runs more frequently.
//! If nothing expires, it backs off to save CPU.

use crate::storage::{ExpiringStore, Payload};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

/// Something the sweeper can evict expired records from.
pub trait Sweep: Send + Sync + 'static {
    /// Evicts everything expired by `now`, returning how many records went.
    fn sweep_expired(&self, now: Instant) -> u64;

    /// Number of records currently held.
    fn record_count(&self) -> usize;
}

impl<P: Payload> Sweep for ExpiringStore<P> {
    fn sweep_expired(&self, now: Instant) -> u64 {
        self.sweep(now)
    }

    fn record_count(&self) -> usize {
        self.len()
    }
}

/// Configuration for the expiry sweeper.
#[derive(Debug, Clone)]
pub struct ExpiryConfig {
    /// Base interval between sweeps (default: 1s)
    pub base_interval: Duration,

    /// Minimum interval between sweeps (default: 100ms)
    pub min_interval: Duration,

    /// Maximum interval between sweeps (default: 10s)
    pub max_interval: Duration,

    /// If this fraction of records expired in one sweep, speed up sweeping
    pub speedup_threshold: f64,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_secs(1),
            min_interval: Duration::from_millis(100),
            max_interval: Duration::from_secs(10),
            speedup_threshold: 0.25, // Speed up if >25% of records expired
        }
    }
}

/// A handle to the running expiry sweeper.
///
/// When this handle is dropped, the sweeper task will be stopped.
#[derive(Debug)]
pub struct ExpirySweeper {
    /// Sender to signal shutdown
    shutdown_tx: watch::Sender<bool>,
    name: &'static str,
}

impl ExpirySweeper {
    /// Starts sweeping `store` in the background.
    ///
    /// `name` labels the store in log output. Must be called from within a
    /// Tokio runtime.
    pub fn start<S: Sweep>(name: &'static str, store: Arc<S>, config: ExpiryConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(sweeper_loop(name, store, config, shutdown_rx));

        info!(store = name, "Background expiry sweeper started");

        Self { shutdown_tx, name }
    }

    /// Stops the expiry sweeper.
    ///
    /// This is called automatically when the handle is dropped.
    pub fn stop(&self) {
        if self.shutdown_tx.send(true).is_ok() {
            info!(store = self.name, "Background expiry sweeper stopped");
        }
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The main sweeper loop.
async fn sweeper_loop<S: Sweep>(
    name: &'static str,
    store: Arc<S>,
    config: ExpiryConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut current_interval = config.base_interval;

    loop {
        tokio::select! {
            _ = tokio::time::sleep(current_interval) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!(store = name, "Expiry sweeper received shutdown signal");
                    return;
                }
            }
        }

        let records_before = store.record_count();
        if records_before == 0 {
            current_interval = (current_interval * 2).min(config.max_interval);
            continue;
        }

        let sweep_store = Arc::clone(&store);
        let expired =
            match tokio::task::spawn_blocking(move || sweep_store.sweep_expired(Instant::now()))
                .await
            {
                Ok(expired) => expired,
                Err(e) => {
                    warn!(store = name, error = %e, "Expiry sweep task failed");
                    continue;
                }
            };

        let expiry_rate = expired as f64 / records_before as f64;

        if expiry_rate > config.speedup_threshold {
            current_interval = (current_interval / 2).max(config.min_interval);
            debug!(
                store = name,
                expired = expired,
                rate = %format!("{:.2}%", expiry_rate * 100.0),
                new_interval_ms = current_interval.as_millis(),
                "High expiry rate, speeding up sweeper"
            );
        } else if expired == 0 {
            current_interval = (current_interval * 2).min(config.max_interval);
            trace!(
                store = name,
                new_interval_ms = current_interval.as_millis(),
                "Nothing expired, slowing down sweeper"
            );
        }

        if expired > 0 {
            info!(
                store = name,
                expired = expired,
                remaining = store.record_count(),
                "Expired shares evicted"
            );
        }
    }
}
