//! Optional Background Expiry Sweeper
//!
//! Lazy expiry alone never reclaims a key that expires and is then never read
//! again. When enabled (`--active-expiry`), this task periodically removes
//! expired entries from every shard.
//!
//! The interval adapts to what each pass finds: a pass where more than
//! `speedup_threshold` of the keys had expired halves the interval, a pass that
//! found nothing doubles it, both bounded by `min_interval` and `max_interval`.

use crate::storage::StorageEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, trace};

/// Configuration for the expiry sweeper.
#[derive(Debug, Clone)]
pub struct ExpiryConfig {
    /// Starting interval between sweeps
    pub base_interval: Duration,
    pub min_interval: Duration,
    pub max_interval: Duration,
    /// Fraction of expired keys above which sweeping speeds up
    pub speedup_threshold: f64,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_millis(100),
            min_interval: Duration::from_millis(10),
            max_interval: Duration::from_secs(1),
            speedup_threshold: 0.25,
        }
    }
}

/// Handle to a running sweeper. Dropping it stops the task.
#[derive(Debug)]
pub struct ExpirySweeper {
    shutdown_tx: watch::Sender<bool>,
}

impl ExpirySweeper {
    /// Spawns the sweeper on the current tokio runtime.
    pub fn start(engine: Arc<StorageEngine>, config: ExpiryConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(sweeper_loop(engine, config, shutdown_rx));
        info!("Background expiry sweeper started");
        Self { shutdown_tx }
    }

    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.stop();
        debug!("Background expiry sweeper stopped");
    }
}

/// Computes the interval for the next pass.
fn next_interval(
    current: Duration,
    keys_before: u64,
    expired: u64,
    config: &ExpiryConfig,
) -> Duration {
    if keys_before == 0 || expired == 0 {
        return (current * 2).min(config.max_interval);
    }

    let rate = expired as f64 / keys_before as f64;
    if rate > config.speedup_threshold {
        (current / 2).max(config.min_interval)
    } else {
        current
    }
}

async fn sweeper_loop(
    engine: Arc<StorageEngine>,
    config: ExpiryConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut interval = config.base_interval;

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    return;
                }
            }
        }

        let keys_before = engine.len();
        let expired = engine.cleanup_expired();
        interval = next_interval(interval, keys_before, expired, &config);

        if expired > 0 {
            debug!(
                expired = expired,
                keys_remaining = engine.len(),
                next_interval_ms = interval.as_millis() as u64,
                "Expired keys cleaned up"
            );
        } else {
            trace!(next_interval_ms = interval.as_millis() as u64, "Nothing to sweep");
        }
    }
}
