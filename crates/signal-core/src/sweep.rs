//! Stale call-record sweeping
//!
//! A visitor-side failure can leave an orphaned ringing record behind;
//! without cleanup it would ring again on every client restart. The
//! sweeper deletes records older than a threshold, once shortly after
//! startup and then on a fixed interval, independent of any live
//! session's state.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::store::SignalStore;

/// Sweeper timing and staleness configuration
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Records older than this are deleted
    pub max_age: Duration,
    /// Delay before the first pass after startup
    pub startup_delay: Duration,
    /// Interval between subsequent passes
    pub interval: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(5 * 60),
            startup_delay: Duration::from_secs(5),
            interval: Duration::from_secs(10 * 60),
        }
    }
}

/// Periodic deleter of stale call records
pub struct StaleSweeper<S: SignalStore> {
    store: Arc<S>,
    config: SweepConfig,
}

impl<S: SignalStore> StaleSweeper<S> {
    /// Create a sweeper over `store`
    pub fn new(store: Arc<S>, config: SweepConfig) -> Self {
        Self { store, config }
    }

    /// Run one sweep pass, returning how many records were deleted
    ///
    /// Backend failures are logged and reported; the caller's loop
    /// keeps running either way.
    pub async fn sweep_once(&self) -> usize {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.config.max_age)
                .unwrap_or_else(|_| chrono::Duration::minutes(5));
        match self.store.delete_older_than(cutoff).await {
            Ok(0) => {
                debug!("sweep pass found no stale records");
                0
            }
            Ok(removed) => {
                info!(removed = removed, "stale call records swept");
                removed
            }
            Err(e) => {
                warn!(error = %e, category = e.category(), "sweep pass failed");
                0
            }
        }
    }

    /// Spawn the sweep loop: one pass after `startup_delay`, then one
    /// per `interval`, until the returned handle is aborted
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            tokio::time::sleep(self.config.startup_delay).await;
            self.sweep_once().await;
            let mut ticker = tokio::time::interval(self.config.interval);
            // The first tick of a tokio interval fires immediately and
            // would double the startup pass.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.sweep_once().await;
            }
        })
    }
}
