// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Background worker that purges expired connection rows.
//!
//! SQL backends have no native TTL, so connection rows whose `expiry`
//! (epoch seconds) has passed are deleted periodically, in batches.
//! The registry and the fan-out never sweep.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Notify;
use tracing::{debug, error, info};

use tunecast_core::persistence::Persistence;

use crate::error::Result;

/// Configuration for the expiry worker.
#[derive(Debug, Clone)]
pub struct ExpiryWorkerConfig {
    /// How often to sweep.
    pub poll_interval: Duration,
    /// Maximum rows to delete per statement.
    pub batch_size: i64,
}

impl Default for ExpiryWorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(300),
            batch_size: 500,
        }
    }
}

impl ExpiryWorkerConfig {
    /// Default batch size with the given sweep interval.
    pub fn with_interval(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            ..Self::default()
        }
    }
}

/// Background worker that deletes expired connections.
pub struct ExpiryWorker {
    persistence: Arc<dyn Persistence>,
    config: ExpiryWorkerConfig,
    shutdown: Arc<Notify>,
}

impl ExpiryWorker {
    /// Create a new expiry worker.
    pub fn new(persistence: Arc<dyn Persistence>, config: ExpiryWorkerConfig) -> Self {
        Self {
            persistence,
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Get a handle that can be used to signal shutdown.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Run the sweep loop until the shutdown signal is received.
    pub async fn run(&self) {
        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            batch_size = self.config.batch_size,
            "Connection expiry worker started"
        );

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.notified() => {
                    info!("Connection expiry worker received shutdown signal");
                    break;
                }

                _ = tokio::time::sleep(self.config.poll_interval) => {
                    if let Err(e) = self.sweep().await {
                        error!(error = %e, "Failed to purge expired connections");
                    }
                }
            }
        }

        info!("Connection expiry worker stopped");
    }

    /// Delete every connection whose expiry is at or before now.
    ///
    /// Returns the number of rows deleted.
    pub async fn sweep(&self) -> Result<u64> {
        let now_secs = Utc::now().timestamp();
        let mut total_purged = 0u64;

        loop {
            let purged = self
                .persistence
                .purge_expired_connections(now_secs, self.config.batch_size)
                .await?;
            total_purged += purged;

            if purged < self.config.batch_size as u64 {
                break;
            }
        }

        if total_purged > 0 {
            info!(total_purged, "Expired connections purged");
        } else {
            debug!("Expiry sweep completed, nothing to purge");
        }

        Ok(total_purged)
    }
}
