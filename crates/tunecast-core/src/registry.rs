// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Connection registry.
//!
//! Durable record of open real-time sessions. A connection goes
//! `absent -> connected -> absent`: it is created on connect and removed on
//! disconnect, when a delivery finds it gone, or when its expiry passes.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::{CoreError, Result};
use crate::persistence::{ConnectionRecord, Persistence};

/// Lifetime of a connection row when none is configured.
pub const DEFAULT_CONNECTION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// User id recorded when the caller is unknown.
pub const ANONYMOUS_USER: &str = "anonymous";

/// Status written for every registered connection.
pub const STATUS_CONNECTED: &str = "connected";

/// Registry of live connections.
#[derive(Clone)]
pub struct ConnectionRegistry {
    persistence: Arc<dyn Persistence>,
    ttl: Duration,
    owner: Option<String>,
}

impl ConnectionRegistry {
    /// Create a registry with the default 24h time-to-live.
    pub fn new(persistence: Arc<dyn Persistence>) -> Self {
        Self::with_ttl(persistence, DEFAULT_CONNECTION_TTL)
    }

    /// Create a registry whose rows expire `ttl` after connecting.
    pub fn with_ttl(persistence: Arc<dyn Persistence>, ttl: Duration) -> Self {
        Self {
            persistence,
            ttl,
            owner: None,
        }
    }

    /// Tag every row this registry writes with `owner`, the instance
    /// holding the connection's socket.
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// Configured time-to-live.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Register (or re-register) a connection.
    pub async fn connect(
        &self,
        connection_id: &str,
        user_id: Option<&str>,
        client_ip: Option<&str>,
    ) -> Result<ConnectionRecord> {
        if connection_id.is_empty() {
            return Err(CoreError::validation(
                "connectionId",
                "No connection ID provided",
            ));
        }

        let now = Utc::now();
        let record = ConnectionRecord {
            connection_id: connection_id.to_string(),
            user_id: user_id
                .filter(|u| !u.is_empty())
                .unwrap_or(ANONYMOUS_USER)
                .to_string(),
            connected_at: now.timestamp_millis(),
            expiry: now.timestamp() + self.ttl.as_secs() as i64,
            connection_status: STATUS_CONNECTED.to_string(),
            client_ip: client_ip.map(str::to_string),
            owner: self.owner.clone(),
        };

        self.persistence.put_connection(&record).await?;

        info!(
            connection_id = %record.connection_id,
            user_id = %record.user_id,
            expiry = record.expiry,
            "Connection registered"
        );

        Ok(record)
    }

    /// Remove a connection. Returns whether it was registered.
    ///
    /// An unknown id is logged and is not an error.
    pub async fn disconnect(&self, connection_id: &str) -> Result<bool> {
        match self.persistence.get_connection(connection_id).await? {
            Some(existing) => {
                info!(
                    connection_id = %connection_id,
                    user_id = %existing.user_id,
                    "Disconnecting"
                );
            }
            None => {
                warn!(connection_id = %connection_id, "Disconnect for unknown connection");
            }
        }

        self.persistence.delete_connection(connection_id).await
    }

    /// Every registered connection.
    ///
    /// Rows past their expiry may still be listed until the sweeper removes them.
    pub async fn list_all(&self) -> Result<Vec<ConnectionRecord>> {
        self.persistence.list_connections().await
    }

    /// Delete a connection a delivery found gone.
    pub async fn remove_stale(&self, connection_id: &str) -> Result<bool> {
        let removed = self.persistence.delete_connection(connection_id).await?;
        debug!(connection_id = %connection_id, removed, "Removed stale connection");
        Ok(removed)
    }
}
