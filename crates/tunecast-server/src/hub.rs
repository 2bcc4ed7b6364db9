// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-process connection hub.
//!
//! Each open WebSocket registers an outbound channel under its connection
//! id. The hub is the [`PushTransport`] used in local push mode.
//!
//! Every hub has an instance id, and the registry tags the rows of this
//! process's sockets with it. The hub serves only its own rows (and
//! untagged ones), so replicas sharing a database never prune each
//! other's connections. An own row with no live channel reports
//! [`DeliveryError::Gone`] and is pruned; rows left by a previous run of
//! the process carry an old id and are left to the expiry sweep.

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use tunecast_core::persistence::ConnectionRecord;
use tunecast_core::transport::{DeliveryError, PushTransport};

/// Live outbound channels keyed by connection id.
#[derive(Debug)]
pub struct ConnectionHub {
    instance_id: String,
    senders: DashMap<String, mpsc::UnboundedSender<String>>,
}

impl Default for ConnectionHub {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionHub {
    /// Create an empty hub with a fresh instance id.
    pub fn new() -> Self {
        Self::with_instance_id(Uuid::new_v4().to_string())
    }

    /// Create an empty hub with the given instance id.
    pub fn with_instance_id(instance_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            senders: DashMap::new(),
        }
    }

    /// Id the registry tags this process's connections with.
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Open a channel for `connection_id`, replacing any previous one.
    pub fn register(&self, connection_id: &str) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.insert(connection_id.to_string(), tx);
        debug!(connection_id = %connection_id, "Hub channel registered");
        rx
    }

    /// Drop the channel for `connection_id`. Returns whether one existed.
    pub fn unregister(&self, connection_id: &str) -> bool {
        self.senders.remove(connection_id).is_some()
    }

    /// Whether a live channel exists for `connection_id`.
    pub fn contains(&self, connection_id: &str) -> bool {
        self.senders.contains_key(connection_id)
    }

    /// Number of live channels.
    pub fn len(&self) -> usize {
        self.senders.len()
    }

    /// Whether no channel is live.
    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }
}

#[async_trait]
impl PushTransport for ConnectionHub {
    fn name(&self) -> &'static str {
        "hub"
    }

    fn serves(&self, connection: &ConnectionRecord) -> bool {
        connection
            .owner
            .as_deref()
            .is_none_or(|owner| owner == self.instance_id)
    }

    async fn post(&self, connection_id: &str, payload: &str) -> Result<(), DeliveryError> {
        let sent = match self.senders.get(connection_id) {
            Some(sender) => sender.send(payload.to_string()).is_ok(),
            None => return Err(DeliveryError::Gone(connection_id.to_string())),
        };

        if sent {
            Ok(())
        } else {
            // Receiver dropped: the socket task has exited
            self.senders.remove(connection_id);
            Err(DeliveryError::Gone(connection_id.to_string()))
        }
    }
}
