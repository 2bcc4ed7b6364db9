// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for tunecast-core integration tests.
//!
//! Provides an in-memory database, a recording push transport and a
//! persistence wrapper that fails ledger writes.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;

use tunecast_core::CoreError;
use tunecast_core::handlers::HandlerState;
use tunecast_core::migrations;
use tunecast_core::persistence::{
    ConnectionRecord, HistoryRecord, ParameterRecord, Persistence, SqlitePersistence,
};
use tunecast_core::registry::ConnectionRegistry;
use tunecast_core::transport::{DeliveryError, PushTransport};

/// Fresh in-memory database with migrations applied.
pub async fn memory_persistence() -> Arc<dyn Persistence> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory SQLite pool");

    migrations::run_sqlite(&pool)
        .await
        .expect("Failed to run migrations");

    Arc::new(SqlitePersistence::new(pool))
}

/// Handler state over the given persistence and transport.
pub fn handler_state(
    persistence: Arc<dyn Persistence>,
    transport: Arc<dyn PushTransport>,
) -> HandlerState {
    let registry = ConnectionRegistry::new(Arc::clone(&persistence));
    HandlerState::new(persistence, registry, transport)
}

/// Push transport that records deliveries.
///
/// Connections listed in `gone` answer [`DeliveryError::Gone`]; those in
/// `failing` answer [`DeliveryError::Failed`]. With an `owner` set, only
/// rows tagged with that owner (or untagged) are served.
#[derive(Default)]
pub struct RecordingTransport {
    gone: HashSet<String>,
    failing: HashSet<String>,
    owner: Option<String>,
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_gone(mut self, connection_id: &str) -> Self {
        self.gone.insert(connection_id.to_string());
        self
    }

    pub fn with_failing(mut self, connection_id: &str) -> Self {
        self.failing.insert(connection_id.to_string());
        self
    }

    pub fn owned_by(mut self, owner: &str) -> Self {
        self.owner = Some(owner.to_string());
        self
    }

    /// `(connection_id, payload)` for every successful delivery.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn delivered_to(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sent().into_iter().map(|(id, _)| id).collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl PushTransport for RecordingTransport {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn serves(&self, connection: &ConnectionRecord) -> bool {
        match (&self.owner, &connection.owner) {
            (Some(mine), Some(theirs)) => mine == theirs,
            _ => true,
        }
    }

    async fn post(&self, connection_id: &str, payload: &str) -> Result<(), DeliveryError> {
        if self.gone.contains(connection_id) {
            return Err(DeliveryError::Gone(connection_id.to_string()));
        }
        if self.failing.contains(connection_id) {
            return Err(DeliveryError::Failed("HTTP 500: boom".to_string()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((connection_id.to_string(), payload.to_string()));
        Ok(())
    }
}

/// Which operations a [`FaultyPersistence`] fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct Faults {
    pub history_writes: bool,
    pub connection_scan: bool,
    pub connection_delete: bool,
    pub parameter_reads: bool,
}

/// Wraps a real persistence and fails selected operations.
pub struct FaultyPersistence {
    inner: Arc<dyn Persistence>,
    faults: Faults,
}

impl FaultyPersistence {
    pub fn new(inner: Arc<dyn Persistence>, faults: Faults) -> Self {
        Self { inner, faults }
    }

    fn fault(operation: &str) -> CoreError {
        CoreError::DatabaseError {
            operation: operation.to_string(),
            details: "injected fault".to_string(),
        }
    }
}

#[async_trait]
impl Persistence for FaultyPersistence {
    async fn latest_parameters(
        &self,
        param_id: &str,
    ) -> Result<Option<ParameterRecord>, CoreError> {
        if self.faults.parameter_reads {
            return Err(Self::fault("latest_parameters"));
        }
        self.inner.latest_parameters(param_id).await
    }

    async fn parameters_by_user(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<ParameterRecord>, CoreError> {
        if self.faults.parameter_reads {
            return Err(Self::fault("parameters_by_user"));
        }
        self.inner.parameters_by_user(user_id, limit).await
    }

    async fn put_parameters(&self, record: &ParameterRecord) -> Result<(), CoreError> {
        self.inner.put_parameters(record).await
    }

    async fn put_parameters_if_version(
        &self,
        record: &ParameterRecord,
        expected_version: Option<&str>,
    ) -> Result<bool, CoreError> {
        self.inner
            .put_parameters_if_version(record, expected_version)
            .await
    }

    async fn put_history(&self, record: &HistoryRecord) -> Result<(), CoreError> {
        if self.faults.history_writes {
            return Err(Self::fault("put_history"));
        }
        self.inner.put_history(record).await
    }

    async fn list_history(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<HistoryRecord>, CoreError> {
        self.inner.list_history(user_id, limit).await
    }

    async fn put_connection(&self, record: &ConnectionRecord) -> Result<(), CoreError> {
        self.inner.put_connection(record).await
    }

    async fn get_connection(
        &self,
        connection_id: &str,
    ) -> Result<Option<ConnectionRecord>, CoreError> {
        self.inner.get_connection(connection_id).await
    }

    async fn delete_connection(&self, connection_id: &str) -> Result<bool, CoreError> {
        if self.faults.connection_delete {
            return Err(Self::fault("delete_connection"));
        }
        self.inner.delete_connection(connection_id).await
    }

    async fn list_connections(&self) -> Result<Vec<ConnectionRecord>, CoreError> {
        if self.faults.connection_scan {
            return Err(Self::fault("list_connections"));
        }
        self.inner.list_connections().await
    }

    async fn health_check_db(&self) -> Result<bool, CoreError> {
        self.inner.health_check_db().await
    }
}
