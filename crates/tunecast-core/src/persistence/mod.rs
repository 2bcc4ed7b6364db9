//! Persistence interfaces and backends for tunecast-core.
//!
//! This module defines the persistence abstraction and backend implementations.
//! All three tables are accessed with plain reads and single-row writes; there
//! are no transactions, so the database is the only point of serialization.

pub mod postgres;
pub mod sqlite;

pub use self::postgres::PostgresPersistence;
pub use self::sqlite::SqlitePersistence;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Parameter row from the persistence layer.
///
/// Rows are keyed by `(param_id, timestamp)`; the newest row for a
/// `param_id` is the current value.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterRecord {
    /// Parameter set identifier.
    pub param_id: String,
    /// Write time in milliseconds since epoch (sort key).
    pub timestamp: i64,
    /// Distribution mean.
    pub mean: f64,
    /// Distribution standard deviation, always > 0 for rows written here.
    pub std_dev: f64,
    /// Version tag (`v1`, `v2`, ...).
    pub version: Option<String>,
    /// Email of the last writer.
    pub last_updated_by: Option<String>,
    /// User id of the last writer.
    pub user_id: Option<String>,
    /// Same instant as `timestamp`, kept as its own attribute.
    pub last_updated_at: Option<i64>,
    /// Display title.
    pub title: Option<String>,
    /// Display description.
    pub description: Option<String>,
}

/// Immutable change-ledger row, one per changed field.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    /// User who made the change (partition key).
    pub user_id: String,
    /// Record time in milliseconds, unique per user (sort key).
    pub timestamp: i64,
    /// Changed field, `mean` or `stdDev`.
    pub param_name: String,
    /// Parameter set the change applies to.
    pub param_id: String,
    /// Value before the change.
    pub old_value: f64,
    /// Value after the change.
    pub new_value: f64,
    /// Email of the user who made the change.
    pub user_email: String,
}

/// Live real-time connection row.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRecord {
    /// Transport-assigned connection id.
    pub connection_id: String,
    /// Owning user, `anonymous` when unknown.
    pub user_id: String,
    /// Connect time in milliseconds since epoch.
    pub connected_at: i64,
    /// Absolute expiry in seconds since epoch.
    pub expiry: i64,
    /// Always `connected` for rows written by the registry.
    pub connection_status: String,
    /// Client address reported by the transport.
    pub client_ip: Option<String>,
    /// Instance holding the socket, `None` when any instance may deliver.
    #[serde(default)]
    pub owner: Option<String>,
}

/// Persistence interface used by the parameter, history and connection components.
#[async_trait]
pub trait Persistence: Send + Sync {
    // ========================================================================
    // Parameters
    // ========================================================================

    /// Newest row for `param_id`, if any.
    async fn latest_parameters(
        &self,
        param_id: &str,
    ) -> Result<Option<ParameterRecord>, CoreError>;

    /// Up to `limit` rows written by `user_id`, newest first.
    async fn parameters_by_user(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<ParameterRecord>, CoreError>;

    /// Write a parameter row, overwriting any row with the same key.
    async fn put_parameters(&self, record: &ParameterRecord) -> Result<(), CoreError>;

    /// Write a parameter row only if the newest stored version for its
    /// `param_id` equals `expected_version`.
    ///
    /// A missing row, or a row without a version, counts as `v0`; `None`
    /// is the same as `Some("v0")`.
    ///
    /// Returns true if the row was written.
    async fn put_parameters_if_version(
        &self,
        record: &ParameterRecord,
        expected_version: Option<&str>,
    ) -> Result<bool, CoreError>;

    // ========================================================================
    // History
    // ========================================================================

    /// Append a ledger row.
    ///
    /// Rows are never overwritten: a row whose `(user_id, timestamp)` is
    /// already taken is rejected with an error.
    async fn put_history(&self, record: &HistoryRecord) -> Result<(), CoreError>;

    /// Up to `limit` ledger rows for `user_id`, newest first.
    async fn list_history(&self, user_id: &str, limit: i64)
    -> Result<Vec<HistoryRecord>, CoreError>;

    // ========================================================================
    // Connections
    // ========================================================================

    /// Insert or overwrite a connection row.
    async fn put_connection(&self, record: &ConnectionRecord) -> Result<(), CoreError>;

    /// Look up a connection row.
    async fn get_connection(
        &self,
        connection_id: &str,
    ) -> Result<Option<ConnectionRecord>, CoreError>;

    /// Delete a connection row. Returns true if a row was removed.
    async fn delete_connection(&self, connection_id: &str) -> Result<bool, CoreError>;

    /// Every stored connection, expired or not.
    async fn list_connections(&self) -> Result<Vec<ConnectionRecord>, CoreError>;

    /// Delete up to `limit` connections whose expiry is at or before `now_secs`.
    ///
    /// This stands in for the time-to-live eviction a key-value store does on
    /// its own. Returns the number of rows removed.
    async fn purge_expired_connections(
        &self,
        _now_secs: i64,
        _limit: i64,
    ) -> Result<u64, CoreError> {
        // Default: no-op (storage with native TTL evicts by itself)
        Ok(0)
    }

    /// Check database connectivity.
    async fn health_check_db(&self) -> Result<bool, CoreError>;
}
