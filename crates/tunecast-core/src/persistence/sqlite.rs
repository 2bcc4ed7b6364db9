//! SQLite-backed persistence implementation.

use std::path::Path;

use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

use crate::error::CoreError;
use crate::migrations;

use super::{ConnectionRecord, HistoryRecord, ParameterRecord, Persistence};

/// SQLite-backed persistence provider.
#[derive(Clone)]
pub struct SqlitePersistence {
    pool: SqlitePool,
}

impl SqlitePersistence {
    /// Create a new SQLite persistence provider from an existing pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create and initialize a new SQLite persistence from a file path.
    ///
    /// This convenience constructor handles all setup:
    /// - Creates parent directories if they don't exist
    /// - Creates the database file if it doesn't exist
    /// - Connects to the database with sensible defaults
    /// - Runs all migrations
    ///
    /// # Example
    ///
    /// ```ignore
    /// let persistence = SqlitePersistence::from_path(".data/tunecast.db").await?;
    /// ```
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| CoreError::DatabaseError {
                operation: "create_dir".to_string(),
                details: format!("Failed to create directory {:?}: {}", parent, e),
            })?;
        }

        let url = format!("sqlite:{}?mode=rwc", path.to_string_lossy());

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .map_err(|e| CoreError::DatabaseError {
                operation: "connect".to_string(),
                details: format!("Failed to connect to SQLite at {:?}: {}", path, e),
            })?;

        migrations::run_sqlite(&pool)
            .await
            .map_err(|e| CoreError::DatabaseError {
                operation: "migrate".to_string(),
                details: format!("Failed to run migrations: {}", e),
            })?;

        Ok(Self { pool })
    }

    /// Underlying pool, for callers that need raw access (tests, health probes).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl Persistence for SqlitePersistence {
    async fn latest_parameters(
        &self,
        param_id: &str,
    ) -> Result<Option<ParameterRecord>, CoreError> {
        let record = sqlx::query_as::<_, ParameterRecord>(
            r#"
            SELECT param_id, timestamp, mean, std_dev, version, last_updated_by,
                   user_id, last_updated_at, title, description
            FROM parameters
            WHERE param_id = ?
            ORDER BY timestamp DESC
            LIMIT 1
            "#,
        )
        .bind(param_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn parameters_by_user(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<ParameterRecord>, CoreError> {
        let records = sqlx::query_as::<_, ParameterRecord>(
            r#"
            SELECT param_id, timestamp, mean, std_dev, version, last_updated_by,
                   user_id, last_updated_at, title, description
            FROM parameters
            WHERE user_id = ?
            ORDER BY timestamp DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn put_parameters(&self, record: &ParameterRecord) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            INSERT INTO parameters (param_id, timestamp, mean, std_dev, version,
                                    last_updated_by, user_id, last_updated_at, title, description)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT (param_id, timestamp) DO UPDATE SET
                mean = excluded.mean,
                std_dev = excluded.std_dev,
                version = excluded.version,
                last_updated_by = excluded.last_updated_by,
                user_id = excluded.user_id,
                last_updated_at = excluded.last_updated_at,
                title = excluded.title,
                description = excluded.description
            "#,
        )
        .bind(&record.param_id)
        .bind(record.timestamp)
        .bind(record.mean)
        .bind(record.std_dev)
        .bind(&record.version)
        .bind(&record.last_updated_by)
        .bind(&record.user_id)
        .bind(record.last_updated_at)
        .bind(&record.title)
        .bind(&record.description)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn put_parameters_if_version(
        &self,
        record: &ParameterRecord,
        expected_version: Option<&str>,
    ) -> Result<bool, CoreError> {
        // The guard and the insert run as one statement, and SQLite serializes writers.
        let result = sqlx::query(
            r#"
            INSERT OR REPLACE INTO parameters (param_id, timestamp, mean, std_dev, version,
                                               last_updated_by, user_id, last_updated_at,
                                               title, description)
            SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10
            WHERE COALESCE(
                (SELECT version FROM parameters
                 WHERE param_id = ?1
                 ORDER BY timestamp DESC
                 LIMIT 1),
                'v0'
            ) = ?11
            "#,
        )
        .bind(&record.param_id)
        .bind(record.timestamp)
        .bind(record.mean)
        .bind(record.std_dev)
        .bind(&record.version)
        .bind(&record.last_updated_by)
        .bind(&record.user_id)
        .bind(record.last_updated_at)
        .bind(&record.title)
        .bind(&record.description)
        .bind(expected_version.unwrap_or("v0"))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn put_history(&self, record: &HistoryRecord) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            INSERT INTO parameter_history
                (user_id, timestamp, param_name, param_id, old_value, new_value, user_email)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.user_id)
        .bind(record.timestamp)
        .bind(&record.param_name)
        .bind(&record.param_id)
        .bind(record.old_value)
        .bind(record.new_value)
        .bind(&record.user_email)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_history(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<HistoryRecord>, CoreError> {
        let records = sqlx::query_as::<_, HistoryRecord>(
            r#"
            SELECT user_id, timestamp, param_name, param_id, old_value, new_value, user_email
            FROM parameter_history
            WHERE user_id = ?
            ORDER BY timestamp DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn put_connection(&self, record: &ConnectionRecord) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO connections
                (connection_id, user_id, connected_at, expiry, connection_status, client_ip, owner)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.connection_id)
        .bind(&record.user_id)
        .bind(record.connected_at)
        .bind(record.expiry)
        .bind(&record.connection_status)
        .bind(&record.client_ip)
        .bind(&record.owner)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_connection(
        &self,
        connection_id: &str,
    ) -> Result<Option<ConnectionRecord>, CoreError> {
        let record = sqlx::query_as::<_, ConnectionRecord>(
            r#"
            SELECT connection_id, user_id, connected_at, expiry, connection_status, client_ip, owner
            FROM connections
            WHERE connection_id = ?
            "#,
        )
        .bind(connection_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn delete_connection(&self, connection_id: &str) -> Result<bool, CoreError> {
        let result = sqlx::query("DELETE FROM connections WHERE connection_id = ?")
            .bind(connection_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_connections(&self) -> Result<Vec<ConnectionRecord>, CoreError> {
        let records = sqlx::query_as::<_, ConnectionRecord>(
            r#"
            SELECT connection_id, user_id, connected_at, expiry, connection_status, client_ip, owner
            FROM connections
            ORDER BY connected_at, connection_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn purge_expired_connections(
        &self,
        now_secs: i64,
        limit: i64,
    ) -> Result<u64, CoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM connections
            WHERE connection_id IN (
                SELECT connection_id FROM connections
                WHERE expiry <= ?
                ORDER BY expiry
                LIMIT ?
            )
            "#,
        )
        .bind(now_secs)
        .bind(limit)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn health_check_db(&self) -> Result<bool, CoreError> {
        let row: (i64,) = sqlx::query_as("SELECT 1").fetch_one(&self.pool).await?;
        Ok(row.0 == 1)
    }
}
