// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Persistence operations for tunecast-core on PostgreSQL.
//!
//! Provides all durable storage access functions for parameters, history and connections.

use sqlx::PgPool;

use crate::error::CoreError;

use super::{ConnectionRecord, HistoryRecord, ParameterRecord, Persistence};

/// PostgreSQL-backed persistence implementation.
#[derive(Clone)]
pub struct PostgresPersistence {
    pool: PgPool,
}

impl PostgresPersistence {
    /// Create a new Postgres-backed persistence implementation.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// ============================================================================
// Parameter Operations
// ============================================================================

/// Newest parameter row for a parameter set.
pub async fn latest_parameters(
    pool: &PgPool,
    param_id: &str,
) -> Result<Option<ParameterRecord>, CoreError> {
    let record = sqlx::query_as::<_, ParameterRecord>(
        r#"
        SELECT param_id, timestamp, mean, std_dev, version, last_updated_by,
               user_id, last_updated_at, title, description
        FROM parameters
        WHERE param_id = $1
        ORDER BY timestamp DESC
        LIMIT 1
        "#,
    )
    .bind(param_id)
    .fetch_optional(pool)
    .await?;

    Ok(record)
}

/// Most recent parameter rows written by a user.
pub async fn parameters_by_user(
    pool: &PgPool,
    user_id: &str,
    limit: i64,
) -> Result<Vec<ParameterRecord>, CoreError> {
    let records = sqlx::query_as::<_, ParameterRecord>(
        r#"
        SELECT param_id, timestamp, mean, std_dev, version, last_updated_by,
               user_id, last_updated_at, title, description
        FROM parameters
        WHERE user_id = $1
        ORDER BY timestamp DESC
        LIMIT $2
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(records)
}

/// Write (or overwrite) a parameter row.
pub async fn put_parameters(pool: &PgPool, record: &ParameterRecord) -> Result<(), CoreError> {
    sqlx::query(
        r#"
        INSERT INTO parameters (param_id, timestamp, mean, std_dev, version,
                                last_updated_by, user_id, last_updated_at, title, description)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (param_id, timestamp) DO UPDATE SET
            mean = EXCLUDED.mean,
            std_dev = EXCLUDED.std_dev,
            version = EXCLUDED.version,
            last_updated_by = EXCLUDED.last_updated_by,
            user_id = EXCLUDED.user_id,
            last_updated_at = EXCLUDED.last_updated_at,
            title = EXCLUDED.title,
            description = EXCLUDED.description
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
    .execute(pool)
    .await?;

    Ok(())
}

/// Write a parameter row only if the stored head version matches.
///
/// Writers of one `param_id` are serialized by a transaction-scoped
/// advisory lock, so the head read by the guard is never stale under
/// READ COMMITTED.
pub async fn put_parameters_if_version(
    pool: &PgPool,
    record: &ParameterRecord,
    expected_version: Option<&str>,
) -> Result<bool, CoreError> {
    let mut tx = pool.begin().await?;

    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(&record.param_id)
        .execute(&mut *tx)
        .await?;

    let result = sqlx::query(
        r#"
        INSERT INTO parameters (param_id, timestamp, mean, std_dev, version,
                                last_updated_by, user_id, last_updated_at, title, description)
        SELECT $1, $2, $3, $4, $5, $6, $7, $8, $9, $10
        WHERE COALESCE(
            (SELECT version FROM parameters
             WHERE param_id = $1
             ORDER BY timestamp DESC
             LIMIT 1),
            'v0'
        ) = $11
        ON CONFLICT (param_id, timestamp) DO UPDATE SET
            mean = EXCLUDED.mean,
            std_dev = EXCLUDED.std_dev,
            version = EXCLUDED.version,
            last_updated_by = EXCLUDED.last_updated_by,
            user_id = EXCLUDED.user_id,
            last_updated_at = EXCLUDED.last_updated_at,
            title = EXCLUDED.title,
            description = EXCLUDED.description
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
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(result.rows_affected() > 0)
}

// ============================================================================
// History Operations
// ============================================================================

/// Append a ledger row. An existing `(user_id, timestamp)` is an error.
pub async fn put_history(pool: &PgPool, record: &HistoryRecord) -> Result<(), CoreError> {
    sqlx::query(
        r#"
        INSERT INTO parameter_history
            (user_id, timestamp, param_name, param_id, old_value, new_value, user_email)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(&record.user_id)
    .bind(record.timestamp)
    .bind(&record.param_name)
    .bind(&record.param_id)
    .bind(record.old_value)
    .bind(record.new_value)
    .bind(&record.user_email)
    .execute(pool)
    .await?;

    Ok(())
}

/// Newest ledger rows for a user.
pub async fn list_history(
    pool: &PgPool,
    user_id: &str,
    limit: i64,
) -> Result<Vec<HistoryRecord>, CoreError> {
    let records = sqlx::query_as::<_, HistoryRecord>(
        r#"
        SELECT user_id, timestamp, param_name, param_id, old_value, new_value, user_email
        FROM parameter_history
        WHERE user_id = $1
        ORDER BY timestamp DESC
        LIMIT $2
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(records)
}

// ============================================================================
// Connection Operations
// ============================================================================

/// Insert or overwrite a connection row.
pub async fn put_connection(pool: &PgPool, record: &ConnectionRecord) -> Result<(), CoreError> {
    sqlx::query(
        r#"
        INSERT INTO connections
            (connection_id, user_id, connected_at, expiry, connection_status, client_ip, owner)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (connection_id) DO UPDATE SET
            user_id = EXCLUDED.user_id,
            connected_at = EXCLUDED.connected_at,
            expiry = EXCLUDED.expiry,
            connection_status = EXCLUDED.connection_status,
            client_ip = EXCLUDED.client_ip,
            owner = EXCLUDED.owner
        "#,
    )
    .bind(&record.connection_id)
    .bind(&record.user_id)
    .bind(record.connected_at)
    .bind(record.expiry)
    .bind(&record.connection_status)
    .bind(&record.client_ip)
    .bind(&record.owner)
    .execute(pool)
    .await?;

    Ok(())
}

/// Look up one connection.
pub async fn get_connection(
    pool: &PgPool,
    connection_id: &str,
) -> Result<Option<ConnectionRecord>, CoreError> {
    let record = sqlx::query_as::<_, ConnectionRecord>(
        r#"
        SELECT connection_id, user_id, connected_at, expiry, connection_status, client_ip, owner
        FROM connections
        WHERE connection_id = $1
        "#,
    )
    .bind(connection_id)
    .fetch_optional(pool)
    .await?;

    Ok(record)
}

/// Delete one connection, reporting whether it existed.
pub async fn delete_connection(pool: &PgPool, connection_id: &str) -> Result<bool, CoreError> {
    let result = sqlx::query("DELETE FROM connections WHERE connection_id = $1")
        .bind(connection_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// All stored connections.
pub async fn list_connections(pool: &PgPool) -> Result<Vec<ConnectionRecord>, CoreError> {
    let records = sqlx::query_as::<_, ConnectionRecord>(
        r#"
        SELECT connection_id, user_id, connected_at, expiry, connection_status, client_ip, owner
        FROM connections
        ORDER BY connected_at, connection_id
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(records)
}

/// Delete a batch of expired connections.
pub async fn purge_expired_connections(
    pool: &PgPool,
    now_secs: i64,
    limit: i64,
) -> Result<u64, CoreError> {
    let result = sqlx::query(
        r#"
        DELETE FROM connections
        WHERE connection_id IN (
            SELECT connection_id FROM connections
            WHERE expiry <= $1
            ORDER BY expiry
            LIMIT $2
        )
        "#,
    )
    .bind(now_secs)
    .bind(limit)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Check database connectivity.
pub async fn health_check_db(pool: &PgPool) -> Result<bool, CoreError> {
    let row: (i32,) = sqlx::query_as("SELECT 1").fetch_one(pool).await?;
    Ok(row.0 == 1)
}

#[async_trait::async_trait]
impl Persistence for PostgresPersistence {
    async fn latest_parameters(
        &self,
        param_id: &str,
    ) -> Result<Option<ParameterRecord>, CoreError> {
        latest_parameters(&self.pool, param_id).await
    }

    async fn parameters_by_user(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<ParameterRecord>, CoreError> {
        parameters_by_user(&self.pool, user_id, limit).await
    }

    async fn put_parameters(&self, record: &ParameterRecord) -> Result<(), CoreError> {
        put_parameters(&self.pool, record).await
    }

    async fn put_parameters_if_version(
        &self,
        record: &ParameterRecord,
        expected_version: Option<&str>,
    ) -> Result<bool, CoreError> {
        put_parameters_if_version(&self.pool, record, expected_version).await
    }

    async fn put_history(&self, record: &HistoryRecord) -> Result<(), CoreError> {
        put_history(&self.pool, record).await
    }

    async fn list_history(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<HistoryRecord>, CoreError> {
        list_history(&self.pool, user_id, limit).await
    }

    async fn put_connection(&self, record: &ConnectionRecord) -> Result<(), CoreError> {
        put_connection(&self.pool, record).await
    }

    async fn get_connection(
        &self,
        connection_id: &str,
    ) -> Result<Option<ConnectionRecord>, CoreError> {
        get_connection(&self.pool, connection_id).await
    }

    async fn delete_connection(&self, connection_id: &str) -> Result<bool, CoreError> {
        delete_connection(&self.pool, connection_id).await
    }

    async fn list_connections(&self) -> Result<Vec<ConnectionRecord>, CoreError> {
        list_connections(&self.pool).await
    }

    async fn purge_expired_connections(
        &self,
        now_secs: i64,
        limit: i64,
    ) -> Result<u64, CoreError> {
        purge_expired_connections(&self.pool, now_secs, limit).await
    }

    async fn health_check_db(&self) -> Result<bool, CoreError> {
        health_check_db(&self.pool).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations;

    // Helper to get a test database pool
    async fn test_pool() -> Option<PgPool> {
        let url = std::env::var("TEST_DATABASE_URL").ok()?;
        let pool = PgPool::connect(&url).await.ok()?;
        migrations::run_postgres(&pool).await.ok()?;
        Some(pool)
    }

    fn unique(prefix: &str) -> String {
        format!(
            "{}-{}",
            prefix,
            chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
        )
    }

    fn row(param_id: &str, timestamp: i64, version: &str) -> ParameterRecord {
        ParameterRecord {
            param_id: param_id.to_string(),
            timestamp,
            mean: 1.0,
            std_dev: 2.0,
            version: Some(version.to_string()),
            last_updated_by: Some("pg@example.com".to_string()),
            user_id: Some("pg-user".to_string()),
            last_updated_at: Some(timestamp),
            title: None,
            description: None,
        }
    }

    async fn cleanup(pool: &PgPool, param_id: &str) {
        sqlx::query("DELETE FROM parameters WHERE param_id = $1")
            .bind(param_id)
            .execute(pool)
            .await
            .ok();
    }

    #[tokio::test]
    async fn test_put_and_latest_parameters() {
        let Some(pool) = test_pool().await else {
            eprintln!("Skipping test: TEST_DATABASE_URL not set");
            return;
        };
        let param_id = unique("pg-params");

        put_parameters(&pool, &row(&param_id, 10, "v1")).await.unwrap();
        put_parameters(&pool, &row(&param_id, 20, "v2")).await.unwrap();

        let latest = latest_parameters(&pool, &param_id).await.unwrap().unwrap();
        assert_eq!(latest.version.as_deref(), Some("v2"));

        cleanup(&pool, &param_id).await;
    }

    #[tokio::test]
    async fn test_conditional_put() {
        let Some(pool) = test_pool().await else {
            eprintln!("Skipping test: TEST_DATABASE_URL not set");
            return;
        };
        let param_id = unique("pg-occ");

        assert!(
            put_parameters_if_version(&pool, &row(&param_id, 10, "v1"), None)
                .await
                .unwrap()
        );
        assert!(
            !put_parameters_if_version(&pool, &row(&param_id, 20, "v2"), None)
                .await
                .unwrap()
        );
        assert!(
            put_parameters_if_version(&pool, &row(&param_id, 20, "v2"), Some("v1"))
                .await
                .unwrap()
        );

        cleanup(&pool, &param_id).await;
    }

    #[tokio::test]
    async fn test_concurrent_conditional_puts_have_one_winner() {
        let Some(pool) = test_pool().await else {
            eprintln!("Skipping test: TEST_DATABASE_URL not set");
            return;
        };
        let param_id = unique("pg-race");

        put_parameters(&pool, &row(&param_id, 10, "v1")).await.unwrap();

        let writers = (0..8).map(|i| {
            let pool = pool.clone();
            let record = row(&param_id, 20 + i, "v2");
            tokio::spawn(async move {
                put_parameters_if_version(&pool, &record, Some("v1")).await
            })
        });
        let mut winners = 0;
        for writer in futures::future::join_all(writers).await {
            if writer.unwrap().unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);

        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM parameters WHERE param_id = $1")
                .bind(&param_id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(count, 2);

        cleanup(&pool, &param_id).await;
    }

    #[tokio::test]
    async fn test_connection_lifecycle() {
        let Some(pool) = test_pool().await else {
            eprintln!("Skipping test: TEST_DATABASE_URL not set");
            return;
        };
        let connection_id = unique("pg-conn");

        put_connection(
            &pool,
            &ConnectionRecord {
                connection_id: connection_id.clone(),
                user_id: "anonymous".to_string(),
                connected_at: 1,
                expiry: 1,
                connection_status: "connected".to_string(),
                client_ip: None,
                owner: None,
            },
        )
        .await
        .unwrap();

        assert!(get_connection(&pool, &connection_id).await.unwrap().is_some());
        assert!(delete_connection(&pool, &connection_id).await.unwrap());
        assert!(!delete_connection(&pool, &connection_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_health_check() {
        let Some(pool) = test_pool().await else {
            eprintln!("Skipping test: TEST_DATABASE_URL not set");
            return;
        };
        assert!(health_check_db(&pool).await.unwrap());
    }
}
