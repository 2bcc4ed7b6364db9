// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Parameter store.
//!
//! Holds the current (mean, standard deviation) pair per parameter set.
//! Every accepted update writes a new row keyed by `(param_id, timestamp)`;
//! the newest row wins. Writes are last-writer-wins unless the caller
//! supplies the version it read, in which case the write is conditional.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{CoreError, Result};
use crate::persistence::{ParameterRecord, Persistence};

/// Parameter set used when a request names none.
pub const DEFAULT_PARAM_ID: &str = "normal_distribution_params";

/// Title written when an update does not carry one.
pub const DEFAULT_TITLE: &str = "Normal Distribution Parameters";

/// Mean reported for a parameter set that was never written.
pub const DEFAULT_MEAN: f64 = 0.0;

/// Standard deviation reported for a parameter set that was never written.
pub const DEFAULT_STD_DEV: f64 = 1.0;

/// How many rows a per-user listing returns.
pub const USER_QUERY_LIMIT: i64 = 10;

/// Version a missing row is treated as having.
pub const INITIAL_VERSION: &str = "v0";

/// Ledger slots each update reserves after its base timestamp.
const LEDGER_SLOTS: i64 = 2;

/// A parameter set as returned to callers.
///
/// `last_updated_by` and `last_updated_at` are always serialized so a
/// never-written set renders them as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterSet {
    /// Parameter set identifier.
    pub param_id: String,
    /// Distribution mean.
    pub mean: f64,
    /// Distribution standard deviation.
    pub std_dev: f64,
    /// Email of the last writer.
    pub last_updated_by: Option<String>,
    /// Time of the last write, ms since epoch.
    pub last_updated_at: Option<i64>,
    /// Row key; absent for a never-written set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    /// Version tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// User id of the last writer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Display title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Display description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ParameterSet {
    /// The set reported for a `param_id` with no stored row.
    pub fn default_for(param_id: impl Into<String>) -> Self {
        Self {
            param_id: param_id.into(),
            mean: DEFAULT_MEAN,
            std_dev: DEFAULT_STD_DEV,
            last_updated_by: None,
            last_updated_at: None,
            timestamp: None,
            version: None,
            user_id: None,
            title: None,
            description: None,
        }
    }

    /// True if this set was never written.
    pub fn is_default(&self) -> bool {
        self.timestamp.is_none()
    }
}

impl From<ParameterRecord> for ParameterSet {
    fn from(record: ParameterRecord) -> Self {
        Self {
            param_id: record.param_id,
            mean: record.mean,
            std_dev: record.std_dev,
            last_updated_by: record.last_updated_by,
            last_updated_at: record.last_updated_at,
            timestamp: Some(record.timestamp),
            version: record.version,
            user_id: record.user_id,
            title: record.title,
            description: record.description,
        }
    }
}

/// A requested change to a parameter set.
///
/// `mean` and `std_dev` are optional here so that missing fields are
/// reported as validation errors rather than deserialization errors.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterUpdate {
    /// Target parameter set.
    pub param_id: String,
    /// New mean.
    pub mean: Option<f64>,
    /// New standard deviation, must be positive.
    pub std_dev: Option<f64>,
    /// Caller's user id.
    pub user_id: String,
    /// Caller's email, stored as `lastUpdatedBy`.
    pub user_email: String,
    /// Display title; the default title is written when absent.
    pub title: Option<String>,
    /// Display description; empty when absent.
    pub description: Option<String>,
    /// When set, the write only happens if the stored version still equals this.
    pub expected_version: Option<String>,
}

impl ParameterUpdate {
    /// An unconditional update with both values present.
    pub fn new(
        param_id: impl Into<String>,
        mean: f64,
        std_dev: f64,
        user_id: impl Into<String>,
        user_email: impl Into<String>,
    ) -> Self {
        Self {
            param_id: param_id.into(),
            mean: Some(mean),
            std_dev: Some(std_dev),
            user_id: user_id.into(),
            user_email: user_email.into(),
            title: None,
            description: None,
            expected_version: None,
        }
    }

    /// Make the write conditional on the stored version.
    pub fn expecting(mut self, version: impl Into<String>) -> Self {
        self.expected_version = Some(version.into());
        self
    }

    /// Check required fields and the `std_dev > 0` invariant.
    pub fn validate(&self) -> Result<(f64, f64)> {
        let (Some(mean), Some(std_dev)) = (self.mean, self.std_dev) else {
            return Err(CoreError::validation(
                if self.mean.is_none() { "mean" } else { "stdDev" },
                "Missing required parameters: mean and stdDev",
            ));
        };

        if !mean.is_finite() {
            return Err(CoreError::validation("mean", "mean must be a finite number"));
        }
        if !std_dev.is_finite() {
            return Err(CoreError::validation(
                "stdDev",
                "stdDev must be a finite number",
            ));
        }
        if std_dev <= 0.0 {
            return Err(CoreError::validation(
                "stdDev",
                "Standard deviation must be positive",
            ));
        }
        if self.param_id.trim().is_empty() {
            return Err(CoreError::validation("paramId", "paramId must not be empty"));
        }

        Ok((mean, std_dev))
    }
}

/// What an accepted update wrote, plus the values it replaced.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedUpdate {
    /// The row that was written.
    pub record: ParameterRecord,
    /// Mean before the update (`0` for a new set).
    pub previous_mean: f64,
    /// Standard deviation before the update (`1` for a new set).
    pub previous_std_dev: f64,
    /// Version before the update, if any.
    pub previous_version: Option<String>,
}

/// Version tag following `current`.
///
/// `v<N>` becomes `v<N+1>`; a missing or unparseable tag restarts at `v1`.
pub fn next_version(current: Option<&str>) -> String {
    match current
        .and_then(|v| v.strip_prefix('v'))
        .and_then(|n| n.parse::<u64>().ok())
    {
        Some(n) => format!("v{}", n.saturating_add(1)),
        None => "v1".to_string(),
    }
}

/// Reads and writes parameter sets.
#[derive(Clone)]
pub struct ParameterStore {
    persistence: Arc<dyn Persistence>,
}

impl ParameterStore {
    /// Create a store over the given persistence.
    pub fn new(persistence: Arc<dyn Persistence>) -> Self {
        Self { persistence }
    }

    /// Current set for `param_id`, or the default set when none was written.
    pub async fn get(&self, param_id: &str) -> Result<ParameterSet> {
        let record = self.persistence.latest_parameters(param_id).await?;
        Ok(record
            .map(ParameterSet::from)
            .unwrap_or_else(|| ParameterSet::default_for(param_id)))
    }

    /// Up to ten rows most recently written by `user_id`, newest first.
    pub async fn get_by_user(&self, user_id: &str) -> Result<Vec<ParameterSet>> {
        if user_id.is_empty() {
            return Ok(Vec::new());
        }

        let records = self
            .persistence
            .parameters_by_user(user_id, USER_QUERY_LIMIT)
            .await?;
        Ok(records.into_iter().map(ParameterSet::from).collect())
    }

    /// Validate and apply an update.
    ///
    /// Nothing is written when validation fails. With `expected_version`
    /// set, a stale version yields [`CoreError::VersionConflict`] whether it
    /// is noticed on the read or at write time.
    pub async fn update(&self, update: &ParameterUpdate) -> Result<AppliedUpdate> {
        let (mean, std_dev) = update.validate()?;

        let current = self
            .persistence
            .latest_parameters(&update.param_id)
            .await?;

        let previous_mean = current.as_ref().map_or(DEFAULT_MEAN, |r| r.mean);
        let previous_std_dev = current.as_ref().map_or(DEFAULT_STD_DEV, |r| r.std_dev);
        let previous_version = current.as_ref().and_then(|r| r.version.clone());

        if let Some(expected) = update.expected_version.as_deref() {
            let actual = previous_version.as_deref().unwrap_or(INITIAL_VERSION);
            if expected != actual {
                return Err(CoreError::VersionConflict {
                    param_id: update.param_id.clone(),
                    expected: Some(expected.to_string()),
                    actual: previous_version,
                });
            }
        }

        // Keep per-set timestamps strictly increasing, leaving room for the
        // ledger's per-field offsets.
        let now = Utc::now().timestamp_millis();
        let timestamp = match &current {
            Some(r) => now.max(r.timestamp + LEDGER_SLOTS),
            None => now,
        };

        let record = ParameterRecord {
            param_id: update.param_id.clone(),
            timestamp,
            mean,
            std_dev,
            version: Some(next_version(previous_version.as_deref())),
            last_updated_by: Some(update.user_email.clone()),
            user_id: Some(update.user_id.clone()),
            last_updated_at: Some(timestamp),
            title: Some(
                update
                    .title
                    .clone()
                    .unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            ),
            description: Some(update.description.clone().unwrap_or_default()),
        };

        match update.expected_version.as_deref() {
            Some(expected) => {
                let written = self
                    .persistence
                    .put_parameters_if_version(&record, Some(expected))
                    .await?;
                if !written {
                    let actual = self
                        .persistence
                        .latest_parameters(&update.param_id)
                        .await?
                        .and_then(|r| r.version);
                    debug!(
                        param_id = %update.param_id,
                        expected = %expected,
                        "Conditional parameter write lost"
                    );
                    return Err(CoreError::VersionConflict {
                        param_id: update.param_id.clone(),
                        expected: Some(expected.to_string()),
                        actual,
                    });
                }
            }
            None => self.persistence.put_parameters(&record).await?,
        }

        info!(
            param_id = %record.param_id,
            version = record.version.as_deref().unwrap_or_default(),
            user_id = %update.user_id,
            "Parameters updated"
        );

        Ok(AppliedUpdate {
            record,
            previous_mean,
            previous_std_dev,
            previous_version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::memory_persistence;

    #[test]
    fn test_next_version() {
        assert_eq!(next_version(None), "v1");
        assert_eq!(next_version(Some("v0")), "v1");
        assert_eq!(next_version(Some("v1")), "v2");
        assert_eq!(next_version(Some("v41")), "v42");
        assert_eq!(next_version(Some("draft")), "v1");
        assert_eq!(next_version(Some("v")), "v1");
        assert_eq!(next_version(Some("v-3")), "v1");
    }

    #[test]
    fn test_validate_rejects_bad_input() {
        let mut update = ParameterUpdate::new("p1", 1.0, 2.0, "u1", "u1@x.com");
        assert_eq!(update.validate().unwrap(), (1.0, 2.0));

        update.std_dev = Some(0.0);
        let err = update.validate().unwrap_err();
        assert_eq!(err.public_message(), "Standard deviation must be positive");

        update.std_dev = Some(-1.5);
        assert!(update.validate().is_err());

        update.std_dev = None;
        let err = update.validate().unwrap_err();
        assert_eq!(
            err.public_message(),
            "Missing required parameters: mean and stdDev"
        );

        update.std_dev = Some(1.0);
        update.mean = Some(f64::NAN);
        assert_eq!(update.validate().unwrap_err().error_code(), "VALIDATION_ERROR");

        update.mean = Some(1.0);
        update.std_dev = Some(f64::INFINITY);
        assert!(update.validate().is_err());
    }

    #[test]
    fn test_default_set_serializes_nulls() {
        let json = serde_json::to_value(ParameterSet::default_for("p1")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "paramId": "p1",
                "mean": 0.0,
                "stdDev": 1.0,
                "lastUpdatedBy": null,
                "lastUpdatedAt": null,
            })
        );
    }

    #[tokio::test]
    async fn test_get_unknown_returns_default() {
        let store = ParameterStore::new(memory_persistence().await);

        let set = store.get("never_written").await.unwrap();
        assert!(set.is_default());
        assert_eq!(set.mean, 0.0);
        assert_eq!(set.std_dev, 1.0);
        assert_eq!(set.last_updated_by, None);
        assert_eq!(set.param_id, "never_written");
    }

    #[tokio::test]
    async fn test_update_then_get() {
        let store = ParameterStore::new(memory_persistence().await);

        let applied = store
            .update(&ParameterUpdate::new("p1", 5.0, 2.0, "u1", "u1@x.com"))
            .await
            .unwrap();
        assert_eq!(applied.record.version.as_deref(), Some("v1"));
        assert_eq!(applied.previous_mean, 0.0);
        assert_eq!(applied.previous_std_dev, 1.0);
        assert_eq!(applied.previous_version, None);

        let set = store.get("p1").await.unwrap();
        assert_eq!(set.mean, 5.0);
        assert_eq!(set.std_dev, 2.0);
        assert_eq!(set.last_updated_by.as_deref(), Some("u1@x.com"));
        assert_eq!(set.version.as_deref(), Some("v1"));
        assert_eq!(set.title.as_deref(), Some(DEFAULT_TITLE));
        assert_eq!(set.description.as_deref(), Some(""));
        assert_eq!(set.last_updated_at, set.timestamp);
    }

    #[tokio::test]
    async fn test_versions_increment_and_timestamps_increase() {
        let store = ParameterStore::new(memory_persistence().await);

        let mut last_ts = 0;
        for (i, expected) in ["v1", "v2", "v3"].iter().enumerate() {
            let applied = store
                .update(&ParameterUpdate::new("p1", i as f64, 1.0, "u1", "u1@x.com"))
                .await
                .unwrap();
            assert_eq!(applied.record.version.as_deref(), Some(*expected));
            assert!(applied.record.timestamp >= last_ts + LEDGER_SLOTS || last_ts == 0);
            last_ts = applied.record.timestamp;
        }

        let set = store.get("p1").await.unwrap();
        assert_eq!(set.version.as_deref(), Some("v3"));
        assert_eq!(set.mean, 2.0);
    }

    #[tokio::test]
    async fn test_rejected_update_leaves_store_unchanged() {
        let store = ParameterStore::new(memory_persistence().await);
        store
            .update(&ParameterUpdate::new("p1", 5.0, 2.0, "u1", "u1@x.com"))
            .await
            .unwrap();

        let err = store
            .update(&ParameterUpdate::new("p1", 9.0, 0.0, "u1", "u1@x.com"))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);

        let set = store.get("p1").await.unwrap();
        assert_eq!(set.mean, 5.0);
        assert_eq!(set.version.as_deref(), Some("v1"));
    }

    #[tokio::test]
    async fn test_expected_version_conflict() {
        let store = ParameterStore::new(memory_persistence().await);

        // v0 matches a set that was never written
        store
            .update(&ParameterUpdate::new("p1", 1.0, 1.0, "u1", "a@x.com").expecting("v0"))
            .await
            .unwrap();
        store
            .update(&ParameterUpdate::new("p1", 2.0, 1.0, "u2", "b@x.com").expecting("v1"))
            .await
            .unwrap();

        let err = store
            .update(&ParameterUpdate::new("p1", 3.0, 1.0, "u1", "a@x.com").expecting("v1"))
            .await
            .unwrap_err();
        match err {
            CoreError::VersionConflict {
                expected, actual, ..
            } => {
                assert_eq!(expected.as_deref(), Some("v1"));
                assert_eq!(actual.as_deref(), Some("v2"));
            }
            other => panic!("expected conflict, got {:?}", other),
        }

        let set = store.get("p1").await.unwrap();
        assert_eq!(set.mean, 2.0);
        assert_eq!(set.version.as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn test_get_by_user() {
        let store = ParameterStore::new(memory_persistence().await);

        assert!(store.get_by_user("").await.unwrap().is_empty());
        assert!(store.get_by_user("u1").await.unwrap().is_empty());

        for id in ["a", "b", "c"] {
            store
                .update(&ParameterUpdate::new(id, 1.0, 1.0, "u1", "u1@x.com"))
                .await
                .unwrap();
        }
        store
            .update(&ParameterUpdate::new("d", 1.0, 1.0, "u2", "u2@x.com"))
            .await
            .unwrap();

        let sets = store.get_by_user("u1").await.unwrap();
        assert_eq!(sets.len(), 3);
        assert!(sets.iter().all(|s| s.user_id.as_deref() == Some("u1")));
    }
}
