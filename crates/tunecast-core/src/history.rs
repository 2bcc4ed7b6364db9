// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Change-history ledger.
//!
//! One immutable row per changed field per update. The ledger is an audit
//! trail: write failures are reported as warnings and never undo the
//! parameter write that produced them.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::Result;
use crate::outcome::{Outcome, Warning};
use crate::params::AppliedUpdate;
use crate::persistence::{HistoryRecord, Persistence};

/// Ledger name of the mean field.
pub const FIELD_MEAN: &str = "mean";

/// Ledger name of the standard deviation field.
pub const FIELD_STD_DEV: &str = "stdDev";

/// A single field change.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    /// Field name as stored in the ledger.
    pub field: &'static str,
    /// Value before the change.
    pub old_value: f64,
    /// Value after the change.
    pub new_value: f64,
    /// Offset from the update's timestamp this row is stamped with.
    pub slot: i64,
}

/// Field changes an applied update produced, in ledger order.
///
/// Only fields whose value actually changed are listed. Each field keeps a
/// fixed slot (`mean` 0, `stdDev` 1) whether or not the other one changed.
pub fn changes_for(applied: &AppliedUpdate) -> Vec<FieldChange> {
    let candidates = [
        (FIELD_MEAN, applied.previous_mean, applied.record.mean),
        (
            FIELD_STD_DEV,
            applied.previous_std_dev,
            applied.record.std_dev,
        ),
    ];

    candidates
        .into_iter()
        .zip(0..)
        .filter(|((_, old, new), _)| old != new)
        .map(|((field, old_value, new_value), slot)| FieldChange {
            field,
            old_value,
            new_value,
            slot,
        })
        .collect()
}

/// Append-only change ledger.
#[derive(Clone)]
pub struct HistoryLedger {
    persistence: Arc<dyn Persistence>,
}

impl HistoryLedger {
    /// Create a ledger over the given persistence.
    pub fn new(persistence: Arc<dyn Persistence>) -> Self {
        Self { persistence }
    }

    /// Write one row per change.
    ///
    /// Each row is stamped `base_timestamp + slot`, moved forward past the
    /// user's newest ledger row when that one is later. Updates to different
    /// parameter sets by the same user therefore never share a key.
    /// Returns the rows that were written; failed writes become warnings.
    pub async fn record(
        &self,
        param_id: &str,
        user_id: &str,
        user_email: &str,
        base_timestamp: i64,
        changes: &[FieldChange],
    ) -> Outcome<Vec<HistoryRecord>> {
        let mut written = Vec::with_capacity(changes.len());
        let mut warnings = Vec::new();
        if changes.is_empty() {
            return Outcome::clean(written);
        }

        let mut next_free = self.next_free_timestamp(user_id).await;

        for change in changes {
            let timestamp = (base_timestamp + change.slot).max(next_free);
            next_free = timestamp + 1;

            let record = HistoryRecord {
                user_id: user_id.to_string(),
                timestamp,
                param_name: change.field.to_string(),
                param_id: param_id.to_string(),
                old_value: change.old_value,
                new_value: change.new_value,
                user_email: user_email.to_string(),
            };

            match self.persistence.put_history(&record).await {
                Ok(()) => written.push(record),
                Err(e) => {
                    warn!(
                        param_id = %param_id,
                        param_name = change.field,
                        error = %e,
                        "Failed to write history record"
                    );
                    warnings.push(Warning::HistoryWrite {
                        param_name: change.field.to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        if !written.is_empty() {
            info!(
                param_id = %param_id,
                user_id = %user_id,
                records = written.len(),
                "History recorded"
            );
        }

        Outcome::with_warnings(written, warnings)
    }

    /// First timestamp after the user's newest ledger row.
    ///
    /// A failed read falls back to no floor; a resulting key clash then
    /// surfaces as a write warning.
    async fn next_free_timestamp(&self, user_id: &str) -> i64 {
        match self.persistence.list_history(user_id, 1).await {
            Ok(rows) => rows.first().map_or(i64::MIN, |newest| newest.timestamp + 1),
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Failed to read newest history row");
                i64::MIN
            }
        }
    }

    /// Up to `limit` rows for `user_id`, newest first.
    pub async fn recent(&self, user_id: &str, limit: i64) -> Result<Vec<HistoryRecord>> {
        self.persistence.list_history(user_id, limit.max(0)).await
    }
}
