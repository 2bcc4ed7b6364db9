// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Parameter update flow: store, then ledger, then broadcast.

use std::sync::Arc;

use tracing::instrument;

use crate::error::Result;
use crate::fanout::{BroadcastReport, Broadcaster};
use crate::history::{HistoryLedger, changes_for};
use crate::outcome::Outcome;
use crate::params::{ParameterStore, ParameterUpdate};
use crate::persistence::{HistoryRecord, Persistence};
use crate::registry::ConnectionRegistry;
use crate::transport::PushTransport;

/// What an accepted update did.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateReceipt {
    /// Updated parameter set.
    pub param_id: String,
    /// Version written.
    pub version: String,
    /// Row timestamp, ms since epoch.
    pub timestamp: i64,
    /// Ledger rows written.
    pub history: Vec<HistoryRecord>,
    /// Fan-out result; its warnings are also merged into the outcome.
    pub broadcast: BroadcastReport,
}

/// Runs parameter updates end to end.
#[derive(Clone)]
pub struct ParameterService {
    store: ParameterStore,
    ledger: HistoryLedger,
    broadcaster: Broadcaster,
}

impl ParameterService {
    /// Build the service from shared handles.
    pub fn new(
        persistence: Arc<dyn Persistence>,
        registry: ConnectionRegistry,
        transport: Arc<dyn PushTransport>,
    ) -> Self {
        Self {
            store: ParameterStore::new(Arc::clone(&persistence)),
            ledger: HistoryLedger::new(persistence),
            broadcaster: Broadcaster::new(registry, transport),
        }
    }

    /// Parameter store.
    pub fn store(&self) -> &ParameterStore {
        &self.store
    }

    /// History ledger.
    pub fn ledger(&self) -> &HistoryLedger {
        &self.ledger
    }

    /// Broadcaster.
    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    /// Apply an update, record its changes and broadcast the new values.
    ///
    /// Fails only if validation or the parameter write fails. Ledger and
    /// delivery failures come back as warnings.
    #[instrument(skip(self, update), fields(param_id = %update.param_id, user_id = %update.user_id))]
    pub async fn update(&self, update: ParameterUpdate) -> Result<Outcome<UpdateReceipt>> {
        let applied = self.store.update(&update).await?;
        let record = &applied.record;

        let history = self
            .ledger
            .record(
                &record.param_id,
                &update.user_id,
                &update.user_email,
                record.timestamp,
                &changes_for(&applied),
            )
            .await;

        let broadcast = self
            .broadcaster
            .broadcast(
                &record.param_id,
                record.mean,
                record.std_dev,
                &update.user_email,
                &update.user_id,
            )
            .await;

        let mut warnings = history.warnings;
        warnings.extend(broadcast.warnings.iter().cloned());

        Ok(Outcome::with_warnings(
            UpdateReceipt {
                param_id: record.param_id.clone(),
                version: record.version.clone().unwrap_or_default(),
                timestamp: record.timestamp,
                history: history.value,
                broadcast,
            },
            warnings,
        ))
    }
}
