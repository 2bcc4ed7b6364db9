// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tunecast Core - Parameter Store and Real-Time Fan-out
//!
//! This crate holds the state behind a parameter-tuning visualization: the
//! current (mean, standard deviation) pair per parameter set, an audit
//! ledger of every change, a registry of open real-time connections and
//! the fan-out that pushes each change to them.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       tunecast-server                         │
//! │          (HTTP routes, WebSocket hub, expiry worker)          │
//! └──────────────────────────────────────────────────────────────┘
//!                               │ ApiEvent / ApiResponse
//!                               ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         handlers                              │
//! └──────────────────────────────────────────────────────────────┘
//!          │                    │                       │
//!          ▼                    ▼                       ▼
//! ┌─────────────────┐  ┌─────────────────┐   ┌────────────────────┐
//! │ ParameterService│  │  HistoryLedger  │   │ ConnectionRegistry │
//! │ store → ledger  │  │   (reads)       │   │ connect/disconnect │
//! │ → Broadcaster   │  └─────────────────┘   └────────────────────┘
//! └─────────────────┘                                   │
//!          │ PushTransport                              │
//!          ▼                                            ▼
//! ┌─────────────────┐                     ┌──────────────────────┐
//! │ hub / callback  │                     │ Persistence          │
//! │ / none          │                     │ (SQLite or Postgres) │
//! └─────────────────┘                     └──────────────────────┘
//! ```
//!
//! # Operations
//!
//! | Operation | Handler | Result |
//! |-----------|---------|--------|
//! | Health check | [`handlers::handle_health_check`] | `{healthy, version, uptimeMs}` |
//! | Get parameters | [`handlers::handle_get_parameters`] | current set, or a user's recent sets |
//! | Update parameters | [`handlers::handle_update_parameters`] | `{success, timestamp, paramId, version}` |
//! | Get history | [`handlers::handle_get_history`] | `{history, count}` |
//! | Connect | [`handlers::handle_connect`] | `Connected` |
//! | Disconnect | [`handlers::handle_disconnect`] | `Disconnected` |
//!
//! ## Update Semantics
//!
//! 1. The values are validated (`stdDev > 0`, both present). Nothing is
//!    written on failure.
//! 2. A new row is written with the next version tag (`v1`, `v2`, ...).
//!    Writes are last-writer-wins unless the caller sends `expectedVersion`.
//! 3. One ledger row is appended per changed field.
//! 4. The new values are pushed to every registered connection. Gone
//!    connections are removed.
//!
//! Steps 3 and 4 are best effort: their failures come back as
//! [`outcome::Warning`]s and the update still succeeds.
//!
//! # Configuration
//!
//! See [`config::Config::from_env`] for the environment variables.

#![deny(missing_docs)]

/// Configuration loaded from environment variables.
pub mod config;

/// Request and response envelopes.
pub mod envelope;

/// Error types.
pub mod error;

/// Broadcast fan-out.
pub mod fanout;

/// Request handlers.
pub mod handlers;

/// Change-history ledger.
pub mod history;

/// Embedded database migrations.
pub mod migrations;

/// Non-fatal warnings attached to results.
pub mod outcome;

/// Parameter store.
pub mod params;

/// Persistence trait and backends.
pub mod persistence;

/// Connection registry.
pub mod registry;

/// Update flow.
pub mod service;

/// Push transports.
pub mod transport;

pub use config::{Config, ConfigError, PushMode};
pub use envelope::{ApiEvent, ApiResponse};
pub use error::CoreError;
pub use fanout::{BroadcastReport, Broadcaster};
pub use handlers::HandlerState;
pub use history::HistoryLedger;
pub use outcome::{Outcome, Warning};
pub use params::{ParameterSet, ParameterStore, ParameterUpdate};
pub use persistence::{Persistence, PostgresPersistence, SqlitePersistence};
pub use registry::ConnectionRegistry;
pub use service::{ParameterService, UpdateReceipt};
pub use transport::{CallbackTransport, DeliveryError, NoopTransport, PushTransport};
