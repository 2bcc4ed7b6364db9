// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tunecast Tasks - Task Pipeline Glue
//!
//! Moves tasks from a task manager through a chat completion service into a
//! notes workspace, then closes them:
//!
//! ```text
//! fetch ──► preprocess ──► enrich ──► publish notes ──► close
//!   │                        │              │              │
//!   ▼                        ▼              ▼              ▼
//! task manager        completion API    notes API     task manager
//! ```
//!
//! Stages are independent handlers over the same [`ApiEvent`] /
//! [`ApiResponse`] envelopes as the parameter handlers; an orchestrator
//! (or the HTTP server) chains them.
//!
//! [`ApiEvent`]: tunecast_core::envelope::ApiEvent
//! [`ApiResponse`]: tunecast_core::envelope::ApiResponse

pub mod clients;
pub mod config;
pub mod error;
pub mod handlers;
pub mod model;
pub mod text;

pub use config::TasksConfig;
pub use error::TasksError;
pub use handlers::TaskPipeline;
pub use model::{EnrichedTask, Task};
