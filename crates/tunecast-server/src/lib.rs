// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tunecast Server - HTTP and WebSocket surface
//!
//! Serves the parameter handlers over HTTP, keeps live WebSocket sessions
//! in an in-process hub that doubles as the push transport, and purges
//! expired connection rows in the background.
//!
//! ```text
//! HTTP ──► server (axum) ──► tunecast_core::handlers ──► Persistence
//!                                     │
//!                                     ▼ broadcast
//! WebSocket ◄── ws session ◄── ConnectionHub (PushTransport)
//!
//! ExpiryWorker ──► purge expired connections
//! ```

pub mod error;
pub mod expiry_worker;
pub mod hub;
pub mod server;
pub mod ws;

pub use error::{Error, Result};
pub use expiry_worker::{ExpiryWorker, ExpiryWorkerConfig};
pub use hub::ConnectionHub;
pub use server::{AppState, build_router, open_persistence};
