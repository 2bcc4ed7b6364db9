// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for tunecast-server.

use axum::response::{IntoResponse, Response};
use thiserror::Error;

use tunecast_core::ApiResponse;

use crate::server::GatewayResponse;

/// Server errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Configuration loading failed.
    #[error("Configuration error: {0}")]
    Config(#[from] tunecast_core::ConfigError),

    /// Database connection failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migrations failed.
    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Core operation failed.
    #[error("Core error: {0}")]
    Core(#[from] tunecast_core::CoreError),

    /// The HTTP request could not be turned into a gateway event.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Result type using the server Error.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// HTTP status this error answers with.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::InvalidRequest(_) => 400,
            Error::Core(e) => e.status_code(),
            _ => 500,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        GatewayResponse(ApiResponse::error(self.status_code(), self.to_string())).into_response()
    }
}
