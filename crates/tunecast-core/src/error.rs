// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for tunecast-core.
//!
//! Provides a unified error type that maps to handler status codes.

use thiserror::Error;

/// Result type using CoreError
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors that can occur during request processing.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum CoreError {
    /// Input validation failed. Nothing was written.
    #[error("Validation error for '{field}': {message}")]
    ValidationError {
        /// The field that failed validation.
        field: String,
        /// The validation error message.
        message: String,
    },

    /// A conditional parameter write lost against a concurrent writer.
    #[error(
        "Version conflict for '{param_id}': expected {}, found {}",
        .expected.as_deref().unwrap_or("<none>"),
        .actual.as_deref().unwrap_or("<none>")
    )]
    VersionConflict {
        /// The parameter set being updated.
        param_id: String,
        /// The version the caller based its update on.
        expected: Option<String>,
        /// The version currently stored.
        actual: Option<String>,
    },

    /// Database operation failed.
    #[error("Database error during '{operation}': {details}")]
    DatabaseError {
        /// The operation that failed.
        operation: String,
        /// Error details.
        details: String,
    },
}

impl CoreError {
    /// Shorthand for a validation failure on `field`.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ValidationError {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ValidationError { .. } => "VALIDATION_ERROR",
            Self::VersionConflict { .. } => "VERSION_CONFLICT",
            Self::DatabaseError { .. } => "DATABASE_ERROR",
        }
    }

    /// HTTP-equivalent status for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::ValidationError { .. } => 400,
            Self::VersionConflict { .. } => 409,
            Self::DatabaseError { .. } => 500,
        }
    }

    /// Message echoed to callers in the `{error}` body.
    ///
    /// Validation failures return the bare message; the other variants
    /// return the full display text.
    pub fn public_message(&self) -> String {
        match self {
            Self::ValidationError { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        CoreError::DatabaseError {
            operation: "query".to_string(),
            details: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::DatabaseError {
            operation: "json".to_string(),
            details: err.to_string(),
        }
    }
}
