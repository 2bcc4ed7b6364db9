// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for tunecast-tasks.

use thiserror::Error;

/// Result type using TasksError
pub type Result<T> = std::result::Result<T, TasksError>;

/// Errors raised by the task pipeline.
#[derive(Debug, Error)]
pub enum TasksError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnv(&'static str),

    /// The pipeline definition file could not be read or parsed.
    #[error("invalid pipeline config {path}: {details}")]
    Config {
        /// File that failed.
        path: String,
        /// What went wrong.
        details: String,
    },

    /// The request body was not what the handler expects.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An upstream API could not be reached.
    #[error("{service} request failed: {details}")]
    Transport {
        /// Upstream service name.
        service: &'static str,
        /// Client error text.
        details: String,
    },

    /// An upstream API answered with an error status.
    #[error("{service} API error ({status}): {body}")]
    Api {
        /// Upstream service name.
        service: &'static str,
        /// HTTP status code.
        status: u16,
        /// Error body or message.
        body: String,
    },

    /// An upstream API answered with a body that could not be decoded.
    #[error("failed to decode {service} response: {details}")]
    Decode {
        /// Upstream service name.
        service: &'static str,
        /// Decoder error text.
        details: String,
    },
}

impl TasksError {
    /// HTTP-equivalent status for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidInput(_) => 400,
            _ => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(TasksError::InvalidInput("bad date".into()).status_code(), 400);
        assert_eq!(
            TasksError::Api {
                service: "todoist",
                status: 401,
                body: "Forbidden".into(),
            }
            .status_code(),
            500
        );
    }

    #[test]
    fn test_display() {
        let err = TasksError::Api {
            service: "notion",
            status: 400,
            body: "body failed validation".into(),
        };
        assert_eq!(
            err.to_string(),
            "notion API error (400): body failed validation"
        );
        assert_eq!(
            TasksError::MissingEnv("OPENAI_API_KEY").to_string(),
            "missing required environment variable: OPENAI_API_KEY"
        );
    }
}
