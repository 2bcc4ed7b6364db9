// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Primary results paired with non-fatal warnings.
//!
//! Audit writes and push deliveries are best effort: their failures are
//! logged and collected here instead of failing the request that caused
//! them.

use std::fmt;

/// A failure that did not abort the operation it happened in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// A history ledger row could not be written.
    HistoryWrite {
        /// Field whose change went unrecorded.
        param_name: String,
        /// Storage error text.
        message: String,
    },
    /// A push delivery failed for a reason other than the connection being gone.
    Delivery {
        /// Target connection.
        connection_id: String,
        /// Transport error text.
        message: String,
    },
    /// A gone connection could not be removed from the registry.
    StaleCleanup {
        /// Connection that should have been removed.
        connection_id: String,
        /// Storage error text.
        message: String,
    },
    /// The registry could not be listed, so nothing was broadcast.
    ConnectionScan {
        /// Storage error text.
        message: String,
    },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HistoryWrite {
                param_name,
                message,
            } => write!(f, "history write for '{}' failed: {}", param_name, message),
            Self::Delivery {
                connection_id,
                message,
            } => write!(f, "delivery to '{}' failed: {}", connection_id, message),
            Self::StaleCleanup {
                connection_id,
                message,
            } => write!(
                f,
                "removing stale connection '{}' failed: {}",
                connection_id, message
            ),
            Self::ConnectionScan { message } => {
                write!(f, "listing connections failed: {}", message)
            }
        }
    }
}

/// Result of a best-effort operation: the value plus whatever went wrong on the side.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome<T> {
    /// The primary result.
    pub value: T,
    /// Non-fatal failures, in the order they happened.
    pub warnings: Vec<Warning>,
}

impl<T> Outcome<T> {
    /// An outcome with no warnings.
    pub fn clean(value: T) -> Self {
        Self {
            value,
            warnings: Vec::new(),
        }
    }

    /// An outcome carrying the given warnings.
    pub fn with_warnings(value: T, warnings: Vec<Warning>) -> Self {
        Self { value, warnings }
    }

    /// True when nothing went wrong on the side.
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    /// Transform the value, keeping the warnings.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome {
            value: f(self.value),
            warnings: self.warnings,
        }
    }
}
