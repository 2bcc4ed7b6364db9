// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::net::SocketAddr;
use std::time::Duration;

/// How parameter updates are pushed to live connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushMode {
    /// Deliver through the server's own WebSocket hub.
    Local,
    /// POST to an external connection-management endpoint.
    Callback {
        /// Base URL; deliveries go to `{endpoint}/@connections/{id}`.
        endpoint: String,
    },
    /// No push transport; broadcasts are skipped.
    Disabled,
}

/// tunecast configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL or SQLite connection URL
    pub database_url: String,
    /// HTTP server address
    pub http_addr: SocketAddr,
    /// Push transport selection
    pub push_mode: PushMode,
    /// Lifetime of a registered connection before it expires
    pub connection_ttl: Duration,
    /// How often expired connections are purged
    pub expiry_sweep_interval: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `TUNECAST_DATABASE_URL`: PostgreSQL or SQLite connection string
    ///
    /// Optional (with defaults):
    /// - `TUNECAST_HTTP_PORT`: HTTP server port (default: 8080)
    /// - `TUNECAST_PUSH_MODE`: `local`, `callback` or `none` (default: local)
    /// - `TUNECAST_PUSH_ENDPOINT`: required when the push mode is `callback`
    /// - `TUNECAST_CONNECTION_TTL_SECS`: connection lifetime (default: 86400)
    /// - `TUNECAST_EXPIRY_SWEEP_SECS`: expiry purge interval (default: 300)
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("TUNECAST_DATABASE_URL")
            .map_err(|_| ConfigError::Missing("TUNECAST_DATABASE_URL"))?;

        let http_port: u16 = std::env::var("TUNECAST_HTTP_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| ConfigError::Invalid("TUNECAST_HTTP_PORT", "must be a valid port number"))?;

        let push_mode = match std::env::var("TUNECAST_PUSH_MODE")
            .unwrap_or_else(|_| "local".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "local" => PushMode::Local,
            "none" | "disabled" => PushMode::Disabled,
            "callback" => {
                let endpoint = std::env::var("TUNECAST_PUSH_ENDPOINT")
                    .map_err(|_| ConfigError::Missing("TUNECAST_PUSH_ENDPOINT"))?;
                PushMode::Callback {
                    endpoint: endpoint.trim_end_matches('/').to_string(),
                }
            }
            _ => {
                return Err(ConfigError::Invalid(
                    "TUNECAST_PUSH_MODE",
                    "must be one of local, callback, none",
                ));
            }
        };

        let ttl_secs: u64 = std::env::var("TUNECAST_CONNECTION_TTL_SECS")
            .unwrap_or_else(|_| "86400".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("TUNECAST_CONNECTION_TTL_SECS", "must be a positive integer")
            })?;

        let sweep_secs: u64 = std::env::var("TUNECAST_EXPIRY_SWEEP_SECS")
            .unwrap_or_else(|_| "300".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("TUNECAST_EXPIRY_SWEEP_SECS", "must be a positive integer")
            })?;

        if ttl_secs == 0 {
            return Err(ConfigError::Invalid(
                "TUNECAST_CONNECTION_TTL_SECS",
                "must be a positive integer",
            ));
        }

        Ok(Self {
            database_url,
            http_addr: SocketAddr::from(([0, 0, 0, 0], http_port)),
            push_mode,
            connection_ttl: Duration::from_secs(ttl_secs),
            expiry_sweep_interval: Duration::from_secs(sweep_secs.max(1)),
        })
    }

    /// Whether the database URL points at SQLite.
    pub fn is_sqlite(&self) -> bool {
        self.database_url.starts_with("sqlite:")
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}
