// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Request handlers for tunecast-core.
//!
//! These handlers process gateway events for:
//! - Health check
//! - Reading and updating parameter sets
//! - Reading a user's change history
//! - Real-time connection open and close
//!
//! Every handler returns an [`ApiResponse`]; failures are rendered as
//! `{"error": ...}` bodies rather than propagated.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use crate::envelope::{ApiEvent, ApiResponse};
use crate::params::{DEFAULT_PARAM_ID, ParameterSet, ParameterUpdate};
use crate::persistence::Persistence;
use crate::registry::ConnectionRegistry;
use crate::service::ParameterService;
use crate::transport::PushTransport;

/// User id used when the request carries no identity.
pub const ANONYMOUS_USER_ID: &str = "anonymous";

/// Email used when the request carries no identity.
pub const ANONYMOUS_EMAIL: &str = "anonymous@example.com";

/// History rows returned when no limit is given.
pub const DEFAULT_HISTORY_LIMIT: i64 = 50;

/// Largest history page a caller may ask for.
pub const MAX_HISTORY_LIMIT: i64 = 500;

/// Shared state for request handlers.
///
/// Built once per process and shared across requests.
#[derive(Clone)]
pub struct HandlerState {
    /// Storage handle.
    pub persistence: Arc<dyn Persistence>,
    /// Update flow (store, ledger, fan-out).
    pub service: ParameterService,
    /// Connection registry.
    pub registry: ConnectionRegistry,
    /// When the process started (for uptime calculation).
    pub start_time: std::time::Instant,
    /// Server version string.
    pub version: String,
}

impl HandlerState {
    /// Create handler state from the persistence, registry and push transport.
    pub fn new(
        persistence: Arc<dyn Persistence>,
        registry: ConnectionRegistry,
        transport: Arc<dyn PushTransport>,
    ) -> Self {
        Self {
            service: ParameterService::new(Arc::clone(&persistence), registry.clone(), transport),
            persistence,
            registry,
            start_time: std::time::Instant::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Get the process uptime in milliseconds.
    pub fn uptime_ms(&self) -> i64 {
        self.start_time.elapsed().as_millis() as i64
    }
}

// ============================================================================
// Health Check
// ============================================================================

/// Health check body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckResponse {
    /// True if the database answered.
    pub healthy: bool,
    /// Server version.
    pub version: String,
    /// Uptime in milliseconds.
    pub uptime_ms: i64,
}

/// Handle health check request.
///
/// 200 when the database answers, 503 otherwise.
#[instrument(skip(state))]
pub async fn handle_health_check(state: &HandlerState) -> ApiResponse {
    debug!("Health check requested");

    let healthy = state.persistence.health_check_db().await.unwrap_or(false);
    let body = HealthCheckResponse {
        healthy,
        version: state.version.clone(),
        uptime_ms: state.uptime_ms(),
    };

    ApiResponse::json(if healthy { 200 } else { 503 }, &body)
}

// ============================================================================
// Parameters
// ============================================================================

#[derive(Debug, Serialize)]
struct UserParameters<'a> {
    parameters: &'a [ParameterSet],
    count: usize,
}

/// Handle a parameter read.
///
/// With a user (query `userId`, else claim `sub`) this lists that user's
/// recent sets, falling back to the default set tagged with the user id.
/// Without one it returns the current set for `paramId`.
#[instrument(skip(state, event))]
pub async fn handle_get_parameters(state: &HandlerState, event: &ApiEvent) -> ApiResponse {
    let user_id = event
        .query("userId")
        .or_else(|| event.claim("sub"))
        .filter(|u| !u.is_empty());
    let param_id = event.query("paramId").unwrap_or(DEFAULT_PARAM_ID);

    let store = state.service.store();

    match user_id {
        Some(user_id) => {
            info!(user_id = %user_id, "Querying parameters for user");
            match store.get_by_user(user_id).await {
                Ok(sets) if sets.is_empty() => {
                    let mut set = ParameterSet::default_for(param_id);
                    set.user_id = Some(user_id.to_string());
                    ApiResponse::json(200, &set)
                }
                Ok(sets) => ApiResponse::json(
                    200,
                    &UserParameters {
                        parameters: &sets,
                        count: sets.len(),
                    },
                ),
                Err(e) => {
                    error!(error = %e, "Error getting parameters");
                    ApiResponse::error(500, e.to_string())
                }
            }
        }
        None => match store.get(param_id).await {
            Ok(set) => ApiResponse::json(200, &set),
            Err(e) => {
                error!(error = %e, "Error getting parameters");
                ApiResponse::error(500, e.to_string())
            }
        },
    }
}

/// Body of a parameter update.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateParametersBody {
    mean: Option<f64>,
    std_dev: Option<f64>,
    param_id: Option<String>,
    title: Option<String>,
    description: Option<String>,
    expected_version: Option<String>,
}

/// Update acknowledgement body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateParametersResponse {
    /// Always true on a 200.
    pub success: bool,
    /// Row timestamp, ms since epoch.
    pub timestamp: i64,
    /// Updated parameter set.
    pub param_id: String,
    /// Version written.
    pub version: String,
}

/// Handle a parameter update.
///
/// 400 on a malformed body or invalid values, 409 on a stale
/// `expectedVersion`, 500 on storage faults. Ledger and push failures are
/// logged and do not change the status.
#[instrument(skip(state, event))]
pub async fn handle_update_parameters(state: &HandlerState, event: &ApiEvent) -> ApiResponse {
    let user_id = event.claim("sub").unwrap_or(ANONYMOUS_USER_ID);
    let user_email = event.claim("email").unwrap_or(ANONYMOUS_EMAIL);

    let raw = event
        .body
        .as_deref()
        .filter(|b| !b.trim().is_empty())
        .unwrap_or("{}");
    let body: UpdateParametersBody = match serde_json::from_str(raw) {
        Ok(body) => body,
        Err(e) => {
            warn!(error = %e, "Malformed update body");
            return ApiResponse::error(400, format!("Invalid request body: {}", e));
        }
    };

    let update = ParameterUpdate {
        param_id: body
            .param_id
            .unwrap_or_else(|| DEFAULT_PARAM_ID.to_string()),
        mean: body.mean,
        std_dev: body.std_dev,
        user_id: user_id.to_string(),
        user_email: user_email.to_string(),
        title: body.title,
        description: body.description,
        expected_version: body.expected_version,
    };

    match state.service.update(update).await {
        Ok(outcome) => {
            for warning in &outcome.warnings {
                warn!(warning = %warning, "Update completed with warning");
            }
            let receipt = outcome.value;
            ApiResponse::json(
                200,
                &UpdateParametersResponse {
                    success: true,
                    timestamp: receipt.timestamp,
                    param_id: receipt.param_id,
                    version: receipt.version,
                },
            )
        }
        Err(e) => {
            if e.status_code() >= 500 {
                error!(error = %e, "Error updating parameters");
            } else {
                info!(error = %e, "Update rejected");
            }
            ApiResponse::from(&e)
        }
    }
}

// ============================================================================
// History
// ============================================================================

/// Handle a history read.
///
/// Requires a user (query `userId`, else claim `sub`). `limit` defaults to
/// 50 and is capped at 500.
#[instrument(skip(state, event))]
pub async fn handle_get_history(state: &HandlerState, event: &ApiEvent) -> ApiResponse {
    let Some(user_id) = event
        .query("userId")
        .or_else(|| event.claim("sub"))
        .filter(|u| !u.is_empty())
    else {
        return ApiResponse::error(400, "userId is required");
    };

    let limit = match event.query("limit") {
        None => DEFAULT_HISTORY_LIMIT,
        Some(raw) => match raw.parse::<i64>() {
            Ok(n) if n > 0 => n.min(MAX_HISTORY_LIMIT),
            _ => return ApiResponse::error(400, "limit must be a positive integer"),
        },
    };

    match state.service.ledger().recent(user_id, limit).await {
        Ok(history) => ApiResponse::json(
            200,
            &serde_json::json!({ "history": history, "count": history.len() }),
        ),
        Err(e) => {
            error!(error = %e, "Error getting history");
            ApiResponse::error(500, e.to_string())
        }
    }
}

// ============================================================================
// Connections
// ============================================================================

/// Handle a real-time connection opening.
///
/// The user comes from claim `sub`, else query `userId`, else `anonymous`.
#[instrument(skip(state, event), fields(connection_id = event.connection_id().unwrap_or_default()))]
pub async fn handle_connect(state: &HandlerState, event: &ApiEvent) -> ApiResponse {
    let Some(connection_id) = event.connection_id() else {
        return ApiResponse::text(400, "No connection ID provided");
    };
    let user_id = event.claim("sub").or_else(|| event.query("userId"));

    match state
        .registry
        .connect(connection_id, user_id, event.source_ip())
        .await
    {
        Ok(_) => ApiResponse::text(200, "Connected"),
        Err(e) => {
            error!(error = %e, "Error handling connect");
            ApiResponse::text(500, e.to_string())
        }
    }
}

/// Handle a real-time connection closing.
///
/// Closing an unknown connection still answers 200.
#[instrument(skip(state, event), fields(connection_id = event.connection_id().unwrap_or_default()))]
pub async fn handle_disconnect(state: &HandlerState, event: &ApiEvent) -> ApiResponse {
    let Some(connection_id) = event.connection_id() else {
        return ApiResponse::text(400, "No connection ID provided");
    };

    match state.registry.disconnect(connection_id).await {
        Ok(_) => ApiResponse::text(200, "Disconnected"),
        Err(e) => {
            error!(error = %e, "Error handling disconnect");
            ApiResponse::text(500, e.to_string())
        }
    }
}
