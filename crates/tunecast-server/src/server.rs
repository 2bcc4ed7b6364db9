// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP surface.
//!
//! Axum requests are turned into [`ApiEvent`]s and the handlers'
//! [`ApiResponse`]s back into HTTP responses, so the same handlers serve
//! both this server and a gateway deployment.
//!
//! Caller identity is read from headers set by the fronting authorizer:
//! `x-auth-sub` becomes claim `sub`, `x-auth-email` claim `email`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::{ConnectInfo, FromRequestParts, Query, State};
use axum::http::request::Parts;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use sqlx::postgres::PgPoolOptions;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tower_http::trace::TraceLayer;
use tracing::info;

use tunecast_core::handlers;
use tunecast_core::persistence::{Persistence, PostgresPersistence, SqlitePersistence};
use tunecast_core::transport::{CallbackTransport, NoopTransport, PushTransport};
use tunecast_core::{ApiEvent, ApiResponse, Config, ConnectionRegistry, HandlerState, PushMode};
use tunecast_tasks::TaskPipeline;
use tunecast_tasks::handlers as tasks;

use crate::error::{Error, Result};
use crate::hub::ConnectionHub;
use crate::ws;

/// Header carrying the caller's subject claim.
pub const AUTH_SUB_HEADER: &str = "x-auth-sub";

/// Header carrying the caller's email claim.
pub const AUTH_EMAIL_HEADER: &str = "x-auth-email";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Parameter and connection handlers.
    pub handlers: Arc<HandlerState>,
    /// Live WebSocket channels.
    pub hub: Arc<ConnectionHub>,
}

impl AppState {
    /// Wire handlers, registry and push transport from configuration.
    pub fn new(persistence: Arc<dyn Persistence>, config: &Config) -> Self {
        let hub = Arc::new(ConnectionHub::new());
        let transport = push_transport(&config.push_mode, &hub);
        let mut registry = ConnectionRegistry::with_ttl(persistence.clone(), config.connection_ttl);
        if matches!(config.push_mode, PushMode::Local) {
            registry = registry.with_owner(hub.instance_id());
        }

        info!(
            transport = transport.name(),
            instance_id = %hub.instance_id(),
            "Push transport selected"
        );

        Self {
            handlers: Arc::new(HandlerState::new(persistence, registry, transport)),
            hub,
        }
    }
}

/// Pick the push transport for `mode`.
pub fn push_transport(mode: &PushMode, hub: &Arc<ConnectionHub>) -> Arc<dyn PushTransport> {
    match mode {
        PushMode::Local => hub.clone(),
        PushMode::Callback { endpoint } => Arc::new(CallbackTransport::new(endpoint.clone())),
        PushMode::Disabled => Arc::new(NoopTransport),
    }
}

/// Connect to the configured database and run its migrations.
///
/// `sqlite:` URLs use the SQLite backend (the file is created if missing);
/// anything else is treated as PostgreSQL.
pub async fn open_persistence(config: &Config) -> Result<Arc<dyn Persistence>> {
    if config.is_sqlite() {
        let options = SqliteConnectOptions::from_str(&config.database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        tunecast_core::migrations::run_sqlite(&pool).await?;
        info!("SQLite database ready");
        Ok(Arc::new(SqlitePersistence::new(pool)))
    } else {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await?;
        tunecast_core::migrations::run_postgres(&pool).await?;
        info!("PostgreSQL database ready");
        Ok(Arc::new(PostgresPersistence::new(pool)))
    }
}

/// Build the router. Task routes are mounted only when a pipeline is given.
pub fn build_router(state: AppState, pipeline: Option<TaskPipeline>) -> Router {
    let mut router = Router::new()
        .route("/health", get(health))
        .route("/params", get(get_params).post(update_params).put(update_params))
        .route("/params/history", get(get_history))
        .route("/ws", get(ws::upgrade));

    if let Some(pipeline) = pipeline {
        router = router.merge(task_routes(Arc::new(pipeline)));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

fn task_routes(pipeline: Arc<TaskPipeline>) -> Router<AppState> {
    Router::new()
        .route("/tasks", get(fetch_tasks))
        .route("/tasks/preprocess", post(preprocess_task))
        .route("/tasks/enrich", post(enrich_tasks))
        .route("/tasks/notes", post(publish_notes))
        .route("/tasks/close", post(close_tasks))
        .with_state(pipeline)
}

// ============================================================================
// Envelope conversion
// ============================================================================

/// An [`ApiEvent`] built from request parts: query, identity headers and
/// peer address. The body is attached by the route.
pub struct GatewayEvent(pub ApiEvent);

impl<S: Send + Sync> FromRequestParts<S> for GatewayEvent {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        event_from_parts(parts).map(GatewayEvent)
    }
}

/// Build an event from request parts.
pub fn event_from_parts(parts: &Parts) -> Result<ApiEvent> {
    let mut event = ApiEvent::default();

    if parts.uri.query().is_some() {
        let Query(query) = Query::<HashMap<String, String>>::try_from_uri(&parts.uri)
            .map_err(|e| Error::InvalidRequest(e.body_text()))?;
        for (name, value) in query {
            event = event.with_query(name, value);
        }
    }

    for (header, claim) in [(AUTH_SUB_HEADER, "sub"), (AUTH_EMAIL_HEADER, "email")] {
        if let Some(value) = parts.headers.get(header).and_then(|v| v.to_str().ok())
            && !value.is_empty()
        {
            event = event.with_claim(claim, value);
        }
    }

    let forwarded = parts
        .headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string());
    let peer = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());
    if let Some(ip) = forwarded.or(peer) {
        event = event.with_source_ip(ip);
    }

    Ok(event)
}

/// HTTP rendering of an [`ApiResponse`].
pub struct GatewayResponse(pub ApiResponse);

impl IntoResponse for GatewayResponse {
    fn into_response(self) -> Response {
        let ApiResponse {
            status_code,
            headers,
            body,
        } = self.0;

        let status = StatusCode::from_u16(status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = (status, Body::from(body)).into_response();

        for (name, value) in headers.into_iter().flatten() {
            if let (Ok(name), Ok(value)) =
                (HeaderName::try_from(name), HeaderValue::try_from(value))
            {
                response.headers_mut().insert(name, value);
            }
        }
        response
    }
}

fn with_body(event: ApiEvent, body: String) -> ApiEvent {
    if body.is_empty() {
        event
    } else {
        event.with_body(body)
    }
}

// ============================================================================
// Parameter routes
// ============================================================================

async fn health(State(state): State<AppState>) -> GatewayResponse {
    GatewayResponse(handlers::handle_health_check(&state.handlers).await)
}

async fn get_params(
    State(state): State<AppState>,
    GatewayEvent(event): GatewayEvent,
) -> GatewayResponse {
    GatewayResponse(handlers::handle_get_parameters(&state.handlers, &event).await)
}

async fn update_params(
    State(state): State<AppState>,
    GatewayEvent(event): GatewayEvent,
    body: String,
) -> GatewayResponse {
    let event = with_body(event, body);
    GatewayResponse(handlers::handle_update_parameters(&state.handlers, &event).await)
}

async fn get_history(
    State(state): State<AppState>,
    GatewayEvent(event): GatewayEvent,
) -> GatewayResponse {
    GatewayResponse(handlers::handle_get_history(&state.handlers, &event).await)
}

// ============================================================================
// Task pipeline routes
// ============================================================================

async fn fetch_tasks(
    State(pipeline): State<Arc<TaskPipeline>>,
    GatewayEvent(event): GatewayEvent,
) -> GatewayResponse {
    GatewayResponse(tasks::handle_fetch_tasks(&pipeline, &event).await)
}

async fn preprocess_task(GatewayEvent(event): GatewayEvent, body: String) -> GatewayResponse {
    GatewayResponse(tasks::handle_preprocess(&with_body(event, body)).await)
}

async fn enrich_tasks(
    State(pipeline): State<Arc<TaskPipeline>>,
    GatewayEvent(event): GatewayEvent,
    body: String,
) -> GatewayResponse {
    GatewayResponse(tasks::handle_enrich(&pipeline, &with_body(event, body)).await)
}

async fn publish_notes(
    State(pipeline): State<Arc<TaskPipeline>>,
    GatewayEvent(event): GatewayEvent,
    body: String,
) -> GatewayResponse {
    GatewayResponse(tasks::handle_publish_notes(&pipeline, &with_body(event, body)).await)
}

async fn close_tasks(
    State(pipeline): State<Arc<TaskPipeline>>,
    GatewayEvent(event): GatewayEvent,
    body: String,
) -> GatewayResponse {
    GatewayResponse(tasks::handle_close_tasks(&pipeline, &with_body(event, body)).await)
}
