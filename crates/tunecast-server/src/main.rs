// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tunecast Server
//!
//! Serves the parameter API and live WebSocket push, purges expired
//! connections, and mounts the task pipeline when it is configured.

use std::net::SocketAddr;

use anyhow::Result;
use tracing::{error, info};

use tunecast_core::Config;
use tunecast_server::{AppState, ExpiryWorker, ExpiryWorkerConfig, build_router, open_persistence};
use tunecast_tasks::{TaskPipeline, TasksConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (from crate directory or parent directories)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tunecast=info".parse()?),
        )
        .init();

    info!("Starting Tunecast Server");

    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;

    info!(
        http_addr = %config.http_addr,
        push_mode = ?config.push_mode,
        connection_ttl_secs = config.connection_ttl.as_secs(),
        "Configuration loaded"
    );

    info!("Connecting to database...");
    let persistence = open_persistence(&config).await?;

    let pipeline = TasksConfig::from_env()?.map(|tasks| TaskPipeline::new(&tasks));
    if pipeline.is_some() {
        info!("Task pipeline routes enabled");
    }

    let state = AppState::new(persistence.clone(), &config);
    let router = build_router(state, pipeline);

    let worker = ExpiryWorker::new(
        persistence,
        ExpiryWorkerConfig::with_interval(config.expiry_sweep_interval),
    );
    let worker_shutdown = worker.shutdown_handle();
    let worker_handle = tokio::spawn(async move { worker.run().await });

    let listener = tokio::net::TcpListener::bind(config.http_addr).await?;
    info!(addr = %config.http_addr, "HTTP server listening");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
        }
        info!("Shutting down...");
    })
    .await?;

    worker_shutdown.notify_one();
    if let Err(e) = worker_handle.await {
        error!("Expiry worker task failed: {}", e);
    }

    info!("Shutdown complete");
    Ok(())
}
