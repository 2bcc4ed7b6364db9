// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! WebSocket sessions.
//!
//! Each upgraded socket gets a fresh connection id, is registered through
//! the connect handler, receives pushes from its hub channel, and is
//! deregistered through the disconnect handler when it closes.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use tunecast_core::ApiEvent;
use tunecast_core::handlers::{handle_connect, handle_disconnect};

use crate::server::{AppState, GatewayEvent};

/// Upgrade the request and run the session.
pub async fn upgrade(
    State(state): State<AppState>,
    GatewayEvent(event): GatewayEvent,
    ws: WebSocketUpgrade,
) -> Response {
    let event = event.with_connection_id(Uuid::new_v4().to_string());
    ws.on_upgrade(move |socket| run_session(state, socket, event))
}

async fn run_session(state: AppState, mut socket: WebSocket, event: ApiEvent) {
    let Some(connection_id) = event.connection_id().map(str::to_string) else {
        return;
    };

    // Channel first so a broadcast racing the registry write is not lost
    let mut outbound = state.hub.register(&connection_id);

    let connected = handle_connect(&state.handlers, &event).await;
    if connected.status_code != 200 {
        warn!(
            connection_id = %connection_id,
            body = %connected.body,
            "Connection rejected"
        );
        state.hub.unregister(&connection_id);
        let _ = socket.send(Message::Close(None)).await;
        return;
    }

    info!(connection_id = %connection_id, "WebSocket session started");
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            Some(payload) = outbound.recv() => {
                if let Err(e) = sink.send(Message::Text(payload.into())).await {
                    debug!(connection_id = %connection_id, error = %e, "Send failed, closing");
                    break;
                }
            }
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    debug!(connection_id = %connection_id, error = %e, "Receive failed, closing");
                    break;
                }
                // Client messages carry nothing; pings are answered by axum
                Some(Ok(_)) => {}
            },
        }
    }

    state.hub.unregister(&connection_id);
    let disconnected = handle_disconnect(&state.handlers, &event).await;
    if disconnected.status_code != 200 {
        warn!(
            connection_id = %connection_id,
            body = %disconnected.body,
            "Disconnect cleanup failed"
        );
    }
    info!(connection_id = %connection_id, "WebSocket session ended");
}
