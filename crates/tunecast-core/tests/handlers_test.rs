// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tests for the request handlers.

mod common;

use std::sync::Arc;

use common::{Faults, FaultyPersistence, RecordingTransport, handler_state, memory_persistence};
use serde_json::{Value, json};
use tunecast_core::envelope::{ApiEvent, ApiResponse, CORS_ORIGIN_HEADER};
use tunecast_core::handlers::{
    handle_connect, handle_disconnect, handle_get_history, handle_get_parameters,
    handle_health_check, handle_update_parameters,
};
use tunecast_core::transport::NoopTransport;

fn body(resp: &ApiResponse) -> Value {
    resp.json_value().expect("response body should be JSON")
}

fn update_event(body: Value) -> ApiEvent {
    ApiEvent::default()
        .with_claim("sub", "u1")
        .with_claim("email", "u1@x.com")
        .with_body(body.to_string())
}

#[tokio::test]
async fn test_health_check() {
    let state = handler_state(memory_persistence().await, Arc::new(NoopTransport));

    let resp = handle_health_check(&state).await;
    assert_eq!(resp.status_code, 200);
    let json = body(&resp);
    assert_eq!(json["healthy"], true);
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    assert!(json["uptimeMs"].as_i64().unwrap() >= 0);
}

#[tokio::test]
async fn test_get_unknown_returns_defaults() {
    let state = handler_state(memory_persistence().await, Arc::new(NoopTransport));

    let resp = handle_get_parameters(&state, &ApiEvent::default()).await;
    assert_eq!(resp.status_code, 200);
    assert_eq!(
        resp.headers.as_ref().unwrap().get(CORS_ORIGIN_HEADER).unwrap(),
        "*"
    );
    assert_eq!(
        body(&resp),
        json!({
            "mean": 0.0,
            "stdDev": 1.0,
            "lastUpdatedBy": null,
            "lastUpdatedAt": null,
            "paramId": "normal_distribution_params",
        })
    );

    let resp = handle_get_parameters(&state, &ApiEvent::default().with_query("paramId", "p9")).await;
    assert_eq!(body(&resp)["paramId"], "p9");
}

#[tokio::test]
async fn test_update_then_get() {
    let state = handler_state(memory_persistence().await, Arc::new(NoopTransport));

    let resp = handle_update_parameters(
        &state,
        &update_event(json!({"mean": 5, "stdDev": 2, "paramId": "p1"})),
    )
    .await;
    assert_eq!(resp.status_code, 200);
    let ack = body(&resp);
    assert_eq!(ack["success"], true);
    assert_eq!(ack["paramId"], "p1");
    assert_eq!(ack["version"], "v1");
    assert!(ack["timestamp"].as_i64().unwrap() > 0);

    // No identity: read by paramId
    let resp = handle_get_parameters(&state, &ApiEvent::default().with_query("paramId", "p1")).await;
    let set = body(&resp);
    assert_eq!(set["mean"], 5.0);
    assert_eq!(set["stdDev"], 2.0);
    assert_eq!(set["lastUpdatedBy"], "u1@x.com");
    assert_eq!(set["userId"], "u1");
    assert_eq!(set["version"], "v1");
    assert_eq!(set["title"], "Normal Distribution Parameters");
    assert_eq!(set["description"], "");
    assert_eq!(set["lastUpdatedAt"], ack["timestamp"]);

    let resp = handle_update_parameters(
        &state,
        &update_event(json!({"mean": 6, "stdDev": 2, "paramId": "p1", "title": "Wide"})),
    )
    .await;
    assert_eq!(body(&resp)["version"], "v2");
}

#[tokio::test]
async fn test_get_by_user() {
    let state = handler_state(memory_persistence().await, Arc::new(NoopTransport));

    // Authenticated caller without rows gets the default tagged with their id
    let resp = handle_get_parameters(&state, &ApiEvent::default().with_claim("sub", "u1")).await;
    let json = body(&resp);
    assert_eq!(json["userId"], "u1");
    assert_eq!(json["mean"], 0.0);
    assert_eq!(json["paramId"], "normal_distribution_params");

    for id in ["a", "b"] {
        handle_update_parameters(
            &state,
            &update_event(json!({"mean": 1, "stdDev": 1.5, "paramId": id})),
        )
        .await;
    }

    let resp = handle_get_parameters(&state, &ApiEvent::default().with_claim("sub", "u1")).await;
    let json = body(&resp);
    assert_eq!(json["count"], 2);
    assert_eq!(json["parameters"].as_array().unwrap().len(), 2);

    // Query userId overrides the claim
    let resp = handle_get_parameters(
        &state,
        &ApiEvent::default()
            .with_claim("sub", "u1")
            .with_query("userId", "someone_else"),
    )
    .await;
    assert_eq!(body(&resp)["userId"], "someone_else");
}

#[tokio::test]
async fn test_update_validation() {
    let state = handler_state(memory_persistence().await, Arc::new(NoopTransport));

    let cases = vec![
        (
            json!({"mean": 1}),
            "Missing required parameters: mean and stdDev",
        ),
        (
            json!({"stdDev": 1}),
            "Missing required parameters: mean and stdDev",
        ),
        (
            json!({"mean": 1, "stdDev": 0}),
            "Standard deviation must be positive",
        ),
        (
            json!({"mean": 1, "stdDev": -2}),
            "Standard deviation must be positive",
        ),
    ];

    for (input, expected) in cases {
        let resp = handle_update_parameters(&state, &update_event(input.clone())).await;
        assert_eq!(resp.status_code, 400, "input {}", input);
        assert_eq!(body(&resp)["error"], expected);
    }

    let resp = handle_update_parameters(
        &state,
        &ApiEvent::default().with_body("{not json"),
    )
    .await;
    assert_eq!(resp.status_code, 400);

    let resp = handle_update_parameters(&state, &ApiEvent::default()).await;
    assert_eq!(resp.status_code, 400);

    // Nothing was written
    let resp = handle_get_parameters(&state, &ApiEvent::default()).await;
    assert_eq!(body(&resp)["lastUpdatedBy"], Value::Null);
}

#[tokio::test]
async fn test_anonymous_update() {
    let state = handler_state(memory_persistence().await, Arc::new(NoopTransport));

    let resp = handle_update_parameters(
        &state,
        &ApiEvent::default().with_body(json!({"mean": 2, "stdDev": 3}).to_string()),
    )
    .await;
    assert_eq!(resp.status_code, 200);

    let resp = handle_get_parameters(&state, &ApiEvent::default()).await;
    let set = body(&resp);
    assert_eq!(set["lastUpdatedBy"], "anonymous@example.com");
    assert_eq!(set["userId"], "anonymous");
}

#[tokio::test]
async fn test_version_conflict() {
    let state = handler_state(memory_persistence().await, Arc::new(NoopTransport));

    let resp = handle_update_parameters(
        &state,
        &update_event(json!({"mean": 1, "stdDev": 1, "expectedVersion": "v0"})),
    )
    .await;
    assert_eq!(body(&resp)["version"], "v1");

    let resp = handle_update_parameters(
        &state,
        &update_event(json!({"mean": 2, "stdDev": 1, "expectedVersion": "v0"})),
    )
    .await;
    assert_eq!(resp.status_code, 409);
    assert!(
        body(&resp)["error"]
            .as_str()
            .unwrap()
            .contains("Version conflict")
    );

    let resp = handle_get_parameters(&state, &ApiEvent::default()).await;
    assert_eq!(body(&resp)["mean"], 1.0);
    assert_eq!(body(&resp)["version"], "v1");
}

#[tokio::test]
async fn test_update_succeeds_when_broadcast_finds_gone_connection() {
    let state = handler_state(
        memory_persistence().await,
        Arc::new(RecordingTransport::new().with_gone("dead")),
    );

    let resp = handle_connect(&state, &ApiEvent::default().with_connection_id("dead")).await;
    assert_eq!(resp.status_code, 200);

    let resp = handle_update_parameters(&state, &update_event(json!({"mean": 3, "stdDev": 4}))).await;
    assert_eq!(resp.status_code, 200);
    assert_eq!(body(&resp)["success"], true);

    assert!(state.registry.list_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_storage_fault_is_500() {
    let persistence = Arc::new(FaultyPersistence::new(
        memory_persistence().await,
        Faults {
            parameter_reads: true,
            ..Faults::default()
        },
    ));
    let state = handler_state(persistence, Arc::new(NoopTransport));

    let resp = handle_get_parameters(&state, &ApiEvent::default()).await;
    assert_eq!(resp.status_code, 500);
    assert!(body(&resp)["error"].as_str().unwrap().contains("injected fault"));

    let resp = handle_update_parameters(&state, &update_event(json!({"mean": 1, "stdDev": 1}))).await;
    assert_eq!(resp.status_code, 500);
}

#[tokio::test]
async fn test_history() {
    let state = handler_state(memory_persistence().await, Arc::new(NoopTransport));

    let resp = handle_get_history(&state, &ApiEvent::default()).await;
    assert_eq!(resp.status_code, 400);

    handle_update_parameters(&state, &update_event(json!({"mean": 5, "stdDev": 2}))).await;
    handle_update_parameters(&state, &update_event(json!({"mean": 5, "stdDev": 3}))).await;

    let resp = handle_get_history(&state, &ApiEvent::default().with_claim("sub", "u1")).await;
    assert_eq!(resp.status_code, 200);
    let json = body(&resp);
    assert_eq!(json["count"], 3);
    let newest = &json["history"][0];
    assert_eq!(newest["paramName"], "stdDev");
    assert_eq!(newest["oldValue"], 2.0);
    assert_eq!(newest["newValue"], 3.0);
    assert_eq!(newest["userEmail"], "u1@x.com");
    assert_eq!(newest["paramId"], "normal_distribution_params");

    let resp = handle_get_history(
        &state,
        &ApiEvent::default()
            .with_query("userId", "u1")
            .with_query("limit", "1"),
    )
    .await;
    assert_eq!(body(&resp)["count"], 1);

    let resp = handle_get_history(
        &state,
        &ApiEvent::default()
            .with_query("userId", "u1")
            .with_query("limit", "zero"),
    )
    .await;
    assert_eq!(resp.status_code, 400);
}

#[tokio::test]
async fn test_connect_and_disconnect() {
    let state = handler_state(memory_persistence().await, Arc::new(NoopTransport));

    let resp = handle_connect(
        &state,
        &ApiEvent::default()
            .with_connection_id("c1")
            .with_query("userId", "u7")
            .with_source_ip("10.1.2.3"),
    )
    .await;
    assert_eq!(resp, ApiResponse::text(200, "Connected"));

    let all = state.registry.list_all().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].user_id, "u7");
    assert_eq!(all[0].client_ip.as_deref(), Some("10.1.2.3"));

    let resp = handle_disconnect(&state, &ApiEvent::default().with_connection_id("c1")).await;
    assert_eq!(resp, ApiResponse::text(200, "Disconnected"));
    assert!(state.registry.list_all().await.unwrap().is_empty());

    // Unknown connection still disconnects cleanly
    let resp = handle_disconnect(&state, &ApiEvent::default().with_connection_id("ghost")).await;
    assert_eq!(resp.status_code, 200);

    let resp = handle_connect(&state, &ApiEvent::default()).await;
    assert_eq!(resp.status_code, 400);
}
