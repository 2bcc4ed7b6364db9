// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Gateway-style request and response envelopes.
//!
//! Handlers take an [`ApiEvent`] and return an [`ApiResponse`], mirroring the
//! proxy-integration shape API gateways use, so the same handlers serve the
//! HTTP server and any event-driven host.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// CORS header every JSON response carries.
pub const CORS_ORIGIN_HEADER: &str = "Access-Control-Allow-Origin";

/// Content type header.
pub const CONTENT_TYPE_HEADER: &str = "Content-Type";

/// Incoming request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEvent {
    /// Query string parameters.
    #[serde(default)]
    pub query_string_parameters: Option<HashMap<String, String>>,
    /// Raw request body.
    #[serde(default)]
    pub body: Option<String>,
    /// Transport and identity context.
    #[serde(default)]
    pub request_context: RequestContext,
}

/// Context the gateway attaches to a request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    /// Real-time connection id, for connect/disconnect events.
    #[serde(default)]
    pub connection_id: Option<String>,
    /// Authorizer output.
    #[serde(default)]
    pub authorizer: Option<Authorizer>,
    /// Caller network identity.
    #[serde(default)]
    pub identity: Option<Identity>,
}

/// Authorizer output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Authorizer {
    /// Identity token claims (`sub`, `email`, ...).
    #[serde(default)]
    pub claims: HashMap<String, String>,
}

/// Caller network identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Caller address.
    #[serde(default)]
    pub source_ip: Option<String>,
}

impl ApiEvent {
    /// Query parameter value.
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query_string_parameters
            .as_ref()
            .and_then(|q| q.get(name))
            .map(String::as_str)
    }

    /// Authorizer claim value.
    pub fn claim(&self, name: &str) -> Option<&str> {
        self.request_context
            .authorizer
            .as_ref()
            .and_then(|a| a.claims.get(name))
            .map(String::as_str)
    }

    /// Connection id from the request context.
    pub fn connection_id(&self) -> Option<&str> {
        self.request_context
            .connection_id
            .as_deref()
            .filter(|id| !id.is_empty())
    }

    /// Caller address from the request context.
    pub fn source_ip(&self) -> Option<&str> {
        self.request_context
            .identity
            .as_ref()
            .and_then(|i| i.source_ip.as_deref())
    }

    /// Add a query parameter.
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_string_parameters
            .get_or_insert_with(HashMap::new)
            .insert(name.into(), value.into());
        self
    }

    /// Add an authorizer claim.
    pub fn with_claim(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request_context
            .authorizer
            .get_or_insert_with(Authorizer::default)
            .claims
            .insert(name.into(), value.into());
        self
    }

    /// Set the body.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Set the connection id.
    pub fn with_connection_id(mut self, connection_id: impl Into<String>) -> Self {
        self.request_context.connection_id = Some(connection_id.into());
        self
    }

    /// Set the caller address.
    pub fn with_source_ip(mut self, source_ip: impl Into<String>) -> Self {
        self.request_context
            .identity
            .get_or_insert_with(Identity::default)
            .source_ip = Some(source_ip.into());
        self
    }
}

/// Outgoing response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse {
    /// HTTP status code.
    pub status_code: u16,
    /// Response headers; omitted for plain-text connection responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
    /// Response body.
    pub body: String,
}

impl ApiResponse {
    /// JSON response with CORS headers.
    pub fn json<T: Serialize + ?Sized>(status_code: u16, value: &T) -> Self {
        match serde_json::to_string(value) {
            Ok(body) => Self::json_body(status_code, body),
            Err(e) => Self::json_body(
                500,
                serde_json::json!({ "error": e.to_string() }).to_string(),
            ),
        }
    }

    /// `{"error": message}` with CORS headers.
    pub fn error(status_code: u16, message: impl Into<String>) -> Self {
        let message: String = message.into();
        Self::json(status_code, &serde_json::json!({ "error": message }))
    }

    /// Plain-text response without headers.
    pub fn text(status_code: u16, body: impl Into<String>) -> Self {
        Self {
            status_code,
            headers: None,
            body: body.into(),
        }
    }

    /// Parse the body as JSON.
    pub fn json_value(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_str(&self.body)
    }

    fn json_body(status_code: u16, body: String) -> Self {
        let headers = HashMap::from([
            (CORS_ORIGIN_HEADER.to_string(), "*".to_string()),
            (CONTENT_TYPE_HEADER.to_string(), "application/json".to_string()),
        ]);
        Self {
            status_code,
            headers: Some(headers),
            body,
        }
    }
}

impl From<&CoreError> for ApiResponse {
    fn from(err: &CoreError) -> Self {
        Self::error(err.status_code(), err.public_message())
    }
}
