// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Chat completion client.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{http_client, read_json, transport_error};
use crate::config::ServiceConfig;
use crate::error::{Result, TasksError};

const SERVICE: &str = "openai";

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

/// Sends prompts to a chat completion endpoint.
#[derive(Debug, Clone)]
pub struct CompletionClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl CompletionClient {
    /// Create a client from its service configuration.
    pub fn new(config: &ServiceConfig, model: impl Into<String>) -> Self {
        Self {
            client: http_client(),
            base_url: config.base_url.clone(),
            api_key: config.token.clone(),
            model: model.into(),
        }
    }

    /// Model requests are sent with.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Ask for a completion of `content` under `prompt`.
    ///
    /// Both are sent as user messages, prompt first.
    pub async fn complete(&self, prompt: &str, content: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
                ChatMessage {
                    role: "user",
                    content,
                },
            ],
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(transport_error(SERVICE))?;

        let body: ChatResponse = read_json(SERVICE, response).await?;
        let text = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| TasksError::Decode {
                service: SERVICE,
                details: "response has no choices".to_string(),
            })?;

        debug!(model = %self.model, chars = text.len(), "Completion received");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> CompletionClient {
        CompletionClient::new(
            &ServiceConfig {
                base_url: server.uri(),
                token: "sk-test".to_string(),
            },
            "gpt-4o",
        )
    }

    #[tokio::test]
    async fn test_complete_sends_prompt_then_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_json(json!({
                "model": "gpt-4o",
                "messages": [
                    {"role": "user", "content": "Summarize:"},
                    {"role": "user", "content": "fix the boiler"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "Call a plumber."}}]
            })))
            .mount(&server)
            .await;

        let text = client(&server)
            .complete("Summarize:", "fix the boiler")
            .await
            .unwrap();
        assert_eq!(text, "Call a plumber.");
    }

    #[tokio::test]
    async fn test_complete_without_choices() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let err = client(&server).complete("p", "c").await.unwrap_err();
        assert!(matches!(err, TasksError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_complete_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let err = client(&server).complete("p", "c").await.unwrap_err();
        assert!(matches!(err, TasksError::Api { status: 429, .. }));
    }
}
