// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Notes workspace client.

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::{http_client, read_json, transport_error};
use crate::config::ServiceConfig;
use crate::error::Result;

const SERVICE: &str = "notion";

/// API version header value.
const NOTION_VERSION: &str = "2022-06-28";

/// A page the notes API created.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CreatedPage {
    /// Page id.
    pub id: String,
}

/// Creates pages in a notes database.
#[derive(Debug, Clone)]
pub struct NotesClient {
    client: Client,
    base_url: String,
    token: String,
    database_id: String,
}

impl NotesClient {
    /// Create a client writing into `database_id`.
    pub fn new(config: &ServiceConfig, database_id: impl Into<String>) -> Self {
        Self {
            client: http_client(),
            base_url: config.base_url.clone(),
            token: config.token.clone(),
            database_id: database_id.into(),
        }
    }

    /// Create a page titled `title` with one paragraph of `text`.
    pub async fn create_page(&self, title: &str, text: &str) -> Result<CreatedPage> {
        let body = json!({
            "parent": {"database_id": self.database_id},
            "properties": {
                "title": {"title": [{"type": "text", "text": {"content": title}}]}
            },
            "children": [{
                "object": "block",
                "type": "paragraph",
                "paragraph": {"rich_text": [{"type": "text", "text": {"content": text}}]}
            }]
        });

        let response = self
            .client
            .post(format!("{}/pages", self.base_url))
            .bearer_auth(&self.token)
            .header("Notion-Version", NOTION_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(transport_error(SERVICE))?;

        let page: CreatedPage = read_json(SERVICE, response).await?;
        info!(page_id = %page.id, "Created notes page");
        Ok(page)
    }
}
