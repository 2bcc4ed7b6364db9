// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Task manager REST client.

use reqwest::Client;
use tracing::{debug, info};

use super::{check_status, http_client, read_json, transport_error};
use crate::config::ServiceConfig;
use crate::error::Result;
use crate::model::Task;

const SERVICE: &str = "todoist";

/// Lists and closes tasks.
#[derive(Debug, Clone)]
pub struct TodoistClient {
    client: Client,
    base_url: String,
    token: String,
}

impl TodoistClient {
    /// Create a client from its service configuration.
    pub fn new(config: &ServiceConfig) -> Self {
        Self {
            client: http_client(),
            base_url: config.base_url.clone(),
            token: config.token.clone(),
        }
    }

    /// All active tasks visible to the token.
    pub async fn active_tasks(&self) -> Result<Vec<Task>> {
        let response = self
            .client
            .get(format!("{}/tasks", self.base_url))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(transport_error(SERVICE))?;

        let tasks: Vec<Task> = read_json(SERVICE, response).await?;
        debug!(count = tasks.len(), "Fetched active tasks");
        Ok(tasks)
    }

    /// Mark a task complete.
    pub async fn close_task(&self, task_id: &str) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/tasks/{}/close", self.base_url, task_id))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(transport_error(SERVICE))?;

        check_status(SERVICE, response).await?;
        info!(task_id = %task_id, "Closed task");
        Ok(())
    }
}
