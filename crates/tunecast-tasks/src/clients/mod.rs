// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Upstream API clients.

mod completion;
mod notes;
mod todoist;

pub use completion::CompletionClient;
pub use notes::{CreatedPage, NotesClient};
pub use todoist::TodoistClient;

use std::time::Duration;

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;

use crate::error::{Result, TasksError};

/// Request timeout for every upstream call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub(crate) fn http_client() -> Client {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .unwrap_or_default()
}

/// Turn a non-success status into [`TasksError::Api`].
pub(crate) async fn check_status(service: &'static str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(TasksError::Api {
        service,
        status: status.as_u16(),
        body,
    })
}

/// Read a success body as JSON.
pub(crate) async fn read_json<T: DeserializeOwned>(
    service: &'static str,
    response: Response,
) -> Result<T> {
    let response = check_status(service, response).await?;
    let body = response.text().await.map_err(|e| TasksError::Transport {
        service,
        details: e.to_string(),
    })?;
    serde_json::from_str(&body).map_err(|e| TasksError::Decode {
        service,
        details: e.to_string(),
    })
}

pub(crate) fn transport_error(service: &'static str) -> impl FnOnce(reqwest::Error) -> TasksError {
    move |e| TasksError::Transport {
        service,
        details: e.to_string(),
    }
}
