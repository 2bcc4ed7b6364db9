// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Task pipeline handlers.
//!
//! Each stage is a linear fetch, reshape, forward step:
//!
//! | Stage | Input | Output |
//! |-------|-------|--------|
//! | fetch | none | tasks of configured projects, pictographs stripped |
//! | preprocess | one task | the task with `due.date` as `DD-MM-YYYY` |
//! | enrich | task array | tasks with project fields and completion output |
//! | publish notes | task array | one notes page per task |
//! | close | task array | tasks closed upstream |
//!
//! The array stages stop at the first upstream failure.

use chrono::NaiveDate;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{error, info, instrument, warn};

use tunecast_core::envelope::{ApiEvent, ApiResponse};

use crate::clients::{CompletionClient, NotesClient, TodoistClient};
use crate::config::{Pipeline, TasksConfig};
use crate::error::{Result, TasksError};
use crate::model::{EnrichedTask, Task};
use crate::text::strip_pictographs;

/// Date format tasks are fetched with.
pub const UPSTREAM_DATE_FORMAT: &str = "%Y-%m-%d";

/// Date format downstream stages expect.
pub const DISPLAY_DATE_FORMAT: &str = "%d-%m-%Y";

/// Clients and configuration shared by the pipeline handlers.
#[derive(Debug, Clone)]
pub struct TaskPipeline {
    pipeline: Pipeline,
    todoist: TodoistClient,
    completion: CompletionClient,
    notes: NotesClient,
}

impl TaskPipeline {
    /// Build clients from configuration.
    pub fn new(config: &TasksConfig) -> Self {
        Self {
            pipeline: config.pipeline.clone(),
            todoist: TodoistClient::new(&config.todoist),
            completion: CompletionClient::new(&config.openai, config.completion_model.clone()),
            notes: NotesClient::new(&config.notion, config.notion_database_id.clone()),
        }
    }

    /// Projects and prompts in use.
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }
}

#[derive(Debug, Serialize)]
struct PublishedNotes {
    message: &'static str,
    task_id: Option<String>,
    created: usize,
}

fn parse_body<T: DeserializeOwned>(event: &ApiEvent) -> Result<T> {
    let body = event
        .body
        .as_deref()
        .ok_or_else(|| TasksError::InvalidInput("request body is required".to_string()))?;
    serde_json::from_str(body).map_err(|e| TasksError::InvalidInput(e.to_string()))
}

fn error_response(err: &TasksError) -> ApiResponse {
    if err.status_code() >= 500 {
        error!(error = %err, "Task pipeline stage failed");
    } else {
        warn!(error = %err, "Task pipeline request rejected");
    }
    ApiResponse::error(err.status_code(), err.to_string())
}

/// Keep tasks of configured projects and strip pictographs from their content.
pub fn select_tasks(pipeline: &Pipeline, tasks: Vec<Task>) -> Vec<Task> {
    tasks
        .into_iter()
        .filter(|t| pipeline.project(&t.project_id).is_some())
        .map(|mut t| {
            t.content = strip_pictographs(&t.content);
            t
        })
        .collect()
}

/// Rewrite `due.date` from `YYYY-MM-DD` to `DD-MM-YYYY`.
pub fn reformat_due_date(task: &mut Task) -> Result<()> {
    if let Some(due) = task.due.as_mut() {
        let date = NaiveDate::parse_from_str(&due.date, UPSTREAM_DATE_FORMAT).map_err(|e| {
            TasksError::InvalidInput(format!("invalid due date '{}': {}", due.date, e))
        })?;
        due.date = date.format(DISPLAY_DATE_FORMAT).to_string();
    }
    Ok(())
}

/// Fetch active tasks of configured projects.
#[instrument(skip(pipeline, _event))]
pub async fn handle_fetch_tasks(pipeline: &TaskPipeline, _event: &ApiEvent) -> ApiResponse {
    match pipeline.todoist.active_tasks().await {
        Ok(tasks) => {
            let selected = select_tasks(&pipeline.pipeline, tasks);
            info!(count = selected.len(), "Fetched pipeline tasks");
            ApiResponse::json(200, &selected)
        }
        Err(e) => error_response(&e),
    }
}

/// Reformat a single task's due date.
#[instrument(skip(event))]
pub async fn handle_preprocess(event: &ApiEvent) -> ApiResponse {
    let result = parse_body::<Task>(event).and_then(|mut task| {
        reformat_due_date(&mut task)?;
        Ok(task)
    });

    match result {
        Ok(task) => ApiResponse::json(200, &task),
        Err(e) => error_response(&e),
    }
}

/// Attach project fields and completion output to each task.
///
/// Tasks of unconfigured projects are dropped. A completion is requested
/// only for tasks whose section has a prompt.
#[instrument(skip(pipeline, event))]
pub async fn handle_enrich(pipeline: &TaskPipeline, event: &ApiEvent) -> ApiResponse {
    let tasks: Vec<EnrichedTask> = match parse_body(event) {
        Ok(tasks) => tasks,
        Err(e) => return error_response(&e),
    };

    let mut enriched = Vec::with_capacity(tasks.len());
    for mut task in tasks {
        let Some(project) = pipeline.pipeline.project(&task.task.project_id) else {
            continue;
        };
        task.pass_chat_gpt = project.pass_chat_gpt;
        task.name = project.name.clone();

        if let Some(prompt) = pipeline.pipeline.prompt_for(task.task.section_id.as_deref()) {
            match pipeline.completion.complete(prompt, &task.task.content).await {
                Ok(output) => task.agent_output = output,
                Err(e) => return error_response(&e),
            }
        }

        enriched.push(task);
    }

    info!(count = enriched.len(), "Enriched tasks");
    ApiResponse::json(200, &enriched)
}

/// Create one notes page per task.
#[instrument(skip(pipeline, event))]
pub async fn handle_publish_notes(pipeline: &TaskPipeline, event: &ApiEvent) -> ApiResponse {
    let tasks: Vec<EnrichedTask> = match parse_body(event) {
        Ok(tasks) => tasks,
        Err(e) => return error_response(&e),
    };

    let mut last_page = None;
    for task in &tasks {
        match pipeline
            .notes
            .create_page(&task.task.content, &task.agent_output)
            .await
        {
            Ok(page) => last_page = Some(page.id),
            Err(e) => return error_response(&e),
        }
    }

    ApiResponse::json(
        200,
        &PublishedNotes {
            message: "Task created successfully!",
            task_id: last_page,
            created: tasks.len(),
        },
    )
}

/// Close every task in the body.
#[instrument(skip(pipeline, event))]
pub async fn handle_close_tasks(pipeline: &TaskPipeline, event: &ApiEvent) -> ApiResponse {
    let tasks: Vec<EnrichedTask> = match parse_body(event) {
        Ok(tasks) => tasks,
        Err(e) => return error_response(&e),
    };

    for task in &tasks {
        if let Err(e) = pipeline.todoist.close_task(&task.task.id).await {
            return error_response(&e);
        }
    }

    ApiResponse::json(200, &serde_json::json!({ "message": "Task deleted" }))
}
