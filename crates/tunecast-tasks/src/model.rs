// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Task records as the task manager returns them, plus pipeline fields.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Due date block of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Due {
    /// Calendar date, `YYYY-MM-DD` as fetched.
    pub date: String,
    /// Remaining due attributes (`string`, `lang`, `is_recurring`, ...), kept as-is.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// An active task.
///
/// Every field defaults so that partial bodies from upstream handlers still
/// parse.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Task {
    pub assignee_id: Option<String>,
    pub assigner_id: Option<String>,
    pub comment_count: i64,
    pub is_completed: bool,
    pub content: String,
    pub created_at: Option<String>,
    pub creator_id: Option<String>,
    pub description: String,
    pub due: Option<Due>,
    pub id: String,
    pub labels: Vec<String>,
    pub order: i64,
    pub parent_id: Option<String>,
    pub priority: i64,
    pub project_id: String,
    pub section_id: Option<String>,
    pub url: Option<String>,
    pub duration: Option<Value>,
    pub sync_id: Option<String>,
}

/// A task carried through enrichment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedTask {
    #[serde(flatten)]
    pub task: Task,
    /// Completion output for the task, empty when none was requested.
    #[serde(default)]
    pub agent_output: String,
    /// Whether the owning project routes tasks through the completion API.
    #[serde(rename = "passChatGPT", default = "default_pass")]
    pub pass_chat_gpt: bool,
    /// Owning project's display name.
    #[serde(default)]
    pub name: String,
}

fn default_pass() -> bool {
    true
}

impl From<Task> for EnrichedTask {
    fn from(task: Task) -> Self {
        Self {
            task,
            agent_output: String::new(),
            pass_chat_gpt: default_pass(),
            name: String::new(),
        }
    }
}
