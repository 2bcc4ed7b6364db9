// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Pipeline configuration.
//!
//! Secrets and endpoints come from environment variables; the project list
//! and per-section prompts come from a JSON file:
//!
//! ```json
//! {
//!   "projects": [
//!     {"project_id": 2334044360, "name": "Biftu", "passChatGPT": true}
//!   ],
//!   "section_prompts": {"158311513": "prompts/biftu.txt"}
//! }
//! ```
//!
//! Prompt paths are relative to the config file.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Deserializer};

use crate::error::{Result, TasksError};

/// Default task manager API base.
pub const DEFAULT_TODOIST_BASE_URL: &str = "https://api.todoist.com/rest/v2";

/// Default completion API base.
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Default notes API base.
pub const DEFAULT_NOTION_BASE_URL: &str = "https://api.notion.com/v1";

/// Completion model used when none is configured.
pub const DEFAULT_COMPLETION_MODEL: &str = "gpt-4o";

/// A project whose tasks flow through the pipeline.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProjectConfig {
    /// Task manager project id. Accepts a JSON number or string.
    #[serde(deserialize_with = "id_string")]
    pub project_id: String,
    /// Display name copied onto enriched tasks.
    pub name: String,
    /// Copied onto enriched tasks as `passChatGPT`.
    #[serde(rename = "passChatGPT", default)]
    pub pass_chat_gpt: bool,
}

#[derive(Debug, Deserialize)]
struct PipelineFile {
    projects: Vec<ProjectConfig>,
    #[serde(default)]
    section_prompts: HashMap<String, String>,
}

fn id_string<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Number(u64),
        Text(String),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Number(n) => n.to_string(),
        Id::Text(s) => s,
    })
}

/// Projects and prompts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipeline {
    /// Projects in the pipeline, in file order.
    pub projects: Vec<ProjectConfig>,
    /// Prompt text by section id.
    pub section_prompts: HashMap<String, String>,
}

impl Pipeline {
    /// Load the pipeline file and the prompt files it references.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config_err = |details: String| TasksError::Config {
            path: path.display().to_string(),
            details,
        };

        let raw = std::fs::read_to_string(path).map_err(|e| config_err(e.to_string()))?;
        let file: PipelineFile =
            serde_json::from_str(&raw).map_err(|e| config_err(e.to_string()))?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        let mut section_prompts = HashMap::with_capacity(file.section_prompts.len());
        for (section_id, prompt_path) in file.section_prompts {
            let prompt_path = base.join(prompt_path);
            let prompt = std::fs::read_to_string(&prompt_path).map_err(|e| {
                config_err(format!("prompt {}: {}", prompt_path.display(), e))
            })?;
            section_prompts.insert(section_id, prompt);
        }

        Ok(Self {
            projects: file.projects,
            section_prompts,
        })
    }

    /// Configuration of the project with `project_id`.
    pub fn project(&self, project_id: &str) -> Option<&ProjectConfig> {
        self.projects.iter().find(|p| p.project_id == project_id)
    }

    /// Prompt for tasks in `section_id`.
    pub fn prompt_for(&self, section_id: Option<&str>) -> Option<&str> {
        section_id
            .and_then(|id| self.section_prompts.get(id))
            .map(String::as_str)
            .filter(|p| !p.is_empty())
    }
}

/// Endpoint plus credential for one upstream API.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    /// API base URL, no trailing slash.
    pub base_url: String,
    /// Bearer token.
    pub token: String,
}

/// Full task pipeline configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct TasksConfig {
    /// Projects and prompts.
    pub pipeline: Pipeline,
    /// Task manager API.
    pub todoist: ServiceConfig,
    /// Completion API.
    pub openai: ServiceConfig,
    /// Completion model.
    pub completion_model: String,
    /// Notes API.
    pub notion: ServiceConfig,
    /// Notes database pages are created in.
    pub notion_database_id: String,
}

impl TasksConfig {
    /// Load configuration from environment variables.
    ///
    /// Returns `Ok(None)` when `TUNECAST_TASKS_CONFIG` is unset; the
    /// pipeline is then disabled.
    ///
    /// Required when enabled:
    /// - `TUNECAST_TASKS_CONFIG`: path to the pipeline JSON file
    /// - `TODOIST_API_KEY`, `OPENAI_API_KEY`, `NOTION_API_TOKEN`, `NOTION_DATABASE_ID`
    ///
    /// Optional:
    /// - `TUNECAST_COMPLETION_MODEL` (default: gpt-4o)
    /// - `TODOIST_BASE_URL`, `OPENAI_BASE_URL`, `NOTION_BASE_URL`
    pub fn from_env() -> Result<Option<Self>> {
        let Ok(path) = std::env::var("TUNECAST_TASKS_CONFIG") else {
            return Ok(None);
        };

        let pipeline = Pipeline::load(path)?;

        Ok(Some(Self {
            pipeline,
            todoist: ServiceConfig {
                base_url: base_url("TODOIST_BASE_URL", DEFAULT_TODOIST_BASE_URL),
                token: required("TODOIST_API_KEY")?,
            },
            openai: ServiceConfig {
                base_url: base_url("OPENAI_BASE_URL", DEFAULT_OPENAI_BASE_URL),
                token: required("OPENAI_API_KEY")?,
            },
            completion_model: std::env::var("TUNECAST_COMPLETION_MODEL")
                .unwrap_or_else(|_| DEFAULT_COMPLETION_MODEL.to_string()),
            notion: ServiceConfig {
                base_url: base_url("NOTION_BASE_URL", DEFAULT_NOTION_BASE_URL),
                token: required("NOTION_API_TOKEN")?,
            },
            notion_database_id: required("NOTION_DATABASE_ID")?,
        }))
    }
}

fn required(name: &'static str) -> Result<String> {
    std::env::var(name).map_err(|_| TasksError::MissingEnv(name))
}

fn base_url(name: &str, default: &str) -> String {
    std::env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .trim_end_matches('/')
        .to_string()
}
