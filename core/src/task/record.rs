use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::params::{Parameters, TaskConfig};

/// Opaque task identifier, unique within a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for TaskId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Unit of work flowing through the graph.
///
/// Top-level records come from the caller; subtasks are born from plan
/// expansion and are the only records with a non-empty `dependencies` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: TaskId,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub parameters: Parameters,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<TaskId>,

    /// Instruction attached by the planner to a subtask.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

impl TaskRecord {
    pub fn new(task_id: impl Into<TaskId>, description: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            description: description.into(),
            parameters: Parameters::default(),
            dependencies: Vec::new(),
            prompt: None,
        }
    }

    pub fn with_config(mut self, config: TaskConfig) -> Self {
        self.parameters.config = config;
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn with_dependencies<I, T>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<TaskId>,
    {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn config(&self) -> &TaskConfig {
        &self.parameters.config
    }

    /// Prompt if the planner attached one, otherwise the description.
    pub fn instruction(&self) -> &str {
        match self.prompt.as_deref().map(str::trim) {
            Some(p) if !p.is_empty() => p,
            _ => &self.description,
        }
    }
}
