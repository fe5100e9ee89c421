//! Plans: results that expand into new subtasks instead of carrying an artifact.

mod order;

pub use order::{SubtaskGraph, TaskLike};

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::OrchestratorError;
use crate::task::{TaskId, TaskRecord};

pub const DEFAULT_MAX_SUBTASKS: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanMetadata {
    /// A non-empty value marks the plan invalid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub subtasks: Vec<TaskRecord>,

    #[serde(default)]
    pub metadata: PlanMetadata,
}

impl Plan {
    pub fn new(subtasks: Vec<TaskRecord>) -> Self {
        Self {
            subtasks,
            metadata: PlanMetadata::default(),
        }
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            subtasks: Vec::new(),
            metadata: PlanMetadata {
                error: Some(error.into()),
                extra: Map::new(),
            },
        }
    }

    pub fn error(&self) -> Option<&str> {
        self.metadata
            .error
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
    }

    /// Whether expansion should be attempted at all.
    pub fn is_expandable(&self) -> bool {
        self.error().is_none() && !self.subtasks.is_empty()
    }
}

/// Checks the fields expansion relies on.
pub fn validate_subtask(subtask: &TaskRecord) -> Result<(), OrchestratorError> {
    if subtask.task_id.is_empty() {
        return Err(OrchestratorError::MalformedPlan(
            "subtask is missing task_id".to_string(),
        ));
    }
    if subtask.description.trim().is_empty() {
        return Err(OrchestratorError::MalformedPlan(format!(
            "subtask '{}' has an empty description",
            subtask.task_id
        )));
    }
    let config = subtask.config();
    if config
        .language
        .as_deref()
        .map(str::trim)
        .unwrap_or_default()
        .is_empty()
    {
        return Err(OrchestratorError::MalformedPlan(format!(
            "subtask '{}' is missing parameters.language",
            subtask.task_id
        )));
    }
    if config.output_files.iter().all(|f| f.trim().is_empty()) {
        return Err(OrchestratorError::MalformedPlan(format!(
            "subtask '{}' is missing parameters.output_files",
            subtask.task_id
        )));
    }
    Ok(())
}

/// Subtasks of `plan` that will actually be expanded, in expansion order.
///
/// The first `max_subtasks` entries are taken in declaration order; malformed
/// entries and ids for which `is_taken` returns true are dropped with a warning;
/// the survivors are ordered by their declared dependencies.
pub fn prepare_subtasks<F>(plan: &Plan, max_subtasks: usize, is_taken: F) -> Vec<TaskRecord>
where
    F: Fn(&TaskId) -> bool,
{
    if !plan.is_expandable() {
        return Vec::new();
    }

    if plan.subtasks.len() > max_subtasks {
        tracing::warn!(
            declared = plan.subtasks.len(),
            max_subtasks,
            "plan exceeds subtask cap; truncating"
        );
    }

    let mut seen: HashSet<TaskId> = HashSet::new();
    let mut accepted = Vec::new();
    for subtask in plan.subtasks.iter().take(max_subtasks) {
        if let Err(err) = validate_subtask(subtask) {
            tracing::warn!(error = %err, "dropping malformed subtask");
            continue;
        }
        if is_taken(&subtask.task_id) || !seen.insert(subtask.task_id.clone()) {
            tracing::warn!(task_id = %subtask.task_id, "dropping subtask with duplicate task_id");
            continue;
        }
        accepted.push(subtask.clone());
    }

    if accepted.len() < 2 {
        return accepted;
    }

    match SubtaskGraph::from_tasks(&accepted) {
        Ok(graph) => {
            let order = graph.execution_order();
            order
                .into_iter()
                .filter_map(|id| graph.nodes.get(&id).cloned())
                .collect()
        }
        Err(_) => accepted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskConfig;

    fn subtask(id: &str) -> TaskRecord {
        TaskRecord::new(id, format!("implement {id}")).with_config(TaskConfig {
            language: Some("javascript".into()),
            output_files: vec![format!("{id}.js")],
            ..Default::default()
        })
    }

    #[test]
    fn plan_with_error_is_not_expandable() {
        let mut plan = Plan::new(vec![subtask("a")]);
        assert!(plan.is_expandable());

        plan.metadata.error = Some("model returned prose".into());
        assert!(!plan.is_expandable());
        assert!(prepare_subtasks(&plan, 10, |_| false).is_empty());

        plan.metadata.error = Some("   ".into());
        assert!(plan.is_expandable());
    }

    #[test]
    fn empty_plan_is_not_expandable() {
        assert!(!Plan::default().is_expandable());
    }

    #[test]
    fn malformed_subtasks_are_dropped() {
        let mut no_lang = subtask("b");
        no_lang.parameters.config.language = None;
        let mut no_files = subtask("c");
        no_files.parameters.config.output_files.clear();
        let mut no_desc = subtask("d");
        no_desc.description = " ".into();

        let plan = Plan::new(vec![subtask("a"), no_lang, no_files, no_desc, subtask("e")]);
        let kept = prepare_subtasks(&plan, 10, |_| false);
        let ids: Vec<&str> = kept.iter().map(|t| t.task_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "e"]);
    }

    #[test]
    fn cap_applies_in_declaration_order() {
        let subtasks = (0..11).map(|i| subtask(&format!("s{i:02}"))).collect();
        let plan = Plan::new(subtasks);
        let kept = prepare_subtasks(&plan, DEFAULT_MAX_SUBTASKS, |_| false);
        assert_eq!(kept.len(), DEFAULT_MAX_SUBTASKS);
        assert_eq!(kept.first().unwrap().task_id.as_str(), "s00");
        assert_eq!(kept.last().unwrap().task_id.as_str(), "s09");
    }

    #[test]
    fn duplicate_and_taken_ids_are_dropped() {
        let plan = Plan::new(vec![subtask("a"), subtask("a"), subtask("root")]);
        let kept = prepare_subtasks(&plan, 10, |id| id.as_str() == "root");
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].task_id.as_str(), "a");
    }

    #[test]
    fn dependent_subtasks_follow_their_dependencies() {
        let plan = Plan::new(vec![
            subtask("ui").with_dependencies(["api"]),
            subtask("api"),
        ]);
        let kept = prepare_subtasks(&plan, 10, |_| false);
        let ids: Vec<&str> = kept.iter().map(|t| t.task_id.as_str()).collect();
        assert_eq!(ids, vec!["api", "ui"]);
    }
}
