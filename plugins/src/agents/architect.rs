use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use devflow_core::api::{
    Agent, AgentOutput, AgentResult, AgentRole, Plan, Status, TaskConfig, TaskId, TaskRecord,
    DEFAULT_MAX_SUBTASKS,
};

use super::{extract_json, language_of, AgentContext};

/// Decomposes a request into subtasks. Its result is always a [`Plan`].
pub struct ArchitectAgent {
    name: String,
    ctx: Arc<AgentContext>,
    max_subtasks: usize,
}

#[derive(Debug, Deserialize)]
struct PlanResponse {
    #[serde(default)]
    subtasks: Vec<SubtaskSpec>,
}

#[derive(Debug, Deserialize)]
struct SubtaskSpec {
    #[serde(default, alias = "id")]
    task_id: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    language: Option<String>,
    #[serde(default, alias = "files")]
    output_files: Vec<String>,
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    dependencies: Vec<String>,
}

impl ArchitectAgent {
    pub fn new(task_id: &TaskId, ctx: Arc<AgentContext>) -> Self {
        Self {
            name: AgentRole::Architect.agent_name(task_id),
            ctx,
            max_subtasks: DEFAULT_MAX_SUBTASKS,
        }
    }

    /// Upper bound announced to the model; the scheduler enforces its own cap.
    pub fn with_max_subtasks(mut self, max_subtasks: usize) -> Self {
        self.max_subtasks = max_subtasks.max(1);
        self
    }

    fn prompt(&self, task: &TaskRecord) -> String {
        let files = task.config().output_files.join(", ");
        format!(
            "You are the Architect of a small development team.\n\
             Split the request below into at most {max} independent implementation subtasks.\n\
             Each subtask must name its language and the files it produces.\n\n\
             Request: {request}\n\
             Language: {language}\n\
             Target files: {files}\n\n\
             Answer with a JSON object {{\"subtasks\": [{{\"task_id\", \"description\", \
             \"language\", \"output_files\", \"prompt\", \"dependencies\"}}]}}.",
            max = self.max_subtasks,
            request = task.instruction(),
            language = language_of(task),
            files = if files.is_empty() { "(unspecified)".to_string() } else { files },
        )
    }

    fn schema() -> Value {
        json!({
            "type": "object",
            "required": ["subtasks"],
            "properties": {
                "subtasks": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "required": ["task_id", "description", "language", "output_files"],
                        "properties": {
                            "task_id": {"type": "string"},
                            "description": {"type": "string"},
                            "language": {"type": "string"},
                            "output_files": {"type": "array", "items": {"type": "string"}},
                            "prompt": {"type": "string"},
                            "dependencies": {"type": "array", "items": {"type": "string"}}
                        }
                    }
                }
            }
        })
    }
}

/// Turn the model's answer into a plan for `parent`.
///
/// Subtask ids are namespaced under the parent id so they stay unique across
/// plans; a missing language is inherited from the parent.
pub(crate) fn parse_plan(response: &str, parent: &TaskRecord) -> Result<Plan, String> {
    let json = extract_json(response).ok_or_else(|| "response contains no JSON object".to_string())?;
    let parsed: PlanResponse =
        serde_json::from_str(json).map_err(|e| format!("plan is not valid JSON: {e}"))?;

    let scoped = |local: &str| TaskId::from(format!("{}.{}", parent.task_id, local.trim()));

    let subtasks = parsed
        .subtasks
        .into_iter()
        .enumerate()
        .map(|(idx, spec)| {
            let local = spec
                .task_id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| (idx + 1).to_string());
            let config = TaskConfig {
                language: spec
                    .language
                    .filter(|l| !l.trim().is_empty())
                    .or_else(|| parent.config().language.clone()),
                output_files: spec.output_files,
                ..Default::default()
            };
            let mut record = TaskRecord::new(scoped(&local), spec.description).with_config(config);
            record.dependencies = spec.dependencies.iter().map(|d| scoped(d)).collect();
            record.prompt = spec.prompt.filter(|p| !p.trim().is_empty());
            record
        })
        .collect();

    let mut plan = Plan::new(subtasks);
    plan.metadata
        .extra
        .insert("parent".to_string(), Value::from(parent.task_id.as_str()));
    Ok(plan)
}

#[async_trait]
impl Agent for ArchitectAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, task: TaskRecord) -> anyhow::Result<AgentOutput> {
        let options = self.ctx.options_for(&task).with_schema(Self::schema());
        let response = self
            .ctx
            .ask(&self.name, &task, &self.prompt(&task), &options)
            .await?;

        match parse_plan(&response, &task) {
            Ok(plan) => {
                tracing::debug!(agent = %self.name, subtasks = plan.subtasks.len(), "plan parsed");
                Ok((
                    Status::from(AgentRole::Architect.success_status()),
                    AgentResult::Plan(plan),
                ))
            }
            Err(reason) => {
                tracing::warn!(agent = %self.name, reason = %reason, "plan could not be parsed");
                Ok((Status::failed(), AgentResult::Plan(Plan::invalid(reason))))
            }
        }
    }

    async fn track(
        &self,
        task: &TaskRecord,
        status: &Status,
        result: &AgentResult,
        _used_remote: bool,
    ) -> anyhow::Result<()> {
        self.ctx.track(&self.name, task, status, result).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ScriptedBackend, ScriptedResponse};
    use pretty_assertions::assert_eq;

    fn parent() -> TaskRecord {
        TaskRecord::new("T", "todo app").with_config(TaskConfig {
            language: Some("javascript".into()),
            output_files: vec!["app.js".into()],
            ..Default::default()
        })
    }

    #[test]
    fn fenced_plan_is_scoped_under_parent() {
        let response = r#"Plan:
```json
{"subtasks": [
  {"task_id": "api", "description": "REST api", "output_files": ["api.js"]},
  {"id": "ui", "description": "front end", "language": "typescript",
   "output_files": ["ui.ts"], "dependencies": ["api"], "prompt": "use fetch"}
]}
```"#;
        let plan = parse_plan(response, &parent()).unwrap();
        let ids: Vec<&str> = plan.subtasks.iter().map(|s| s.task_id.as_str()).collect();
        assert_eq!(ids, vec!["T.api", "T.ui"]);
        assert_eq!(plan.subtasks[0].config().language.as_deref(), Some("javascript"));
        assert_eq!(plan.subtasks[1].config().language.as_deref(), Some("typescript"));
        assert_eq!(plan.subtasks[1].dependencies, vec![TaskId::from("T.api")]);
        assert_eq!(plan.subtasks[1].prompt.as_deref(), Some("use fetch"));
        assert!(plan.error().is_none());
    }

    #[test]
    fn prose_is_rejected() {
        assert!(parse_plan("I cannot help with that.", &parent()).is_err());
    }

    #[tokio::test]
    async fn unparseable_answer_yields_invalid_plan() {
        let backend = Arc::new(ScriptedBackend::new(vec![ScriptedResponse::always("no idea")]));
        let agent = ArchitectAgent::new(&TaskId::from("T"), Arc::new(AgentContext::new(backend)));

        let (status, result) = agent.process(parent()).await.unwrap();
        assert!(status.is_failed());
        let plan = result.as_plan().unwrap();
        assert!(plan.error().is_some());
        assert!(!plan.is_expandable());
    }

    #[tokio::test]
    async fn valid_answer_is_planned() {
        let backend = Arc::new(ScriptedBackend::new(vec![ScriptedResponse::always(
            r#"{"subtasks": [{"task_id": "a", "description": "d", "output_files": ["a.js"]}]}"#,
        )]));
        let agent = ArchitectAgent::new(&TaskId::from("T"), Arc::new(AgentContext::new(backend)));
        assert_eq!(agent.name(), "Architect_T");

        let (status, result) = agent.process(parent()).await.unwrap();
        assert_eq!(status, "planned");
        assert_eq!(result.as_plan().unwrap().subtasks.len(), 1);
    }
}
