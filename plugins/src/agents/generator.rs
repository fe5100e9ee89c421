use std::sync::Arc;

use async_trait::async_trait;

use devflow_core::api::{
    Agent, AgentOutput, AgentResult, AgentRole, CodeArtifact, Status, TaskId, TaskRecord,
};

use super::{extract_code, language_of, AgentContext};

/// Writes the implementation for a task or subtask.
pub struct GeneratorAgent {
    name: String,
    ctx: Arc<AgentContext>,
}

impl GeneratorAgent {
    pub fn new(task_id: &TaskId, ctx: Arc<AgentContext>) -> Self {
        Self {
            name: AgentRole::Generator.agent_name(task_id),
            ctx,
        }
    }

    fn prompt(task: &TaskRecord) -> String {
        let language = language_of(task);
        let files = &task.config().output_files;
        let target = match files.as_slice() {
            [] => String::new(),
            [one] => format!("The code goes into `{one}`.\n"),
            many => format!("The code goes into these files: {}.\n", many.join(", ")),
        };
        format!(
            "Write {language} code for the following task.\n\
             {target}\
             Return only the code in a single fenced block.\n\n\
             Task: {instruction}",
            instruction = task.instruction(),
        )
    }
}

#[async_trait]
impl Agent for GeneratorAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, task: TaskRecord) -> anyhow::Result<AgentOutput> {
        let options = self.ctx.options_for(&task);
        let response = self
            .ctx
            .ask(&self.name, &task, &Self::prompt(&task), &options)
            .await?;

        let code = extract_code(&response, language_of(&task));
        if code.is_empty() {
            tracing::warn!(agent = %self.name, task_id = %task.task_id, "model returned no code");
            return Ok((Status::failed(), AgentResult::failure("model returned no code")));
        }

        let artifact = CodeArtifact {
            code,
            tests: None,
            path: task.config().output_files.first().cloned(),
        };
        Ok((
            Status::from(AgentRole::Generator.success_status()),
            AgentResult::Code(artifact),
        ))
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
    use devflow_core::api::TaskConfig;

    fn task() -> TaskRecord {
        TaskRecord::new("T.api", "REST api")
            .with_prompt("expose GET /todos")
            .with_config(TaskConfig {
                language: Some("javascript".into()),
                output_files: vec!["api.js".into()],
                ..Default::default()
            })
    }

    #[tokio::test]
    async fn code_is_extracted_and_bound_to_first_file() {
        let backend = Arc::new(ScriptedBackend::new(vec![ScriptedResponse::always(
            "```js\nmodule.exports = {};\n```",
        )]));
        let agent = GeneratorAgent::new(&TaskId::from("T"), Arc::new(AgentContext::new(backend.clone())));

        let (status, result) = agent.process(task()).await.unwrap();
        assert_eq!(status, "generated");
        let code = result.as_code().unwrap();
        assert_eq!(code.code, "module.exports = {};");
        assert_eq!(code.path.as_deref(), Some("api.js"));

        let prompts = backend.prompts();
        assert!(prompts[0].contains("expose GET /todos"));
        assert!(prompts[0].contains("`api.js`"));
    }

    #[tokio::test]
    async fn blank_answer_fails() {
        let backend = Arc::new(ScriptedBackend::new(vec![ScriptedResponse::always("   ")]));
        let agent = GeneratorAgent::new(&TaskId::from("T"), Arc::new(AgentContext::new(backend)));

        let (status, result) = agent.process(task()).await.unwrap();
        assert!(status.is_failed());
        assert!(result.is_failure());
    }
}
