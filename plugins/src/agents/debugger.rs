use std::sync::Arc;

use async_trait::async_trait;

use devflow_core::api::{
    Agent, AgentOutput, AgentResult, AgentRole, CodeArtifact, Status, TaskId, TaskRecord,
};

use super::{collect_code, extract_code, language_of, render_code, AgentContext};

/// Repairs generated code after a failing test run.
pub struct DebuggerAgent {
    name: String,
    ctx: Arc<AgentContext>,
}

impl DebuggerAgent {
    pub fn new(task_id: &TaskId, ctx: Arc<AgentContext>) -> Self {
        Self {
            name: AgentRole::Debugger.agent_name(task_id),
            ctx,
        }
    }
}

#[async_trait]
impl Agent for DebuggerAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, task: TaskRecord) -> anyhow::Result<AgentOutput> {
        let files = collect_code(&task);
        if files.is_empty() {
            return Ok((Status::failed(), AgentResult::failure("no generated code to debug")));
        }

        let run = task
            .parameters
            .latest_by_prefix(AgentRole::Executor.as_str())
            .and_then(|(_, d)| d.result.as_test_outcome());
        let (tests, output) = match run {
            Some(o) => (o.test_code.as_str(), o.output.as_deref().unwrap_or("(no output)")),
            None => ("(none)", "(tests were not run)"),
        };

        let language = language_of(&task);
        let prompt = format!(
            "The {language} code below fails its tests. Fix the code, not the tests.\n\
             Return the corrected code in a single fenced block.\n\n\
             Requirement: {instruction}\n\n{code}\n\
             Tests:\n{tests}\n\n\
             Test output:\n{output}",
            instruction = task.instruction(),
            code = render_code(&files),
        );
        let options = self.ctx.options_for(&task);
        let response = self.ctx.ask(&self.name, &task, &prompt, &options).await?;

        let code = extract_code(&response, language);
        if code.is_empty() {
            return Ok((Status::failed(), AgentResult::failure("model returned no fix")));
        }
        let path = task
            .config()
            .output_files
            .first()
            .cloned()
            .or_else(|| files.iter().find_map(|f| f.path.clone()));
        Ok((
            Status::from(AgentRole::Debugger.success_status()),
            AgentResult::Code(CodeArtifact {
                code,
                tests: Some(tests.to_string()),
                path,
            }),
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
