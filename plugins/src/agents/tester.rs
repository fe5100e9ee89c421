use std::sync::Arc;

use async_trait::async_trait;

use devflow_core::api::{
    Agent, AgentOutput, AgentResult, AgentRole, CodeArtifact, Status, TaskId, TaskRecord,
};

use super::{collect_code, extract_code, language_of, render_code, AgentContext};

/// Writes tests for the code generated so far. Does not run them, so the
/// deposit carries no pass/fail verdict; that is left to the Executor.
pub struct TesterAgent {
    name: String,
    ctx: Arc<AgentContext>,
}

impl TesterAgent {
    pub fn new(task_id: &TaskId, ctx: Arc<AgentContext>) -> Self {
        Self {
            name: AgentRole::Tester.agent_name(task_id),
            ctx,
        }
    }
}

#[async_trait]
impl Agent for TesterAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, task: TaskRecord) -> anyhow::Result<AgentOutput> {
        let files = collect_code(&task);
        if files.is_empty() {
            tracing::warn!(agent = %self.name, task_id = %task.task_id, "no generated code to test");
            return Ok((Status::failed(), AgentResult::failure("no generated code to test")));
        }

        let language = language_of(&task);
        let prompt = format!(
            "Write automated {language} tests for the code below.\n\
             The tests must be runnable as a single file and import the code by its file name.\n\
             Return only the test code in a single fenced block.\n\n\
             Requirement: {instruction}\n\n{code}",
            instruction = task.instruction(),
            code = render_code(&files),
        );
        let options = self.ctx.options_for(&task);
        let response = self.ctx.ask(&self.name, &task, &prompt, &options).await?;

        let test_code = extract_code(&response, language);
        if test_code.is_empty() {
            return Ok((Status::failed(), AgentResult::failure("model returned no tests")));
        }
        Ok((
            Status::from(AgentRole::Tester.success_status()),
            AgentResult::Code(CodeArtifact {
                code: String::new(),
                tests: Some(test_code),
                path: None,
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ScriptedBackend, ScriptedResponse};
    use chrono::Utc;
    use devflow_core::api::{Deposit, Gate, TaskConfig};

    fn task_with_code() -> TaskRecord {
        let mut task = TaskRecord::new("T", "sum two numbers").with_config(TaskConfig {
            language: Some("javascript".into()),
            ..Default::default()
        });
        task.parameters.insert_deposit(
            "Generator_T",
            Deposit {
                status: Status::from("generated"),
                result: AgentResult::Code(CodeArtifact {
                    code: "module.exports = (a, b) => a + b;".into(),
                    tests: None,
                    path: Some("sum.js".into()),
                }),
                timestamp: Utc::now(),
                seq: 1,
            },
        );
        task
    }

    #[tokio::test]
    async fn writes_tests_without_running_them() {
        let backend = Arc::new(ScriptedBackend::new(vec![ScriptedResponse::always(
            "```javascript\nassert.equal(sum(1, 2), 3);\n```",
        )]));
        let agent = TesterAgent::new(&TaskId::from("T"), Arc::new(AgentContext::new(backend.clone())));

        let (status, result) = agent.process(task_with_code()).await.unwrap();
        assert_eq!(status, "tests_written");
        let written = result.as_code().unwrap();
        assert_eq!(written.tests.as_deref(), Some("assert.equal(sum(1, 2), 3);"));
        assert_eq!(result.passed(), None);
        // Unrun tests satisfy neither verdict.
        assert!(!Gate::status("tests_written").with_passed(false).matches(&status, &result));
        assert!(!Gate::status("tests_written").with_passed(true).matches(&status, &result));
        assert!(backend.prompts()[0].contains("// file: sum.js"));
    }

    #[tokio::test]
    async fn fails_without_generated_code() {
        let backend = Arc::new(ScriptedBackend::new(vec![]));
        let agent = TesterAgent::new(&TaskId::from("T"), Arc::new(AgentContext::new(backend.clone())));

        let (status, _) = agent.process(TaskRecord::new("T", "x")).await.unwrap();
        assert!(status.is_failed());
        assert!(backend.prompts().is_empty());
    }
}
