use std::sync::Arc;

use async_trait::async_trait;

use devflow_core::api::{
    Agent, AgentOutput, AgentResult, AgentRole, Status, TaskId, TaskRecord, TestOutcome,
};

use super::extract::extension_for;
use super::{collect_code, language_of, AgentContext};
use crate::runner::{SourceFile, TestRunner};

/// Runs the Tester's tests against the generated code.
pub struct ExecutorAgent {
    name: String,
    ctx: Arc<AgentContext>,
    runner: Arc<dyn TestRunner>,
}

impl ExecutorAgent {
    pub fn new(task_id: &TaskId, ctx: Arc<AgentContext>, runner: Arc<dyn TestRunner>) -> Self {
        Self {
            name: AgentRole::Executor.agent_name(task_id),
            ctx,
            runner,
        }
    }
}

fn test_code_of(task: &TaskRecord) -> Option<&str> {
    task.parameters
        .latest_by_prefix(AgentRole::Tester.as_str())
        .and_then(|(_, d)| d.result.as_code())
        .and_then(|c| c.tests.as_deref())
        .filter(|code| !code.trim().is_empty())
}

#[async_trait]
impl Agent for ExecutorAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, task: TaskRecord) -> anyhow::Result<AgentOutput> {
        let Some(test_code) = test_code_of(&task) else {
            return Ok((Status::failed(), AgentResult::failure("no tests to run")));
        };
        let code = collect_code(&task);
        if code.is_empty() {
            return Ok((Status::failed(), AgentResult::failure("no generated code to test")));
        }

        let ext = extension_for(language_of(&task));
        let sources: Vec<SourceFile> = code
            .iter()
            .enumerate()
            .map(|(idx, c)| {
                let path = c
                    .path
                    .clone()
                    .unwrap_or_else(|| format!("generated_{idx}.{ext}"));
                SourceFile::new(path, c.code.clone())
            })
            .collect();
        let tests = SourceFile::new(format!("devflow.test.{ext}"), test_code);

        let run = self.runner.run(&sources, &tests).await?;
        tracing::debug!(
            agent = %self.name,
            runner = self.runner.name(),
            passed = run.passed,
            exit_code = ?run.exit_code,
            "tests executed"
        );

        Ok((
            Status::from(AgentRole::Executor.success_status()),
            AgentResult::TestOutcome(TestOutcome {
                test_code: test_code.to_string(),
                passed: run.passed,
                output: Some(run.output),
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
    use crate::backend::ScriptedBackend;
    use crate::runner::TestRun;
    use chrono::Utc;
    use devflow_core::api::{CodeArtifact, Deposit, TaskConfig};
    use std::sync::Mutex;

    struct FakeRunner {
        passed: bool,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TestRunner for FakeRunner {
        fn name(&self) -> &str {
            "fake"
        }

        async fn run(&self, sources: &[SourceFile], tests: &SourceFile) -> anyhow::Result<TestRun> {
            let mut seen = self.seen.lock().unwrap();
            seen.extend(sources.iter().map(|s| s.path.clone()));
            seen.push(tests.path.clone());
            Ok(TestRun {
                passed: self.passed,
                exit_code: Some(if self.passed { 0 } else { 1 }),
                output: "1 test".into(),
            })
        }
    }

    fn deposit(result: AgentResult, seq: u64) -> Deposit {
        Deposit {
            status: Status::from("ok"),
            result,
            timestamp: Utc::now(),
            seq,
        }
    }

    fn task() -> TaskRecord {
        let mut task = TaskRecord::new("T", "sum").with_config(TaskConfig {
            language: Some("javascript".into()),
            ..Default::default()
        });
        task.parameters
            .insert_deposit("Generator_T", deposit(AgentResult::Code(CodeArtifact::new("x")), 1));
        task.parameters.insert_deposit(
            "Tester_T",
            deposit(
                AgentResult::Code(CodeArtifact {
                    code: String::new(),
                    tests: Some("test()".into()),
                    path: None,
                }),
                2,
            ),
        );
        task
    }

    fn agent(passed: bool) -> (ExecutorAgent, Arc<FakeRunner>) {
        let runner = Arc::new(FakeRunner {
            passed,
            seen: Mutex::new(Vec::new()),
        });
        let ctx = Arc::new(AgentContext::new(Arc::new(ScriptedBackend::new(vec![]))));
        (ExecutorAgent::new(&TaskId::from("T"), ctx, runner.clone()), runner)
    }

    #[tokio::test]
    async fn reports_runner_verdict() {
        let (executor, runner) = agent(false);
        let (status, result) = executor.process(task()).await.unwrap();
        assert_eq!(status, "tested");
        assert_eq!(result.passed(), Some(false));
        assert_eq!(
            *runner.seen.lock().unwrap(),
            vec!["generated_0.js".to_string(), "devflow.test.js".to_string()]
        );

        let (executor, _) = agent(true);
        let (_, result) = executor.process(task()).await.unwrap();
        assert_eq!(result.passed(), Some(true));
        assert_eq!(result.as_test_outcome().unwrap().output.as_deref(), Some("1 test"));
    }

    #[tokio::test]
    async fn missing_tests_fail_without_running() {
        let (executor, runner) = agent(true);
        let (status, _) = executor.process(TaskRecord::new("T", "sum")).await.unwrap();
        assert!(status.is_failed());
        assert!(runner.seen.lock().unwrap().is_empty());
    }
}
