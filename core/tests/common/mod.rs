#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use devflow_core::api::{
    Agent, Clock, AgentOutput, AgentResult, CodeArtifact, GenerateOptions, ModelBackend, Orchestrator,
    OrchestratorConfig, Plan, Status, TaskConfig, TaskId, TaskRecord, TestOutcome,
};

/// What a scripted agent does when invoked.
#[derive(Clone)]
pub enum Reply {
    Output(Status, AgentResult),
    Error(&'static str),
    Panic,
    Hang,
}

pub struct ScriptedAgent {
    name: String,
    reply: Reply,
    /// Task id for which the agent reports `failed` instead of its reply.
    fails_for: Option<String>,
    calls: Mutex<Vec<TaskRecord>>,
    tracked: Mutex<Vec<(TaskId, Status, AgentResult)>>,
}

impl ScriptedAgent {
    pub fn new(name: &str, reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            reply,
            fails_for: None,
            calls: Mutex::new(Vec::new()),
            tracked: Mutex::new(Vec::new()),
        })
    }

    pub fn replying(name: &str, status: &str, result: AgentResult) -> Arc<Self> {
        Self::new(name, Reply::Output(Status::from(status), result))
    }

    pub fn replying_except(
        name: &str,
        status: &str,
        result: AgentResult,
        failing_task: &str,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            reply: Reply::Output(Status::from(status), result),
            fails_for: Some(failing_task.to_string()),
            calls: Mutex::new(Vec::new()),
            tracked: Mutex::new(Vec::new()),
        })
    }

    /// Tasks this agent was invoked with, in call order.
    pub fn calls(&self) -> Vec<TaskRecord> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_ids(&self) -> Vec<String> {
        self.calls()
            .iter()
            .map(|t| t.task_id.as_str().to_string())
            .collect()
    }

    pub fn tracked(&self) -> Vec<(TaskId, Status, AgentResult)> {
        self.tracked.lock().unwrap().clone()
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, task: TaskRecord) -> anyhow::Result<AgentOutput> {
        let fails = self.fails_for.as_deref() == Some(task.task_id.as_str());
        self.calls.lock().unwrap().push(task);
        if fails {
            return Ok((Status::failed(), AgentResult::failure("scripted failure")));
        }
        match self.reply.clone() {
            Reply::Output(status, result) => Ok((status, result)),
            Reply::Error(reason) => anyhow::bail!(reason),
            Reply::Panic => panic!("scripted agent panic"),
            Reply::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok((Status::from("late"), AgentResult::empty()))
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
        self.tracked
            .lock()
            .unwrap()
            .push((task.task_id.clone(), status.clone(), result.clone()));
        Ok(())
    }
}

/// Clock pinned to one instant.
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

pub struct NullBackend;

#[async_trait]
impl ModelBackend for NullBackend {
    fn name(&self) -> &str {
        "null"
    }

    async fn generate(&self, _prompt: &str, _options: &GenerateOptions) -> anyhow::Result<String> {
        anyhow::bail!("no model in tests")
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("devflow_core=debug")
        .with_test_writer()
        .try_init();
}

pub fn orchestrator() -> Orchestrator {
    init_tracing();
    Orchestrator::new("session-test", Arc::new(NullBackend))
}

pub fn orchestrator_with(config: OrchestratorConfig) -> Orchestrator {
    orchestrator().with_config(config)
}

pub fn task(id: &str) -> TaskRecord {
    TaskRecord::new(id, "build a todo app").with_config(TaskConfig {
        language: Some("javascript".into()),
        output_files: vec!["app.js".into()],
        ..Default::default()
    })
}

pub fn js_subtask(id: &str) -> TaskRecord {
    TaskRecord::new(id, format!("implement {id}")).with_config(TaskConfig {
        language: Some("javascript".into()),
        output_files: vec![format!("{id}.js")],
        ..Default::default()
    })
}

pub fn plan(subtasks: Vec<TaskRecord>) -> AgentResult {
    AgentResult::Plan(Plan::new(subtasks))
}

pub fn code(code: &str) -> AgentResult {
    AgentResult::Code(CodeArtifact::new(code))
}

pub fn test_outcome(passed: bool) -> AgentResult {
    AgentResult::TestOutcome(TestOutcome {
        test_code: "test('adds', () => {})".into(),
        passed,
        output: Some(if passed { "ok" } else { "1 failing" }.into()),
    })
}
