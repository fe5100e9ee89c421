use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::task::{AgentResult, Status, TaskId, TaskRecord};

pub type AgentOutput = (Status, AgentResult);

/// Capability surface of every participating agent.
///
/// Agents never call each other, never touch the graph and never see the
/// output store; the task they receive is a private snapshot.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Stable identity, `<Role>_<task_id>`. Used as the graph node key.
    fn name(&self) -> &str;

    async fn process(&self, task: TaskRecord) -> anyhow::Result<AgentOutput>;

    /// Telemetry hook, called once after every `process` call whatever its outcome.
    async fn track(
        &self,
        _task: &TaskRecord,
        _status: &Status,
        _result: &AgentResult,
        _used_remote: bool,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentRole {
    Architect,
    Generator,
    Tester,
    Executor,
    Debugger,
}

impl AgentRole {
    pub const ALL: [AgentRole; 5] = [
        AgentRole::Architect,
        AgentRole::Generator,
        AgentRole::Tester,
        AgentRole::Executor,
        AgentRole::Debugger,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Architect => "Architect",
            Self::Generator => "Generator",
            Self::Tester => "Tester",
            Self::Executor => "Executor",
            Self::Debugger => "Debugger",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(s.trim()))
    }

    /// Role encoded in an agent name (`Architect_t1` -> `Architect`).
    pub fn from_agent_name(name: &str) -> Option<Self> {
        let (prefix, _) = name.split_once('_')?;
        Self::parse(prefix)
    }

    pub fn agent_name(self, task_id: &TaskId) -> String {
        format!("{}_{}", self.as_str(), task_id)
    }

    /// Status the role reports when it completes normally.
    pub fn success_status(self) -> &'static str {
        match self {
            Self::Architect => "planned",
            Self::Generator => "generated",
            Self::Tester => "tests_written",
            Self::Executor => "tested",
            Self::Debugger => "debugged",
        }
    }
}
