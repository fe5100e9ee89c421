use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::plan::Plan;

/// Status string reported by an agent, e.g. `planned`, `generated`, `failed`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Status(String);

impl Status {
    pub const FAILED: &'static str = "failed";

    pub fn new(status: impl Into<String>) -> Self {
        Self(status.into())
    }

    pub fn failed() -> Self {
        Self(Self::FAILED.to_string())
    }

    pub fn is_failed(&self) -> bool {
        self.0 == Self::FAILED
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Status {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Status {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl PartialEq<str> for Status {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Status {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Generated source, optionally with accompanying tests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodeArtifact {
    pub code: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tests: Option<String>,

    /// Target file the code belongs to, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl CodeArtifact {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            tests: None,
            path: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub test_code: String,
    pub passed: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

/// What an agent hands back to the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AgentResult {
    Plan(Plan),
    Code(CodeArtifact),
    TestOutcome(TestOutcome),
    Text(String),
    Failure { reason: String },
}

impl AgentResult {
    /// Typed empty result paired with a `failed` status.
    pub fn empty() -> Self {
        Self::Failure {
            reason: String::new(),
        }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Self::Failure {
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Plan(_) => "plan",
            Self::Code(_) => "code",
            Self::TestOutcome(_) => "test_outcome",
            Self::Text(_) => "text",
            Self::Failure { .. } => "failure",
        }
    }

    pub fn as_plan(&self) -> Option<&Plan> {
        match self {
            Self::Plan(plan) => Some(plan),
            _ => None,
        }
    }

    pub fn as_code(&self) -> Option<&CodeArtifact> {
        match self {
            Self::Code(code) => Some(code),
            _ => None,
        }
    }

    pub fn as_test_outcome(&self) -> Option<&TestOutcome> {
        match self {
            Self::TestOutcome(outcome) => Some(outcome),
            _ => None,
        }
    }

    /// Pass/fail bit, only carried by test outcomes.
    pub fn passed(&self) -> Option<bool> {
        self.as_test_outcome().map(|o| o.passed)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure { .. })
    }
}

/// One agent's recorded contribution for a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deposit {
    pub status: Status,
    pub result: AgentResult,
    pub timestamp: DateTime<Utc>,

    /// Run-wide write sequence; deposits of one task are totally ordered by it.
    pub seq: u64,
}

impl Deposit {
    pub fn into_pair(self) -> (Status, AgentResult) {
        (self.status, self.result)
    }
}
