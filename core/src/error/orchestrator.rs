use thiserror::Error;

/// Failure kinds the scheduler recovers from locally.
///
/// None of these reach the caller of `orchestrate`; they are logged and folded
/// into deposits or the run summary.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("agent '{agent}' failed: {reason}")]
    AgentFailure { agent: String, reason: String },

    #[error("agent '{agent}' timed out after {timeout_ms}ms")]
    AgentTimeout { agent: String, timeout_ms: u64 },

    #[error("agent '{agent}' panicked: {message}")]
    AgentPanicked { agent: String, message: String },

    #[error("malformed plan: {0}")]
    MalformedPlan(String),

    #[error("no progress: {pending} pending agent(s) blocked on unsatisfied gates")]
    NoProgress { pending: usize },

    #[error("iteration cap {cap} reached with {pending} agent(s) pending")]
    IterationCap { cap: usize, pending: usize },

    #[error("callback '{callback}' failed: {reason}")]
    CallbackFailure { callback: String, reason: String },

    #[error("config error: {0}")]
    Config(String),
}

impl OrchestratorError {
    /// Short stable label used in structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AgentFailure { .. } => "agent_failure",
            Self::AgentTimeout { .. } => "agent_timeout",
            Self::AgentPanicked { .. } => "agent_panicked",
            Self::MalformedPlan(_) => "malformed_plan",
            Self::NoProgress { .. } => "no_progress",
            Self::IterationCap { .. } => "iteration_cap",
            Self::CallbackFailure { .. } => "callback_failure",
            Self::Config(_) => "config",
        }
    }

    /// Whether the error represents an agent invocation that did not produce a result.
    pub fn is_agent_fault(&self) -> bool {
        matches!(
            self,
            Self::AgentFailure { .. } | Self::AgentTimeout { .. } | Self::AgentPanicked { .. }
        )
    }
}
