//! Stable re-exports for consumers (`cli`, `plugins`, and external crates).
//!
//! Prefer importing from `devflow_core::api` instead of reaching into internal modules.

pub use crate::agent::{Agent, AgentOutput, AgentRole};
pub use crate::backend::{GenerateOptions, ModelBackend};
pub use crate::clock::{Clock, SystemClock};
pub use crate::config::{
    load_default, load_from, AdvisoryConfig, AppConfig, BackendConfig, BackendKind,
    ExecutorConfig, LoggingConfig, OrchestratorConfig, SinkConfig,
};
pub use crate::error::{CliError, OrchestratorError};
pub use crate::graph::{DependencyGraph, Edge, Gate};
pub use crate::orchestrator::Orchestrator;
pub use crate::plan::{Plan, PlanMetadata, DEFAULT_MAX_SUBTASKS};
pub use crate::scheduler::{RunSummary, Termination};
pub use crate::selector::{AdvisorySelector, Selection, SelectionReason};
pub use crate::store::{OutputStore, TaskOutputs};
pub use crate::task::{
    AgentResult, CodeArtifact, Deposit, Parameters, Status, TaskConfig, TaskId, TaskRecord,
    TestOutcome,
};
pub use crate::tracking::{record_exchange, save_artifact, ArtifactStore, ConversationLog};
