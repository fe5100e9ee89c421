//! Best-effort sinks agents report to from `track` and around model calls.

use async_trait::async_trait;

use crate::error::OrchestratorError;
use crate::task::{AgentResult, Status, TaskId};

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    fn name(&self) -> &str;

    async fn save(
        &self,
        task_id: &TaskId,
        agent: &str,
        status: &Status,
        payload: &AgentResult,
    ) -> anyhow::Result<()>;
}

#[async_trait]
pub trait ConversationLog: Send + Sync {
    fn name(&self) -> &str;

    async fn record(
        &self,
        session_id: &str,
        task_id: &TaskId,
        agent: &str,
        prompt: &str,
        response: &str,
    ) -> anyhow::Result<()>;
}

/// Save through `store`, logging and swallowing any failure.
pub async fn save_artifact(
    store: &dyn ArtifactStore,
    task_id: &TaskId,
    agent: &str,
    status: &Status,
    payload: &AgentResult,
) {
    if let Err(e) = store.save(task_id, agent, status, payload).await {
        let err = OrchestratorError::CallbackFailure {
            callback: store.name().to_string(),
            reason: e.to_string(),
        };
        tracing::warn!(kind = err.kind(), %task_id, agent, "{}", err);
    }
}

/// Record through `log`, logging and swallowing any failure.
pub async fn record_exchange(
    log: &dyn ConversationLog,
    session_id: &str,
    task_id: &TaskId,
    agent: &str,
    prompt: &str,
    response: &str,
) {
    if let Err(e) = log.record(session_id, task_id, agent, prompt, response).await {
        let err = OrchestratorError::CallbackFailure {
            callback: log.name().to_string(),
            reason: e.to_string(),
        };
        tracing::warn!(kind = err.kind(), %task_id, agent, "{}", err);
    }
}
