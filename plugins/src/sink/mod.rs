//! JSONL-backed implementations of the tracking sinks.

mod writer;

pub use writer::{start_jsonl_writer, JsonlTx};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use devflow_core::api::{AgentResult, ArtifactStore, ConversationLog, Status, TaskId};

/// One line of the artifact log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub ts: DateTime<Utc>,
    pub task_id: TaskId,
    pub agent: String,
    pub status: Status,
    pub payload: AgentResult,
}

/// One line of the conversation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRecord {
    pub ts: DateTime<Utc>,
    pub session_id: String,
    pub task_id: TaskId,
    pub agent: String,
    pub prompt: String,
    pub response: String,
}

pub struct JsonlArtifactStore {
    tx: JsonlTx,
}

impl JsonlArtifactStore {
    pub fn new(tx: JsonlTx) -> Self {
        Self { tx }
    }

    pub fn writer(&self) -> &JsonlTx {
        &self.tx
    }
}

#[async_trait]
impl ArtifactStore for JsonlArtifactStore {
    fn name(&self) -> &str {
        "jsonl-artifacts"
    }

    async fn save(
        &self,
        task_id: &TaskId,
        agent: &str,
        status: &Status,
        payload: &AgentResult,
    ) -> anyhow::Result<()> {
        let record = ArtifactRecord {
            ts: Utc::now(),
            task_id: task_id.clone(),
            agent: agent.to_string(),
            status: status.clone(),
            payload: payload.clone(),
        };
        self.tx.send_json(&record).await
    }
}

pub struct JsonlConversationLog {
    tx: JsonlTx,
}

impl JsonlConversationLog {
    pub fn new(tx: JsonlTx) -> Self {
        Self { tx }
    }

    pub fn writer(&self) -> &JsonlTx {
        &self.tx
    }
}

#[async_trait]
impl ConversationLog for JsonlConversationLog {
    fn name(&self) -> &str {
        "jsonl-conversation"
    }

    async fn record(
        &self,
        session_id: &str,
        task_id: &TaskId,
        agent: &str,
        prompt: &str,
        response: &str,
    ) -> anyhow::Result<()> {
        let record = ExchangeRecord {
            ts: Utc::now(),
            session_id: session_id.to_string(),
            task_id: task_id.clone(),
            agent: agent.to_string(),
            prompt: prompt.to_string(),
            response: response.to_string(),
        };
        self.tx.send_json(&record).await
    }
}
