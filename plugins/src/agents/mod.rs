//! Role agents wrapping a [`ModelBackend`].
//!
//! Every role shares an [`AgentContext`]: the backend, generation defaults and
//! the optional tracking sinks. Agents only ever read the task they are handed.

mod architect;
mod debugger;
mod executor;
mod extract;
mod generator;
mod tester;

pub use architect::ArchitectAgent;
pub use debugger::DebuggerAgent;
pub use executor::ExecutorAgent;
pub use extract::{extract_code, extract_json};
pub use generator::GeneratorAgent;
pub use tester::TesterAgent;

use std::sync::Arc;

use devflow_core::api::{
    record_exchange, save_artifact, AgentResult, ArtifactStore, CodeArtifact, ConversationLog,
    GenerateOptions, ModelBackend, Status, TaskRecord,
};

pub struct AgentContext {
    backend: Arc<dyn ModelBackend>,
    artifacts: Option<Arc<dyn ArtifactStore>>,
    conversation: Option<Arc<dyn ConversationLog>>,
    options: GenerateOptions,
}

impl AgentContext {
    pub fn new(backend: Arc<dyn ModelBackend>) -> Self {
        Self {
            backend,
            artifacts: None,
            conversation: None,
            options: GenerateOptions::default(),
        }
    }

    pub fn with_artifacts(mut self, store: Option<Arc<dyn ArtifactStore>>) -> Self {
        self.artifacts = store;
        self
    }

    pub fn with_conversation(mut self, log: Option<Arc<dyn ConversationLog>>) -> Self {
        self.conversation = log;
        self
    }

    pub fn with_options(mut self, options: GenerateOptions) -> Self {
        self.options = options;
        self
    }

    pub fn backend(&self) -> &Arc<dyn ModelBackend> {
        &self.backend
    }

    /// Defaults overlaid with the task's own token budget and remote flag.
    pub fn options_for(&self, task: &TaskRecord) -> GenerateOptions {
        let config = task.config();
        let mut options = self.options.clone().with_max_tokens(config.max_tokens);
        options.use_remote |= config.use_remote;
        options
    }

    /// Send `prompt` to the backend and log the exchange.
    pub async fn ask(
        &self,
        agent: &str,
        task: &TaskRecord,
        prompt: &str,
        options: &GenerateOptions,
    ) -> anyhow::Result<String> {
        let response = self.backend.generate(prompt, options).await?;
        if let Some(log) = &self.conversation {
            let session_id = task.config().session_id.as_deref().unwrap_or_default();
            record_exchange(
                log.as_ref(),
                session_id,
                &task.task_id,
                agent,
                prompt,
                &response,
            )
            .await;
        }
        Ok(response)
    }

    /// Shared `Agent::track` body: persist the deposit, best-effort.
    pub async fn track(&self, agent: &str, task: &TaskRecord, status: &Status, result: &AgentResult) {
        if let Some(store) = &self.artifacts {
            save_artifact(store.as_ref(), &task.task_id, agent, status, result).await;
        }
    }
}

/// Generated code visible to an agent: one artifact per subtask that has a
/// Generator deposit, else the task's own Generator deposit.
pub(crate) fn collect_code(task: &TaskRecord) -> Vec<CodeArtifact> {
    let from_subtasks: Vec<CodeArtifact> = task
        .parameters
        .subtask_deposits_by_prefix("Generator")
        .into_iter()
        .filter_map(|(_, deposit)| deposit.result.as_code().cloned())
        .collect();
    if !from_subtasks.is_empty() {
        return from_subtasks;
    }
    task.parameters
        .latest_by_prefix("Generator")
        .and_then(|(_, deposit)| deposit.result.as_code().cloned())
        .into_iter()
        .collect()
}

pub(crate) fn render_code(files: &[CodeArtifact]) -> String {
    files
        .iter()
        .map(|f| {
            format!(
                "// file: {}\n{}\n",
                f.path.as_deref().unwrap_or("(unnamed)"),
                f.code.trim_end()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub(crate) fn language_of(task: &TaskRecord) -> &str {
    task.config()
        .language
        .as_deref()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .unwrap_or("plain text")
}
