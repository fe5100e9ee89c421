//! Choice of the next agent to run among the pending set.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::graph::{escape_applies, is_ready, DependencyGraph};
use crate::store::TaskOutputs;
use crate::task::TaskRecord;

pub const DEFAULT_ADVISORY_TIMEOUT_MS: u64 = 2_000;

/// Next-step oracle consulted when no pending agent is ready.
///
/// Suggestions are advisory: a name outside the candidate list is ignored and
/// errors never reach the scheduler.
#[async_trait]
pub trait AdvisorySelector: Send + Sync {
    fn name(&self) -> &str;

    async fn suggest(
        &self,
        task: &TaskRecord,
        candidates: &[String],
    ) -> anyhow::Result<Option<String>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionReason {
    Ready,
    Escape,
    Advisory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub agent: String,
    pub reason: SelectionReason,
}

#[derive(Clone)]
pub struct Selector {
    advisory: Option<Arc<dyn AdvisorySelector>>,
    advisory_timeout: Duration,
}

impl Default for Selector {
    fn default() -> Self {
        Self {
            advisory: None,
            advisory_timeout: Duration::from_millis(DEFAULT_ADVISORY_TIMEOUT_MS),
        }
    }
}

impl std::fmt::Debug for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Selector")
            .field("advisory", &self.advisory.as_ref().map(|a| a.name().to_string()))
            .field("advisory_timeout", &self.advisory_timeout)
            .finish()
    }
}

impl Selector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_advisory(mut self, advisory: Arc<dyn AdvisorySelector>) -> Self {
        self.advisory = Some(advisory);
        self
    }

    pub fn with_advisory_timeout(mut self, timeout: Duration) -> Self {
        self.advisory_timeout = timeout;
        self
    }

    pub fn has_advisory(&self) -> bool {
        self.advisory.is_some()
    }

    /// Rules, first match wins:
    /// 1. first ready agent in `pending` order;
    /// 2. first agent admitted by the Architect escape hatch;
    /// 3. the advisory predictor's answer, if it names a pending agent;
    /// 4. nothing.
    pub async fn select(
        &self,
        task: &TaskRecord,
        pending: &[String],
        graph: &DependencyGraph,
        outputs: &TaskOutputs,
    ) -> Option<Selection> {
        if let Some(agent) = pending.iter().find(|a| is_ready(graph, a, outputs)) {
            return Some(Selection {
                agent: agent.clone(),
                reason: SelectionReason::Ready,
            });
        }

        if let Some(agent) = pending.iter().find(|a| escape_applies(graph, a, outputs)) {
            return Some(Selection {
                agent: agent.clone(),
                reason: SelectionReason::Escape,
            });
        }

        self.consult_advisory(task, pending).await.map(|agent| Selection {
            agent,
            reason: SelectionReason::Advisory,
        })
    }

    async fn consult_advisory(&self, task: &TaskRecord, pending: &[String]) -> Option<String> {
        let advisory = self.advisory.as_ref()?;
        if pending.is_empty() {
            return None;
        }

        let suggestion =
            match tokio::time::timeout(self.advisory_timeout, advisory.suggest(task, pending)).await
            {
                Ok(Ok(suggestion)) => suggestion?,
                Ok(Err(e)) => {
                    tracing::warn!(selector = advisory.name(), error = %e, "advisory selector failed");
                    return None;
                }
                Err(_) => {
                    tracing::warn!(
                        selector = advisory.name(),
                        timeout_ms = self.advisory_timeout.as_millis() as u64,
                        "advisory selector timed out"
                    );
                    return None;
                }
            };

        let suggestion = suggestion.trim();
        match pending.iter().find(|name| name.as_str() == suggestion) {
            Some(name) => Some(name.clone()),
            None => {
                tracing::debug!(
                    selector = advisory.name(),
                    suggestion,
                    "advisory suggestion is not pending; ignoring"
                );
                None
            }
        }
    }
}
