//! Advisory next-agent predictor backed by the model.

use std::sync::Arc;

use async_trait::async_trait;

use devflow_core::api::{AdvisorySelector, GenerateOptions, ModelBackend, TaskRecord};

/// Asks the backend which pending agent should run next.
///
/// Used only when nothing is ready. The answer is matched against the
/// candidate names; anything else counts as no suggestion.
pub struct LlmAdvisorySelector {
    backend: Arc<dyn ModelBackend>,
    options: GenerateOptions,
}

impl LlmAdvisorySelector {
    pub fn new(backend: Arc<dyn ModelBackend>) -> Self {
        Self {
            backend,
            options: GenerateOptions {
                max_tokens: Some(32),
                ..Default::default()
            },
        }
    }

    fn prompt(task: &TaskRecord, candidates: &[String]) -> String {
        format!(
            "A team of agents is working on: {instruction}\n\
             None of these agents has its inputs ready: {names}.\n\
             Reply with exactly one of the names above, or NONE.",
            instruction = task.instruction(),
            names = candidates.join(", "),
        )
    }
}

/// Candidate named by `answer`: an exact line match first, then the first
/// candidate mentioned anywhere. Longer names win so `Tester_T` does not
/// shadow `Tester_T.1`.
fn pick<'a>(answer: &str, candidates: &'a [String]) -> Option<&'a String> {
    let answer = answer.trim().trim_matches(|c: char| c == '`' || c == '"' || c == '.');
    if let Some(exact) = candidates.iter().find(|c| c.as_str() == answer) {
        return Some(exact);
    }
    let mut by_len: Vec<&String> = candidates.iter().collect();
    by_len.sort_by_key(|c| std::cmp::Reverse(c.len()));
    by_len.into_iter().find(|c| answer.contains(c.as_str()))
}

#[async_trait]
impl AdvisorySelector for LlmAdvisorySelector {
    fn name(&self) -> &str {
        "llm"
    }

    async fn suggest(
        &self,
        task: &TaskRecord,
        candidates: &[String],
    ) -> anyhow::Result<Option<String>> {
        if candidates.is_empty() {
            return Ok(None);
        }
        let answer = self
            .backend
            .generate(&Self::prompt(task, candidates), &self.options)
            .await?;
        let choice = pick(&answer, candidates).cloned();
        tracing::debug!(task_id = %task.task_id, answer = %answer.trim(), choice = ?choice, "advisory answer");
        Ok(choice)
    }
}
