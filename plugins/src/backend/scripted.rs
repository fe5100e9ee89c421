use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use devflow_core::api::{GenerateOptions, ModelBackend};

/// One canned answer. `when` is matched as a substring of the prompt; a rule
/// without `when` matches everything.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptedResponse {
    #[serde(default)]
    pub when: Option<String>,

    pub response: String,

    /// Answer at most once when false.
    #[serde(default = "default_repeat")]
    pub repeat: bool,
}

fn default_repeat() -> bool {
    true
}

impl ScriptedResponse {
    pub fn when(needle: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            when: Some(needle.into()),
            response: response.into(),
            repeat: true,
        }
    }

    pub fn always(response: impl Into<String>) -> Self {
        Self {
            when: None,
            response: response.into(),
            repeat: true,
        }
    }

    pub fn once(mut self) -> Self {
        self.repeat = false;
        self
    }

    fn matches(&self, prompt: &str) -> bool {
        self.when
            .as_deref()
            .map(|needle| prompt.contains(needle))
            .unwrap_or(true)
    }
}

#[derive(Debug, Default)]
struct ScriptState {
    used: Vec<bool>,
    prompts: Vec<String>,
}

/// Backend answering from a fixed script, for dry runs and tests.
#[derive(Debug)]
pub struct ScriptedBackend {
    responses: Vec<ScriptedResponse>,
    state: Mutex<ScriptState>,
}

impl ScriptedBackend {
    pub fn new(responses: Vec<ScriptedResponse>) -> Self {
        let used = vec![false; responses.len()];
        Self {
            responses,
            state: Mutex::new(ScriptState {
                used,
                prompts: Vec::new(),
            }),
        }
    }

    /// Load a JSON array of responses.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scripted responses {}", path.display()))?;
        let responses: Vec<ScriptedResponse> = serde_json::from_str(&content)
            .with_context(|| format!("invalid scripted responses {}", path.display()))?;
        Ok(Self::new(responses))
    }

    /// Prompts received so far, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|s| s.prompts.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, prompt: &str, _options: &GenerateOptions) -> Result<String> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow::anyhow!("scripted backend state poisoned"))?;
        state.prompts.push(prompt.to_string());

        for (idx, rule) in self.responses.iter().enumerate() {
            if state.used[idx] || !rule.matches(prompt) {
                continue;
            }
            if !rule.repeat {
                state.used[idx] = true;
            }
            return Ok(rule.response.clone());
        }
        anyhow::bail!("no scripted response matches the prompt")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn first_matching_rule_answers() {
        let backend = ScriptedBackend::new(vec![
            ScriptedResponse::when("plan", "first").once(),
            ScriptedResponse::when("plan", "second"),
            ScriptedResponse::always("fallback"),
        ]);
        let opts = GenerateOptions::default();

        assert_eq!(backend.generate("plan this", &opts).await.unwrap(), "first");
        assert_eq!(backend.generate("plan this", &opts).await.unwrap(), "second");
        assert_eq!(backend.generate("code that", &opts).await.unwrap(), "fallback");
        assert_eq!(backend.prompts().len(), 3);
    }

    #[tokio::test]
    async fn unmatched_prompt_is_an_error() {
        let backend = ScriptedBackend::new(vec![ScriptedResponse::when("plan", "x")]);
        assert!(backend
            .generate("something else", &GenerateOptions::default())
            .await
            .is_err());
    }

    #[test]
    fn loads_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"when": "Architect", "response": "{{}}"}}, {{"response": "ok", "repeat": false}}]"#
        )
        .unwrap();

        let backend = ScriptedBackend::from_file(file.path()).unwrap();
        assert_eq!(backend.responses.len(), 2);
        assert!(!backend.responses[1].repeat);
    }
}
