use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::plan::DEFAULT_MAX_SUBTASKS;
use crate::selector::DEFAULT_ADVISORY_TIMEOUT_MS;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default = "default_artifacts_sink")]
    pub artifacts: SinkConfig,

    #[serde(default = "default_conversation_sink")]
    pub conversation: SinkConfig,

    #[serde(default)]
    pub executor: ExecutorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,

    /// If true, log to stderr.
    #[serde(default = "default_logging_console")]
    pub console: bool,

    /// If true, log to a file under `directory`.
    #[serde(default = "default_logging_file")]
    pub file: bool,

    /// EnvFilter string, e.g. "info" or "devflow_core=debug".
    #[serde(default = "default_logging_level")]
    pub level: String,

    #[serde(default)]
    pub directory: Option<String>,
}

fn default_logging_enabled() -> bool {
    true
}

fn default_logging_console() -> bool {
    true
}

fn default_logging_file() -> bool {
    true
}

fn default_logging_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            console: default_logging_console(),
            file: default_logging_file(),
            level: default_logging_level(),
            directory: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_max_subtasks")]
    pub max_subtasks: usize,

    /// Main-loop iteration cap. Defaults to 10 x the number of agents.
    #[serde(default)]
    pub max_iterations: Option<usize>,

    /// Timeout applied to agent invocations whose task carries none.
    #[serde(default)]
    pub agent_timeout_ms: Option<u64>,

    #[serde(default)]
    pub advisory: AdvisoryConfig,
}

fn default_max_subtasks() -> usize {
    DEFAULT_MAX_SUBTASKS
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_subtasks: default_max_subtasks(),
            max_iterations: None,
            agent_timeout_ms: None,
            advisory: AdvisoryConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn agent_timeout(&self) -> Option<Duration> {
        self.agent_timeout_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    pub fn max_iterations_for(&self, agents: usize) -> usize {
        self.max_iterations
            .unwrap_or(agents.saturating_mul(10))
            .max(1)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvisoryConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_advisory_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_advisory_timeout_ms() -> u64 {
    DEFAULT_ADVISORY_TIMEOUT_MS
}

impl Default for AdvisoryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_ms: default_advisory_timeout_ms(),
        }
    }
}

impl AdvisoryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Local code CLI driven over stdin/stdout.
    #[default]
    Codecli,
    /// Canned responses, for dry runs and tests.
    Scripted,
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "codecli" => Ok(Self::Codecli),
            "scripted" => Ok(Self::Scripted),
            other => Err(format!("unknown backend kind '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub kind: BackendKind,

    #[serde(default = "default_backend_command")]
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub env: HashMap<String, String>,

    #[serde(default = "default_backend_timeout_ms")]
    pub timeout_ms: u64,

    /// JSON file of canned responses for the scripted backend.
    #[serde(default)]
    pub responses_file: Option<String>,

    #[serde(default)]
    pub default_max_tokens: Option<u32>,

    #[serde(default)]
    pub default_temperature: Option<f32>,
}

fn default_backend_command() -> String {
    "codex".to_string()
}

fn default_backend_timeout_ms() -> u64 {
    300_000
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            command: default_backend_command(),
            args: Vec::new(),
            env: HashMap::new(),
            timeout_ms: default_backend_timeout_ms(),
            responses_file: None,
            default_max_tokens: None,
            default_temperature: None,
        }
    }
}

/// JSONL sink shared by the artifact store and the conversation log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    pub enabled: bool,
    pub path: String,
    pub channel_capacity: usize,
    pub drop_when_full: bool,
}

pub(crate) const DEFAULT_ARTIFACTS_PATH: &str = "./artifacts.jsonl";
pub(crate) const DEFAULT_CONVERSATION_PATH: &str = "./conversation.jsonl";

fn default_artifacts_sink() -> SinkConfig {
    SinkConfig::at(DEFAULT_ARTIFACTS_PATH)
}

fn default_conversation_sink() -> SinkConfig {
    SinkConfig::at(DEFAULT_CONVERSATION_PATH)
}

impl SinkConfig {
    fn at(path: &str) -> Self {
        Self {
            enabled: true,
            path: path.to_string(),
            channel_capacity: 2048,
            drop_when_full: true,
        }
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        default_artifacts_sink()
    }
}

/// Test command run by the Executor agent. `{file}` in `args` is replaced
/// with the path of the generated test file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default = "default_executor_command")]
    pub command: String,

    #[serde(default = "default_executor_args")]
    pub args: Vec<String>,

    #[serde(default)]
    pub workdir: Option<String>,

    #[serde(default = "default_executor_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_executor_command() -> String {
    "node".to_string()
}

fn default_executor_args() -> Vec<String> {
    vec!["--test".to_string(), "{file}".to_string()]
}

fn default_executor_timeout_ms() -> u64 {
    120_000
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            command: default_executor_command(),
            args: default_executor_args(),
            workdir: None,
            timeout_ms: default_executor_timeout_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let cfg: AppConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.orchestrator.max_subtasks, 10);
        assert_eq!(cfg.orchestrator.advisory.timeout_ms, 2000);
        assert_eq!(cfg.backend.kind, BackendKind::Codecli);
        assert_eq!(cfg.artifacts.path, "./artifacts.jsonl");
        assert_eq!(cfg.conversation.path, "./conversation.jsonl");
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn sections_are_parsed() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [orchestrator]
            max_subtasks = 3
            max_iterations = 7
            agent_timeout_ms = 500

            [orchestrator.advisory]
            enabled = true

            [backend]
            kind = "scripted"
            responses_file = "responses.json"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.orchestrator.max_subtasks, 3);
        assert_eq!(cfg.orchestrator.max_iterations_for(4), 7);
        assert_eq!(cfg.orchestrator.agent_timeout(), Some(Duration::from_millis(500)));
        assert!(cfg.orchestrator.advisory.enabled);
        assert_eq!(cfg.backend.kind, BackendKind::Scripted);
        assert_eq!(cfg.backend.responses_file.as_deref(), Some("responses.json"));
    }

    #[test]
    fn iteration_cap_scales_with_agents() {
        let cfg = OrchestratorConfig::default();
        assert_eq!(cfg.max_iterations_for(5), 50);
        assert_eq!(cfg.max_iterations_for(0), 1);
    }
}
