use std::path::{Path, PathBuf};

use crate::error::OrchestratorError;

use super::types::{AppConfig, DEFAULT_ARTIFACTS_PATH, DEFAULT_CONVERSATION_PATH};

/// Get the default devflow data directory: ~/.devflow
pub fn get_devflow_data_dir() -> Result<PathBuf, OrchestratorError> {
    dirs::home_dir()
        .map(|home| home.join(".devflow"))
        .ok_or_else(|| OrchestratorError::Config("cannot determine home directory".to_string()))
}

/// Search `~/.devflow/config.toml`, then `./config.toml`, else defaults.
pub fn load_default() -> Result<AppConfig, OrchestratorError> {
    let data_dir = get_devflow_data_dir()?;
    let user_config = data_dir.join("config.toml");
    let local_config = Path::new("config.toml");

    let mut cfg = if user_config.exists() {
        read_file(&user_config)?
    } else if local_config.exists() {
        read_file(local_config)?
    } else {
        AppConfig::default()
    };

    relocate_defaults(&mut cfg, &data_dir);
    apply_env_overrides(&mut cfg)?;
    Ok(cfg)
}

/// Load an explicit config file; no search is performed.
pub fn load_from(path: &Path) -> Result<AppConfig, OrchestratorError> {
    let mut cfg = read_file(path)?;
    if let Ok(data_dir) = get_devflow_data_dir() {
        relocate_defaults(&mut cfg, &data_dir);
    }
    apply_env_overrides(&mut cfg)?;
    Ok(cfg)
}

fn read_file(path: &Path) -> Result<AppConfig, OrchestratorError> {
    let s = std::fs::read_to_string(path).map_err(|e| {
        OrchestratorError::Config(format!("failed to read {}: {e}", path.display()))
    })?;
    toml::from_str::<AppConfig>(&s)
        .map_err(|e| OrchestratorError::Config(format!("invalid {}: {e}", path.display())))
}

/// Point default sink paths and the log directory into the data directory.
///
/// Directories are created by the sinks and the log writer when they open.
fn relocate_defaults(cfg: &mut AppConfig, data_dir: &Path) {
    if cfg.artifacts.path == DEFAULT_ARTIFACTS_PATH {
        cfg.artifacts.path = data_dir
            .join("artifacts")
            .join("artifacts.jsonl")
            .to_string_lossy()
            .to_string();
    }
    if cfg.conversation.path == DEFAULT_CONVERSATION_PATH {
        cfg.conversation.path = data_dir
            .join("conversations")
            .join("conversation.jsonl")
            .to_string_lossy()
            .to_string();
    }

    let unset = cfg
        .logging
        .directory
        .as_ref()
        .map(|s| s.trim().is_empty())
        .unwrap_or(true);
    if unset {
        cfg.logging.directory = Some(data_dir.join("logs").to_string_lossy().to_string());
    }
}

/// Environment variable overrides (highest priority).
pub fn apply_env_overrides(cfg: &mut AppConfig) -> Result<(), OrchestratorError> {
    if let Some(v) = non_empty_var("DEVFLOW_BACKEND_KIND") {
        cfg.backend.kind = v.parse().map_err(OrchestratorError::Config)?;
    }
    if let Some(v) = non_empty_var("DEVFLOW_BACKEND_COMMAND") {
        cfg.backend.command = v;
    }
    if let Some(v) = non_empty_var("DEVFLOW_MAX_SUBTASKS") {
        cfg.orchestrator.max_subtasks = v.trim().parse().map_err(|_| {
            OrchestratorError::Config(format!("DEVFLOW_MAX_SUBTASKS is not a number: {v}"))
        })?;
    }
    if let Some(v) = non_empty_var("DEVFLOW_LOG_LEVEL") {
        cfg.logging.level = v;
    }
    Ok(())
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
