use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tempfile::TempDir;
use tokio::process::Command;

use devflow_core::api::ExecutorConfig;

use super::{SourceFile, TestRun, TestRunner};

const OUTPUT_TAIL_BYTES: usize = 8 * 1024;

/// Runs an external test command, e.g. `node --test {file}`.
///
/// `{file}` in the arguments is replaced by the test file path and `{dir}` by
/// the working directory. Without a configured workdir each run gets a fresh
/// directory under the system temp dir, removed once the run is over.
pub struct CommandTestRunner {
    command: String,
    args: Vec<String>,
    workdir: Option<PathBuf>,
    timeout: Duration,
}

impl CommandTestRunner {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            workdir: None,
            timeout: Duration::from_secs(120),
        }
    }

    pub fn from_config(cfg: &ExecutorConfig) -> Self {
        Self {
            command: cfg.command.clone(),
            args: cfg.args.clone(),
            workdir: cfg
                .workdir
                .as_deref()
                .map(str::trim)
                .filter(|w| !w.is_empty())
                .map(PathBuf::from),
            timeout: Duration::from_millis(cfg.timeout_ms.max(1)),
        }
    }

    pub fn with_workdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn run_dir(&self) -> Result<RunDir> {
        match &self.workdir {
            Some(dir) => Ok(RunDir::Fixed(dir.clone())),
            None => tempfile::Builder::new()
                .prefix("devflow-")
                .tempdir()
                .map(RunDir::Temp)
                .context("failed to create a temporary run directory"),
        }
    }

    fn expand_args(&self, file: &Path, dir: &Path) -> Vec<String> {
        let file = file.to_string_lossy();
        let dir = dir.to_string_lossy();
        self.args
            .iter()
            .map(|a| a.replace("{file}", &file).replace("{dir}", &dir))
            .collect()
    }
}

/// Where one run writes its files. A `Temp` directory is deleted on drop.
enum RunDir {
    Fixed(PathBuf),
    Temp(TempDir),
}

impl RunDir {
    fn path(&self) -> &Path {
        match self {
            RunDir::Fixed(dir) => dir.as_path(),
            RunDir::Temp(dir) => dir.path(),
        }
    }
}

/// Keep only the normal components of `path` so generated files stay inside
/// the run directory.
fn contained(path: &str) -> Option<PathBuf> {
    let clean: PathBuf = Path::new(path.trim())
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect();
    (!clean.as_os_str().is_empty()).then_some(clean)
}

async fn write_file(dir: &Path, file: &SourceFile) -> Result<PathBuf> {
    let rel = contained(&file.path)
        .with_context(|| format!("unusable file name '{}'", file.path))?;
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&path, &file.contents)
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

fn tail(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut start = s.len() - max;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &s[start..])
}

#[async_trait]
impl TestRunner for CommandTestRunner {
    fn name(&self) -> &str {
        "command"
    }

    async fn run(&self, sources: &[SourceFile], tests: &SourceFile) -> Result<TestRun> {
        let run_dir = self.run_dir()?;
        let dir = run_dir.path();
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("failed to create {}", dir.display()))?;

        for source in sources {
            write_file(dir, source).await?;
        }
        let test_path = write_file(dir, tests).await?;
        let args = self.expand_args(&test_path, dir);

        tracing::debug!(command = %self.command, args = ?args, dir = %dir.display(), "running tests");
        let child = Command::new(&self.command)
            .args(&args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn '{}'", self.command))?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output.with_context(|| format!("i/o with '{}' failed", self.command))?,
            Err(_) => {
                tracing::warn!(command = %self.command, timeout_ms = self.timeout.as_millis() as u64, "test run timed out");
                return Ok(TestRun {
                    passed: false,
                    exit_code: None,
                    output: format!("test run timed out after {}ms", self.timeout.as_millis()),
                });
            }
        };

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&stderr);
        }

        Ok(TestRun {
            passed: output.status.success(),
            exit_code: output.status.code(),
            output: tail(text.trim(), OUTPUT_TAIL_BYTES),
        })
    }
}
