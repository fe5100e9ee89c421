use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

use devflow_core::api::{BackendConfig, GenerateOptions, ModelBackend};

/// Local code CLI (codex, claude, gemini, ...) driven one prompt at a time.
///
/// The prompt is written to stdin and the whole of stdout is the response.
/// A non-zero exit status is an error carrying the tail of stderr.
pub struct CodeCliBackend {
    command: String,
    args: Vec<String>,
    envs: HashMap<String, String>,
    timeout: Duration,
}

impl CodeCliBackend {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            envs: HashMap::new(),
            timeout: Duration::from_secs(300),
        }
    }

    pub fn from_config(cfg: &BackendConfig) -> Self {
        Self {
            command: cfg.command.clone(),
            args: cfg.args.clone(),
            envs: cfg.env.clone(),
            timeout: Duration::from_millis(cfg.timeout_ms.max(1)),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn build_args(&self, options: &GenerateOptions) -> Vec<String> {
        let mut args = self.args.clone();
        if let Some(max_tokens) = options.max_tokens {
            args.push("--max-tokens".to_string());
            args.push(max_tokens.to_string());
        }
        if let Some(temperature) = options.temperature {
            args.push("--temperature".to_string());
            args.push(temperature.to_string());
        }
        args
    }

    fn build_stdin(prompt: &str, options: &GenerateOptions) -> String {
        match &options.json_schema {
            Some(schema) => format!(
                "{prompt}\n\nRespond with JSON only, matching this schema:\n{schema}\n"
            ),
            None => format!("{prompt}\n"),
        }
    }
}

#[async_trait]
impl ModelBackend for CodeCliBackend {
    fn name(&self) -> &str {
        "codecli"
    }

    async fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<String> {
        let args = self.build_args(options);
        tracing::debug!(
            command = %self.command,
            args = ?args,
            prompt_len = prompt.len(),
            use_remote = options.use_remote,
            "spawning code cli"
        );

        let mut child = Command::new(&self.command)
            .args(&args)
            .envs(&self.envs)
            .env("DEVFLOW_USE_REMOTE", if options.use_remote { "1" } else { "0" })
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn '{}'", self.command))?;

        let mut stdin = child.stdin.take().context("child stdin unavailable")?;
        let mut stdout = child.stdout.take().context("child stdout unavailable")?;
        let mut stderr = child.stderr.take().context("child stderr unavailable")?;

        let payload = Self::build_stdin(prompt, options);
        let exchange = async move {
            let write = async move {
                // A child that exits without reading its input is judged by its exit status.
                match stdin.write_all(payload.as_bytes()).await {
                    Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => return Err(e),
                    _ => {}
                }
                let _ = stdin.shutdown().await;
                Ok::<_, std::io::Error>(())
            };
            let mut out = String::new();
            let mut err = String::new();
            let (_, _, _) = tokio::try_join!(
                write,
                stdout.read_to_string(&mut out),
                stderr.read_to_string(&mut err)
            )?;
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((status, out, err))
        };

        let (status, out, err) = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| {
                anyhow::anyhow!(
                    "'{}' did not answer within {}ms",
                    self.command,
                    self.timeout.as_millis()
                )
            })?
            .with_context(|| format!("i/o with '{}' failed", self.command))?;

        if !status.success() {
            anyhow::bail!(
                "'{}' exited with {}: {}",
                self.command,
                status.code().unwrap_or(-1),
                tail(&err, 400)
            );
        }

        let out = out.trim().to_string();
        if out.is_empty() {
            anyhow::bail!("'{}' returned an empty response", self.command);
        }
        Ok(out)
    }
}

fn tail(s: &str, max: usize) -> &str {
    let s = s.trim();
    if s.len() <= max {
        return s;
    }
    let mut start = s.len() - max;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}
