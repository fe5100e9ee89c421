use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};

use devflow_core::api::SinkConfig;

enum Msg {
    Line(String),
    Flush(oneshot::Sender<()>),
}

/// Sending half of a background JSONL appender.
#[derive(Clone)]
pub struct JsonlTx {
    tx: mpsc::Sender<Msg>,
    dropped: Arc<AtomicU64>,
    drop_when_full: bool,
}

impl JsonlTx {
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub async fn send_line(&self, line: String) -> anyhow::Result<()> {
        if self.drop_when_full {
            if self.tx.try_send(Msg::Line(line)).is_err() {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            return Ok(());
        }
        self.tx
            .send(Msg::Line(line))
            .await
            .map_err(|_| anyhow::anyhow!("jsonl writer closed"))
    }

    pub async fn send_json<T: serde::Serialize>(&self, value: &T) -> anyhow::Result<()> {
        self.send_line(serde_json::to_string(value)?).await
    }

    /// Wait until every line sent so far has been written.
    pub async fn flush(&self) -> anyhow::Result<()> {
        let (done, wait) = oneshot::channel();
        self.tx
            .send(Msg::Flush(done))
            .await
            .map_err(|_| anyhow::anyhow!("jsonl writer closed"))?;
        wait.await
            .map_err(|_| anyhow::anyhow!("jsonl writer stopped before flushing"))
    }
}

/// Spawn the appender for `cfg`. `Ok(None)` when the sink is disabled.
///
/// `stdout:` as path writes to standard output instead of a file.
pub async fn start_jsonl_writer(cfg: &SinkConfig) -> anyhow::Result<Option<JsonlTx>> {
    if !cfg.enabled || cfg.path.trim().is_empty() {
        return Ok(None);
    }

    let path = cfg.path.clone();
    let mut writer: Box<dyn tokio::io::AsyncWrite + Unpin + Send> = if path == "stdout:" {
        Box::new(tokio::io::stdout())
    } else {
        if let Some(parent) = Path::new(&path).parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Box::new(file)
    };

    let (tx, mut rx) = mpsc::channel::<Msg>(cfg.channel_capacity.max(1));
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match msg {
                Msg::Line(mut line) => {
                    if !line.ends_with('\n') {
                        line.push('\n');
                    }
                    if let Err(e) = writer.write_all(line.as_bytes()).await {
                        tracing::warn!(path = %path, error = %e, "jsonl write failed; sink stopped");
                        return;
                    }
                }
                Msg::Flush(done) => {
                    let _ = writer.flush().await;
                    let _ = done.send(());
                }
            }
        }
        let _ = writer.flush().await;
    });

    Ok(Some(JsonlTx {
        tx,
        dropped: Arc::new(AtomicU64::new(0)),
        drop_when_full: cfg.drop_when_full,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(path: &Path) -> SinkConfig {
        SinkConfig {
            enabled: true,
            path: path.to_string_lossy().to_string(),
            channel_capacity: 16,
            drop_when_full: false,
        }
    }

    #[tokio::test]
    async fn appends_lines_and_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.jsonl");

        let tx = start_jsonl_writer(&cfg(&path)).await.unwrap().unwrap();
        tx.send_line("{\"a\":1}".into()).await.unwrap();
        tx.send_json(&serde_json::json!({"b": 2})).await.unwrap();
        tx.flush().await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines, vec!["{\"a\":1}", "{\"b\":2}"]);
        assert_eq!(tx.dropped_count(), 0);
    }

    #[tokio::test]
    async fn disabled_sink_starts_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = cfg(&dir.path().join("x.jsonl"));
        cfg.enabled = false;
        assert!(start_jsonl_writer(&cfg).await.unwrap().is_none());
    }
}
