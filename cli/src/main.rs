use clap::Parser;
mod args;
use args::Args;
use devflow_core::api::{
    load_default, load_from, AgentRole, AppConfig, CliError, LoggingConfig, OrchestratorError,
    TaskConfig, TaskId, TaskRecord,
};
use devflow_plugins::factory::build_pipeline;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

static LOG_GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
    std::sync::OnceLock::new();

#[tokio::main]
async fn main() {
    let exit = match real_main().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{e}");
            exit_code_for_error(&e)
        }
    };

    std::process::exit(exit);
}

async fn real_main() -> Result<i32, CliError> {
    let args = Args::parse();
    let mut cfg = match &args.config {
        Some(path) => load_from(path),
        None => load_default(),
    }
    .map_err(|e| CliError::Config(e.to_string()))?;
    apply_args(&mut cfg, &args);
    init_tracing(&cfg.logging).map_err(CliError::Command)?;

    let request = match (&args.request, &args.request_file) {
        (Some(r), _) => r.clone(),
        (None, Some(path)) => std::fs::read_to_string(path)?,
        (None, None) => return Err(CliError::Command("a request is required".to_string())),
    };
    if request.trim().is_empty() {
        return Err(CliError::Command("the request is empty".to_string()));
    }

    let task_id = args
        .task_id
        .as_deref()
        .map(TaskId::from)
        .unwrap_or_else(TaskId::generate);
    let session_id = args
        .session_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let stop_at = args.stop_at.as_deref().map(|s| stop_at_name(s, &task_id));

    let task = TaskRecord::new(task_id.clone(), request.trim()).with_config(TaskConfig {
        language: Some(args.language.clone()),
        output_files: args.output_files.clone(),
        use_remote: args.remote,
        max_tokens: args.max_tokens,
        timeout_ms: args.timeout_ms,
        session_id: Some(session_id.clone()),
        ..Default::default()
    });

    let mut pipeline = build_pipeline(&cfg, &session_id, &task_id).await?;
    let (status, result) = pipeline
        .orchestrator
        .orchestrate(task, stop_at.as_deref())
        .await;
    pipeline.flush().await;

    let mut out = serde_json::json!({
        "task_id": task_id,
        "session_id": session_id,
        "status": status,
        "result": result,
    });
    if args.summary {
        out["summary"] = serde_json::to_value(pipeline.orchestrator.last_run())
            .map_err(|e| CliError::Anyhow(e.into()))?;
    }
    let rendered = serde_json::to_string_pretty(&out).map_err(|e| CliError::Anyhow(e.into()))?;
    println!("{rendered}");

    Ok(if status.is_failed() { 1 } else { 0 })
}

/// Command-line overrides win over config file and environment.
fn apply_args(cfg: &mut AppConfig, args: &Args) {
    if let Some(kind) = args.backend {
        cfg.backend.kind = kind;
    }
    if let Some(file) = &args.responses_file {
        cfg.backend.responses_file = Some(file.clone());
    }
    if let Some(max) = args.max_subtasks {
        cfg.orchestrator.max_subtasks = max;
    }
}

fn stop_at_name(raw: &str, task_id: &TaskId) -> String {
    match AgentRole::parse(raw) {
        Some(role) => role.agent_name(task_id),
        None => raw.to_string(),
    }
}

fn exit_code_for_error(e: &CliError) -> i32 {
    // 0: success
    // 1: the run finished with a failed status
    // 11: config error
    // 20: io / usage error
    // 50: internal/uncategorized
    match e {
        CliError::Config(_) => 11,
        CliError::Orchestrator(OrchestratorError::Config(_)) => 11,
        CliError::Orchestrator(_) => 50,
        CliError::Io(_) => 20,
        CliError::Command(_) => 20,
        CliError::Anyhow(_) => 50,
    }
}

fn init_tracing(logging: &LoggingConfig) -> Result<(), String> {
    if !logging.enabled {
        return Ok(());
    }

    let filter = match std::env::var("RUST_LOG") {
        Ok(v) if !v.trim().is_empty() => EnvFilter::from_default_env(),
        _ => EnvFilter::try_new(logging.level.clone()).map_err(|e| e.to_string())?,
    };

    let mut maybe_writer = None;

    if logging.file {
        let dir = match logging
            .directory
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            Some(d) => std::path::PathBuf::from(d),
            None => std::env::temp_dir().join("devflow"),
        };

        std::fs::create_dir_all(&dir).map_err(|e| format!("create log dir failed: {e}"))?;
        let file_name = format!("devflow.{}.log", std::process::id());
        let appender = tracing_appender::rolling::never(dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        let _ = LOG_GUARD.set(guard);
        maybe_writer = Some(non_blocking);
    }

    if !logging.console && maybe_writer.is_none() {
        return Err("logging disabled for both console and file".to_string());
    }

    let console_layer = logging.console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(atty::is(atty::Stream::Stderr))
    });

    let file_layer = maybe_writer.map(|w| {
        tracing_subscriber::fmt::layer()
            .with_writer(w)
            .with_ansi(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(())
}
