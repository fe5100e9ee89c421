use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use devflow_core::api::{
    Agent, AppConfig, ArtifactStore, BackendConfig, BackendKind, ConversationLog, Edge,
    ExecutorConfig, GenerateOptions, Gate, ModelBackend, Orchestrator, SinkConfig, TaskId,
};

use crate::agents::{
    AgentContext, ArchitectAgent, DebuggerAgent, ExecutorAgent, GeneratorAgent, TesterAgent,
};
use crate::backend::{CodeCliBackend, ScriptedBackend};
use crate::runner::{CommandTestRunner, TestRunner};
use crate::selector::LlmAdvisorySelector;
use crate::sink::{start_jsonl_writer, JsonlArtifactStore, JsonlConversationLog, JsonlTx};

pub fn build_backend(cfg: &BackendConfig) -> Result<Arc<dyn ModelBackend>> {
    match cfg.kind {
        BackendKind::Codecli => Ok(Arc::new(CodeCliBackend::from_config(cfg))),
        BackendKind::Scripted => {
            let path = cfg
                .responses_file
                .as_deref()
                .context("backend.responses_file is required for the scripted backend")?;
            Ok(Arc::new(ScriptedBackend::from_file(Path::new(path))?))
        }
    }
}

pub fn default_options(cfg: &BackendConfig) -> GenerateOptions {
    GenerateOptions {
        max_tokens: cfg.default_max_tokens,
        temperature: cfg.default_temperature,
        ..Default::default()
    }
}

pub async fn build_artifact_store(cfg: &SinkConfig) -> Result<Option<Arc<JsonlArtifactStore>>> {
    Ok(start_jsonl_writer(cfg)
        .await
        .with_context(|| format!("failed to open artifact sink {}", cfg.path))?
        .map(|tx| Arc::new(JsonlArtifactStore::new(tx))))
}

pub async fn build_conversation_log(
    cfg: &SinkConfig,
) -> Result<Option<Arc<JsonlConversationLog>>> {
    Ok(start_jsonl_writer(cfg)
        .await
        .with_context(|| format!("failed to open conversation sink {}", cfg.path))?
        .map(|tx| Arc::new(JsonlConversationLog::new(tx))))
}

pub fn build_test_runner(cfg: &ExecutorConfig) -> Arc<dyn TestRunner> {
    Arc::new(CommandTestRunner::from_config(cfg))
}

/// Register the five role agents for `task_id`:
///
/// ```text
/// Architect -planned-> Generator -generated-> Tester -tests_written-> Executor
/// Executor -tested, passed=false-> Debugger
/// ```
pub fn register_pipeline(
    orchestrator: &mut Orchestrator,
    task_id: &TaskId,
    ctx: Arc<AgentContext>,
    runner: Arc<dyn TestRunner>,
) {
    let max_subtasks = orchestrator.config().max_subtasks;
    let architect = ArchitectAgent::new(task_id, ctx.clone()).with_max_subtasks(max_subtasks);
    let generator = GeneratorAgent::new(task_id, ctx.clone());
    let tester = TesterAgent::new(task_id, ctx.clone());
    let executor = ExecutorAgent::new(task_id, ctx.clone(), runner);
    let debugger = DebuggerAgent::new(task_id, ctx);

    let generator_deps = vec![Edge::gated(architect.name(), Gate::status("planned"))];
    let tester_deps = vec![Edge::gated(generator.name(), Gate::status("generated"))];
    let executor_deps = vec![Edge::gated(tester.name(), Gate::status("tests_written"))];
    let debugger_deps = vec![Edge::gated(
        executor.name(),
        Gate::status("tested").with_passed(false),
    )];

    orchestrator.add_agent(Arc::new(architect), Vec::new());
    orchestrator.add_agent(Arc::new(generator), generator_deps);
    orchestrator.add_agent(Arc::new(tester), tester_deps);
    orchestrator.add_agent(Arc::new(executor), executor_deps);
    orchestrator.add_agent(Arc::new(debugger), debugger_deps);
}

/// A wired orchestrator plus the sink writers that must be flushed on exit.
pub struct Pipeline {
    pub orchestrator: Orchestrator,
    sinks: Vec<JsonlTx>,
}

impl Pipeline {
    /// Wait for pending sink lines. Failures are logged, never returned.
    pub async fn flush(&self) {
        for tx in &self.sinks {
            if let Err(e) = tx.flush().await {
                tracing::warn!(error = %e, "failed to flush sink");
            }
            let dropped = tx.dropped_count();
            if dropped > 0 {
                tracing::warn!(dropped, "sink dropped lines under backpressure");
            }
        }
    }
}

/// Build an orchestrator for one request from configuration.
pub async fn build_pipeline(
    cfg: &AppConfig,
    session_id: &str,
    task_id: &TaskId,
) -> Result<Pipeline> {
    let backend = build_backend(&cfg.backend)?;
    let artifacts = build_artifact_store(&cfg.artifacts).await?;
    let conversation = build_conversation_log(&cfg.conversation).await?;

    let mut sinks = Vec::new();
    if let Some(store) = &artifacts {
        sinks.push(store.writer().clone());
    }
    if let Some(log) = &conversation {
        sinks.push(log.writer().clone());
    }

    let ctx = Arc::new(
        AgentContext::new(backend.clone())
            .with_artifacts(artifacts.map(|s| s as Arc<dyn ArtifactStore>))
            .with_conversation(conversation.map(|l| l as Arc<dyn ConversationLog>))
            .with_options(default_options(&cfg.backend)),
    );

    let mut orchestrator =
        Orchestrator::new(session_id, backend).with_config(cfg.orchestrator.clone());
    if cfg.orchestrator.advisory.enabled {
        let advisory = LlmAdvisorySelector::new(orchestrator.backend().clone());
        orchestrator = orchestrator.with_advisory_selector(Arc::new(advisory));
    }
    register_pipeline(
        &mut orchestrator,
        task_id,
        ctx,
        build_test_runner(&cfg.executor),
    );

    tracing::debug!(
        session_id,
        task_id = %task_id,
        agents = orchestrator.graph().len(),
        advisory = cfg.orchestrator.advisory.enabled,
        "pipeline built"
    );
    Ok(Pipeline { orchestrator, sinks })
}
