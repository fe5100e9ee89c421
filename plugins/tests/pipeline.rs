use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pretty_assertions::assert_eq;

use devflow_core::api::{
    ArtifactStore, ConversationLog, ModelBackend, Orchestrator, SinkConfig, TaskConfig, TaskId,
    TaskRecord, Termination,
};
use devflow_plugins::agents::AgentContext;
use devflow_plugins::backend::{ScriptedBackend, ScriptedResponse};
use devflow_plugins::factory::register_pipeline;
use devflow_plugins::runner::{SourceFile, TestRun, TestRunner};
use devflow_plugins::sink::{
    start_jsonl_writer, ArtifactRecord, ExchangeRecord, JsonlArtifactStore, JsonlConversationLog,
};

struct RecordingRunner {
    passed: bool,
    files: Mutex<Vec<String>>,
}

#[async_trait]
impl TestRunner for RecordingRunner {
    fn name(&self) -> &str {
        "recording"
    }

    async fn run(&self, sources: &[SourceFile], tests: &SourceFile) -> anyhow::Result<TestRun> {
        let mut files = self.files.lock().unwrap();
        files.extend(sources.iter().map(|s| s.path.clone()));
        files.push(tests.path.clone());
        Ok(TestRun {
            passed: self.passed,
            exit_code: Some(if self.passed { 0 } else { 1 }),
            output: if self.passed { "ok".into() } else { "1 failing".into() },
        })
    }
}

const PLAN: &str = r#"```json
{"subtasks": [
  {"task_id": "ui", "description": "front end", "output_files": ["ui.js"], "dependencies": ["api"]},
  {"task_id": "api", "description": "REST api", "output_files": ["api.js"]}
]}
```"#;

fn script() -> Vec<ScriptedResponse> {
    vec![
        ScriptedResponse::when("You are the Architect", PLAN),
        ScriptedResponse::when("Task: REST api", "```js\nexports.api = 1;\n```"),
        ScriptedResponse::when("Task: front end", "```js\nexports.ui = 1;\n```"),
        ScriptedResponse::when("Write automated", "```js\ntest('api', () => {});\n```"),
        ScriptedResponse::when("fails its tests", "```js\nexports.api = 2;\n```"),
    ]
}

fn request() -> TaskRecord {
    TaskRecord::new("T", "todo app").with_config(TaskConfig {
        language: Some("javascript".into()),
        output_files: vec!["app.js".into()],
        ..Default::default()
    })
}

fn sink(path: &std::path::Path) -> SinkConfig {
    SinkConfig {
        enabled: true,
        path: path.to_string_lossy().to_string(),
        channel_capacity: 64,
        drop_when_full: false,
    }
}

#[tokio::test]
async fn failing_tests_reach_the_debugger() {
    let dir = tempfile::tempdir().unwrap();
    let artifacts_path = dir.path().join("artifacts.jsonl");
    let conversation_path = dir.path().join("conversation.jsonl");
    let artifacts = Arc::new(JsonlArtifactStore::new(
        start_jsonl_writer(&sink(&artifacts_path)).await.unwrap().unwrap(),
    ));
    let conversation = Arc::new(JsonlConversationLog::new(
        start_jsonl_writer(&sink(&conversation_path)).await.unwrap().unwrap(),
    ));

    let backend = Arc::new(ScriptedBackend::new(script()));
    let ctx = Arc::new(
        AgentContext::new(backend.clone())
            .with_artifacts(Some(artifacts.clone() as Arc<dyn ArtifactStore>))
            .with_conversation(Some(conversation.clone() as Arc<dyn ConversationLog>)),
    );
    let runner = Arc::new(RecordingRunner {
        passed: false,
        files: Mutex::new(Vec::new()),
    });

    let mut orch = Orchestrator::new("sess-1", backend.clone() as Arc<dyn ModelBackend>);
    register_pipeline(&mut orch, &TaskId::from("T"), ctx, runner.clone());

    let (status, result) = orch.orchestrate(request(), None).await;
    assert_eq!(status, "debugged");
    assert_eq!(result.as_code().unwrap().code, "exports.api = 2;");

    // Subtasks were generated in dependency order, each into its own file.
    let store = orch.store();
    let api = store.get(&TaskId::from("T.api")).unwrap();
    let ui = store.get(&TaskId::from("T.ui")).unwrap();
    let api_code = api.get("Generator_T").unwrap();
    let ui_code = ui.get("Generator_T").unwrap();
    assert_eq!(api_code.result.as_code().unwrap().path.as_deref(), Some("api.js"));
    assert!(api_code.seq < ui_code.seq);

    assert_eq!(
        *runner.files.lock().unwrap(),
        vec!["api.js".to_string(), "ui.js".to_string(), "devflow.test.js".to_string()]
    );

    let summary = orch.last_run().unwrap();
    assert_eq!(summary.termination, Termination::Completed);
    assert!(summary.pending.is_empty());

    artifacts.writer().flush().await.unwrap();
    conversation.writer().flush().await.unwrap();

    let saved: Vec<ArtifactRecord> = std::fs::read_to_string(&artifacts_path)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    let agents: Vec<&str> = saved.iter().map(|r| r.agent.as_str()).collect();
    assert_eq!(
        agents,
        vec!["Architect_T", "Generator_T", "Generator_T", "Tester_T", "Executor_T", "Debugger_T"]
    );

    let exchanges: Vec<ExchangeRecord> = std::fs::read_to_string(&conversation_path)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(exchanges.len(), 5);
    assert!(exchanges.iter().all(|e| e.session_id == "sess-1"));
}

#[tokio::test]
async fn passing_tests_end_at_the_executor() {
    let backend = Arc::new(ScriptedBackend::new(script()));
    let ctx = Arc::new(AgentContext::new(backend.clone()));
    let runner = Arc::new(RecordingRunner {
        passed: true,
        files: Mutex::new(Vec::new()),
    });

    let mut orch = Orchestrator::new("sess-2", backend as Arc<dyn ModelBackend>);
    register_pipeline(&mut orch, &TaskId::from("T"), ctx, runner);

    let (status, result) = orch.orchestrate(request(), None).await;
    assert_eq!(status, "tested");
    assert_eq!(result.passed(), Some(true));

    let summary = orch.last_run().unwrap();
    assert_eq!(summary.pending, vec!["Debugger_T".to_string()]);
    assert_eq!(summary.termination, Termination::NoProgress);
}

#[tokio::test]
async fn stop_at_tester_skips_execution() {
    let backend = Arc::new(ScriptedBackend::new(script()));
    let ctx = Arc::new(AgentContext::new(backend.clone()));
    let runner = Arc::new(RecordingRunner {
        passed: false,
        files: Mutex::new(Vec::new()),
    });

    let mut orch = Orchestrator::new("sess-3", backend as Arc<dyn ModelBackend>);
    register_pipeline(&mut orch, &TaskId::from("T"), ctx, runner.clone());

    let (status, result) = orch.orchestrate(request(), Some("Tester_T")).await;
    assert_eq!(status, "tests_written");
    assert_eq!(result.passed(), None);
    assert_eq!(
        result.as_code().unwrap().tests.as_deref(),
        Some("test('api', () => {});")
    );
    assert!(runner.files.lock().unwrap().is_empty());
    assert_eq!(orch.last_run().unwrap().termination, Termination::StoppedAt);
}
