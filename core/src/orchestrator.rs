use std::collections::HashMap;
use std::sync::Arc;

use crate::agent::Agent;
use crate::backend::ModelBackend;
use crate::clock::{Clock, SystemClock};
use crate::config::OrchestratorConfig;
use crate::graph::{DependencyGraph, Edge};
use crate::scheduler::{RunLimits, RunSummary, Scheduler};
use crate::selector::{AdvisorySelector, Selector};
use crate::store::{OutputStore, TaskOutputs};
use crate::task::{AgentResult, Status, TaskId, TaskRecord};

/// Entry point of the core: owns the agent pool, the dependency graph and the
/// output store.
///
/// `orchestrate` takes `&mut self`, so runs against one instance are
/// serialized; per-task state stays isolated in the output store.
pub struct Orchestrator {
    session_id: String,
    backend: Arc<dyn ModelBackend>,
    config: OrchestratorConfig,
    graph: DependencyGraph,
    agents: HashMap<String, Arc<dyn Agent>>,
    store: OutputStore,
    selector: Selector,
    clock: Arc<dyn Clock>,
    last_run: Option<RunSummary>,
}

impl Orchestrator {
    pub fn new(session_id: impl Into<String>, backend: Arc<dyn ModelBackend>) -> Self {
        Self {
            session_id: session_id.into(),
            backend,
            config: OrchestratorConfig::default(),
            graph: DependencyGraph::new(),
            agents: HashMap::new(),
            store: OutputStore::new(),
            selector: Selector::new(),
            clock: Arc::new(SystemClock),
            last_run: None,
        }
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.selector = self
            .selector
            .clone()
            .with_advisory_timeout(config.advisory.timeout());
        self.config = config;
        self
    }

    pub fn with_advisory_selector(mut self, advisory: Arc<dyn AdvisorySelector>) -> Self {
        self.selector = self.selector.clone().with_advisory(advisory);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Backend shared with the agents built for this session.
    pub fn backend(&self) -> &Arc<dyn ModelBackend> {
        &self.backend
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Register `agent` under its name with its inbound edges.
    /// Re-registering a name replaces both the agent and its edges.
    pub fn add_agent(&mut self, agent: Arc<dyn Agent>, dependencies: Vec<Edge>) {
        let name = agent.name().to_string();
        tracing::debug!(agent = %name, edges = dependencies.len(), "agent registered");
        self.graph.add(name.clone(), dependencies);
        self.agents.insert(name, agent);
    }

    pub async fn process_task(&mut self, task: TaskRecord) -> (Status, AgentResult) {
        self.orchestrate(task, None).await
    }

    /// Drive `task` through the graph until nothing is left to run, no
    /// progress is possible, the iteration cap is hit or `stop_at` has run.
    ///
    /// Never fails: the outcome is the `stop_at` deposit, else the most recent
    /// deposit, else `failed` with an empty result.
    pub async fn orchestrate(
        &mut self,
        mut task: TaskRecord,
        stop_at: Option<&str>,
    ) -> (Status, AgentResult) {
        if task.parameters.config.session_id.is_none() {
            task.parameters.config.session_id = Some(self.session_id.clone());
        }

        let limits = RunLimits {
            max_iterations: self.config.max_iterations_for(self.graph.len()),
            max_subtasks: self.config.max_subtasks,
            default_timeout: self.config.agent_timeout(),
        };
        let task_id = task.task_id.clone();
        tracing::info!(
            session_id = %self.session_id,
            task_id = %task_id,
            agents = self.graph.len(),
            max_iterations = limits.max_iterations,
            advisory = self.selector.has_advisory(),
            "orchestration started"
        );

        let outcome = Scheduler::new(
            &self.graph,
            &self.agents,
            &mut self.store,
            &self.selector,
            self.clock.as_ref(),
            limits,
            task,
        )
        .run(stop_at)
        .await;

        tracing::info!(
            task_id = %task_id,
            status = %outcome.status,
            termination = ?outcome.summary.termination,
            iterations = outcome.summary.iterations,
            invocations = outcome.summary.invocations,
            "orchestration finished"
        );

        self.last_run = Some(outcome.summary);
        (outcome.status, outcome.result)
    }

    /// Output store entry for `task_id`, if anything touched it.
    pub fn outputs(&self, task_id: &TaskId) -> Option<&TaskOutputs> {
        self.store.get(task_id)
    }

    pub fn store(&self) -> &OutputStore {
        &self.store
    }

    pub fn last_run(&self) -> Option<&RunSummary> {
        self.last_run.as_ref()
    }

    /// Forget all recorded outputs; agents and edges stay registered.
    pub fn reset(&mut self) {
        self.store.clear();
        self.last_run = None;
    }
}
