//! Iterative driver for one task.
//!
//! Each main-loop iteration asks the [`Selector`] for an agent, falls back to a
//! rotating pick among the pending agents, and dispatches it when its gates
//! (or the Architect escape hatch) allow. Dispatch records the deposit, then
//! either expands a plan or propagates forward to gated successors.

mod expand;
mod invoke;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::agent::Agent;
use crate::clock::Clock;
use crate::error::OrchestratorError;
use crate::graph::{escape_applies, gate_admits, is_ready, DependencyGraph};
use crate::selector::Selector;
use crate::store::OutputStore;
use crate::task::{AgentResult, Deposit, Status, TaskId, TaskRecord};

use self::expand::Expansion;
use self::invoke::{call_agent, call_track};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunLimits {
    pub max_iterations: usize,
    pub max_subtasks: usize,

    /// Applied when the task itself carries no timeout.
    pub default_timeout: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Every registered agent was processed.
    Completed,
    StoppedAt,
    /// A full sweep of the pending set found nothing runnable.
    NoProgress,
    IterationCap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub task_id: TaskId,
    pub iterations: usize,
    pub invocations: usize,
    pub termination: Termination,

    /// Agents never processed for the task, in registration order.
    pub pending: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stopped_at: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub status: Status,
    pub result: AgentResult,
    pub summary: RunSummary,
}

enum Flow {
    Continue,
    Stop(Deposit),
}

pub struct Scheduler<'a> {
    graph: &'a DependencyGraph,
    agents: &'a HashMap<String, Arc<dyn Agent>>,
    store: &'a mut OutputStore,
    selector: &'a Selector,
    clock: &'a dyn Clock,
    limits: RunLimits,

    /// The task being driven; its parameters mirror every deposit recorded for it.
    root: TaskRecord,
    last: Option<Deposit>,
    invocations: usize,
}

impl<'a> Scheduler<'a> {
    pub fn new(
        graph: &'a DependencyGraph,
        agents: &'a HashMap<String, Arc<dyn Agent>>,
        store: &'a mut OutputStore,
        selector: &'a Selector,
        clock: &'a dyn Clock,
        limits: RunLimits,
        task: TaskRecord,
    ) -> Self {
        Self {
            graph,
            agents,
            store,
            selector,
            clock,
            limits,
            root: task,
            last: None,
            invocations: 0,
        }
    }

    pub async fn run(mut self, stop_at: Option<&str>) -> RunOutcome {
        let root_id = self.root.task_id.clone();
        let graph = self.graph;
        let selector = self.selector;
        let cap = self.limits.max_iterations;

        let mut iterations = 0usize;
        let mut stalled = 0usize;
        let mut cursor = 0usize;
        let mut stopped: Option<Deposit> = None;

        let termination = loop {
            let pending = self.pending();
            if pending.is_empty() {
                break Termination::Completed;
            }
            if iterations >= cap {
                let err = OrchestratorError::IterationCap {
                    cap,
                    pending: pending.len(),
                };
                tracing::warn!(
                    kind = err.kind(),
                    task_id = %root_id,
                    pending = ?pending,
                    "{}",
                    err
                );
                break Termination::IterationCap;
            }
            iterations += 1;

            let outputs = self.store.entry(&root_id);
            let selection = selector.select(&self.root, &pending, graph, outputs).await;
            let name = match selection {
                Some(selection) => {
                    tracing::trace!(
                        task_id = %root_id,
                        iteration = iterations,
                        agent = %selection.agent,
                        reason = ?selection.reason,
                        "selected"
                    );
                    selection.agent
                }
                None => {
                    let name = pending[cursor % pending.len()].clone();
                    cursor += 1;
                    name
                }
            };

            let outputs = self.store.entry(&root_id);
            if outputs.is_processed(&name) {
                continue;
            }
            let runnable =
                is_ready(graph, &name, outputs) || escape_applies(graph, &name, outputs);
            if !runnable {
                stalled += 1;
                if stalled >= pending.len() {
                    let err = OrchestratorError::NoProgress {
                        pending: pending.len(),
                    };
                    tracing::info!(
                        kind = err.kind(),
                        task_id = %root_id,
                        pending = ?pending,
                        "{}",
                        err
                    );
                    break Termination::NoProgress;
                }
                continue;
            }
            stalled = 0;

            if let Flow::Stop(deposit) = self.dispatch(name, stop_at).await {
                stopped = Some(deposit);
                break Termination::StoppedAt;
            }
        };

        let pending = self.pending();
        let (status, result) = match stopped.or_else(|| self.last.clone()) {
            Some(deposit) => deposit.into_pair(),
            None => (Status::failed(), AgentResult::empty()),
        };

        RunOutcome {
            status,
            result,
            summary: RunSummary {
                task_id: root_id,
                iterations,
                invocations: self.invocations,
                termination,
                pending,
                stopped_at: match termination {
                    Termination::StoppedAt => stop_at.map(str::to_string),
                    _ => None,
                },
            },
        }
    }

    /// Registered agents not yet processed for the task, in registration order.
    fn pending(&mut self) -> Vec<String> {
        let outputs = self.store.entry(&self.root.task_id);
        self.graph
            .names()
            .iter()
            .filter(|name| !outputs.is_processed(name))
            .cloned()
            .collect()
    }

    /// Run `start` for the task, then whatever its deposit unlocks.
    ///
    /// Forward propagation is a worklist rather than recursion; its depth is
    /// capped at the iteration limit.
    async fn dispatch(&mut self, start: String, stop_at: Option<&str>) -> Flow {
        let root_id = self.root.task_id.clone();
        let graph = self.graph;
        let mut work = vec![(start, 0usize)];

        while let Some((name, depth)) = work.pop() {
            if self.store.entry(&root_id).is_processed(&name) {
                continue;
            }

            let task = self.root_invocation();
            let deposit = self.invoke(&name, &root_id, task).await;
            self.root
                .parameters
                .insert_deposit(name.clone(), deposit.clone());

            if stop_at == Some(name.as_str()) {
                return Flow::Stop(deposit);
            }

            if let Some(plan) = deposit.result.as_plan().filter(|p| p.is_expandable()) {
                match self.expand_plan(&name, &deposit, plan, stop_at).await {
                    Expansion::Expanded => continue,
                    Expansion::Stopped(deposit) => return Flow::Stop(deposit),
                    Expansion::NothingToExpand => {}
                }
            }

            if depth >= self.limits.max_iterations {
                tracing::warn!(
                    task_id = %root_id,
                    agent = %name,
                    depth,
                    "propagation depth cap reached; successors left to the main loop"
                );
                continue;
            }

            let outputs = self.store.entry(&root_id);
            let mut next: Vec<String> = Vec::new();
            for (successor, gate) in graph.successors(&name) {
                if next.iter().any(|n| n == successor)
                    || outputs.is_processed(successor)
                    || !gate_admits(gate, &deposit)
                    || !is_ready(graph, successor, outputs)
                {
                    continue;
                }
                next.push(successor.to_string());
            }
            // Reverse so successors run in registration order.
            for successor in next.into_iter().rev() {
                work.push((successor, depth + 1));
            }
        }

        Flow::Continue
    }

    /// Fresh record for an invocation against the task itself.
    fn root_invocation(&mut self) -> TaskRecord {
        let mut task = self.root.clone();
        let children = self.store.entry(&self.root.task_id).children().to_vec();
        for child in children {
            if let Some(outputs) = self.store.get(&child) {
                task.parameters.subtasks.insert(child, outputs.snapshot());
            }
        }
        task
    }

    /// Invoke `name` with `task`, record the deposit under `record_under`
    /// and call the agent's tracking hook.
    async fn invoke(&mut self, name: &str, record_under: &TaskId, task: TaskRecord) -> Deposit {
        let Some(agent) = self.agents.get(name).cloned() else {
            let err = OrchestratorError::AgentFailure {
                agent: name.to_string(),
                reason: "no agent registered under this name".to_string(),
            };
            tracing::warn!(kind = err.kind(), agent = name, task_id = %record_under, "{}", err);
            return self.record(name, record_under, Status::failed(), AgentResult::failure(err.to_string()));
        };

        let timeout = task.config().timeout().or(self.limits.default_timeout);
        let used_remote = task.config().use_remote;
        let started = self.clock.instant();
        self.invocations += 1;
        tracing::debug!(agent = name, task_id = %record_under, "agent started");

        let (status, result) = match call_agent(agent.as_ref(), task.clone(), timeout).await {
            Ok(output) => output,
            Err(err) => {
                tracing::warn!(kind = err.kind(), agent = name, task_id = %record_under, "{}", err);
                (Status::failed(), AgentResult::failure(err.to_string()))
            }
        };
        tracing::debug!(
            agent = name,
            task_id = %record_under,
            status = %status,
            result = result.kind(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "agent finished"
        );

        let deposit = self.record(name, record_under, status, result);
        call_track(agent.as_ref(), &task, &deposit.status, &deposit.result, used_remote).await;
        deposit
    }

    fn record(
        &mut self,
        name: &str,
        record_under: &TaskId,
        status: Status,
        result: AgentResult,
    ) -> Deposit {
        let deposit = Deposit {
            status,
            result,
            timestamp: self.clock.now(),
            seq: self.store.next_seq(),
        };
        self.store
            .entry(record_under)
            .record(name, deposit.clone());
        self.last = Some(deposit.clone());
        deposit
    }
}
