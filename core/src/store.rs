//! Per-task record of agent deposits.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::task::{AgentResult, Deposit, Status, TaskId};

/// Output store entry for one task_id.
#[derive(Debug, Clone, Default)]
pub struct TaskOutputs {
    /// Last status recorded. Advisory only.
    pub status: Option<Status>,

    /// Last result recorded. Advisory only.
    pub result: Option<AgentResult>,

    outputs: HashMap<String, Deposit>,

    /// Agent names in the order their deposits were written.
    order: Vec<String>,

    processed: BTreeSet<String>,

    /// Subtasks expanded from plans deposited under this task.
    children: Vec<TaskId>,
}

impl TaskOutputs {
    pub fn get(&self, agent: &str) -> Option<&Deposit> {
        self.outputs.get(agent)
    }

    pub fn contains(&self, agent: &str) -> bool {
        self.outputs.contains_key(agent)
    }

    pub fn is_processed(&self, agent: &str) -> bool {
        self.processed.contains(agent)
    }

    pub fn processed(&self) -> &BTreeSet<String> {
        &self.processed
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Deposits in write order.
    pub fn deposits(&self) -> impl Iterator<Item = (&str, &Deposit)> {
        self.order
            .iter()
            .filter_map(|name| self.outputs.get(name).map(|d| (name.as_str(), d)))
    }

    pub fn children(&self) -> &[TaskId] {
        &self.children
    }

    /// Copy of the deposit map, as handed to agents.
    pub fn snapshot(&self) -> BTreeMap<String, Deposit> {
        self.outputs
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Write `deposit` for `agent` and mark it processed.
    ///
    /// Deposits are write-once; a second write is rejected and returns `false`.
    pub(crate) fn record(&mut self, agent: &str, deposit: Deposit) -> bool {
        if self.outputs.contains_key(agent) {
            tracing::warn!(agent, "deposit already recorded; keeping the first one");
            self.processed.insert(agent.to_string());
            return false;
        }
        self.status = Some(deposit.status.clone());
        self.result = Some(deposit.result.clone());
        self.outputs.insert(agent.to_string(), deposit);
        self.order.push(agent.to_string());
        self.processed.insert(agent.to_string());
        true
    }

    pub(crate) fn add_child(&mut self, task_id: &TaskId) {
        if !self.children.contains(task_id) {
            self.children.push(task_id.clone());
        }
    }
}

/// Output store for a whole orchestrator. Entries are created on first touch.
#[derive(Debug, Default)]
pub struct OutputStore {
    tasks: HashMap<TaskId, TaskOutputs>,
    next_seq: u64,
}

impl OutputStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, task_id: &TaskId) -> Option<&TaskOutputs> {
        self.tasks.get(task_id)
    }

    pub fn contains(&self, task_id: &TaskId) -> bool {
        self.tasks.contains_key(task_id)
    }

    pub fn task_ids(&self) -> impl Iterator<Item = &TaskId> {
        self.tasks.keys()
    }

    pub fn clear(&mut self) {
        self.tasks.clear();
    }

    pub(crate) fn entry(&mut self, task_id: &TaskId) -> &mut TaskOutputs {
        self.tasks.entry(task_id.clone()).or_default()
    }

    pub(crate) fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }
}
