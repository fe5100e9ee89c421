use std::collections::{HashMap, HashSet};

use crate::error::OrchestratorError;
use crate::task::{TaskId, TaskRecord};

/// Minimal view of a node in a subtask dependency graph.
pub trait TaskLike: Clone {
    fn id(&self) -> &TaskId;
    fn dependencies(&self) -> &[TaskId];
}

impl TaskLike for TaskRecord {
    fn id(&self) -> &TaskId {
        &self.task_id
    }

    fn dependencies(&self) -> &[TaskId] {
        &self.dependencies
    }
}

/// Dependency graph over the subtasks of one plan.
///
/// Dependencies naming a task outside the graph are dropped at construction:
/// they are satisfied elsewhere (or never) and must not block ordering.
#[derive(Debug, Clone)]
pub struct SubtaskGraph<T: TaskLike> {
    /// task_id -> task
    pub nodes: HashMap<TaskId, T>,

    /// task_id -> in-graph dependencies
    pub edges: HashMap<TaskId, Vec<TaskId>>,

    /// task_id -> tasks depending on it
    pub reverse_edges: HashMap<TaskId, Vec<TaskId>>,

    insertion_order: Vec<TaskId>,
}

impl<T: TaskLike> SubtaskGraph<T> {
    pub fn from_tasks(tasks: &[T]) -> Result<Self, OrchestratorError> {
        let mut nodes = HashMap::new();
        let mut insertion_order = Vec::new();

        for task in tasks {
            if nodes.contains_key(task.id()) {
                return Err(OrchestratorError::MalformedPlan(format!(
                    "duplicate subtask id: {}",
                    task.id()
                )));
            }
            nodes.insert(task.id().clone(), task.clone());
            insertion_order.push(task.id().clone());
        }

        let mut edges = HashMap::new();
        let mut reverse_edges: HashMap<TaskId, Vec<TaskId>> = HashMap::new();
        for task in tasks {
            let deps: Vec<TaskId> = task
                .dependencies()
                .iter()
                .filter(|dep| nodes.contains_key(*dep) && *dep != task.id())
                .cloned()
                .collect();
            for dep in &deps {
                reverse_edges
                    .entry(dep.clone())
                    .or_default()
                    .push(task.id().clone());
            }
            edges.insert(task.id().clone(), deps);
        }

        Ok(Self {
            nodes,
            edges,
            reverse_edges,
            insertion_order,
        })
    }

    /// Topological sort using Kahn's algorithm.
    ///
    /// Returns stages; tasks in one stage do not depend on each other. Within a
    /// stage, declaration order is preserved.
    pub fn topological_sort(&self) -> Result<Vec<Vec<TaskId>>, OrchestratorError> {
        let mut in_degree: HashMap<&TaskId, usize> = HashMap::new();
        for (task_id, deps) in &self.edges {
            in_degree.insert(task_id, deps.len());
        }

        let mut stages: Vec<Vec<TaskId>> = Vec::new();
        let mut current_stage: Vec<TaskId> = in_degree
            .iter()
            .filter(|(_, &degree)| degree == 0)
            .map(|(id, _)| (*id).clone())
            .collect();
        self.sort_by_insertion(&mut current_stage);

        let mut processed = 0;
        while !current_stage.is_empty() {
            processed += current_stage.len();

            let mut next_stage = Vec::new();
            for task_id in &current_stage {
                let Some(dependents) = self.reverse_edges.get(task_id) else {
                    continue;
                };
                for dependent in dependents {
                    if let Some(degree) = in_degree.get_mut(dependent) {
                        *degree = degree.saturating_sub(1);
                        if *degree == 0 {
                            next_stage.push(dependent.clone());
                        }
                    }
                }
            }
            self.sort_by_insertion(&mut next_stage);

            stages.push(std::mem::replace(&mut current_stage, next_stage));
        }

        if processed != self.nodes.len() {
            let cycle = self
                .detect_cycle()
                .unwrap_or_else(|| "unable to complete topological sort".to_string());
            return Err(OrchestratorError::MalformedPlan(format!(
                "circular subtask dependency: {cycle}"
            )));
        }

        Ok(stages)
    }

    /// Flattened topological order, falling back to declaration order on a cycle.
    pub fn execution_order(&self) -> Vec<TaskId> {
        match self.topological_sort() {
            Ok(stages) => stages.into_iter().flatten().collect(),
            Err(err) => {
                tracing::warn!(error = %err, "subtask dependencies are cyclic; using declaration order");
                self.insertion_order.clone()
            }
        }
    }

    fn sort_by_insertion(&self, ids: &mut [TaskId]) {
        ids.sort_by_key(|id| {
            self.insertion_order
                .iter()
                .position(|k| k == id)
                .unwrap_or(usize::MAX)
        });
    }

    /// Detect circular dependencies using DFS.
    fn detect_cycle(&self) -> Option<String> {
        let mut visited = HashSet::new();
        let mut stack = Vec::new();

        for task_id in &self.insertion_order {
            if !visited.contains(task_id) && self.dfs_cycle(task_id, &mut visited, &mut stack) {
                return Some(format_cycle_path(&stack));
            }
        }

        None
    }

    fn dfs_cycle(
        &self,
        node: &TaskId,
        visited: &mut HashSet<TaskId>,
        stack: &mut Vec<TaskId>,
    ) -> bool {
        visited.insert(node.clone());
        stack.push(node.clone());

        if let Some(deps) = self.edges.get(node) {
            for dep in deps {
                if let Some(pos) = stack.iter().position(|x| x == dep) {
                    stack.push(dep.clone());
                    *stack = stack[pos..].to_vec();
                    return true;
                }

                if !visited.contains(dep) && self.dfs_cycle(dep, visited, stack) {
                    return true;
                }
            }
        }

        stack.pop();
        false
    }
}

fn format_cycle_path(stack: &[TaskId]) -> String {
    stack
        .iter()
        .map(TaskId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}
