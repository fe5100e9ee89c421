use crate::graph::gate_admits;
use crate::plan::{prepare_subtasks, Plan};
use crate::task::{Deposit, Parameters, TaskRecord};

use super::Scheduler;

pub(super) enum Expansion {
    Expanded,
    Stopped(Deposit),
    /// No subtask survived filtering; the deposit is handled as a plain one.
    NothingToExpand,
}

impl Scheduler<'_> {
    /// Fan a plan deposited by `producer` out into its subtasks.
    ///
    /// Every successor whose gate admits the plan deposit runs once per
    /// subtask, one level deep. Deposits land under the subtask ids; the latest
    /// successful one of each successor is then mirrored into the outer task.
    pub(super) async fn expand_plan(
        &mut self,
        producer: &str,
        deposit: &Deposit,
        plan: &Plan,
        stop_at: Option<&str>,
    ) -> Expansion {
        let root_id = self.root.task_id.clone();
        let store = &*self.store;
        let subtasks = prepare_subtasks(plan, self.limits.max_subtasks, |id| {
            *id == root_id || store.contains(id)
        });
        if subtasks.is_empty() {
            return Expansion::NothingToExpand;
        }

        let outputs = self.store.entry(&root_id);
        let mut successors: Vec<String> = Vec::new();
        for (successor, gate) in self.graph.successors(producer) {
            if successors.iter().any(|s| s == successor)
                || outputs.is_processed(successor)
                || !gate_admits(gate, deposit)
            {
                continue;
            }
            successors.push(successor.to_string());
        }

        tracing::debug!(
            task_id = %root_id,
            producer,
            subtasks = subtasks.len(),
            successors = ?successors,
            "expanding plan"
        );

        let mut stopped = None;
        'subtasks: for subtask in &subtasks {
            self.store.entry(&subtask.task_id);
            self.store.entry(&root_id).add_child(&subtask.task_id);

            for successor in &successors {
                let task = self.subtask_invocation(subtask);
                let deposit = self.invoke(successor, &subtask.task_id, task).await;
                if stop_at == Some(successor.as_str()) {
                    stopped = Some(deposit);
                    break 'subtasks;
                }
            }
        }

        self.mirror_into_root(&subtasks, &successors);

        match stopped {
            Some(deposit) => Expansion::Stopped(deposit),
            None => Expansion::Expanded,
        }
    }

    /// Subtask fields over the outer task's configuration and deposits, plus
    /// whatever has already been recorded for the subtask.
    fn subtask_invocation(&mut self, subtask: &TaskRecord) -> TaskRecord {
        let mut config = self.root.parameters.config.clone();
        config.merge_from(&subtask.parameters.config);

        let mut deposits = self.root.parameters.deposits.clone();
        deposits.extend(self.store.entry(&subtask.task_id).snapshot());

        TaskRecord {
            task_id: subtask.task_id.clone(),
            description: subtask.description.clone(),
            parameters: Parameters {
                config,
                deposits,
                subtasks: Default::default(),
            },
            dependencies: subtask.dependencies.clone(),
            prompt: subtask
                .prompt
                .clone()
                .filter(|p| !p.trim().is_empty())
                .or_else(|| self.root.prompt.clone()),
        }
    }

    /// Mirror each successor's latest non-failed subtask deposit into the outer
    /// task. Only when every subtask failed is the last failure mirrored.
    fn mirror_into_root(&mut self, subtasks: &[TaskRecord], successors: &[String]) {
        let root_id = self.root.task_id.clone();
        for successor in successors {
            let deposits: Vec<Deposit> = subtasks
                .iter()
                .rev()
                .filter_map(|s| {
                    self.store
                        .get(&s.task_id)
                        .and_then(|outputs| outputs.get(successor))
                        .cloned()
                })
                .collect();
            let chosen = deposits
                .iter()
                .find(|d| !d.status.is_failed())
                .or_else(|| deposits.first())
                .cloned();
            let Some(deposit) = chosen else {
                continue;
            };
            self.root
                .parameters
                .insert_deposit(successor.clone(), deposit.clone());
            self.store.entry(&root_id).record(successor, deposit);
        }
    }
}
