use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::record::TaskId;
use super::result::Deposit;

/// Caller-supplied configuration carried by a task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output_files: Vec<String>,

    /// Whether agents may route inference to a remote model.
    #[serde(default)]
    pub use_remote: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Per-invocation timeout for agents running this task.
    #[serde(default, alias = "timeout", skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TaskConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.filter(|ms| *ms > 0).map(Duration::from_millis)
    }

    /// Overlay `other` onto `self`. Values set in `other` win; nothing is removed.
    pub fn merge_from(&mut self, other: &TaskConfig) {
        if other.language.is_some() {
            self.language = other.language.clone();
        }
        if !other.output_files.is_empty() {
            self.output_files = other.output_files.clone();
        }
        self.use_remote |= other.use_remote;
        if other.max_tokens.is_some() {
            self.max_tokens = other.max_tokens;
        }
        if other.timeout_ms.is_some() {
            self.timeout_ms = other.timeout_ms;
        }
        if other.session_id.is_some() {
            self.session_id = other.session_id.clone();
        }
        for (k, v) in &other.extra {
            self.extra.insert(k.clone(), v.clone());
        }
    }
}

/// Parameter bag of a task: configuration plus per-agent deposits.
///
/// The bag only grows during a run. Deposits are keyed by agent name and are
/// never overwritten once present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Parameters {
    #[serde(flatten)]
    pub config: TaskConfig,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub deposits: BTreeMap<String, Deposit>,

    /// Deposits recorded under subtasks spawned from this task.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub subtasks: BTreeMap<TaskId, BTreeMap<String, Deposit>>,
}

impl Parameters {
    pub fn deposit(&self, agent: &str) -> Option<&Deposit> {
        self.deposits.get(agent)
    }

    /// Returns `false` (and keeps the existing value) if `agent` already deposited.
    pub fn insert_deposit(&mut self, agent: impl Into<String>, deposit: Deposit) -> bool {
        use std::collections::btree_map::Entry;
        match self.deposits.entry(agent.into()) {
            Entry::Vacant(slot) => {
                slot.insert(deposit);
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    pub fn insert_subtask_deposit(
        &mut self,
        task_id: &TaskId,
        agent: impl Into<String>,
        deposit: Deposit,
    ) -> bool {
        let deposits = self.subtasks.entry(task_id.clone()).or_default();
        let agent = agent.into();
        if deposits.contains_key(&agent) {
            return false;
        }
        deposits.insert(agent, deposit);
        true
    }

    /// Most recent deposit whose agent name starts with `<prefix>_`.
    pub fn latest_by_prefix(&self, prefix: &str) -> Option<(&str, &Deposit)> {
        latest_in(&self.deposits, prefix)
    }

    /// Most recent matching deposit of every subtask, in subtask id order.
    pub fn subtask_deposits_by_prefix(&self, prefix: &str) -> Vec<(&TaskId, &Deposit)> {
        self.subtasks
            .iter()
            .filter_map(|(id, deposits)| latest_in(deposits, prefix).map(|(_, d)| (id, d)))
            .collect()
    }
}

fn latest_in<'a>(
    deposits: &'a BTreeMap<String, Deposit>,
    prefix: &str,
) -> Option<(&'a str, &'a Deposit)> {
    deposits
        .iter()
        .filter(|(name, _)| {
            name.strip_prefix(prefix)
                .map(|rest| rest.is_empty() || rest.starts_with('_'))
                .unwrap_or(false)
        })
        .max_by_key(|(_, d)| d.seq)
        .map(|(name, d)| (name.as_str(), d))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{AgentResult, Status};
    use chrono::Utc;

    fn deposit(status: &str, seq: u64) -> Deposit {
        Deposit {
            status: Status::from(status),
            result: AgentResult::Text(status.to_string()),
            timestamp: Utc::now(),
            seq,
        }
    }

    #[test]
    fn deposits_are_write_once() {
        let mut params = Parameters::default();
        assert!(params.insert_deposit("Generator_t1", deposit("generated", 1)));
        assert!(!params.insert_deposit("Generator_t1", deposit("failed", 2)));
        assert_eq!(params.deposit("Generator_t1").unwrap().status, "generated");
    }

    #[test]
    fn latest_by_prefix_uses_sequence_and_role_boundary() {
        let mut params = Parameters::default();
        params.insert_deposit("Generator_a", deposit("generated", 4));
        params.insert_deposit("Generator_b", deposit("generated", 7));
        params.insert_deposit("GeneratorX_c", deposit("generated", 9));

        let (name, d) = params.latest_by_prefix("Generator").unwrap();
        assert_eq!(name, "Generator_b");
        assert_eq!(d.seq, 7);
        assert!(params.latest_by_prefix("Tester").is_none());
    }

    #[test]
    fn merge_overlays_without_removing() {
        let mut base = TaskConfig {
            language: Some("python".into()),
            max_tokens: Some(512),
            ..Default::default()
        };
        base.extra.insert("style".into(), Value::from("pep8"));

        let mut overlay = TaskConfig {
            language: Some("javascript".into()),
            output_files: vec!["a.js".into()],
            ..Default::default()
        };
        overlay.extra.insert("framework".into(), Value::from("express"));

        base.merge_from(&overlay);
        assert_eq!(base.language.as_deref(), Some("javascript"));
        assert_eq!(base.output_files, vec!["a.js"]);
        assert_eq!(base.max_tokens, Some(512));
        assert!(base.extra.contains_key("style"));
        assert!(base.extra.contains_key("framework"));
    }

    #[test]
    fn timeout_alias_is_accepted() {
        let cfg: TaskConfig = serde_json::from_value(serde_json::json!({ "timeout": 1500 })).unwrap();
        assert_eq!(cfg.timeout(), Some(Duration::from_millis(1500)));

        let cfg: TaskConfig = serde_json::from_value(serde_json::json!({ "timeout_ms": 0 })).unwrap();
        assert_eq!(cfg.timeout(), None);
    }
}
