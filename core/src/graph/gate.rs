use serde::{Deserialize, Serialize};

use crate::agent::AgentRole;
use crate::store::TaskOutputs;
use crate::task::{AgentResult, Deposit, Status};

use super::{DependencyGraph, Edge};

/// Edge-local precondition on a predecessor's deposit. Absent fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Gate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,

    /// Only meaningful for results carrying a pass/fail bit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passed: Option<bool>,
}

impl Gate {
    pub fn status(status: impl Into<Status>) -> Self {
        Self {
            status: Some(status.into()),
            passed: None,
        }
    }

    pub fn with_passed(mut self, passed: bool) -> Self {
        self.passed = Some(passed);
        self
    }

    pub fn matches(&self, status: &Status, result: &AgentResult) -> bool {
        if let Some(required) = &self.status {
            if required != status {
                return false;
            }
        }
        if let Some(required) = self.passed {
            // A result without a pass bit never matches a `passed` condition.
            if result.passed() != Some(required) {
                return false;
            }
        }
        true
    }

    pub fn matches_deposit(&self, deposit: &Deposit) -> bool {
        self.matches(&deposit.status, &deposit.result)
    }
}

/// Whether an optional gate admits `deposit`.
pub(crate) fn gate_admits(gate: Option<&Gate>, deposit: &Deposit) -> bool {
    gate.map(|g| g.matches_deposit(deposit)).unwrap_or(true)
}

pub fn edge_satisfied(edge: &Edge, outputs: &TaskOutputs) -> bool {
    outputs
        .get(&edge.predecessor)
        .map(|deposit| gate_admits(edge.gate.as_ref(), deposit))
        .unwrap_or(false)
}

/// Every inbound edge of `agent` has a deposit satisfying its gate.
pub fn is_ready(graph: &DependencyGraph, agent: &str, outputs: &TaskOutputs) -> bool {
    graph
        .edges(agent)
        .iter()
        .all(|edge| edge_satisfied(edge, outputs))
}

/// Architect escape hatch: some inbound edge comes from an Architect whose
/// recorded status equals the status that edge asks for.
///
/// Callers only consult this when no agent is ready.
pub fn escape_applies(graph: &DependencyGraph, agent: &str, outputs: &TaskOutputs) -> bool {
    graph.edges(agent).iter().any(|edge| {
        if AgentRole::from_agent_name(&edge.predecessor) != Some(AgentRole::Architect) {
            return false;
        }
        let Some(required) = edge.gate.as_ref().and_then(|g| g.status.as_ref()) else {
            return false;
        };
        outputs
            .get(&edge.predecessor)
            .map(|deposit| &deposit.status == required)
            .unwrap_or(false)
    })
}
