//! Dependency graph between agents.
//!
//! `edges[A] = [(B, gate)]` means A may run once B has deposited something
//! that satisfies `gate`.

mod gate;

pub use gate::{edge_satisfied, escape_applies, is_ready, Gate};
pub(crate) use gate::gate_admits;

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// Inbound edge of an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub predecessor: String,

    /// `None` is always satisfied once the predecessor has deposited.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gate: Option<Gate>,
}

impl Edge {
    pub fn new(predecessor: impl Into<String>) -> Self {
        Self {
            predecessor: predecessor.into(),
            gate: None,
        }
    }

    pub fn gated(predecessor: impl Into<String>, gate: Gate) -> Self {
        Self {
            predecessor: predecessor.into(),
            gate: Some(gate),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// agent name -> inbound edges
    edges: HashMap<String, Vec<Edge>>,

    /// Registration order; fixes every iteration order the scheduler relies on.
    insertion_order: Vec<String>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `agent` with its inbound edges. Re-registering replaces the
    /// edges but keeps the original position.
    pub fn add(&mut self, agent: impl Into<String>, dependencies: Vec<Edge>) {
        let agent = agent.into();
        if self.edges.insert(agent.clone(), dependencies).is_none() {
            self.insertion_order.push(agent.clone());
        }

        if let Some(cycle) = self.find_cycle(&agent) {
            tracing::warn!(
                agent = %agent,
                cycle = %cycle.join(" -> "),
                "dependency cycle registered; agents on it will never become ready"
            );
        }
    }

    pub fn contains(&self, agent: &str) -> bool {
        self.edges.contains_key(agent)
    }

    pub fn len(&self) -> usize {
        self.insertion_order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insertion_order.is_empty()
    }

    /// Agent names in registration order.
    pub fn names(&self) -> &[String] {
        &self.insertion_order
    }

    pub fn edges(&self, agent: &str) -> &[Edge] {
        self.edges.get(agent).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Outbound edges of `agent` as `(successor, gate)`, successors in
    /// registration order.
    pub fn successors<'a>(&'a self, agent: &'a str) -> impl Iterator<Item = (&'a str, Option<&'a Gate>)> + 'a {
        self.insertion_order.iter().flat_map(move |succ| {
            self.edges(succ)
                .iter()
                .filter(move |edge| edge.predecessor == agent)
                .map(move |edge| (succ.as_str(), edge.gate.as_ref()))
        })
    }

    /// A cycle through `start`, following inbound edges, if one exists.
    pub fn find_cycle(&self, start: &str) -> Option<Vec<String>> {
        let mut visited = HashSet::new();
        let mut stack = Vec::new();
        if self.dfs_cycle(start, start, &mut visited, &mut stack) {
            Some(stack)
        } else {
            None
        }
    }

    fn dfs_cycle(
        &self,
        start: &str,
        node: &str,
        visited: &mut HashSet<String>,
        stack: &mut Vec<String>,
    ) -> bool {
        visited.insert(node.to_string());
        stack.push(node.to_string());

        for edge in self.edges(node) {
            if edge.predecessor == start {
                stack.push(start.to_string());
                return true;
            }
            if !visited.contains(&edge.predecessor)
                && self.dfs_cycle(start, &edge.predecessor, visited, stack)
            {
                return true;
            }
        }

        stack.pop();
        false
    }
}
