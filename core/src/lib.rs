//! Agent orchestration core.
//!
//! A population of agents is registered against a dependency graph whose edges
//! carry optional gates. The scheduler drives one task at a time: it selects a
//! ready agent, invokes it, records the deposit, propagates to gated successors
//! and expands plans into subtasks.
//!
//! # Architecture
//!
//! ```text
//! Orchestrator::add_agent(agent, edges)
//!   ↓
//! DependencyGraph { edges, insertion_order }
//!   ↓
//! Orchestrator::orchestrate(task, stop_at)
//!   ↓
//! Scheduler::run() → Selector::select() → invoke → OutputStore::record()
//!   ↓                                        ↓
//!   ↓                               Plan? → expand_plan() → subtask invocations
//!   ↓
//! (Status, AgentResult) + RunSummary
//! ```

pub mod agent;
pub mod api;
pub mod backend;
pub mod clock;
pub mod config;
pub mod error;
pub mod graph;
pub mod orchestrator;
pub mod plan;
pub mod scheduler;
pub mod selector;
pub mod store;
pub mod task;
pub mod tracking;
