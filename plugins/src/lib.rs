pub mod agents;
pub mod backend;
pub mod factory;
pub mod runner;
pub mod selector;
pub mod sink;
