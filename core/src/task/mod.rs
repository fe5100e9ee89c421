mod params;
mod record;
mod result;

pub use params::{Parameters, TaskConfig};
pub use record::{TaskId, TaskRecord};
pub use result::{AgentResult, CodeArtifact, Deposit, Status, TestOutcome};
