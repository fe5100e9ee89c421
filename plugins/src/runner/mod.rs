//! Test runners used by the Executor agent.

mod command;

pub use command::CommandTestRunner;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A file to materialise before running tests. `path` is relative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: String,
    pub contents: String,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, contents: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            contents: contents.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRun {
    pub passed: bool,
    pub exit_code: Option<i32>,
    pub output: String,
}

/// Runs a generated test file against generated sources.
///
/// A failing test run is `Ok` with `passed == false`; `Err` means the runner
/// itself could not be started.
#[async_trait]
pub trait TestRunner: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, sources: &[SourceFile], tests: &SourceFile) -> anyhow::Result<TestRun>;
}
