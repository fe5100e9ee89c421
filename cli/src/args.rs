use std::path::PathBuf;

use clap::Parser;

use devflow_core::api::BackendKind;

#[derive(Parser, Debug)]
#[command(name = "devflow", version, about = "Run a request through the Architect/Generator/Tester/Executor/Debugger pipeline")]
pub struct Args {
    /// What to build.
    #[arg(group = "input")]
    pub request: Option<String>,

    /// Read the request from a file instead.
    #[arg(long, group = "input")]
    pub request_file: Option<PathBuf>,

    #[arg(long, default_value = "javascript")]
    pub language: String,

    /// Target file of the generated code. Can be specified multiple times.
    #[arg(long = "output-file", action = clap::ArgAction::Append)]
    pub output_files: Vec<String>,

    #[arg(long)]
    pub task_id: Option<String>,

    #[arg(long)]
    pub session_id: Option<String>,

    /// Config file to use instead of the default search.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Stop once this agent has run. A bare role (`Tester`) names the role's
    /// agent for the request.
    #[arg(long)]
    pub stop_at: Option<String>,

    /// Allow agents to route inference to a remote model.
    #[arg(long)]
    pub remote: bool,

    #[arg(long)]
    pub max_subtasks: Option<usize>,

    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Per-agent timeout in milliseconds.
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    #[arg(long, value_parser = parse_backend_kind)]
    pub backend: Option<BackendKind>,

    /// Canned responses for `--backend scripted`.
    #[arg(long)]
    pub responses_file: Option<String>,

    /// Print the run summary along with the result.
    #[arg(long)]
    pub summary: bool,
}

fn parse_backend_kind(s: &str) -> Result<BackendKind, String> {
    s.parse()
}
