mod load;
mod types;

pub use load::{apply_env_overrides, get_devflow_data_dir, load_default, load_from};
pub use types::{
    AdvisoryConfig, AppConfig, BackendConfig, BackendKind, ExecutorConfig, LoggingConfig,
    OrchestratorConfig, SinkConfig,
};
