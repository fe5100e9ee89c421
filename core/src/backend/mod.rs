use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Options passed with every generation request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerateOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// JSON schema the response is expected to satisfy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_schema: Option<serde_json::Value>,

    #[serde(default)]
    pub use_remote: bool,
}

impl GenerateOptions {
    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        if max_tokens.is_some() {
            self.max_tokens = max_tokens;
        }
        self
    }

    pub fn with_schema(mut self, schema: serde_json::Value) -> Self {
        self.json_schema = Some(schema);
        self
    }
}

/// Language-model backend consumed by agents.
///
/// Any error is treated by the scheduler as a failure of the calling agent.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &str, options: &GenerateOptions) -> anyhow::Result<String>;
}
