use async_trait::async_trait;

use nimbus_types::ToolOutcome;

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Execution failed: {0}")]
    ExecutionError(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),
}

/// One external capability the model can invoke. Executors must eventually
/// resolve — success and failure both come back as an outcome value.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The name the model calls this tool by.
    fn id(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON-schema for the arguments object.
    fn parameters(&self) -> serde_json::Value;

    async fn execute(&self, args: serde_json::Value) -> Result<ToolOutcome, ToolError>;
}

/// Endpoints and credentials for the managed tool backends.
#[derive(Debug, Clone)]
pub struct ToolConfig {
    pub search_url: String,
    pub image_url: String,
    pub api_key: String,
}

impl ToolConfig {
    pub fn new(
        search_url: impl Into<String>,
        image_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            search_url: search_url.into(),
            image_url: image_url.into(),
            api_key: api_key.into(),
        }
    }
}
