use std::collections::HashMap;
use std::sync::Arc;

use nimbus_provider::ToolDefinition;
use nimbus_types::ToolOutcome;

use crate::tool::{Tool, ToolConfig, ToolError};
use crate::{ImageEditTool, ImageGenerationTool, WebSearchTool};

/// Executors keyed by the name the model calls them by.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the standard workspace capabilities: web search and
    /// image generation/editing.
    pub fn standard(config: ToolConfig) -> Self {
        let mut registry = Self::new();
        registry.register(WebSearchTool::new(config.clone()));
        registry.register(ImageGenerationTool::new(config.clone()));
        registry.register(ImageEditTool::new(config));
        registry
    }

    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        let id = tool.id().to_string();
        if !self.tools.contains_key(&id) {
            self.order.push(id.clone());
        }
        self.tools.insert(id, Arc::new(tool));
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(id).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Tool surface for the completion request, in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|id| self.tools.get(id))
            .map(|tool| ToolDefinition {
                name: tool.id().to_string(),
                description: Some(tool.description().to_string()),
                parameters: tool.parameters(),
            })
            .collect()
    }

    /// Invoke the named executor once. Unknown names and executor failures
    /// both come back as an error outcome — failure is data here, never a
    /// panic or a hung reconciliation.
    pub async fn run(&self, id: &str, args: serde_json::Value) -> ToolOutcome {
        let Some(tool) = self.get(id) else {
            tracing::warn!(tool = %id, "model invoked an unregistered tool");
            return ToolOutcome::error(id, format!("{}", ToolError::UnknownTool(id.to_string())));
        };

        match tool.execute(args).await {
            Ok(outcome) if outcome.matches_tool(id) => outcome,
            Ok(_) => {
                tracing::warn!(tool = %id, "executor returned a mismatched outcome shape");
                ToolOutcome::error(id, "executor returned a mismatched outcome shape")
            }
            Err(e) => {
                tracing::warn!(tool = %id, error = %e, "tool execution failed");
                ToolOutcome::error(id, e.to_string())
            }
        }
    }
}
