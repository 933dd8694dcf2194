use serde::{Deserialize, Serialize};

pub const WEB_SEARCH_TOOL: &str = "web_search";
pub const IMAGE_GENERATION_TOOL: &str = "image_generation";
pub const IMAGE_EDIT_TOOL: &str = "image_edit";

/// Version stamped into every structured tool outcome so consumers can
/// reject shapes they do not understand.
pub const TOOL_OUTCOME_SCHEMA_VERSION: u32 = 1;

/// One invocation of an external capability surfaced by the model mid-stream.
///
/// The `id` is assigned by the upstream protocol and correlates the delta
/// fragments that assemble `arguments`. The arguments string is only valid
/// JSON once the stream closes the call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: String,
    pub phase: ToolCallPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ToolOutcome>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallPhase {
    /// Name known, arguments still streaming.
    Announced,
    /// Arguments closed and parsed successfully.
    ArgumentsComplete,
    /// Handed to an executor.
    Executing,
    /// Executor produced an outcome.
    Resolved,
    /// Argument parse failure or executor error.
    Failed,
}

impl ToolCall {
    pub fn announced(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: String::new(),
            phase: ToolCallPhase::Announced,
            result: None,
        }
    }

    /// A call is settled once an outcome (success or error) is attached, or
    /// once it failed before dispatch.
    pub fn is_settled(&self) -> bool {
        self.result.is_some() || self.phase == ToolCallPhase::Failed
    }
}

/// Closed set of tool result shapes. Failure is carried as the `Error`
/// variant rather than an exception so a failed execution still drives the
/// conversation to a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolOutcome {
    WebSearch {
        schema_version: u32,
        query: String,
        results: Vec<SearchHit>,
    },
    ImageGeneration {
        schema_version: u32,
        images: Vec<GeneratedImage>,
    },
    ImageEdit {
        schema_version: u32,
        images: Vec<GeneratedImage>,
    },
    Error {
        tool: String,
        message: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub snippet: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneratedImage {
    pub url: String,
    #[serde(default)]
    pub mime: String,
}

impl ToolOutcome {
    pub fn error(tool: impl Into<String>, message: impl Into<String>) -> Self {
        ToolOutcome::Error {
            tool: tool.into(),
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ToolOutcome::Error { .. })
    }

    /// Whether this outcome variant is the one the named tool produces.
    /// `Error` matches any tool. Unknown tool names match nothing, so
    /// callers fail closed.
    pub fn matches_tool(&self, tool_name: &str) -> bool {
        match self {
            ToolOutcome::WebSearch { .. } => tool_name == WEB_SEARCH_TOOL,
            ToolOutcome::ImageGeneration { .. } => tool_name == IMAGE_GENERATION_TOOL,
            ToolOutcome::ImageEdit { .. } => tool_name == IMAGE_EDIT_TOOL,
            ToolOutcome::Error { .. } => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_matches_only_its_tool() {
        let outcome = ToolOutcome::WebSearch {
            schema_version: TOOL_OUTCOME_SCHEMA_VERSION,
            query: "rust".to_string(),
            results: vec![],
        };
        assert!(outcome.matches_tool(WEB_SEARCH_TOOL));
        assert!(!outcome.matches_tool(IMAGE_GENERATION_TOOL));
        assert!(!outcome.matches_tool("unknown_tool"));
    }

    #[test]
    fn error_outcome_matches_any_tool() {
        let outcome = ToolOutcome::error(WEB_SEARCH_TOOL, "timeout");
        assert!(outcome.matches_tool(WEB_SEARCH_TOOL));
        assert!(outcome.matches_tool(IMAGE_EDIT_TOOL));
        assert!(outcome.is_error());
    }

    #[test]
    fn settled_requires_result_or_failure() {
        let mut call = ToolCall::announced("tool-call-0", WEB_SEARCH_TOOL);
        assert!(!call.is_settled());

        call.phase = ToolCallPhase::Failed;
        assert!(call.is_settled());

        call.phase = ToolCallPhase::Resolved;
        call.result = Some(ToolOutcome::error(WEB_SEARCH_TOOL, "x"));
        assert!(call.is_settled());
    }

    #[test]
    fn outcome_serializes_with_kind_tag() {
        let outcome = ToolOutcome::ImageGeneration {
            schema_version: TOOL_OUTCOME_SCHEMA_VERSION,
            images: vec![GeneratedImage {
                url: "https://img.example/1.png".to_string(),
                mime: "image/png".to_string(),
            }],
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["kind"], "image_generation");
        assert_eq!(json["schema_version"], 1);
    }
}
