use nimbus_provider::UsageReport;
use nimbus_types::{Reasoning, ToolCall, ToolOutcome};

/// Transient accumulator for one active stream. Owned exclusively by the
/// send that created it; dropped once the reconciler has produced terminal
/// messages, except while tool calls are still unresolved past stream end.
#[derive(Debug, Clone, Default)]
pub struct StreamingState {
    /// Answer text assembled from content deltas.
    pub assembled_content: String,
    /// Tool calls in announcement order, in any lifecycle phase.
    pub tool_calls: Vec<ToolCall>,
    pub reasoning: ReasoningState,
    pub metadata: StreamMetadata,
}

#[derive(Debug, Clone, Default)]
pub struct ReasoningState {
    pub text: String,
    /// Unix millis of the first reasoning delta.
    pub started_at: Option<i64>,
    /// Computed when the stream completes.
    pub duration_ms: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct StreamMetadata {
    pub provider: String,
    pub model: String,
    pub usage: Option<UsageReport>,
    /// Outcomes in resolution order, kept alongside the per-call results.
    pub tool_results: Vec<ToolOutcome>,
}

impl StreamingState {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            metadata: StreamMetadata {
                provider: provider.into(),
                model: model.into(),
                usage: None,
                tool_results: Vec::new(),
            },
            ..Default::default()
        }
    }

    pub fn tool_call(&self, id: &str) -> Option<&ToolCall> {
        self.tool_calls.iter().find(|tc| tc.id == id)
    }

    pub fn tool_call_mut(&mut self, id: &str) -> Option<&mut ToolCall> {
        self.tool_calls.iter_mut().find(|tc| tc.id == id)
    }

    /// True once every announced call carries an outcome.
    pub fn all_tool_calls_settled(&self) -> bool {
        self.tool_calls.iter().all(|tc| tc.is_settled())
    }
}

impl ReasoningState {
    pub fn to_reasoning(&self) -> Option<Reasoning> {
        if self.text.is_empty() {
            return None;
        }
        Some(Reasoning {
            text: self.text.clone(),
            started_at: self.started_at,
            duration_ms: self.duration_ms,
        })
    }
}
