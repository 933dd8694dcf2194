mod message;
mod tool_call;

pub use message::{FileAttachment, MessageRole, MessageStatus, Reasoning, ThreadMessage};
pub use tool_call::{
    GeneratedImage, SearchHit, ToolCall, ToolCallPhase, ToolOutcome, IMAGE_EDIT_TOOL,
    IMAGE_GENERATION_TOOL, TOOL_OUTCOME_SCHEMA_VERSION, WEB_SEARCH_TOOL,
};
