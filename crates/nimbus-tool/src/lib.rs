mod image;
mod registry;
mod tool;
mod websearch;

pub use image::{ImageEditTool, ImageGenerationTool};
pub use registry::ToolRegistry;
pub use tool::{Tool, ToolConfig, ToolError};
pub use websearch::WebSearchTool;
