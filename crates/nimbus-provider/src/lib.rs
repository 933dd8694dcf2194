pub mod request;
pub mod sse;
pub mod transport;

pub use request::{
    CompletionRequest, ImageUrl, ToolChoice, ToolDefinition, WireContent, WireFunctionCall,
    WireMessage, WirePart, WireRole, WireToolCall,
};
pub use sse::{parse_sse_data, ProtocolEvent, UsageReport};
pub use transport::{CompletionTransport, EventStream, HttpTransport, TransportConfig,
    TransportError};
