use std::collections::VecDeque;
use std::pin::Pin;

use async_trait::async_trait;
use futures::{stream, Stream, StreamExt};
use serde_json::{json, Value};

use crate::request::{CompletionRequest, ToolChoice};
use crate::sse::{parse_sse_data, ProtocolEvent};

pub type EventStream = Pin<Box<dyn Stream<Item = Result<ProtocolEvent, TransportError>> + Send>>;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Opens one logical stream against a completion endpoint. Implementations
/// do not retry or reconnect; a broken stream surfaces as an `Err` item and
/// the stream is finished.
#[async_trait]
pub trait CompletionTransport: Send + Sync {
    async fn stream_chat(&self, request: CompletionRequest) -> Result<EventStream, TransportError>;
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub base_url: String,
    pub api_key: String,
}

impl TransportConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

/// HTTP transport speaking the OpenAI-compatible chat-completions dialect.
pub struct HttpTransport {
    client: reqwest::Client,
    config: TransportConfig,
}

impl HttpTransport {
    pub fn new(config: TransportConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn build_body(request: &CompletionRequest) -> Result<Value, TransportError> {
        let mut messages: Vec<Value> = Vec::with_capacity(request.messages.len() + 1);
        if let Some(instructions) = &request.instructions {
            messages.push(json!({"role": "system", "content": instructions}));
        }
        for message in &request.messages {
            let mut value = serde_json::to_value(message)
                .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
            if let Value::Object(obj) = &mut value {
                obj.retain(|_, v| !v.is_null());
            }
            messages.push(value);
        }

        let mut body = json!({
            "model": request.model,
            "messages": messages,
            "stream": true,
            "stream_options": {"include_usage": true},
        });

        let obj = body.as_object_mut().expect("body is an object");
        if !request.tools.is_empty() {
            let tools: Vec<Value> = request
                .tools
                .iter()
                .map(|t| json!({"type": "function", "function": t}))
                .collect();
            obj.insert("tools".to_string(), Value::Array(tools));
        }
        if let Some(choice) = request.tool_choice {
            let value = match choice {
                ToolChoice::Auto => "auto",
                ToolChoice::Required => "required",
                ToolChoice::None => "none",
            };
            obj.insert("tool_choice".to_string(), json!(value));
        }
        if let Some(temperature) = request.temperature {
            obj.insert("temperature".to_string(), json!(temperature));
        }
        if let Some(max_tokens) = request.max_tokens {
            obj.insert("max_tokens".to_string(), json!(max_tokens));
        }

        Ok(body)
    }
}

/// Pull every complete SSE line out of `buffer`, leaving a partial trailing
/// line (a frame split across chunks) in place for the next read.
fn drain_sse_payloads(buffer: &mut String, flush: bool) -> Vec<String> {
    let mut payloads = Vec::new();

    while let Some(pos) = buffer.find('\n') {
        let line: String = buffer.drain(..=pos).collect();
        if let Some(data) = line.trim_end().strip_prefix("data: ") {
            payloads.push(data.to_string());
        }
    }

    if flush {
        if let Some(data) = buffer.trim_end().strip_prefix("data: ") {
            payloads.push(data.to_string());
        }
        buffer.clear();
    }

    payloads
}

#[async_trait]
impl CompletionTransport for HttpTransport {
    async fn stream_chat(&self, request: CompletionRequest) -> Result<EventStream, TransportError> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let body = Self::build_body(&request)?;

        tracing::debug!(provider = %request.provider, model = %request.model, "opening completion stream");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(TransportError::Api { status, message });
        }

        let stream = stream::try_unfold(
            (
                response.bytes_stream(),
                String::new(),
                VecDeque::<ProtocolEvent>::new(),
                false,
            ),
            |(mut chunks, mut buffer, mut pending, mut exhausted)| async move {
                loop {
                    if let Some(event) = pending.pop_front() {
                        return Ok(Some((event, (chunks, buffer, pending, exhausted))));
                    }

                    if exhausted {
                        return Ok(None);
                    }

                    match chunks.next().await {
                        Some(Ok(bytes)) => {
                            buffer.push_str(&String::from_utf8_lossy(&bytes));
                            pending.extend(
                                drain_sse_payloads(&mut buffer, false)
                                    .iter()
                                    .filter_map(|data| parse_sse_data(data)),
                            );
                        }
                        Some(Err(e)) => return Err(TransportError::Stream(e.to_string())),
                        None => {
                            exhausted = true;
                            pending.extend(
                                drain_sse_payloads(&mut buffer, true)
                                    .iter()
                                    .filter_map(|data| parse_sse_data(data)),
                            );
                        }
                    }
                }
            },
        );

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{ToolDefinition, WireMessage};

    #[test]
    fn payloads_split_across_chunks_reassemble() {
        let mut buffer = String::from("data: {\"choices\":[{\"delta\":{\"con");
        assert!(drain_sse_payloads(&mut buffer, false).is_empty());

        buffer.push_str("tent\":\"Hi\"}}]}\n\n");
        let payloads = drain_sse_payloads(&mut buffer, false);
        assert_eq!(payloads.len(), 1);
        assert_eq!(
            parse_sse_data(&payloads[0]),
            Some(ProtocolEvent::ContentDelta("Hi".to_string()))
        );
        assert!(buffer.is_empty());
    }

    #[test]
    fn multiple_frames_in_one_chunk_all_drain() {
        let mut buffer = String::from(
            "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n\ndata: [DONE]\n\n",
        );
        let payloads = drain_sse_payloads(&mut buffer, false);
        assert_eq!(payloads.len(), 2);
        assert_eq!(payloads[1], "[DONE]");
    }

    #[test]
    fn flush_recovers_unterminated_trailing_frame() {
        let mut buffer = String::from("data: [DONE]");
        assert!(drain_sse_payloads(&mut buffer, false).is_empty());
        let payloads = drain_sse_payloads(&mut buffer, true);
        assert_eq!(payloads, vec!["[DONE]".to_string()]);
    }

    #[test]
    fn body_carries_instructions_tools_and_params() {
        let request = CompletionRequest::new(
            "openai",
            "gpt-4o-mini",
            vec![WireMessage::user("find me a picture of a capsule hotel")],
        )
        .with_instructions("You are a workspace assistant.")
        .with_tools(vec![ToolDefinition {
            name: "web_search".to_string(),
            description: Some("Search the web".to_string()),
            parameters: json!({"type": "object"}),
        }])
        .with_tool_choice(ToolChoice::Auto)
        .with_temperature(0.2)
        .with_max_tokens(1024);

        let body = HttpTransport::build_body(&request).unwrap();
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["tools"][0]["function"]["name"], "web_search");
        assert_eq!(body["tool_choice"], "auto");
        assert_eq!(body["temperature"], 0.2);
        assert_eq!(body["max_tokens"], 1024);
        assert_eq!(body["stream"], true);
    }

    #[test]
    fn tool_role_message_keeps_call_id() {
        let request = CompletionRequest::new(
            "openai",
            "gpt-4o-mini",
            vec![WireMessage::tool("tool-call-0", "{\"results\":[]}")],
        );
        let body = HttpTransport::build_body(&request).unwrap();
        assert_eq!(body["messages"][0]["tool_call_id"], "tool-call-0");
    }
}
