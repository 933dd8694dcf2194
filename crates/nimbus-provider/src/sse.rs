use serde::{Deserialize, Serialize};

/// Typed events decoded from the completion wire. These are what the chat
/// engine folds; everything provider-specific stops at this boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ProtocolEvent {
    /// Incremental answer text.
    ContentDelta(String),
    /// Incremental "thinking" text, kept out of the answer body.
    ReasoningDelta(String),
    /// A tool call was announced; arguments follow as deltas.
    ToolCallStart { id: String, name: String },
    /// Incremental tool-call argument JSON.
    ToolCallDelta { id: String, arguments: String },
    /// The upstream closed the argument stream for every open call; the
    /// assembled JSON strings are now valid to parse.
    ToolCallsFinished,
    /// Token accounting, when the dialect reports it.
    Usage(UsageReport),
    /// Terminal signal; no further events follow on a well-behaved stream.
    Done,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct UsageReport {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct SseFrame {
    #[serde(default)]
    choices: Vec<SseChoice>,
    usage: Option<SseUsage>,
}

#[derive(Debug, Deserialize)]
struct SseChoice {
    #[serde(default)]
    delta: Option<SseDelta>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SseDelta {
    content: Option<String>,
    #[serde(alias = "reasoning")]
    reasoning_content: Option<String>,
    tool_calls: Option<Vec<SseToolCall>>,
}

#[derive(Debug, Deserialize)]
struct SseToolCall {
    #[serde(default)]
    index: u32,
    #[serde(default)]
    function: Option<SseFunction>,
}

#[derive(Debug, Deserialize, Default)]
struct SseFunction {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SseUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

/// Tool-call fragments are correlated by stream index. The first chunk may
/// carry an explicit id while later delta chunks only have the index, so an
/// index-derived id is the only one that stays stable across the call.
fn tool_call_id(tc: &SseToolCall) -> String {
    format!("tool-call-{}", tc.index)
}

/// Decode one `data:` payload of an OpenAI-compatible chat-completions
/// stream into a protocol event. Payloads that carry nothing of interest
/// (keep-alives, role preludes) return `None`.
pub fn parse_sse_data(data: &str) -> Option<ProtocolEvent> {
    if data == "[DONE]" {
        return Some(ProtocolEvent::Done);
    }

    let frame: SseFrame = serde_json::from_str(data).ok()?;

    for choice in frame.choices {
        if let Some(delta) = &choice.delta {
            if let Some(content) = &delta.content {
                if !content.is_empty() {
                    return Some(ProtocolEvent::ContentDelta(content.clone()));
                }
            }

            if let Some(reasoning) = &delta.reasoning_content {
                if !reasoning.is_empty() {
                    return Some(ProtocolEvent::ReasoningDelta(reasoning.clone()));
                }
            }

            if let Some(tool_calls) = &delta.tool_calls {
                for tc in tool_calls {
                    if let Some(func) = &tc.function {
                        // Some OpenAI-compatible backends send empty tool
                        // names; treat those as absent so no ghost call is
                        // created.
                        let has_name = func.name.as_deref().is_some_and(|n| !n.is_empty());
                        let has_args = func.arguments.as_deref().is_some_and(|a| !a.is_empty());

                        if has_name {
                            return Some(ProtocolEvent::ToolCallStart {
                                id: tool_call_id(tc),
                                name: func.name.clone().unwrap_or_default(),
                            });
                        }
                        if has_args {
                            return Some(ProtocolEvent::ToolCallDelta {
                                id: tool_call_id(tc),
                                arguments: func.arguments.clone().unwrap_or_default(),
                            });
                        }
                    }
                }
            }
        }

        match choice.finish_reason.as_deref() {
            Some("tool_calls") => return Some(ProtocolEvent::ToolCallsFinished),
            Some("stop") => return Some(ProtocolEvent::Done),
            _ => {}
        }
    }

    frame.usage.map(|usage| {
        ProtocolEvent::Usage(UsageReport {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_delta_parses() {
        let data = r#"{"choices":[{"delta":{"content":"Hel"}}]}"#;
        assert_eq!(
            parse_sse_data(data),
            Some(ProtocolEvent::ContentDelta("Hel".to_string()))
        );
    }

    #[test]
    fn reasoning_delta_parses_with_alias() {
        let data = r#"{"choices":[{"delta":{"reasoning":"hmm"}}]}"#;
        assert_eq!(
            parse_sse_data(data),
            Some(ProtocolEvent::ReasoningDelta("hmm".to_string()))
        );
    }

    #[test]
    fn tool_start_uses_index_based_id() {
        let data = r#"{"choices":[{"delta":{"tool_calls":[{"index":2,"id":"call_abc","function":{"name":"web_search"}}]}}]}"#;
        match parse_sse_data(data) {
            Some(ProtocolEvent::ToolCallStart { id, name }) => {
                assert_eq!(id, "tool-call-2", "index id must win over explicit id");
                assert_eq!(name, "web_search");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn tool_delta_uses_index_based_id() {
        let data = r#"{"choices":[{"delta":{"tool_calls":[{"index":2,"function":{"arguments":"{\"query\":"}}]}}]}"#;
        match parse_sse_data(data) {
            Some(ProtocolEvent::ToolCallDelta { id, arguments }) => {
                assert_eq!(id, "tool-call-2");
                assert_eq!(arguments, "{\"query\":");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn empty_tool_name_is_ignored() {
        let data = r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"name":""}}]}}]}"#;
        assert_eq!(parse_sse_data(data), None);
    }

    #[test]
    fn tool_calls_finish_reason_closes_arguments() {
        let data = r#"{"choices":[{"finish_reason":"tool_calls"}]}"#;
        assert_eq!(parse_sse_data(data), Some(ProtocolEvent::ToolCallsFinished));
    }

    #[test]
    fn stop_and_done_sentinel_both_end_stream() {
        assert_eq!(
            parse_sse_data(r#"{"choices":[{"finish_reason":"stop"}]}"#),
            Some(ProtocolEvent::Done)
        );
        assert_eq!(parse_sse_data("[DONE]"), Some(ProtocolEvent::Done));
    }

    #[test]
    fn usage_frame_parses() {
        let data = r#"{"choices":[],"usage":{"prompt_tokens":10,"completion_tokens":4}}"#;
        assert_eq!(
            parse_sse_data(data),
            Some(ProtocolEvent::Usage(UsageReport {
                prompt_tokens: 10,
                completion_tokens: 4,
            }))
        );
    }

    #[test]
    fn role_prelude_is_skipped() {
        let data = r#"{"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert_eq!(parse_sse_data(data), None);
    }
}
