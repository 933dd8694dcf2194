use nimbus_provider::{ImageUrl, WireMessage, WirePart, WireToolCall};
use nimbus_types::{MessageRole, ThreadMessage};

/// Project the thread's completed messages onto the completion wire.
///
/// The streaming placeholder is excluded; follow-up messages are included
/// as plain assistant turns (they carry the model's own wrap-up text);
/// tool-call records become an assistant turn echoing the calls, followed
/// by one tool-role message per settled call carrying its serialized
/// outcome.
pub fn build_wire_history(messages: &[ThreadMessage]) -> Vec<WireMessage> {
    let mut wire = Vec::with_capacity(messages.len());

    for message in messages.iter().filter(|m| !m.is_streaming()) {
        match message.role {
            MessageRole::System => wire.push(WireMessage::system(message.content.clone())),

            MessageRole::User => {
                if message.files.is_empty() {
                    wire.push(WireMessage::user(message.content.clone()));
                } else {
                    let mut parts = vec![WirePart::Text {
                        text: message.content.clone(),
                    }];
                    parts.extend(message.files.iter().map(|f| WirePart::ImageUrl {
                        image_url: ImageUrl { url: f.url.clone() },
                    }));
                    wire.push(WireMessage::user_with_parts(parts));
                }
            }

            MessageRole::Assistant => match &message.tool_calls {
                Some(calls) if !calls.is_empty() => {
                    let echoed = calls
                        .iter()
                        .map(|c| {
                            WireToolCall::function(c.id.clone(), c.name.clone(), c.arguments.clone())
                        })
                        .collect();
                    wire.push(WireMessage::assistant_with_calls(
                        message.content.clone(),
                        echoed,
                    ));

                    for call in calls {
                        if let Some(outcome) = &call.result {
                            let payload = serde_json::to_string(outcome)
                                .unwrap_or_else(|_| "{}".to_string());
                            wire.push(WireMessage::tool(call.id.clone(), payload));
                        }
                    }
                }
                _ => wire.push(WireMessage::assistant(message.content.clone())),
            },

            // Standalone tool-role messages are reconstructed from the
            // tool-call records above; nothing to project.
            MessageRole::Tool => {}
        }
    }

    wire
}
