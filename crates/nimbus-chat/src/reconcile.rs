use std::collections::HashSet;

use tokio_util::sync::CancellationToken;

use nimbus_types::{MessageStatus, ThreadMessage};

use crate::state::StreamingState;

/// Suffix for the UI-only wrap-up message produced by a tool-call split.
pub const FOLLOW_UP_SUFFIX: &str = "_followup";

/// Tool-call records must never be stored with empty content; a single
/// space satisfies the constraint without showing anything.
const TOOL_CALL_PLACEHOLDER_CONTENT: &str = " ";

/// The three ways a stream can end, decided from the accumulated state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionShape {
    /// No tool calls: freeze the active message as the answer.
    PlainDone,
    /// Tool calls, all carrying outcomes: split into a durable tool-call
    /// record and an ephemeral follow-up.
    ToolCallsResolved,
    /// At least one call still lacks an outcome: stay visually streaming
    /// and re-evaluate on every resolution. There is no timeout here; a
    /// stuck executor leaves the thread in progress.
    ToolCallsPending,
}

pub fn completion_shape(state: &StreamingState) -> CompletionShape {
    if state.tool_calls.is_empty() {
        CompletionShape::PlainDone
    } else if state.all_tool_calls_settled() {
        CompletionShape::ToolCallsResolved
    } else {
        CompletionShape::ToolCallsPending
    }
}

/// Everything scoped to one `send_message` call: the cancellation token and
/// the set of message ids already reconciled. Owning these per send keeps
/// concurrent sends — if ever allowed — from sharing guard state.
pub struct SendContext {
    pub cancel: CancellationToken,
    reconciled: HashSet<String>,
}

impl SendContext {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            reconciled: HashSet::new(),
        }
    }

    /// Check-and-mark in one step. This runs inside the send's event loop
    /// with no await between check and mark, so a duplicate terminal signal
    /// can never slip through.
    pub fn mark_reconciled(&mut self, message_id: &str) -> bool {
        self.reconciled.insert(message_id.to_string())
    }
}

/// Rule 1: no tool calls. The placeholder becomes the answer in place.
pub fn freeze_plain(placeholder: &ThreadMessage, state: &StreamingState) -> ThreadMessage {
    let mut message = placeholder.clone();
    message.content = state.assembled_content.clone();
    message.status = MessageStatus::Completed;
    message.reasoning = state.reasoning.to_reasoning();
    message
}

/// Rule 2: tool calls with outcomes. The durable record keeps the
/// placeholder's id and the calls; the model's natural-language wrap-up
/// moves to an ephemeral follow-up that is shown but never stored, since
/// its content is reconstructable from the record plus the next turn.
pub fn split_tool_call(
    placeholder: &ThreadMessage,
    state: &StreamingState,
) -> (ThreadMessage, ThreadMessage) {
    let mut record = placeholder.clone();
    record.content = TOOL_CALL_PLACEHOLDER_CONTENT.to_string();
    record.tool_calls = Some(state.tool_calls.clone());
    record.status = MessageStatus::Completed;
    record.reasoning = state.reasoning.to_reasoning();

    let mut follow_up = placeholder.clone();
    follow_up.id = format!("{}{}", placeholder.id, FOLLOW_UP_SUFFIX);
    follow_up.content = state.assembled_content.clone();
    follow_up.status = MessageStatus::Completed;
    follow_up.skip_save = true;

    (record, follow_up)
}

/// An unrecoverable generation error collapses the placeholder to a short
/// fixed apology instead of leaving it stuck streaming.
pub fn collapse_to_apology(placeholder: &ThreadMessage, apology: &str) -> ThreadMessage {
    let mut message = placeholder.clone();
    message.content = apology.to_string();
    message.status = MessageStatus::Error;
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use nimbus_types::{ToolCall, ToolCallPhase, ToolOutcome, WEB_SEARCH_TOOL};

    fn state_with_call(settled: bool) -> StreamingState {
        let mut state = StreamingState::default();
        let mut call = ToolCall::announced("tool-call-0", WEB_SEARCH_TOOL);
        call.phase = ToolCallPhase::ArgumentsComplete;
        if settled {
            call.phase = ToolCallPhase::Resolved;
            call.result = Some(ToolOutcome::WebSearch {
                schema_version: 1,
                query: "rust".to_string(),
                results: vec![],
            });
        }
        state.tool_calls.push(call);
        state
    }

    #[test]
    fn shape_is_plain_without_tool_calls() {
        let state = StreamingState::default();
        assert_eq!(completion_shape(&state), CompletionShape::PlainDone);
    }

    #[test]
    fn shape_is_resolved_when_every_call_has_an_outcome() {
        assert_eq!(
            completion_shape(&state_with_call(true)),
            CompletionShape::ToolCallsResolved
        );
    }

    #[test]
    fn shape_is_pending_while_any_call_lacks_an_outcome() {
        assert_eq!(
            completion_shape(&state_with_call(false)),
            CompletionShape::ToolCallsPending
        );
    }

    #[test]
    fn failed_calls_count_as_settled() {
        let mut state = state_with_call(false);
        state.tool_calls[0].phase = ToolCallPhase::Failed;
        assert_eq!(completion_shape(&state), CompletionShape::ToolCallsResolved);
    }

    #[test]
    fn split_keeps_id_on_record_and_suffixes_follow_up() {
        let placeholder = ThreadMessage::assistant_placeholder("thr_1");
        let mut state = state_with_call(true);
        state.assembled_content = "Here is what I found.".to_string();

        let (record, follow_up) = split_tool_call(&placeholder, &state);

        assert_eq!(record.id, placeholder.id);
        assert_eq!(record.content, " ");
        assert_eq!(record.tool_calls.as_ref().unwrap().len(), 1);
        assert!(!record.skip_save);
        assert!(record.is_complete());

        assert_eq!(follow_up.id, format!("{}_followup", placeholder.id));
        assert_eq!(follow_up.content, "Here is what I found.");
        assert!(follow_up.skip_save);
        assert!(follow_up.is_complete());
    }

    #[test]
    fn mark_reconciled_is_idempotent() {
        let mut ctx = SendContext::new(CancellationToken::new());
        assert!(ctx.mark_reconciled("msg_1"));
        assert!(!ctx.mark_reconciled("msg_1"));
        assert!(ctx.mark_reconciled("msg_2"));
    }

    #[test]
    fn apology_collapse_ends_streaming() {
        let placeholder = ThreadMessage::assistant_placeholder("thr_1");
        let message = collapse_to_apology(&placeholder, "Sorry.");
        assert_eq!(message.status, MessageStatus::Error);
        assert!(!message.is_streaming());
        assert_eq!(message.content, "Sorry.");
    }
}
