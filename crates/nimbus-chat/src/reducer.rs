use nimbus_provider::ProtocolEvent;
use nimbus_types::{ToolCall, ToolCallPhase, ToolOutcome};

use crate::state::StreamingState;

/// The single dispatch point: everything that can change a stream's state
/// arrives here, whether it came off the wire or from an executor task.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    Protocol(ProtocolEvent),
    ToolResolved { id: String, outcome: ToolOutcome },
}

/// What a fold step changed, for the caller to act on. The reducer itself
/// never performs I/O.
#[derive(Debug, Clone, PartialEq)]
pub enum StateChange {
    ContentChanged,
    ReasoningChanged,
    /// Arguments closed and parsed; the call is ready for an executor.
    ToolCallReady {
        id: String,
        name: String,
        arguments: serde_json::Value,
    },
    /// An outcome (success or error) was attached to the call.
    ToolCallSettled { id: String },
    StreamDone,
}

/// Fold one event into the state. `now_ms` is injected so reasoning timing
/// stays deterministic under test.
pub fn apply(state: &mut StreamingState, event: EngineEvent, now_ms: i64) -> Vec<StateChange> {
    let mut changes = Vec::new();

    match event {
        EngineEvent::Protocol(ProtocolEvent::ContentDelta(text)) => {
            state.assembled_content.push_str(&text);
            changes.push(StateChange::ContentChanged);
        }

        EngineEvent::Protocol(ProtocolEvent::ReasoningDelta(text)) => {
            if state.reasoning.started_at.is_none() {
                state.reasoning.started_at = Some(now_ms);
            }
            state.reasoning.text.push_str(&text);
            changes.push(StateChange::ReasoningChanged);
        }

        EngineEvent::Protocol(ProtocolEvent::ToolCallStart { id, name }) => {
            match state.tool_call_mut(&id) {
                Some(call) => {
                    // A delta-created entry learns its name late.
                    if call.name.is_empty() {
                        call.name = name;
                    }
                }
                None => state.tool_calls.push(ToolCall::announced(id, name)),
            }
        }

        EngineEvent::Protocol(ProtocolEvent::ToolCallDelta { id, arguments }) => {
            match state.tool_call_mut(&id) {
                Some(call) => call.arguments.push_str(&arguments),
                None => {
                    // Fragments for a call whose start frame was lost still
                    // assemble; the name arrives with a later frame or the
                    // call fails at close.
                    let mut call = ToolCall::announced(id, "");
                    call.arguments = arguments;
                    state.tool_calls.push(call);
                }
            }
        }

        EngineEvent::Protocol(ProtocolEvent::ToolCallsFinished) => {
            close_open_calls(state, &mut changes);
        }

        EngineEvent::Protocol(ProtocolEvent::Usage(usage)) => {
            state.metadata.usage = Some(usage);
        }

        EngineEvent::Protocol(ProtocolEvent::Done) => {
            // A stream may end without the explicit argument terminator;
            // close whatever is still open so no call is lost.
            close_open_calls(state, &mut changes);
            if let (Some(started), None) = (state.reasoning.started_at, state.reasoning.duration_ms)
            {
                state.reasoning.duration_ms = Some((now_ms - started).max(0));
            }
            changes.push(StateChange::StreamDone);
        }

        EngineEvent::ToolResolved { id, outcome } => {
            if let Some(call) = state.tool_call_mut(&id) {
                if call.result.is_none() {
                    call.phase = if outcome.is_error() {
                        ToolCallPhase::Failed
                    } else {
                        ToolCallPhase::Resolved
                    };
                    call.result = Some(outcome.clone());
                    state.metadata.tool_results.push(outcome);
                    changes.push(StateChange::ToolCallSettled { id });
                }
            } else {
                tracing::warn!(tool_call_id = %id, "resolution for unknown tool call dropped");
            }
        }
    }

    changes
}

/// Transition every still-announced call out of the argument-assembly
/// phase. A parse failure is local to that call: it fails with an error
/// outcome and its siblings proceed untouched.
fn close_open_calls(state: &mut StreamingState, changes: &mut Vec<StateChange>) {
    let StreamingState {
        tool_calls,
        metadata,
        ..
    } = state;

    for call in tool_calls.iter_mut() {
        if call.phase != ToolCallPhase::Announced {
            continue;
        }

        let raw = if call.arguments.trim().is_empty() {
            "{}"
        } else {
            call.arguments.as_str()
        };

        match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(arguments) => {
                call.phase = ToolCallPhase::ArgumentsComplete;
                changes.push(StateChange::ToolCallReady {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    arguments,
                });
            }
            Err(e) => {
                tracing::warn!(
                    tool_call_id = %call.id,
                    tool = %call.name,
                    error = %e,
                    "tool call arguments failed to parse"
                );
                call.phase = ToolCallPhase::Failed;
                let outcome = ToolOutcome::error(
                    call.name.clone(),
                    format!("arguments were not valid JSON: {}", e),
                );
                call.result = Some(outcome.clone());
                metadata.tool_results.push(outcome);
                changes.push(StateChange::ToolCallSettled {
                    id: call.id.clone(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nimbus_types::WEB_SEARCH_TOOL;

    fn fold(state: &mut StreamingState, event: ProtocolEvent) -> Vec<StateChange> {
        apply(state, EngineEvent::Protocol(event), 1_000)
    }

    #[test]
    fn content_deltas_append_in_order() {
        let mut state = StreamingState::default();
        fold(&mut state, ProtocolEvent::ContentDelta("Hel".to_string()));
        fold(&mut state, ProtocolEvent::ContentDelta("lo".to_string()));
        assert_eq!(state.assembled_content, "Hello");
    }

    #[test]
    fn interleaved_tool_fragments_assemble_independently() {
        let mut state = StreamingState::default();
        fold(
            &mut state,
            ProtocolEvent::ToolCallStart {
                id: "tool-call-0".to_string(),
                name: WEB_SEARCH_TOOL.to_string(),
            },
        );
        fold(
            &mut state,
            ProtocolEvent::ToolCallStart {
                id: "tool-call-1".to_string(),
                name: "image_generation".to_string(),
            },
        );
        // Fragments interleave across ids.
        fold(
            &mut state,
            ProtocolEvent::ToolCallDelta {
                id: "tool-call-0".to_string(),
                arguments: "{\"query\":".to_string(),
            },
        );
        fold(
            &mut state,
            ProtocolEvent::ToolCallDelta {
                id: "tool-call-1".to_string(),
                arguments: "{\"prompt\":\"cat\"}".to_string(),
            },
        );
        fold(
            &mut state,
            ProtocolEvent::ToolCallDelta {
                id: "tool-call-0".to_string(),
                arguments: "\"rust\"}".to_string(),
            },
        );

        assert_eq!(
            state.tool_call("tool-call-0").unwrap().arguments,
            "{\"query\":\"rust\"}"
        );
        assert_eq!(
            state.tool_call("tool-call-1").unwrap().arguments,
            "{\"prompt\":\"cat\"}"
        );
    }

    #[test]
    fn finished_marks_parseable_calls_ready() {
        let mut state = StreamingState::default();
        fold(
            &mut state,
            ProtocolEvent::ToolCallStart {
                id: "tool-call-0".to_string(),
                name: WEB_SEARCH_TOOL.to_string(),
            },
        );
        fold(
            &mut state,
            ProtocolEvent::ToolCallDelta {
                id: "tool-call-0".to_string(),
                arguments: "{\"query\":\"rust\"}".to_string(),
            },
        );
        let changes = fold(&mut state, ProtocolEvent::ToolCallsFinished);

        assert!(matches!(
            &changes[0],
            StateChange::ToolCallReady { id, .. } if id == "tool-call-0"
        ));
        assert_eq!(
            state.tool_call("tool-call-0").unwrap().phase,
            ToolCallPhase::ArgumentsComplete
        );
    }

    #[test]
    fn parse_failure_is_local_to_one_call() {
        let mut state = StreamingState::default();
        for (id, args) in [("tool-call-0", "{not json"), ("tool-call-1", "{}")] {
            fold(
                &mut state,
                ProtocolEvent::ToolCallStart {
                    id: id.to_string(),
                    name: WEB_SEARCH_TOOL.to_string(),
                },
            );
            fold(
                &mut state,
                ProtocolEvent::ToolCallDelta {
                    id: id.to_string(),
                    arguments: args.to_string(),
                },
            );
        }
        fold(&mut state, ProtocolEvent::ToolCallsFinished);

        let broken = state.tool_call("tool-call-0").unwrap();
        assert_eq!(broken.phase, ToolCallPhase::Failed);
        assert!(broken.result.as_ref().unwrap().is_error());

        let fine = state.tool_call("tool-call-1").unwrap();
        assert_eq!(fine.phase, ToolCallPhase::ArgumentsComplete);
        assert!(fine.result.is_none());
    }

    #[test]
    fn empty_arguments_close_as_empty_object() {
        let mut state = StreamingState::default();
        fold(
            &mut state,
            ProtocolEvent::ToolCallStart {
                id: "tool-call-0".to_string(),
                name: WEB_SEARCH_TOOL.to_string(),
            },
        );
        let changes = fold(&mut state, ProtocolEvent::ToolCallsFinished);
        assert!(matches!(
            &changes[0],
            StateChange::ToolCallReady { arguments, .. } if arguments == &serde_json::json!({})
        ));
    }

    #[test]
    fn reasoning_tracks_start_and_duration() {
        let mut state = StreamingState::default();
        apply(
            &mut state,
            EngineEvent::Protocol(ProtocolEvent::ReasoningDelta("thinking".to_string())),
            1_000,
        );
        assert_eq!(state.reasoning.started_at, Some(1_000));

        apply(&mut state, EngineEvent::Protocol(ProtocolEvent::Done), 3_500);
        assert_eq!(state.reasoning.duration_ms, Some(2_500));
    }

    #[test]
    fn done_closes_calls_the_terminator_missed() {
        let mut state = StreamingState::default();
        fold(
            &mut state,
            ProtocolEvent::ToolCallStart {
                id: "tool-call-0".to_string(),
                name: WEB_SEARCH_TOOL.to_string(),
            },
        );
        fold(
            &mut state,
            ProtocolEvent::ToolCallDelta {
                id: "tool-call-0".to_string(),
                arguments: "{\"query\":\"x\"}".to_string(),
            },
        );
        let changes = fold(&mut state, ProtocolEvent::Done);
        assert!(changes.iter().any(|c| matches!(c, StateChange::ToolCallReady { .. })));
        assert!(changes.contains(&StateChange::StreamDone));
    }

    #[test]
    fn resolution_attaches_outcome_exactly_once() {
        let mut state = StreamingState::default();
        fold(
            &mut state,
            ProtocolEvent::ToolCallStart {
                id: "tool-call-0".to_string(),
                name: WEB_SEARCH_TOOL.to_string(),
            },
        );
        fold(&mut state, ProtocolEvent::ToolCallsFinished);

        let outcome = ToolOutcome::error(WEB_SEARCH_TOOL, "boom");
        let changes = apply(
            &mut state,
            EngineEvent::ToolResolved {
                id: "tool-call-0".to_string(),
                outcome: outcome.clone(),
            },
            2_000,
        );
        assert_eq!(
            changes,
            vec![StateChange::ToolCallSettled {
                id: "tool-call-0".to_string()
            }]
        );

        // A duplicate resolution is dropped.
        let changes = apply(
            &mut state,
            EngineEvent::ToolResolved {
                id: "tool-call-0".to_string(),
                outcome,
            },
            2_001,
        );
        assert!(changes.is_empty());
        assert_eq!(state.metadata.tool_results.len(), 1);
    }
}
