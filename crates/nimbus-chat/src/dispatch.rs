use std::sync::Arc;

use tokio::sync::mpsc;

use nimbus_tool::ToolRegistry;

use crate::reducer::EngineEvent;

/// Runs tool calls out-of-band. Each ready call is executed exactly once on
/// its own task, so independent calls within a message proceed in parallel;
/// the outcome — error included — comes back through the send's event
/// channel and is folded like any other event.
///
/// Dispatched tasks are deliberately not cancelled with the stream: a
/// discarded send simply drops the receiving end and late outcomes go
/// nowhere.
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn dispatch(
        &self,
        call_id: String,
        tool_name: String,
        arguments: serde_json::Value,
        events: mpsc::UnboundedSender<EngineEvent>,
    ) {
        let registry = self.registry.clone();
        tokio::spawn(async move {
            tracing::debug!(tool_call_id = %call_id, tool = %tool_name, "executing tool call");
            let outcome = registry.run(&tool_name, arguments).await;
            let _ = events.send(EngineEvent::ToolResolved {
                id: call_id,
                outcome,
            });
        });
    }
}
