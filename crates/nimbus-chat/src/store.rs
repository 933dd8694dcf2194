use std::sync::Arc;

use tokio::sync::watch;

use nimbus_types::ThreadMessage;

/// Ordered, in-memory view of one thread — what the UI renders.
///
/// There is a single logical writer (the engine owning the conversation);
/// every mutation publishes a fresh `Arc<Vec<_>>` snapshot so subscribers
/// never observe a partially mutated list. The streaming id is a second
/// signal driving "assistant is typing / running a tool" indicators.
pub struct MessageStore {
    messages: watch::Sender<Arc<Vec<ThreadMessage>>>,
    streaming_id: watch::Sender<Option<String>>,
}

impl MessageStore {
    pub fn new() -> Self {
        let (messages, _) = watch::channel(Arc::new(Vec::new()));
        let (streaming_id, _) = watch::channel(None);
        Self {
            messages,
            streaming_id,
        }
    }

    /// Replace the whole list, e.g. with history loaded from storage.
    pub fn seed(&self, messages: Vec<ThreadMessage>) {
        self.messages.send_replace(Arc::new(messages));
    }

    pub fn snapshot(&self) -> Arc<Vec<ThreadMessage>> {
        self.messages.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<ThreadMessage>>> {
        self.messages.subscribe()
    }

    pub fn streaming_message_id(&self) -> Option<String> {
        self.streaming_id.borrow().clone()
    }

    pub fn subscribe_streaming_id(&self) -> watch::Receiver<Option<String>> {
        self.streaming_id.subscribe()
    }

    pub fn append(&self, message: ThreadMessage) {
        let streaming = message.is_streaming().then(|| message.id.clone());
        debug_assert!(
            !(message.is_streaming() && self.snapshot().iter().any(|m| m.is_streaming())),
            "only one message may stream at a time"
        );

        let mut next = self.snapshot().as_ref().clone();
        next.push(message);
        self.messages.send_replace(Arc::new(next));

        if let Some(id) = streaming {
            self.streaming_id.send_replace(Some(id));
        }
    }

    /// Swap the message with `id` for `replacement` in place.
    pub fn replace(&self, id: &str, replacement: ThreadMessage) {
        let mut next = self.snapshot().as_ref().clone();
        if let Some(slot) = next.iter_mut().find(|m| m.id == id) {
            *slot = replacement;
            self.messages.send_replace(Arc::new(next));
        }
    }

    /// Swap one message for two in a single published snapshot — the
    /// tool-call split must never be observable halfway.
    pub fn replace_with_pair(&self, id: &str, first: ThreadMessage, second: ThreadMessage) {
        let mut next = self.snapshot().as_ref().clone();
        if let Some(pos) = next.iter().position(|m| m.id == id) {
            next[pos] = first;
            next.insert(pos + 1, second);
            self.messages.send_replace(Arc::new(next));
        }
    }

    pub fn remove(&self, id: &str) {
        let mut next = self.snapshot().as_ref().clone();
        next.retain(|m| m.id != id);
        self.messages.send_replace(Arc::new(next));
    }

    pub fn clear_streaming_id(&self) {
        self.streaming_id.send_replace(None);
    }

    pub fn streaming_count(&self) -> usize {
        self.snapshot().iter().filter(|m| m.is_streaming()).count()
    }
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::new()
    }
}
