use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

use nimbus_types::ThreadMessage;

use crate::database::StorageError;
use crate::repository::ThreadStore;

pub type StorageErrorHandler = Arc<dyn Fn(StorageError) + Send + Sync>;

/// Durable writes, decoupled from the UI: the in-memory thread is updated
/// before a write is even attempted, so rendering never waits on storage
/// and a failed write never rolls the thread back.
pub struct MessageWriter {
    store: Arc<dyn ThreadStore>,
    on_error: Option<StorageErrorHandler>,
    in_flight: Arc<AtomicUsize>,
    drained: Arc<Notify>,
}

impl MessageWriter {
    pub fn new(store: Arc<dyn ThreadStore>) -> Self {
        Self {
            store,
            on_error: None,
            in_flight: Arc::new(AtomicUsize::new(0)),
            drained: Arc::new(Notify::new()),
        }
    }

    pub fn with_error_handler(mut self, handler: StorageErrorHandler) -> Self {
        self.on_error = Some(handler);
        self
    }

    /// Fire-and-forget save. Ephemeral messages are skipped outright; a
    /// duplicate-key conflict means the row is already durable and is
    /// swallowed; any other failure is logged and forwarded to the error
    /// handler.
    pub fn save(&self, message: ThreadMessage) {
        if message.skip_save {
            tracing::debug!(message_id = %message.id, "skipping save for ephemeral message");
            return;
        }

        let store = self.store.clone();
        let on_error = self.on_error.clone();
        let in_flight = self.in_flight.clone();
        let drained = self.drained.clone();

        in_flight.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(async move {
            match store.append_message(&message).await {
                Ok(()) => {}
                Err(StorageError::Duplicate(id)) => {
                    tracing::debug!(message_id = %id, "message already persisted");
                }
                Err(e) => {
                    tracing::warn!(message_id = %message.id, error = %e, "failed to persist message");
                    if let Some(handler) = on_error {
                        handler(e);
                    }
                }
            }
            if in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
                drained.notify_waiters();
            }
        });
    }

    /// Wait until every spawned write has settled. Intended for shutdown
    /// paths and tests; the chat flow never calls this.
    pub async fn idle(&self) {
        while self.in_flight.load(Ordering::SeqCst) > 0 {
            let notified = self.drained.notified();
            if self.in_flight.load(Ordering::SeqCst) == 0 {
                break;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingStore {
        saved: Mutex<Vec<String>>,
        fail_with: Mutex<Option<StorageError>>,
    }

    #[async_trait]
    impl ThreadStore for RecordingStore {
        async fn get_messages(&self, _thread_id: &str) -> Result<Vec<ThreadMessage>, StorageError> {
            Ok(vec![])
        }

        async fn append_message(&self, message: &ThreadMessage) -> Result<(), StorageError> {
            if let Some(err) = self.fail_with.lock().unwrap().take() {
                return Err(err);
            }
            self.saved.lock().unwrap().push(message.id.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn ephemeral_messages_never_reach_the_store() {
        let store = Arc::new(RecordingStore::default());
        let writer = MessageWriter::new(store.clone());

        let mut msg = ThreadMessage::user("thr_1", "ephemeral");
        msg.skip_save = true;
        writer.save(msg);
        writer.idle().await;

        assert!(store.saved.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn durable_messages_are_written() {
        let store = Arc::new(RecordingStore::default());
        let writer = MessageWriter::new(store.clone());

        let msg = ThreadMessage::user("thr_1", "hello");
        let id = msg.id.clone();
        writer.save(msg);
        writer.idle().await;

        assert_eq!(*store.saved.lock().unwrap(), vec![id]);
    }

    #[tokio::test]
    async fn duplicate_conflict_is_swallowed() {
        let store = Arc::new(RecordingStore::default());
        *store.fail_with.lock().unwrap() = Some(StorageError::Duplicate("msg_x".to_string()));

        let reported: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(vec![]));
        let sink = reported.clone();
        let writer = MessageWriter::new(store).with_error_handler(Arc::new(move |e| {
            sink.lock().unwrap().push(e.to_string());
        }));

        writer.save(ThreadMessage::user("thr_1", "dup"));
        writer.idle().await;

        assert!(reported.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn other_failures_reach_the_error_handler() {
        let store = Arc::new(RecordingStore::default());
        *store.fail_with.lock().unwrap() = Some(StorageError::Query("disk full".to_string()));

        let reported: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(vec![]));
        let sink = reported.clone();
        let writer = MessageWriter::new(store).with_error_handler(Arc::new(move |e| {
            sink.lock().unwrap().push(e.to_string());
        }));

        writer.save(ThreadMessage::user("thr_1", "oops"));
        writer.idle().await;

        assert_eq!(reported.lock().unwrap().len(), 1);
    }
}
