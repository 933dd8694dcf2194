use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use nimbus_provider::{
    CompletionRequest, CompletionTransport, ProtocolEvent, ToolChoice, TransportError,
};
use nimbus_storage::{MessageWriter, StorageError, StorageErrorHandler, ThreadStore};
use nimbus_tool::ToolRegistry;
use nimbus_types::{FileAttachment, ThreadMessage, ToolCallPhase};

use crate::dispatch::ToolDispatcher;
use crate::history::build_wire_history;
use crate::reconcile::{
    collapse_to_apology, completion_shape, freeze_plain, split_tool_call, CompletionShape,
    SendContext,
};
use crate::reducer::{apply, EngineEvent, StateChange};
use crate::state::StreamingState;
use crate::store::MessageStore;

/// Shown in place of the assistant's reply when generation fails.
pub const APOLOGY_MESSAGE: &str =
    "Sorry, something went wrong while generating a response. Please try again.";

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("a message is already being generated")]
    Busy,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("no previous message to retry")]
    NothingToRetry,
}

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub provider: String,
    pub model: String,
    pub instructions: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u64>,
}

impl EngineOptions {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            instructions: None,
            temperature: None,
            max_tokens: None,
        }
    }
}

/// Orchestrates one conversation thread: turns a submitted message into a
/// live, incrementally rendered reply, runs tool calls out-of-band, and
/// reconciles the result into terminal messages that are persisted exactly
/// once.
pub struct ChatEngine {
    thread_id: String,
    store: MessageStore,
    transport: Arc<dyn CompletionTransport>,
    dispatcher: ToolDispatcher,
    thread_store: Arc<dyn ThreadStore>,
    writer: MessageWriter,
    options: EngineOptions,
    is_loading: AtomicBool,
    active_cancel: Mutex<Option<CancellationToken>>,
    last_user_input: Mutex<Option<String>>,
}

struct LoadingGuard<'a>(&'a AtomicBool);

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl ChatEngine {
    pub fn new(
        thread_id: impl Into<String>,
        transport: Arc<dyn CompletionTransport>,
        registry: Arc<ToolRegistry>,
        thread_store: Arc<dyn ThreadStore>,
        options: EngineOptions,
    ) -> Self {
        Self {
            thread_id: thread_id.into(),
            store: MessageStore::new(),
            transport,
            dispatcher: ToolDispatcher::new(registry),
            thread_store: thread_store.clone(),
            writer: MessageWriter::new(thread_store),
            options,
            is_loading: AtomicBool::new(false),
            active_cancel: Mutex::new(None),
            last_user_input: Mutex::new(None),
        }
    }

    pub fn with_storage_error_handler(mut self, handler: StorageErrorHandler) -> Self {
        self.writer = MessageWriter::new(self.thread_store.clone()).with_error_handler(handler);
        self
    }

    /// Seed the in-memory store with the thread's persisted history.
    pub async fn load_history(&self) -> Result<(), StorageError> {
        let messages = self.thread_store.get_messages(&self.thread_id).await?;
        self.store.seed(messages);
        Ok(())
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading.load(Ordering::SeqCst)
    }

    /// Wait for in-flight persistence writes to settle. Shutdown helper;
    /// the chat flow itself never blocks on durability.
    pub async fn flush_persistence(&self) {
        self.writer.idle().await;
    }

    /// Cooperatively abort the active generation, if any. Already-running
    /// tool executions are left to finish; their results are discarded.
    pub fn stop_generation(&self) {
        if let Some(token) = self.active_cancel.lock().unwrap().take() {
            token.cancel();
        }
    }

    /// Replay the last submitted input as a brand-new send.
    pub async fn retry_last_message(&self) -> Result<Option<StreamingState>, ChatError> {
        let last = self
            .last_user_input
            .lock()
            .unwrap()
            .clone()
            .ok_or(ChatError::NothingToRetry)?;
        self.send_message(last).await
    }

    pub async fn send_message(
        &self,
        text: impl Into<String>,
    ) -> Result<Option<StreamingState>, ChatError> {
        self.send_message_with_files(text, Vec::new()).await
    }

    /// Run one full exchange. Resolves with the terminal `StreamingState`
    /// once the stream has ended and every tool call is reconciled, or
    /// `None` when the exchange was cancelled.
    pub async fn send_message_with_files(
        &self,
        text: impl Into<String>,
        files: Vec<FileAttachment>,
    ) -> Result<Option<StreamingState>, ChatError> {
        if self
            .is_loading
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ChatError::Busy);
        }
        let _guard = LoadingGuard(&self.is_loading);

        let text = text.into();
        *self.last_user_input.lock().unwrap() = Some(text.clone());

        let user = ThreadMessage::user(&self.thread_id, &text).with_files(files);
        self.store.append(user.clone());
        self.writer.save(user);

        let placeholder = ThreadMessage::assistant_placeholder(&self.thread_id);
        self.store.append(placeholder.clone());

        let request = self.build_request();

        let cancel = CancellationToken::new();
        *self.active_cancel.lock().unwrap() = Some(cancel.clone());
        let mut ctx = SendContext::new(cancel);

        let mut stream = match self.transport.stream_chat(request).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(error = %e, "failed to open completion stream");
                self.fail_placeholder(&placeholder);
                return Err(ChatError::Transport(e));
            }
        };

        let (events_tx, mut events_rx) = mpsc::unbounded_channel::<EngineEvent>();
        let mut state = StreamingState::new(&self.options.provider, &self.options.model);
        let mut stream_open = true;
        let mut stream_done = false;

        loop {
            let event = tokio::select! {
                _ = ctx.cancel.cancelled() => {
                    // An aborted exchange leaves no terminal message behind;
                    // in-flight executor tasks run on and their late results
                    // die with this channel.
                    self.store.remove(&placeholder.id);
                    self.store.clear_streaming_id();
                    tracing::info!(message_id = %placeholder.id, "generation cancelled");
                    return Ok(None);
                }

                item = stream.next(), if stream_open => match item {
                    Some(Ok(protocol)) => EngineEvent::Protocol(protocol),
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "completion stream failed mid-flight");
                        self.fail_placeholder(&placeholder);
                        return Err(ChatError::Transport(e));
                    }
                    None => {
                        stream_open = false;
                        // Exhaustion without an explicit terminal frame
                        // still ends the stream.
                        EngineEvent::Protocol(ProtocolEvent::Done)
                    }
                },

                resolved = events_rx.recv() => match resolved {
                    Some(event) => event,
                    None => continue,
                },
            };

            let changes = apply(&mut state, event, chrono::Utc::now().timestamp_millis());

            let mut evaluate = false;
            for change in changes {
                match change {
                    StateChange::ContentChanged | StateChange::ReasoningChanged => {
                        self.sync_placeholder(&placeholder, &state);
                    }
                    StateChange::ToolCallReady {
                        id,
                        name,
                        arguments,
                    } => {
                        if let Some(call) = state.tool_call_mut(&id) {
                            call.phase = ToolCallPhase::Executing;
                        }
                        self.sync_placeholder(&placeholder, &state);
                        self.dispatcher
                            .dispatch(id, name, arguments, events_tx.clone());
                    }
                    StateChange::ToolCallSettled { .. } => {
                        self.sync_placeholder(&placeholder, &state);
                        // Resolutions only re-evaluate completion once the
                        // stream itself has finished.
                        evaluate = evaluate || stream_done;
                    }
                    StateChange::StreamDone => {
                        stream_done = true;
                        evaluate = true;
                    }
                }
            }

            if evaluate && self.reconcile(&mut ctx, &placeholder, &state) {
                *self.active_cancel.lock().unwrap() = None;
                return Ok(Some(state));
            }
        }
    }

    /// Apply the terminal transition for the current shape. Returns true
    /// once the exchange has produced its terminal messages.
    fn reconcile(
        &self,
        ctx: &mut SendContext,
        placeholder: &ThreadMessage,
        state: &StreamingState,
    ) -> bool {
        match completion_shape(state) {
            CompletionShape::PlainDone => {
                if !ctx.mark_reconciled(&placeholder.id) {
                    return true;
                }
                let message = freeze_plain(placeholder, state);
                self.store.replace(&placeholder.id, message.clone());
                self.writer.save(message);
                self.store.clear_streaming_id();
                true
            }

            CompletionShape::ToolCallsResolved => {
                if !ctx.mark_reconciled(&placeholder.id) {
                    return true;
                }
                let (record, follow_up) = split_tool_call(placeholder, state);
                self.store
                    .replace_with_pair(&placeholder.id, record.clone(), follow_up.clone());
                self.writer.save(record);
                self.writer.save(follow_up);
                self.store.clear_streaming_id();
                true
            }

            CompletionShape::ToolCallsPending => {
                let outstanding = state
                    .tool_calls
                    .iter()
                    .filter(|call| !call.is_settled())
                    .count();
                tracing::debug!(
                    message_id = %placeholder.id,
                    outstanding,
                    "stream ended with tool calls still running"
                );
                false
            }
        }
    }

    fn sync_placeholder(&self, placeholder: &ThreadMessage, state: &StreamingState) {
        let mut updated = placeholder.clone();
        updated.content = state.assembled_content.clone();
        updated.reasoning = state.reasoning.to_reasoning();
        updated.tool_calls = (!state.tool_calls.is_empty()).then(|| state.tool_calls.clone());
        self.store.replace(&placeholder.id, updated);
    }

    fn fail_placeholder(&self, placeholder: &ThreadMessage) {
        self.store
            .replace(&placeholder.id, collapse_to_apology(placeholder, APOLOGY_MESSAGE));
        self.store.clear_streaming_id();
        *self.active_cancel.lock().unwrap() = None;
    }

    fn build_request(&self) -> CompletionRequest {
        let snapshot = self.store.snapshot();
        let mut request = CompletionRequest::new(
            &self.options.provider,
            &self.options.model,
            build_wire_history(&snapshot),
        );

        if let Some(instructions) = &self.options.instructions {
            request = request.with_instructions(instructions.clone());
        }
        let definitions = self.dispatcher.registry().definitions();
        if !definitions.is_empty() {
            request = request
                .with_tools(definitions)
                .with_tool_choice(ToolChoice::Auto);
        }
        if let Some(temperature) = self.options.temperature {
            request = request.with_temperature(temperature);
        }
        if let Some(max_tokens) = self.options.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }
        request
    }
}
