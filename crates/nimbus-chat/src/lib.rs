mod dispatch;
mod engine;
mod history;
mod reconcile;
mod reducer;
mod state;
mod store;

pub use engine::{ChatEngine, ChatError, EngineOptions, APOLOGY_MESSAGE};
pub use reconcile::{completion_shape, CompletionShape, SendContext, FOLLOW_UP_SUFFIX};
pub use reducer::{apply, EngineEvent, StateChange};
pub use state::{ReasoningState, StreamMetadata, StreamingState};
pub use store::MessageStore;
