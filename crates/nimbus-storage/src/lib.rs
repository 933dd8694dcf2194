mod database;
mod repository;
mod schema;
mod writer;

pub use database::{Database, StorageError};
pub use repository::{MessageRepository, ThreadStore};
pub use writer::{MessageWriter, StorageErrorHandler};
