use crate::error::Result;
use crate::models::{StoredMessage, ThreadRecord};
use async_trait::async_trait;

/// Durable, append-biased log of messages per thread.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Append a message. The caller supplies `sequence_index`; appending
    /// the same (thread_id, sequence_index) twice replaces instead of
    /// duplicating, so retries are idempotent.
    async fn append(&self, message: StoredMessage) -> Result<()>;

    /// Replay a thread's log ordered by sequence index. Unknown threads
    /// yield an empty vec, not an error.
    async fn replay(&self, thread_id: &str) -> Result<Vec<StoredMessage>>;

    /// Remove all messages for a thread. No error if already absent.
    async fn delete_messages(&self, thread_id: &str) -> Result<()>;
}

/// Durable mapping thread id -> title (+ creation metadata).
#[async_trait]
pub trait ThreadDirectory: Send + Sync {
    /// Create-or-replace a thread's title. Idempotent; the creation order
    /// of an existing thread is preserved.
    async fn upsert_title(&self, thread_id: &str, title: &str) -> Result<()>;

    /// List threads newest-first by creation order. When `filter` is
    /// non-empty it is matched case-insensitively against titles.
    async fn list_threads(&self, filter: Option<&str>) -> Result<Vec<ThreadRecord>>;

    /// Change a thread's title. No-op for unknown ids.
    async fn rename(&self, thread_id: &str, new_title: &str) -> Result<()>;

    /// Remove the directory entry AND the thread's entire message log.
    /// No error if the thread never existed.
    async fn delete_thread(&self, thread_id: &str) -> Result<()>;
}

/// Combined storage surface consumed by the chat service.
pub trait ChatStore: MessageStore + ThreadDirectory {}

impl<T: MessageStore + ThreadDirectory> ChatStore for T {}
