use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use palaver_store::{ChatStore, StoreError, StoredMessage, ThreadRecord};

use crate::builder::ChatServiceBuilder;
use crate::title::PLACEHOLDER_TITLE;
use crate::turn::{TurnController, TurnHandle};

/// Session-facing facade over the thread directory, the message log, and
/// the turn pipeline.
///
/// Read paths degrade to empty results on storage errors so the directory
/// stays browsable; write paths propagate errors to the caller.
pub struct ChatService {
    store: Arc<dyn ChatStore>,
    controller: TurnController,
    thread_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    current_turn: Mutex<Option<CancellationToken>>,
}

impl ChatService {
    pub fn builder() -> ChatServiceBuilder {
        ChatServiceBuilder::new()
    }

    pub(crate) fn new(store: Arc<dyn ChatStore>, controller: TurnController) -> Self {
        Self {
            store,
            controller,
            thread_locks: Mutex::new(HashMap::new()),
            current_turn: Mutex::new(None),
        }
    }

    /// Threads newest-first, optionally filtered by a case-insensitive
    /// title substring.
    pub async fn list_threads(&self, filter: Option<&str>) -> Vec<ThreadRecord> {
        match self.store.list_threads(filter).await {
            Ok(threads) => threads,
            Err(e) => {
                warn!("thread listing unavailable: {e}");
                Vec::new()
            }
        }
    }

    /// A thread's full message log in sequence order.
    pub async fn open_thread(&self, thread_id: &str) -> Vec<StoredMessage> {
        match self.store.replay(thread_id).await {
            Ok(messages) => messages,
            Err(e) => {
                warn!(thread_id, "thread history unavailable: {e}");
                Vec::new()
            }
        }
    }

    /// Submits a user message and starts a turn. `None` for `thread_id`
    /// creates a fresh thread under the placeholder title. Turns on the
    /// same thread are serialized; different threads run concurrently.
    pub async fn submit_message(
        &self,
        thread_id: Option<String>,
        text: &str,
    ) -> Result<TurnHandle, StoreError> {
        let thread_id = match thread_id {
            Some(id) => id,
            None => {
                let id = uuid::Uuid::new_v4().to_string();
                self.store.upsert_title(&id, PLACEHOLDER_TITLE).await?;
                info!(thread_id = %id, "created thread");
                id
            }
        };

        let lock = {
            let mut locks = self.thread_locks.lock().await;
            Arc::clone(
                locks
                    .entry(thread_id.clone())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };
        let guard = lock.lock_owned().await;

        let handle = self.controller.start(&thread_id, text, guard).await?;
        *self.current_turn.lock().await = Some(handle.cancel_token());
        Ok(handle)
    }

    /// Cancels the most recently submitted turn, if any. Idempotent.
    pub async fn stop_current_turn(&self) {
        if let Some(token) = self.current_turn.lock().await.as_ref() {
            token.cancel();
        }
    }

    pub async fn rename_thread(&self, thread_id: &str, title: &str) -> Result<(), StoreError> {
        self.store.rename(thread_id, title).await
    }

    /// Removes the thread and its entire message log.
    pub async fn delete_thread(&self, thread_id: &str) -> Result<(), StoreError> {
        self.store.delete_thread(thread_id).await?;
        self.thread_locks.lock().await.remove(thread_id);
        info!(thread_id, "deleted thread");
        Ok(())
    }
}
