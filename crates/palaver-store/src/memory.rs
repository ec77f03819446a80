use crate::error::Result;
use crate::models::{StoredMessage, ThreadRecord};
use crate::store::{MessageStore, ThreadDirectory};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

/// In-memory backend. The default store: single-process durable enough for
/// tests and embedding; one lock makes thread deletion atomic across the
/// directory and the message log.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    threads: HashMap<String, ThreadRecord>,
    // Per-thread log keyed by sequence index: replay order and append
    // dedupe both fall out of the BTreeMap.
    messages: HashMap<String, BTreeMap<u64, StoredMessage>>,
    next_order: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_poisoned() -> crate::error::StoreError {
        crate::error::StoreError::Storage("store lock poisoned".to_string())
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn append(&self, message: StoredMessage) -> Result<()> {
        let mut inner = self.inner.write().map_err(|_| Self::lock_poisoned())?;
        inner
            .messages
            .entry(message.thread_id.clone())
            .or_default()
            .insert(message.sequence_index, message);
        Ok(())
    }

    async fn replay(&self, thread_id: &str) -> Result<Vec<StoredMessage>> {
        let inner = self.inner.read().map_err(|_| Self::lock_poisoned())?;
        Ok(inner
            .messages
            .get(thread_id)
            .map(|log| log.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn delete_messages(&self, thread_id: &str) -> Result<()> {
        let mut inner = self.inner.write().map_err(|_| Self::lock_poisoned())?;
        inner.messages.remove(thread_id);
        Ok(())
    }
}

#[async_trait]
impl ThreadDirectory for MemoryStore {
    async fn upsert_title(&self, thread_id: &str, title: &str) -> Result<()> {
        let mut inner = self.inner.write().map_err(|_| Self::lock_poisoned())?;
        match inner.threads.get_mut(thread_id) {
            Some(record) => {
                record.title = title.to_string();
            }
            None => {
                let order = inner.next_order;
                inner.next_order += 1;
                inner.threads.insert(
                    thread_id.to_string(),
                    ThreadRecord {
                        thread_id: thread_id.to_string(),
                        title: title.to_string(),
                        created_order: order,
                        created_at: Utc::now(),
                    },
                );
            }
        }
        Ok(())
    }

    async fn list_threads(&self, filter: Option<&str>) -> Result<Vec<ThreadRecord>> {
        let inner = self.inner.read().map_err(|_| Self::lock_poisoned())?;
        let needle = filter
            .map(|f| f.trim().to_lowercase())
            .filter(|f| !f.is_empty());

        let mut threads: Vec<ThreadRecord> = inner
            .threads
            .values()
            .filter(|record| match &needle {
                Some(n) => record.title.to_lowercase().contains(n.as_str()),
                None => true,
            })
            .cloned()
            .collect();

        threads.sort_by(|a, b| b.created_order.cmp(&a.created_order));
        Ok(threads)
    }

    async fn rename(&self, thread_id: &str, new_title: &str) -> Result<()> {
        let mut inner = self.inner.write().map_err(|_| Self::lock_poisoned())?;
        if let Some(record) = inner.threads.get_mut(thread_id) {
            record.title = new_title.to_string();
        }
        Ok(())
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        let mut inner = self.inner.write().map_err(|_| Self::lock_poisoned())?;
        inner.threads.remove(thread_id);
        inner.messages.remove(thread_id);
        Ok(())
    }
}
