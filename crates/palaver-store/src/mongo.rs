use crate::error::Result;
use crate::models::{StoredMessage, ThreadRecord};
use crate::store::{MessageStore, ThreadDirectory};
use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::{bson::doc, Client, Collection};
use serde::{Deserialize, Serialize};

/// MongoDB backend: `threads` and `messages` collections.
#[derive(Clone)]
pub struct MongoStore {
    threads: Collection<MongoThread>,
    messages: Collection<MongoMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MongoThread {
    #[serde(rename = "_id")]
    thread_id: String,
    title: String,
    created_order: i64,
    created_at: bson::DateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MongoMessage {
    id: String,
    thread_id: String,
    sequence_index: i64,
    role: crate::models::MessageRole,
    content: String,
    tool_name: Option<String>,
    tool_call_id: Option<String>,
    created_at: bson::DateTime,
}

impl MongoStore {
    pub fn new(client: &Client, db_name: &str) -> Self {
        let db = client.database(db_name);
        Self {
            threads: db.collection("threads"),
            messages: db.collection("messages"),
        }
    }
}

impl From<MongoThread> for ThreadRecord {
    fn from(t: MongoThread) -> Self {
        ThreadRecord {
            thread_id: t.thread_id,
            title: t.title,
            created_order: t.created_order.max(0) as u64,
            created_at: t.created_at.into(),
        }
    }
}

impl From<MongoMessage> for StoredMessage {
    fn from(m: MongoMessage) -> Self {
        StoredMessage {
            id: m.id,
            thread_id: m.thread_id,
            sequence_index: m.sequence_index.max(0) as u64,
            role: m.role,
            content: m.content,
            tool_name: m.tool_name,
            tool_call_id: m.tool_call_id,
            created_at: m.created_at.into(),
        }
    }
}

fn escape_regex(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if "\\^$.|?*+()[]{}".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[async_trait]
impl MessageStore for MongoStore {
    async fn append(&self, message: StoredMessage) -> Result<()> {
        let doc = MongoMessage {
            id: message.id,
            thread_id: message.thread_id.clone(),
            sequence_index: message.sequence_index as i64,
            role: message.role,
            content: message.content,
            tool_name: message.tool_name,
            tool_call_id: message.tool_call_id,
            created_at: bson::DateTime::from_millis(message.created_at.timestamp_millis()),
        };

        // Upsert on (thread_id, sequence_index) so a retried append
        // replaces rather than duplicates.
        let filter = doc! {
            "thread_id": &message.thread_id,
            "sequence_index": message.sequence_index as i64,
        };
        self.messages
            .replace_one(filter, &doc)
            .upsert(true)
            .await?;
        Ok(())
    }

    async fn replay(&self, thread_id: &str) -> Result<Vec<StoredMessage>> {
        let filter = doc! { "thread_id": thread_id };
        let messages: Vec<MongoMessage> = self
            .messages
            .find(filter)
            .sort(doc! { "sequence_index": 1 })
            .await?
            .try_collect()
            .await?;
        Ok(messages.into_iter().map(Into::into).collect())
    }

    async fn delete_messages(&self, thread_id: &str) -> Result<()> {
        self.messages
            .delete_many(doc! { "thread_id": thread_id })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ThreadDirectory for MongoStore {
    async fn upsert_title(&self, thread_id: &str, title: &str) -> Result<()> {
        // created_order/created_at are set only on insert, preserving the
        // creation order of an existing thread.
        let now = Utc::now();
        let update = doc! {
            "$set": { "title": title },
            "$setOnInsert": {
                "created_order": now.timestamp_millis(),
                "created_at": bson::DateTime::from_millis(now.timestamp_millis()),
            },
        };
        self.threads
            .update_one(doc! { "_id": thread_id }, update)
            .upsert(true)
            .await?;
        Ok(())
    }

    async fn list_threads(&self, filter: Option<&str>) -> Result<Vec<ThreadRecord>> {
        let needle = filter.map(str::trim).filter(|f| !f.is_empty());
        let query = match needle {
            Some(text) => doc! {
                "title": { "$regex": escape_regex(text), "$options": "i" }
            },
            None => doc! {},
        };

        let threads: Vec<MongoThread> = self
            .threads
            .find(query)
            .sort(doc! { "created_order": -1 })
            .await?
            .try_collect()
            .await?;
        Ok(threads.into_iter().map(Into::into).collect())
    }

    async fn rename(&self, thread_id: &str, new_title: &str) -> Result<()> {
        self.threads
            .update_one(
                doc! { "_id": thread_id },
                doc! { "$set": { "title": new_title } },
            )
            .await?;
        Ok(())
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        // Messages go first: a crash in between leaves an empty listed
        // thread, never orphaned history.
        self.messages
            .delete_many(doc! { "thread_id": thread_id })
            .await?;
        self.threads.delete_one(doc! { "_id": thread_id }).await?;
        Ok(())
    }
}
