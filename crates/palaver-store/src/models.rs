use chrono::{DateTime, Utc};
use palaver_llm::types::FunctionCall;
use serde::{Deserialize, Serialize};

/// Directory entry for one conversation thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadRecord {
    pub thread_id: String,
    pub title: String,
    /// Monotonic creation counter; listings sort newest-first on this.
    pub created_order: u64,
    pub created_at: DateTime<Utc>,
}

/// One durable message in a thread's log.
///
/// `sequence_index` is assigned by the caller and is strictly increasing
/// within a thread; the log is keyed on (thread_id, sequence_index), so a
/// retried append replaces rather than duplicates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: String,
    pub thread_id: String,
    pub sequence_index: u64,
    pub role: MessageRole,
    pub content: String,
    pub tool_name: Option<String>,
    pub tool_call_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl StoredMessage {
    pub fn user(thread_id: impl Into<String>, sequence_index: u64, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            thread_id: thread_id.into(),
            sequence_index,
            role: MessageRole::User,
            content: content.into(),
            tool_name: None,
            tool_call_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn assistant(
        thread_id: impl Into<String>,
        sequence_index: u64,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            thread_id: thread_id.into(),
            sequence_index,
            role: MessageRole::Assistant,
            content: content.into(),
            tool_name: None,
            tool_call_id: None,
            created_at: Utc::now(),
        }
    }

    /// Tool result; `content` holds the structured result as JSON text.
    pub fn tool(
        thread_id: impl Into<String>,
        sequence_index: u64,
        tool_name: impl Into<String>,
        tool_call_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            thread_id: thread_id.into(),
            sequence_index,
            role: MessageRole::Tool,
            content: content.into(),
            tool_name: Some(tool_name.into()),
            tool_call_id: Some(tool_call_id.into()),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    Tool,
}

// Conversion: StoredMessage -> palaver_llm::Message, used when replaying a
// thread into model-facing history. Tool results become tool pseudo-messages
// (the tool-call request itself is never persisted).
impl TryFrom<StoredMessage> for palaver_llm::Message {
    type Error = anyhow::Error;

    fn try_from(msg: StoredMessage) -> Result<Self, Self::Error> {
        match msg.role {
            MessageRole::User => Ok(palaver_llm::Message::Human {
                content: palaver_llm::Content::text(msg.content),
                name: None,
            }),
            MessageRole::Assistant => Ok(palaver_llm::Message::AI {
                content: Some(palaver_llm::Content::text(msg.content)),
                tool_calls: None,
                name: None,
            }),
            MessageRole::Tool => {
                let tool_call_id = msg
                    .tool_call_id
                    .ok_or_else(|| anyhow::anyhow!("tool message missing tool_call_id"))?;
                Ok(palaver_llm::Message::Tool {
                    tool_call_id,
                    content: palaver_llm::Content::text(msg.content),
                })
            }
        }
    }
}

/// A replayed tool message needs its originating tool-call request restored
/// ahead of it for the history to be model-shaped. Used by the replay path.
pub fn tool_call_request_for(msg: &StoredMessage) -> Option<palaver_llm::Message> {
    let (Some(tool_call_id), Some(tool_name)) = (&msg.tool_call_id, &msg.tool_name) else {
        return None;
    };
    Some(palaver_llm::Message::ai_with_tools(vec![
        palaver_llm::ToolCall {
            id: tool_call_id.clone(),
            tool_type: "function".to_string(),
            function: FunctionCall {
                name: tool_name.clone(),
                arguments: "{}".to_string(),
            },
        },
    ]))
}
