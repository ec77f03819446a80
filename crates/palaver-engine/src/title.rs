use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;

use palaver_llm::{ChatClient, ChatRequest, Message};

/// Title shown for a thread until its first turn completes.
pub const PLACEHOLDER_TITLE: &str = "New Chat";

const TITLE_FALLBACK_MAX_CHARS: usize = 40;

/// Produces a short human-readable title from the first user message.
#[async_trait]
pub trait TitleGenerator: Send + Sync {
    async fn generate(&self, first_user_text: &str) -> Result<String>;
}

/// Asks the chat model for a title with a fixed one-shot prompt.
pub struct LlmTitleGenerator {
    client: Arc<dyn ChatClient>,
    model: String,
}

impl LlmTitleGenerator {
    pub fn new(client: Arc<dyn ChatClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl TitleGenerator for LlmTitleGenerator {
    async fn generate(&self, first_user_text: &str) -> Result<String> {
        let prompt = format!("Short title max 5 words: {first_user_text}");
        let request = ChatRequest::new(self.model.clone(), vec![Message::human(prompt)]);

        let response = self.client.chat(request).await?;
        let title = response.content.unwrap_or_default();
        let title = title.trim().trim_matches('"').trim();
        if title.is_empty() {
            bail!("model returned an empty title");
        }
        Ok(title.to_string())
    }
}

/// Deterministic title used when the model cannot produce one: a prefix
/// of the user's text, truncated on a character boundary.
pub fn fallback_title(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return PLACEHOLDER_TITLE.to_string();
    }
    if trimmed.chars().count() <= TITLE_FALLBACK_MAX_CHARS {
        return trimmed.to_string();
    }
    let mut title: String = trimmed.chars().take(TITLE_FALLBACK_MAX_CHARS).collect();
    title.push('…');
    title
}
