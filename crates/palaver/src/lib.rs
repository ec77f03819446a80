//! # Palaver - Conversational Chat Core
//!
//! Palaver is the engine room of a chat application:
//! - **Durable threads**: a searchable directory plus an append-biased message log
//! - **Streaming turns**: token-by-token assistant output with mid-stream tool calls
//! - **Clean cancellation**: stop a turn at any point and keep the partial text
//! - **Auto titling**: first turn of a thread names it, with a deterministic fallback
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use palaver::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let service = ChatService::builder()
//!         .store(Arc::new(MemoryStore::new()))
//!         .client(Arc::new(OpenAIClient::new(std::env::var("OPENAI_API_KEY")?)?))
//!         .tool(Arc::new(CalculatorTool))
//!         .build()?;
//!
//!     let mut turn = service.submit_message(None, "What is 2 + 2?").await?;
//!     while let Some(event) = turn.recv().await {
//!         match event {
//!             TurnEvent::Delta { content } => print!("{content}"),
//!             TurnEvent::Completed { .. } => println!(),
//!             _ => {}
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! Palaver consists of three composable crates:
//!
//! - **palaver-llm**: chat-model clients (OpenAI-compatible, with SSE streaming)
//! - **palaver-store**: the thread directory and message log (in-memory, MongoDB)
//! - **palaver-engine**: the turn pipeline (streaming, tools, cancellation, titles)
//!
//! ## Features
//!
//! - `mongodb`: MongoDB-backed storage via `palaver_store::MongoStore`

pub use palaver_engine as engine;
pub use palaver_llm as llm;
pub use palaver_store as store;

pub use palaver_engine::{
    CalculatorTool, ChatService, ChatServiceBuilder, EngineConfig, TitleGenerator, ToolHandler,
    ToolRegistry, TurnEvent, TurnHandle, TurnStatus,
};
pub use palaver_llm::{ChatClient, Content, Message, OpenAIClient};
pub use palaver_store::{ChatStore, MemoryStore, StoredMessage, ThreadRecord};

/// Convenient prelude with commonly used types
pub mod prelude {
    pub use crate::engine::{
        CalculatorTool, ChatService, EngineConfig, ToolHandler, ToolRegistry, TurnEvent,
        TurnHandle, TurnStatus,
    };
    pub use crate::llm::{ChatClient, Content, Message, OpenAIClient};
    pub use crate::store::{ChatStore, MemoryStore, MessageRole, StoredMessage, ThreadRecord};
    pub use anyhow::Result;
}
