pub mod config;
pub mod openai;
pub mod streaming;
pub mod traits;
pub mod types;

pub use traits::{ChatClient, ChatOptions, ChatRequest, ChatResponse, TokenUsage};

pub use config::{ClientFactory, ProviderConfig};
pub use openai::OpenAIClient;
pub use streaming::StreamEvent;
pub use types::{Content, FunctionCall, Message, Tool, ToolCall, ToolChoice};
