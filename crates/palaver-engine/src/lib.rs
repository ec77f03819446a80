pub mod builder;
pub mod config;
pub mod engine;
pub mod events;
pub mod service;
pub mod title;
pub mod tools;
pub mod turn;

pub use builder::ChatServiceBuilder;
pub use config::EngineConfig;
pub use engine::{ResponderEngine, StepOutcome, StepOutput};
pub use events::TurnEvent;
pub use service::ChatService;
pub use title::{fallback_title, LlmTitleGenerator, TitleGenerator, PLACEHOLDER_TITLE};
pub use tools::{CalculatorTool, ToolHandler, ToolRegistry};
pub use turn::{TurnController, TurnHandle, TurnStatus, FAILED_MARKER, STOPPED_MARKER, TOOL_LOOP_EXCEEDED};
