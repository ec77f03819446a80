use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Events emitted over a turn's stream, consumed by the UI.
///
/// Deltas arrive strictly in emission order and concatenate with no
/// separators into the terminal event's `content`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    /// Turn accepted; streaming begins
    Started {
        thread_id: String,
        turn_id: String,
        timestamp: i64,
    },

    /// Incremental fragment of assistant text
    Delta {
        content: String,
    },

    /// The model requested a tool invocation
    ToolCall {
        id: String,
        name: String,
        arguments: Value,
    },

    /// A tool invocation finished and its result re-entered the turn
    ToolResult {
        id: String,
        name: String,
        result: Value,
        is_error: bool,
        duration_ms: u64,
    },

    /// Turn finished; `content` is the full accumulated assistant text
    Completed {
        content: String,
    },

    /// Turn cancelled; `content` is the partial text plus the stop marker
    Stopped {
        content: String,
    },

    /// Turn failed; partial text (if any) was persisted with a failure marker
    Failed {
        message: String,
    },
}
