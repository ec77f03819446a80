use std::collections::BTreeMap;
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use palaver_llm::{
    ChatClient, ChatOptions, ChatRequest, FunctionCall, Message, StreamEvent, Tool, ToolCall,
    ToolChoice,
};

use crate::config::EngineConfig;
use crate::events::TurnEvent;

/// How a single model invocation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The stream ran to its end
    Completed,
    /// Cancellation was observed mid-stream
    Stopped,
    /// The request or the stream failed
    Failed(String),
}

/// Result of one model invocation: the text streamed so far, any fully
/// assembled tool calls, and how the invocation ended. Tool calls are
/// only meaningful when the outcome is `Completed`.
#[derive(Debug)]
pub struct StepOutput {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub outcome: StepOutcome,
}

impl StepOutput {
    fn ended(text: String, outcome: StepOutcome) -> Self {
        Self {
            text,
            tool_calls: Vec::new(),
            outcome,
        }
    }
}

#[derive(Default)]
struct ToolCallBuffer {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

/// Drives one streaming model invocation.
///
/// Emits `Delta` events as text arrives, accumulates tool-call fragments
/// keyed by stream index, and reacts to the cancellation token between
/// stream items. Tool execution and persistence live a level up, in the
/// turn loop.
#[derive(Clone)]
pub struct ResponderEngine {
    client: Arc<dyn ChatClient>,
    config: EngineConfig,
}

impl ResponderEngine {
    pub fn new(client: Arc<dyn ChatClient>, config: EngineConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn build_request(&self, history: &[Message], tools: &[Tool]) -> ChatRequest {
        let mut options = ChatOptions::new();
        if let Some(temp) = self.config.temperature {
            options = options.temperature(temp);
        }
        if let Some(max) = self.config.max_tokens {
            options = options.max_tokens(max);
        }
        if !tools.is_empty() {
            options = options.tools(tools.to_vec()).tool_choice(ToolChoice::auto());
        }
        ChatRequest::new(self.config.model.clone(), history.to_vec()).with_options(options)
    }

    /// Runs one model invocation to its end, to cancellation, or to error.
    pub async fn step(
        &self,
        history: &[Message],
        tools: &[Tool],
        cancel: &CancellationToken,
        events: &mpsc::Sender<TurnEvent>,
    ) -> StepOutput {
        let request = self.build_request(history, tools);

        let mut stream = match self.client.chat_stream(request).await {
            Ok(stream) => stream,
            Err(e) => return StepOutput::ended(String::new(), StepOutcome::Failed(e.to_string())),
        };

        let mut text = String::new();
        // Keyed by stream index so interleaved fragments reassemble in
        // the order the model emitted the calls.
        let mut buffers: BTreeMap<u32, ToolCallBuffer> = BTreeMap::new();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("model stream cancelled");
                    return StepOutput::ended(text, StepOutcome::Stopped);
                }
                item = stream.next() => item,
            };

            let Some(event) = next else { break };

            match event {
                Ok(StreamEvent::Message { content }) => {
                    if content.is_empty() {
                        continue;
                    }
                    text.push_str(&content);
                    if events.send(TurnEvent::Delta { content }).await.is_err() {
                        // Receiver gone; nobody is listening to this turn.
                        return StepOutput::ended(text, StepOutcome::Stopped);
                    }
                }
                Ok(StreamEvent::ToolCall {
                    index,
                    id,
                    name,
                    arguments,
                }) => {
                    let buffer = buffers.entry(index).or_default();
                    if let Some(id) = id {
                        buffer.id = Some(id);
                    }
                    if let Some(name) = name {
                        buffer.name = Some(name);
                    }
                    if let Some(fragment) = arguments {
                        buffer.arguments.push_str(&fragment);
                    }
                }
                Ok(StreamEvent::Done { .. }) => break,
                Err(e) => return StepOutput::ended(text, StepOutcome::Failed(e.to_string())),
            }
        }

        let tool_calls = buffers
            .into_values()
            .filter_map(|buffer| match (buffer.id, buffer.name) {
                (Some(id), Some(name)) => Some(ToolCall {
                    id,
                    tool_type: "function".to_string(),
                    function: FunctionCall {
                        name,
                        arguments: if buffer.arguments.is_empty() {
                            "{}".to_string()
                        } else {
                            buffer.arguments
                        },
                    },
                }),
                _ => None,
            })
            .collect();

        StepOutput {
            text,
            tool_calls,
            outcome: StepOutcome::Completed,
        }
    }
}
