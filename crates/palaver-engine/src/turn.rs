use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::{mpsc, watch, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use palaver_llm::{Content, Message};
use palaver_store::{tool_call_request_for, ChatStore, StoreError, StoredMessage};

use crate::engine::{ResponderEngine, StepOutcome};
use crate::events::TurnEvent;
use crate::title::{fallback_title, TitleGenerator};
use crate::tools::ToolRegistry;

/// Appended to partial assistant text when a turn is cancelled.
pub const STOPPED_MARKER: &str = "\n\n*Stopped by user*";

/// Appended to partial assistant text when a turn fails.
pub const FAILED_MARKER: &str = "\n\n*Response failed*";

/// Failure reason reported when the tool-iteration guardrail trips.
pub const TOOL_LOOP_EXCEEDED: &str = "tool_loop_exceeded";

/// Lifecycle of a turn. Created and Streaming are transient; the other
/// three are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    Created,
    Streaming,
    Done,
    Stopped,
    Failed,
}

impl TurnStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Stopped | Self::Failed)
    }
}

/// Caller's handle to a running turn: the event stream, the cancellation
/// lever, and the current status.
pub struct TurnHandle {
    thread_id: String,
    turn_id: String,
    cancel: CancellationToken,
    events: mpsc::Receiver<TurnEvent>,
    status: watch::Receiver<TurnStatus>,
}

impl TurnHandle {
    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn turn_id(&self) -> &str {
        &self.turn_id
    }

    /// Requests cancellation. The turn finishes cleanly: any in-flight
    /// tool invocation completes and its result is persisted before the
    /// `Stopped` terminal event.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn status(&self) -> TurnStatus {
        *self.status.borrow()
    }

    /// Next event, or `None` once the turn task has finished entirely
    /// (including the title hook on first turns).
    pub async fn recv(&mut self) -> Option<TurnEvent> {
        self.events.recv().await
    }

    /// Collects every remaining event until the turn task finishes.
    pub async fn drain(mut self) -> Vec<TurnEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.events.recv().await {
            events.push(event);
        }
        events
    }
}

/// Runs one turn per call: replays history, persists the user message,
/// then drives the model/tool loop on a background task.
pub struct TurnController {
    store: Arc<dyn ChatStore>,
    engine: ResponderEngine,
    tools: Arc<ToolRegistry>,
    titles: Arc<dyn TitleGenerator>,
}

impl TurnController {
    pub fn new(
        store: Arc<dyn ChatStore>,
        engine: ResponderEngine,
        tools: Arc<ToolRegistry>,
        titles: Arc<dyn TitleGenerator>,
    ) -> Self {
        Self {
            store,
            engine,
            tools,
            titles,
        }
    }

    /// Starts a turn. The user message is persisted before this returns,
    /// so a storage failure here surfaces to the caller and no turn task
    /// is spawned. `thread_guard` serializes turns on the same thread and
    /// is held until the spawned task finishes.
    pub async fn start(
        &self,
        thread_id: &str,
        user_text: &str,
        thread_guard: OwnedMutexGuard<()>,
    ) -> Result<TurnHandle, StoreError> {
        let stored = self.store.replay(thread_id).await?;
        let is_first_turn = stored.is_empty();
        let next_seq = stored.last().map(|m| m.sequence_index + 1).unwrap_or(0);

        self.store
            .append(StoredMessage::user(thread_id, next_seq, user_text))
            .await?;

        let mut messages = Vec::with_capacity(stored.len() + 2);
        if let Some(prompt) = &self.engine.config().system_prompt {
            messages.push(Message::system(prompt.clone()));
        }
        for msg in stored {
            // Restore the tool-call request ahead of each replayed tool
            // result so the history stays model-shaped.
            if let Some(request) = tool_call_request_for(&msg) {
                messages.push(request);
            }
            match Message::try_from(msg) {
                Ok(message) => messages.push(message),
                Err(e) => warn!(thread_id, "skipping malformed stored message: {e}"),
            }
        }
        messages.push(Message::human(user_text));

        let turn_id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::channel(self.engine.config().channel_capacity);
        let (status_tx, status_rx) = watch::channel(TurnStatus::Created);
        let cancel = CancellationToken::new();

        let ctx = TurnContext {
            store: Arc::clone(&self.store),
            engine: self.engine.clone(),
            tools: Arc::clone(&self.tools),
            titles: Arc::clone(&self.titles),
            thread_id: thread_id.to_string(),
            turn_id: turn_id.clone(),
            user_text: user_text.to_string(),
            is_first_turn,
            next_seq: next_seq + 1,
            messages,
            tx,
            cancel: cancel.clone(),
            status_tx,
        };
        tokio::spawn(run_turn(ctx, thread_guard));

        Ok(TurnHandle {
            thread_id: thread_id.to_string(),
            turn_id,
            cancel,
            events: rx,
            status: status_rx,
        })
    }
}

struct TurnContext {
    store: Arc<dyn ChatStore>,
    engine: ResponderEngine,
    tools: Arc<ToolRegistry>,
    titles: Arc<dyn TitleGenerator>,
    thread_id: String,
    turn_id: String,
    user_text: String,
    is_first_turn: bool,
    next_seq: u64,
    messages: Vec<Message>,
    tx: mpsc::Sender<TurnEvent>,
    cancel: CancellationToken,
    status_tx: watch::Sender<TurnStatus>,
}

enum Terminal {
    Done,
    Stopped,
    Failed(String),
}

async fn run_turn(mut ctx: TurnContext, thread_guard: OwnedMutexGuard<()>) {
    // Released when this task ends, unblocking the next turn on the thread.
    let _guard = thread_guard;

    let _ = ctx
        .tx
        .send(TurnEvent::Started {
            thread_id: ctx.thread_id.clone(),
            turn_id: ctx.turn_id.clone(),
            timestamp: Utc::now().timestamp_millis(),
        })
        .await;
    let _ = ctx.status_tx.send(TurnStatus::Streaming);

    let mut accumulated = String::new();
    let terminal = drive(&mut ctx, &mut accumulated).await;
    finish(&ctx, accumulated, terminal).await;
}

/// The model/tool loop. Returns how the turn ended; all terminal
/// persistence happens in `finish`.
async fn drive(ctx: &mut TurnContext, accumulated: &mut String) -> Terminal {
    let tool_defs = ctx.tools.definitions();
    let max_iterations = ctx.engine.config().max_tool_iterations;
    let mut iterations = 0;

    loop {
        if ctx.cancel.is_cancelled() {
            return Terminal::Stopped;
        }

        let step = ctx
            .engine
            .step(&ctx.messages, &tool_defs, &ctx.cancel, &ctx.tx)
            .await;
        accumulated.push_str(&step.text);

        match step.outcome {
            StepOutcome::Stopped => return Terminal::Stopped,
            StepOutcome::Failed(reason) => return Terminal::Failed(reason),
            StepOutcome::Completed => {}
        }

        if step.tool_calls.is_empty() {
            return Terminal::Done;
        }
        if iterations >= max_iterations {
            warn!(
                thread_id = %ctx.thread_id,
                "tool loop guardrail hit after {iterations} rounds"
            );
            return Terminal::Failed(TOOL_LOOP_EXCEEDED.to_string());
        }
        iterations += 1;

        // The request stays in the in-memory transcript only; the durable
        // log keeps just the user/tool/assistant messages.
        ctx.messages.push(Message::AI {
            content: if step.text.is_empty() {
                None
            } else {
                Some(Content::text(step.text.clone()))
            },
            tool_calls: Some(step.tool_calls.clone()),
            name: None,
        });

        for call in step.tool_calls {
            let name = call.function.name.clone();
            let started = Instant::now();

            let (result, is_error) = match call.arguments_value() {
                Ok(arguments) => {
                    let _ = ctx
                        .tx
                        .send(TurnEvent::ToolCall {
                            id: call.id.clone(),
                            name: name.clone(),
                            arguments: arguments.clone(),
                        })
                        .await;
                    match ctx.tools.invoke(&name, arguments).await {
                        Ok(value) => (value, false),
                        Err(e) => {
                            warn!(tool = %name, "tool invocation failed: {e}");
                            (json!({ "error": e.to_string() }), true)
                        }
                    }
                }
                Err(e) => {
                    let _ = ctx
                        .tx
                        .send(TurnEvent::ToolCall {
                            id: call.id.clone(),
                            name: name.clone(),
                            arguments: Value::Null,
                        })
                        .await;
                    (json!({ "error": format!("malformed tool arguments: {e}") }), true)
                }
            };
            let duration_ms = started.elapsed().as_millis() as u64;

            let payload = result.to_string();
            let stored =
                StoredMessage::tool(&ctx.thread_id, ctx.next_seq, &name, &call.id, &payload);
            if let Err(e) = ctx.store.append(stored).await {
                error!(thread_id = %ctx.thread_id, "failed to persist tool result: {e}");
                return Terminal::Failed(e.to_string());
            }
            ctx.next_seq += 1;

            let _ = ctx
                .tx
                .send(TurnEvent::ToolResult {
                    id: call.id.clone(),
                    name,
                    result,
                    is_error,
                    duration_ms,
                })
                .await;
            ctx.messages.push(Message::tool_result(call.id, payload));
        }
    }
}

/// Persists the terminal assistant message, emits the terminal event, and
/// runs the first-turn title hook.
async fn finish(ctx: &TurnContext, accumulated: String, terminal: Terminal) {
    let (content, status) = match &terminal {
        Terminal::Done => (accumulated, TurnStatus::Done),
        Terminal::Stopped => (format!("{accumulated}{STOPPED_MARKER}"), TurnStatus::Stopped),
        Terminal::Failed(_) => (format!("{accumulated}{FAILED_MARKER}"), TurnStatus::Failed),
    };

    let stored = StoredMessage::assistant(&ctx.thread_id, ctx.next_seq, &content);
    if let Err(e) = ctx.store.append(stored).await {
        error!(thread_id = %ctx.thread_id, "failed to persist assistant message: {e}");
    }

    let _ = ctx.status_tx.send(status);
    let event = match terminal {
        Terminal::Done => TurnEvent::Completed { content },
        Terminal::Stopped => TurnEvent::Stopped { content },
        Terminal::Failed(message) => TurnEvent::Failed { message },
    };
    let _ = ctx.tx.send(event).await;

    // Title hook runs once, after the terminal event so the caller is
    // never blocked on it.
    if ctx.is_first_turn {
        let title = match ctx.titles.generate(&ctx.user_text).await {
            Ok(title) => title,
            Err(e) => {
                debug!("title generation fell back: {e}");
                fallback_title(&ctx.user_text)
            }
        };
        if let Err(e) = ctx.store.upsert_title(&ctx.thread_id, &title).await {
            error!(thread_id = %ctx.thread_id, "failed to store thread title: {e}");
        }
    }
}
