use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::{stream, Stream, StreamExt};

use palaver_engine::{
    CalculatorTool, ChatService, EngineConfig, ToolRegistry, TurnEvent, TurnStatus, FAILED_MARKER,
    STOPPED_MARKER, TOOL_LOOP_EXCEEDED,
};
use palaver_llm::{ChatClient, ChatRequest, ChatResponse, StreamEvent};
use palaver_store::{MemoryStore, MessageRole, MessageStore, ThreadDirectory};

/// One scripted model invocation.
#[derive(Clone)]
enum Script {
    /// Yield these events, then end the stream
    Events(Vec<StreamEvent>),
    /// Yield these events, then stay pending until cancelled
    EventsThenHang(Vec<StreamEvent>),
    /// Stay pending forever
    Hang,
    /// Fail the request outright
    Error(String),
}

struct ScriptedClient {
    scripts: Mutex<VecDeque<Script>>,
    repeat: Option<Script>,
    title_response: String,
    title_calls: AtomicUsize,
    fail_title: bool,
}

impl ScriptedClient {
    fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            repeat: None,
            title_response: "Generated Title".to_string(),
            title_calls: AtomicUsize::new(0),
            fail_title: false,
        }
    }

    /// Replays `script` for every invocation once the queue is empty.
    fn repeating(script: Script) -> Self {
        let mut client = Self::new(Vec::new());
        client.repeat = Some(script);
        client
    }

    fn with_title(mut self, title: &str) -> Self {
        self.title_response = title.to_string();
        self
    }

    fn with_failing_titles(mut self) -> Self {
        self.fail_title = true;
        self
    }

    fn title_calls(&self) -> usize {
        self.title_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatClient for ScriptedClient {
    async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse> {
        self.title_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_title {
            return Err(anyhow!("title model unavailable"));
        }
        Ok(ChatResponse {
            content: Some(self.title_response.clone()),
            tool_calls: None,
            usage: None,
            finish_reason: Some("stop".to_string()),
        })
    }

    async fn chat_stream(
        &self,
        _request: ChatRequest,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>> {
        let script = {
            let mut scripts = self.scripts.lock().unwrap();
            scripts.pop_front().or_else(|| self.repeat.clone())
        }
        .ok_or_else(|| anyhow!("scripted client exhausted"))?;

        match script {
            Script::Events(events) => Ok(stream::iter(events.into_iter().map(Ok)).boxed()),
            Script::EventsThenHang(events) => Ok(stream::iter(events.into_iter().map(Ok))
                .chain(stream::pending())
                .boxed()),
            Script::Hang => Ok(stream::pending().boxed()),
            Script::Error(message) => Err(anyhow!(message)),
        }
    }
}

fn text(content: &str) -> StreamEvent {
    StreamEvent::Message {
        content: content.to_string(),
    }
}

fn done() -> StreamEvent {
    StreamEvent::Done {
        finish_reason: Some("stop".to_string()),
    }
}

fn call_fragment(
    index: u32,
    id: Option<&str>,
    name: Option<&str>,
    arguments: Option<&str>,
) -> StreamEvent {
    StreamEvent::ToolCall {
        index,
        id: id.map(str::to_string),
        name: name.map(str::to_string),
        arguments: arguments.map(str::to_string),
    }
}

fn build_service(
    client: Arc<ScriptedClient>,
    store: Arc<MemoryStore>,
    config: EngineConfig,
    with_calculator: bool,
) -> ChatService {
    let mut tools = ToolRegistry::new();
    if with_calculator {
        tools.register(Arc::new(CalculatorTool));
    }
    ChatService::builder()
        .store(store)
        .client(client)
        .config(config)
        .tools(tools)
        .build()
        .unwrap()
}

#[tokio::test]
async fn calculator_turn_streams_persists_and_titles() {
    let client = Arc::new(
        ScriptedClient::new(vec![
            Script::Events(vec![
                call_fragment(0, Some("call_1"), Some("calculator"), Some(r#"{"first_num":2,"#)),
                call_fragment(0, None, None, Some(r#""second_num":2,"operation":"add"}"#)),
                done(),
            ]),
            Script::Events(vec![text("2 + 2 = "), text("4"), done()]),
        ])
        .with_title("Quick Math"),
    );
    let store = Arc::new(MemoryStore::new());
    let service = build_service(client.clone(), store.clone(), EngineConfig::default(), true);

    let handle = service
        .submit_message(None, "what is 2+2?")
        .await
        .unwrap();
    let thread_id = handle.thread_id().to_string();
    let events = handle.drain().await;

    let tool_result = events
        .iter()
        .find_map(|e| match e {
            TurnEvent::ToolResult {
                name,
                result,
                is_error,
                ..
            } => Some((name.clone(), result.clone(), *is_error)),
            _ => None,
        })
        .expect("tool result event");
    assert_eq!(tool_result.0, "calculator");
    assert!(!tool_result.2);
    assert_eq!(tool_result.1["result"], serde_json::json!(4.0));

    let completed = events
        .iter()
        .find_map(|e| match e {
            TurnEvent::Completed { content } => Some(content.clone()),
            _ => None,
        })
        .expect("completed event");
    assert_eq!(completed, "2 + 2 = 4");

    // Durable log: user, tool result, assistant. The tool-call request is
    // never persisted.
    let log = store.replay(&thread_id).await.unwrap();
    assert_eq!(
        log.iter().map(|m| m.role).collect::<Vec<_>>(),
        vec![MessageRole::User, MessageRole::Tool, MessageRole::Assistant]
    );
    assert_eq!(
        log.iter().map(|m| m.sequence_index).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );
    let tool_payload: serde_json::Value = serde_json::from_str(&log[1].content).unwrap();
    assert_eq!(tool_payload["result"], serde_json::json!(4.0));
    assert_eq!(log[2].content, "2 + 2 = 4");

    // First turn triggers exactly one title generation.
    let threads = store.list_threads(None).await.unwrap();
    assert_eq!(threads.len(), 1);
    assert_eq!(threads[0].title, "Quick Math");
    assert_eq!(client.title_calls(), 1);
}

#[tokio::test]
async fn stop_before_first_delta_persists_marker_only() {
    let client = Arc::new(ScriptedClient::new(vec![Script::Hang]));
    let store = Arc::new(MemoryStore::new());
    let service = build_service(client, store.clone(), EngineConfig::default(), false);

    let handle = service.submit_message(None, "hello?").await.unwrap();
    let thread_id = handle.thread_id().to_string();
    handle.cancel();
    let events = handle.drain().await;

    let stopped = events
        .iter()
        .find_map(|e| match e {
            TurnEvent::Stopped { content } => Some(content.clone()),
            _ => None,
        })
        .expect("stopped event");
    assert_eq!(stopped, STOPPED_MARKER);

    let log = store.replay(&thread_id).await.unwrap();
    assert_eq!(log.len(), 2);
    assert_eq!(log[1].role, MessageRole::Assistant);
    assert_eq!(log[1].content, STOPPED_MARKER);
}

#[tokio::test]
async fn cancel_mid_stream_keeps_partial_text() {
    let client = Arc::new(ScriptedClient::new(vec![Script::EventsThenHang(vec![
        text("Hello"),
        text(""),
        text(" world"),
    ])]));
    let store = Arc::new(MemoryStore::new());
    let service = build_service(client, store.clone(), EngineConfig::default(), false);

    let mut handle = service.submit_message(None, "greet me").await.unwrap();
    let thread_id = handle.thread_id().to_string();

    let mut deltas = Vec::new();
    while deltas.len() < 2 {
        match handle.recv().await.expect("event before cancellation") {
            TurnEvent::Delta { content } => deltas.push(content),
            _ => {}
        }
    }
    handle.cancel();
    let rest = handle.drain().await;

    // Empty fragments are dropped, never emitted as deltas.
    assert_eq!(deltas, vec!["Hello", " world"]);

    let stopped = rest
        .iter()
        .find_map(|e| match e {
            TurnEvent::Stopped { content } => Some(content.clone()),
            _ => None,
        })
        .expect("stopped event");
    assert_eq!(stopped, format!("Hello world{STOPPED_MARKER}"));

    let log = store.replay(&thread_id).await.unwrap();
    assert_eq!(log[1].content, format!("Hello world{STOPPED_MARKER}"));
}

#[tokio::test]
async fn model_failure_persists_failure_marker() {
    let client = Arc::new(ScriptedClient::new(vec![Script::Error(
        "connection reset".to_string(),
    )]));
    let store = Arc::new(MemoryStore::new());
    let service = build_service(client, store.clone(), EngineConfig::default(), false);

    let handle = service.submit_message(None, "hello").await.unwrap();
    let thread_id = handle.thread_id().to_string();
    let events = handle.drain().await;

    let failure = events
        .iter()
        .find_map(|e| match e {
            TurnEvent::Failed { message } => Some(message.clone()),
            _ => None,
        })
        .expect("failed event");
    assert!(failure.contains("connection reset"));

    // The user message survives and the failure is visible in the log.
    let log = store.replay(&thread_id).await.unwrap();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].role, MessageRole::User);
    assert!(log[1].content.ends_with(FAILED_MARKER));
}

#[tokio::test]
async fn runaway_tool_loop_hits_guardrail() {
    let client = Arc::new(ScriptedClient::repeating(Script::Events(vec![
        call_fragment(
            0,
            Some("call_loop"),
            Some("calculator"),
            Some(r#"{"first_num":1,"second_num":1,"operation":"add"}"#),
        ),
        done(),
    ])));
    let store = Arc::new(MemoryStore::new());
    let config = EngineConfig::default().with_max_tool_iterations(3);
    let service = build_service(client, store.clone(), config, true);

    let handle = service.submit_message(None, "loop forever").await.unwrap();
    let thread_id = handle.thread_id().to_string();
    let events = handle.drain().await;

    let failure = events
        .iter()
        .find_map(|e| match e {
            TurnEvent::Failed { message } => Some(message.clone()),
            _ => None,
        })
        .expect("failed event");
    assert_eq!(failure, TOOL_LOOP_EXCEEDED);

    // user + one tool result per allowed round + terminal assistant
    let log = store.replay(&thread_id).await.unwrap();
    assert_eq!(log.len(), 5);
    assert_eq!(
        log.iter().filter(|m| m.role == MessageRole::Tool).count(),
        3
    );
    assert!(log[4].content.ends_with(FAILED_MARKER));
}

#[tokio::test]
async fn unknown_tool_error_feeds_back_without_aborting() {
    let client = Arc::new(ScriptedClient::new(vec![
        Script::Events(vec![
            call_fragment(
                0,
                Some("call_1"),
                Some("calculator"),
                Some(r#"{"first_num":1,"second_num":2,"operation":"add"}"#),
            ),
            done(),
        ]),
        Script::Events(vec![text("Sorry, no calculator here."), done()]),
    ]));
    let store = Arc::new(MemoryStore::new());
    // No tools registered; the invocation fails but the turn continues.
    let service = build_service(client, store.clone(), EngineConfig::default(), false);

    let handle = service.submit_message(None, "add 1 and 2").await.unwrap();
    let thread_id = handle.thread_id().to_string();
    let events = handle.drain().await;

    let (result, is_error) = events
        .iter()
        .find_map(|e| match e {
            TurnEvent::ToolResult {
                result, is_error, ..
            } => Some((result.clone(), *is_error)),
            _ => None,
        })
        .expect("tool result event");
    assert!(is_error);
    assert!(result["error"]
        .as_str()
        .unwrap()
        .contains("unknown tool"));

    let completed = events
        .iter()
        .find_map(|e| match e {
            TurnEvent::Completed { content } => Some(content.clone()),
            _ => None,
        })
        .expect("completed event");
    assert_eq!(completed, "Sorry, no calculator here.");

    let log = store.replay(&thread_id).await.unwrap();
    assert_eq!(log[1].role, MessageRole::Tool);
    assert!(log[1].content.contains("unknown tool"));
}

#[tokio::test]
async fn title_is_generated_only_on_the_first_turn() {
    let client = Arc::new(ScriptedClient::new(vec![
        Script::Events(vec![text("Hi!"), done()]),
        Script::Events(vec![text("Hello again!"), done()]),
    ]));
    let store = Arc::new(MemoryStore::new());
    let service = build_service(client.clone(), store.clone(), EngineConfig::default(), false);

    let handle = service.submit_message(None, "hello").await.unwrap();
    let thread_id = handle.thread_id().to_string();
    handle.drain().await;

    let handle = service
        .submit_message(Some(thread_id.clone()), "hello again")
        .await
        .unwrap();
    handle.drain().await;

    assert_eq!(client.title_calls(), 1);
    let threads = store.list_threads(None).await.unwrap();
    assert_eq!(threads[0].title, "Generated Title");

    // Second turn appended onto the same log.
    let log = store.replay(&thread_id).await.unwrap();
    assert_eq!(log.len(), 4);
    assert_eq!(log[3].content, "Hello again!");
}

#[tokio::test]
async fn title_falls_back_to_truncated_prefix() {
    let client = Arc::new(
        ScriptedClient::new(vec![Script::Events(vec![text("ok"), done()])])
            .with_failing_titles(),
    );
    let store = Arc::new(MemoryStore::new());
    let service = build_service(client, store.clone(), EngineConfig::default(), false);

    let long_text = "please summarize the complete history of distributed version control";
    let handle = service.submit_message(None, long_text).await.unwrap();
    handle.drain().await;

    let threads = store.list_threads(None).await.unwrap();
    let title = &threads[0].title;
    assert!(title.ends_with('…'));
    assert_eq!(title.chars().count(), 41);
    assert!(long_text.starts_with(title.trim_end_matches('…')));
}

#[tokio::test]
async fn new_thread_appears_under_placeholder_until_titled() {
    let client = Arc::new(ScriptedClient::new(vec![Script::Hang]));
    let store = Arc::new(MemoryStore::new());
    let service = build_service(client, store.clone(), EngineConfig::default(), false);

    let handle = service.submit_message(None, "hello").await.unwrap();

    // Turn still running: the directory already lists the thread.
    let threads = store.list_threads(None).await.unwrap();
    assert_eq!(threads.len(), 1);
    assert_eq!(threads[0].title, palaver_engine::PLACEHOLDER_TITLE);

    service.stop_current_turn().await;
    let events = handle.drain().await;
    assert!(events
        .iter()
        .any(|e| matches!(e, TurnEvent::Stopped { .. })));
}

#[tokio::test]
async fn turn_status_reaches_a_terminal_state() {
    let client = Arc::new(ScriptedClient::new(vec![Script::Events(vec![
        text("done"),
        done(),
    ])]));
    let store = Arc::new(MemoryStore::new());
    let service = build_service(client, store, EngineConfig::default(), false);

    let mut handle = service.submit_message(None, "hi").await.unwrap();
    while let Some(event) = handle.recv().await {
        if matches!(event, TurnEvent::Completed { .. }) {
            break;
        }
    }
    assert_eq!(handle.status(), TurnStatus::Done);
    assert!(handle.status().is_terminal());
}
