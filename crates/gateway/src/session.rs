//! The streaming session controller — one chat turn from inbound request to
//! terminal wire event.
//!
//! A turn interleaves durable side effects with streaming:
//!
//! 1. Resolve the thread: mint a fresh identifier when the client supplied
//!    none; otherwise reuse the supplied one. An unknown identifier is not
//!    an error — the conversation row is created on the spot and history is
//!    simply empty.
//! 2. Persist the user message, unconditionally, before any model call.
//! 3. For a new conversation, emit the `checkpoint` event before anything
//!    else so the client can store the thread identifier.
//! 4. Kick off title generation, fire-and-forget; its failures are logged
//!    and never reach the stream.
//! 5. Create the empty assistant row that streamed tokens will grow.
//! 6. Reconstruct the history from the store and drive the agent loop,
//!    persisting each token before forwarding it on the wire.
//! 7. Emit `end`, exactly once, last. Failures emit `error` first; content
//!    already persisted stays as a valid partial answer.

use brook_agent::{AgentEvent, AgentLoop, PLACEHOLDER_TITLE, TitleSummarizer};
use brook_core::message::{Message, ThreadId};
use brook_core::provider::Provider;
use brook_core::store::ConversationStore;
use brook_core::tool::ToolRegistry;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::wire::WireEvent;

/// Model-call settings a turn runs with.
#[derive(Debug, Clone)]
pub struct TurnSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub max_rounds: u32,
}

/// Drives chat turns end-to-end.
pub struct SessionController {
    store: Arc<dyn ConversationStore>,
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    titles: Arc<TitleSummarizer>,
    settings: TurnSettings,
}

impl SessionController {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        titles: Arc<TitleSummarizer>,
        settings: TurnSettings,
    ) -> Self {
        Self {
            store,
            provider,
            tools,
            titles,
            settings,
        }
    }

    /// Start one chat turn. Returns the receiver the wire events arrive on;
    /// the turn itself runs on a spawned task and stops early if the
    /// receiver is dropped (client disconnect).
    pub fn stream_turn(
        &self,
        user_text: String,
        checkpoint_id: Option<String>,
    ) -> mpsc::Receiver<WireEvent> {
        let (tx, rx) = mpsc::channel::<WireEvent>(128);

        let controller = Self {
            store: self.store.clone(),
            provider: self.provider.clone(),
            tools: self.tools.clone(),
            titles: self.titles.clone(),
            settings: self.settings.clone(),
        };

        tokio::spawn(async move {
            controller.drive_turn(user_text, checkpoint_id, tx).await;
        });

        rx
    }

    async fn drive_turn(
        &self,
        user_text: String,
        checkpoint_id: Option<String>,
        tx: mpsc::Sender<WireEvent>,
    ) {
        let is_new = checkpoint_id.is_none();
        let thread_id = checkpoint_id.unwrap_or_else(|| ThreadId::new().to_string());

        info!(thread_id = %thread_id, new = is_new, "Chat turn starting");

        // A conversation row must exist before any message row. For a
        // client-supplied identifier this is an idempotent no-op when the
        // row exists, and quietly adopts unknown identifiers otherwise.
        if let Err(e) = self
            .store
            .create_conversation(&thread_id, PLACEHOLDER_TITLE)
            .await
        {
            warn!(error = %e, "Failed to create conversation row");
            return Self::fail(&tx, "could not open conversation").await;
        }

        if let Err(e) = self.store.insert_message(&thread_id, &user_text, true).await {
            warn!(error = %e, "Failed to persist user message");
            return Self::fail(&tx, "could not persist message").await;
        }

        if is_new
            && tx
                .send(WireEvent::Checkpoint {
                    checkpoint_id: thread_id.clone(),
                })
                .await
                .is_err()
        {
            return;
        }

        // Title refresh is best-effort and detached from the stream.
        let titles = self.titles.clone();
        let title_thread = thread_id.clone();
        tokio::spawn(async move {
            if let Err(e) = titles.maybe_update(&title_thread).await {
                warn!(thread_id = %title_thread, error = %e, "Title generation failed");
            }
        });

        let assistant_id = match self.store.insert_message(&thread_id, "", false).await {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "Failed to create assistant row");
                return Self::fail(&tx, "could not persist message").await;
            }
        };

        let history = match self.load_history(&thread_id, assistant_id).await {
            Ok(history) => history,
            Err(e) => {
                warn!(error = %e, "Failed to load history");
                return Self::fail(&tx, "could not load history").await;
            }
        };

        let agent = AgentLoop::new(
            self.provider.clone(),
            &self.settings.model,
            self.settings.temperature,
            self.tools.clone(),
        )
        .with_max_tokens(self.settings.max_tokens)
        .with_max_rounds(self.settings.max_rounds);

        let mut events = agent.run_stream(history);

        while let Some(event) = events.recv().await {
            match event {
                AgentEvent::Chunk { content } => {
                    // Persist first, then forward: the durable row is never
                    // behind what the client has seen.
                    if let Err(e) = self.store.append_content(assistant_id, &content).await {
                        warn!(error = %e, "Failed to append assistant content");
                        return Self::fail(&tx, "could not persist content").await;
                    }
                    if tx.send(WireEvent::Content { content }).await.is_err() {
                        return;
                    }
                }
                AgentEvent::ToolCall { input, .. } => {
                    let query = input
                        .get("query")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string();
                    if tx.send(WireEvent::SearchStart { query }).await.is_err() {
                        return;
                    }
                }
                AgentEvent::ToolResult { output, .. } => {
                    let urls = result_urls(&output);
                    if tx.send(WireEvent::SearchResults { urls }).await.is_err() {
                        return;
                    }
                }
                AgentEvent::Done {
                    rounds,
                    tool_calls,
                } => {
                    info!(thread_id = %thread_id, rounds, tool_calls, "Chat turn completed");
                    break;
                }
                AgentEvent::Error { message } => {
                    warn!(thread_id = %thread_id, error = %message, "Chat turn failed");
                    if tx.send(WireEvent::Error { message }).await.is_err() {
                        return;
                    }
                    break;
                }
            }
        }

        let _ = tx.send(WireEvent::End).await;
    }

    /// Reconstruct the model-facing history from the store: every persisted
    /// message of the thread, in order, except the assistant row this turn
    /// is about to grow.
    async fn load_history(
        &self,
        thread_id: &str,
        assistant_id: i64,
    ) -> Result<Vec<Message>, brook_core::Error> {
        let records = self.store.messages(thread_id).await?;
        Ok(records
            .into_iter()
            .filter(|r| r.id != assistant_id)
            .map(|r| {
                if r.from_user {
                    Message::user(r.content)
                } else {
                    Message::assistant(r.content)
                }
            })
            .collect())
    }

    async fn fail(tx: &mpsc::Sender<WireEvent>, message: &str) {
        let _ = tx
            .send(WireEvent::Error {
                message: message.into(),
            })
            .await;
        let _ = tx.send(WireEvent::End).await;
    }
}

/// Extract result URLs from a search tool's serialized output.
///
/// Accepts either a bare array of result objects or an object wrapping a
/// `results` array; anything unparseable yields no URLs rather than an
/// error, mirroring the permissive treatment of tool output elsewhere.
fn result_urls(output: &str) -> Vec<String> {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(output) else {
        return Vec::new();
    };

    let items = match &value {
        serde_json::Value::Array(items) => items.as_slice(),
        serde_json::Value::Object(map) => match map.get("results").and_then(|v| v.as_array()) {
            Some(items) => items.as_slice(),
            None => return Vec::new(),
        },
        _ => return Vec::new(),
    };

    items
        .iter()
        .filter_map(|item| item.get("url").and_then(|u| u.as_str()))
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use brook_agent::testing::*;
    use brook_store::SqliteStore;

    async fn controller_with(provider: Arc<dyn Provider>) -> (Arc<SessionController>, Arc<SqliteStore>) {
        let store = Arc::new(SqliteStore::new("sqlite::memory:").await.unwrap());

        let mut registry = ToolRegistry::new();
        registry.register(Box::new(StubSearchTool));

        // The summarizer gets its own model so turns and title refreshes
        // never race over one scripted response queue.
        let titles = Arc::new(TitleSummarizer::new(
            Arc::new(RepeatingProvider::new("Test Title")),
            store.clone(),
            "mock-model",
        ));

        let controller = Arc::new(SessionController::new(
            store.clone(),
            provider,
            Arc::new(registry),
            titles,
            TurnSettings {
                model: "mock-model".into(),
                temperature: 0.7,
                max_tokens: 1024,
                max_rounds: 8,
            },
        ));

        (controller, store)
    }

    async fn collect(mut rx: mpsc::Receiver<WireEvent>) -> Vec<WireEvent> {
        let mut events = vec![];
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    fn content_concat(events: &[WireEvent]) -> String {
        events
            .iter()
            .filter_map(|e| match e {
                WireEvent::Content { content } => Some(content.as_str()),
                _ => None,
            })
            .collect()
    }

    fn checkpoint_of(events: &[WireEvent]) -> Option<String> {
        events.iter().find_map(|e| match e {
            WireEvent::Checkpoint { checkpoint_id } => Some(checkpoint_id.clone()),
            _ => None,
        })
    }

    #[tokio::test]
    async fn new_turn_checkpoint_first_end_last() {
        let (controller, _store) =
            controller_with(Arc::new(ScriptedProvider::single_text("Hi there!"))).await;

        let events = collect(controller.stream_turn("Hello".into(), None)).await;
        let kinds: Vec<&str> = events.iter().map(WireEvent::kind).collect();

        assert_eq!(kinds.first(), Some(&"checkpoint"));
        assert_eq!(kinds.last(), Some(&"end"));
        assert_eq!(kinds.iter().filter(|k| **k == "end").count(), 1);
        assert_eq!(content_concat(&events), "Hi there!");
    }

    #[tokio::test]
    async fn persisted_assistant_content_equals_streamed_content() {
        let (controller, store) = controller_with(Arc::new(ChunkedTextProvider::new(&[
            "The ", "answer ", "is ", "42.",
        ])))
        .await;

        let events = collect(controller.stream_turn("What is the answer?".into(), None)).await;
        let thread_id = checkpoint_of(&events).unwrap();

        // Four separate content events, one per chunk.
        let contents: Vec<&WireEvent> = events
            .iter()
            .filter(|e| matches!(e, WireEvent::Content { .. }))
            .collect();
        assert_eq!(contents.len(), 4);

        let messages = store.messages(&thread_id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].from_user);
        assert_eq!(messages[0].content, "What is the answer?");
        assert!(!messages[1].from_user);
        assert_eq!(messages[1].content, content_concat(&events));
        assert_eq!(messages[1].content, "The answer is 42.");
    }

    #[tokio::test]
    async fn continuing_turn_has_no_checkpoint() {
        let (controller, _store) =
            controller_with(Arc::new(ScriptedProvider::single_text("First answer"))).await;

        let events = collect(controller.stream_turn("First".into(), None)).await;
        let thread_id = checkpoint_of(&events).unwrap();

        let (controller, store) =
            controller_with(Arc::new(ScriptedProvider::single_text("Second answer"))).await;
        // Reuse the identifier against a fresh controller+store: unknown
        // identifiers are adopted, not rejected.
        let events = collect(controller.stream_turn("Second".into(), Some(thread_id.clone()))).await;

        assert!(checkpoint_of(&events).is_none());
        assert_eq!(content_concat(&events), "Second answer");
        assert!(store.conversation(&thread_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn unknown_checkpoint_means_empty_history() {
        let provider = Arc::new(ScriptedProvider::single_text("Fresh start"));
        let (controller, _store) = controller_with(provider.clone()).await;

        let events =
            collect(controller.stream_turn("hello".into(), Some("ghost-thread".into()))).await;
        assert!(checkpoint_of(&events).is_none());
        assert_eq!(content_concat(&events), "Fresh start");

        // The model saw exactly one message: the new user turn.
        let request = &provider.requests()[0];
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.messages[0].content, "hello");
    }

    #[tokio::test]
    async fn history_reconstructed_across_turns() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            make_text_response("Answer one"),
            make_text_response("Answer two"),
        ]));
        let (controller, _store) = controller_with(provider.clone()).await;

        let events = collect(controller.stream_turn("Question one".into(), None)).await;
        let thread_id = checkpoint_of(&events).unwrap();

        collect(controller.stream_turn("Question two".into(), Some(thread_id))).await;

        // Second call sees: user one, assistant one, user two.
        let second = &provider.requests()[1];
        let contents: Vec<&str> = second.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["Question one", "Answer one", "Question two"]);
    }

    #[tokio::test]
    async fn tool_round_trip_wire_sequence() {
        let (controller, _store) = controller_with(Arc::new(ScriptedProvider::tool_then_answer(
            vec![make_tool_call(
                "web_search",
                serde_json::json!({"query": "lisbon weather"}),
            )],
            "Sunny, 24 degrees.",
        )))
        .await;

        let events = collect(controller.stream_turn("Weather in Lisbon?".into(), None)).await;
        let kinds: Vec<&str> = events.iter().map(WireEvent::kind).collect();

        // Pinned to this implementation's timing: the tool round streams no
        // content, so search_start/search_results lead, then the answer.
        assert_eq!(kinds[0], "checkpoint");
        assert_eq!(kinds[1], "search_start");
        assert_eq!(kinds[2], "search_results");
        assert!(kinds[3..kinds.len() - 1].iter().all(|k| *k == "content"));
        assert_eq!(kinds.last(), Some(&"end"));

        match &events[1] {
            WireEvent::SearchStart { query } => assert_eq!(query, "lisbon weather"),
            other => panic!("Expected SearchStart, got {other:?}"),
        }
        match &events[2] {
            WireEvent::SearchResults { urls } => assert_eq!(*urls, StubSearchTool::urls()),
            other => panic!("Expected SearchResults, got {other:?}"),
        }
        assert_eq!(content_concat(&events), "Sunny, 24 degrees.");
    }

    #[tokio::test]
    async fn provider_failure_emits_error_then_end() {
        let (controller, store) = controller_with(Arc::new(FailingProvider)).await;

        let events = collect(controller.stream_turn("hello".into(), None)).await;
        let kinds: Vec<&str> = events.iter().map(WireEvent::kind).collect();

        assert_eq!(kinds.first(), Some(&"checkpoint"));
        assert!(kinds.contains(&"error"));
        assert_eq!(kinds.last(), Some(&"end"));

        // The user message and the empty assistant row both survive.
        let thread_id = checkpoint_of(&events).unwrap();
        let messages = store.messages(&thread_id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, "");
    }

    #[tokio::test]
    async fn user_message_persisted_before_model_call() {
        // Even a failing turn leaves the user message behind.
        let (controller, store) = controller_with(Arc::new(FailingProvider)).await;
        let events = collect(controller.stream_turn("keep me".into(), None)).await;
        let thread_id = checkpoint_of(&events).unwrap();

        let messages = store.messages(&thread_id).await.unwrap();
        assert!(messages.iter().any(|m| m.from_user && m.content == "keep me"));
    }

    // ── result_urls unit tests ──

    #[test]
    fn urls_from_bare_array() {
        let output = r#"[{"title":"A","url":"https://a.example/"},{"title":"B","url":"https://b.example/"}]"#;
        assert_eq!(
            result_urls(output),
            vec!["https://a.example/", "https://b.example/"]
        );
    }

    #[test]
    fn urls_from_wrapped_results() {
        let output = r#"{"query":"x","results":[{"url":"https://a.example/"}]}"#;
        assert_eq!(result_urls(output), vec!["https://a.example/"]);
    }

    #[test]
    fn urls_skip_items_without_url() {
        let output = r#"[{"title":"no url"},{"url":"https://a.example/"}]"#;
        assert_eq!(result_urls(output), vec!["https://a.example/"]);
    }

    #[test]
    fn urls_from_garbage_is_empty() {
        assert!(result_urls("not json").is_empty());
        assert!(result_urls("42").is_empty());
        assert!(result_urls(r#"{"no":"results"}"#).is_empty());
    }
}
