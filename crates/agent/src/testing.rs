//! Test support: scripted providers and stub tools.
//!
//! Shared by the unit tests in this crate and by the gateway's session
//! tests, which drive whole turns against a scripted model.

use async_trait::async_trait;
use brook_core::error::{ProviderError, ToolError};
use brook_core::message::{Message, MessageToolCall};
use brook_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use brook_core::tool::{Tool, ToolResult};
use std::sync::Mutex;

/// A mock provider that returns a sequence of scripted responses.
///
/// Each call to `complete` returns the next response in the queue and
/// records the request it was given. Panics if more calls are made than
/// responses provided.
pub struct ScriptedProvider {
    responses: Mutex<Vec<ProviderResponse>>,
    requests: Mutex<Vec<ProviderRequest>>,
    call_count: Mutex<usize>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
            call_count: Mutex::new(0),
        }
    }

    /// A provider that returns a single text response (no tool calls).
    pub fn single_text(text: &str) -> Self {
        Self::new(vec![make_text_response(text)])
    }

    /// A provider that first requests tool calls (with no visible content),
    /// then returns a final answer.
    pub fn tool_then_answer(tool_calls: Vec<MessageToolCall>, answer: &str) -> Self {
        Self::new(vec![
            make_tool_call_response(tool_calls, ""),
            make_text_response(answer),
        ])
    }

    /// How many times `complete` was called.
    pub fn call_count(&self) -> usize {
        *self.call_count.lock().unwrap()
    }

    /// The requests seen so far, in order.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut count = self.call_count.lock().unwrap();
        let responses = self.responses.lock().unwrap();

        if *count >= responses.len() {
            panic!(
                "ScriptedProvider: no more responses (call #{}, have {})",
                *count,
                responses.len()
            );
        }

        self.requests.lock().unwrap().push(request);
        let response = responses[*count].clone();
        *count += 1;
        Ok(response)
    }
}

/// A provider that returns the same text response on every call.
///
/// Useful where a component is invoked once per turn across several turns
/// (the title summarizer) and a fixed-length script would run dry.
pub struct RepeatingProvider {
    text: String,
}

impl RepeatingProvider {
    pub fn new(text: &str) -> Self {
        Self { text: text.into() }
    }
}

#[async_trait]
impl Provider for RepeatingProvider {
    fn name(&self) -> &str {
        "repeating"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        Ok(make_text_response(&self.text))
    }
}

/// A provider that streams a fixed answer as several content chunks.
///
/// `complete` returns the chunks joined; `stream` delivers them one by one,
/// the way a real backend trickles tokens.
pub struct ChunkedTextProvider {
    chunks: Vec<String>,
}

impl ChunkedTextProvider {
    pub fn new(chunks: &[&str]) -> Self {
        Self {
            chunks: chunks.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[async_trait]
impl Provider for ChunkedTextProvider {
    fn name(&self) -> &str {
        "chunked"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        Ok(make_text_response(&self.chunks.concat()))
    }

    async fn stream(
        &self,
        _request: ProviderRequest,
    ) -> Result<
        tokio::sync::mpsc::Receiver<Result<brook_core::provider::StreamChunk, ProviderError>>,
        ProviderError,
    > {
        let (tx, rx) = tokio::sync::mpsc::channel(16);
        let chunks = self.chunks.clone();
        tokio::spawn(async move {
            for chunk in chunks {
                let _ = tx
                    .send(Ok(brook_core::provider::StreamChunk {
                        content: Some(chunk),
                        tool_calls: vec![],
                        done: false,
                        usage: None,
                    }))
                    .await;
            }
            let _ = tx
                .send(Ok(brook_core::provider::StreamChunk {
                    content: None,
                    tool_calls: vec![],
                    done: true,
                    usage: None,
                }))
                .await;
        });
        Ok(rx)
    }
}

/// A provider whose every call fails with a network error.
pub struct FailingProvider;

#[async_trait]
impl Provider for FailingProvider {
    fn name(&self) -> &str {
        "failing"
    }

    async fn complete(
        &self,
        _request: ProviderRequest,
    ) -> Result<ProviderResponse, ProviderError> {
        Err(ProviderError::Network("connection refused".into()))
    }
}

/// Create a simple text response (no tool calls).
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
        metadata: serde_json::Map::new(),
    }
}

/// Create a response with tool calls and the given visible content.
pub fn make_tool_call_response(
    tool_calls: Vec<MessageToolCall>,
    content: &str,
) -> ProviderResponse {
    let mut msg = Message::assistant(content);
    msg.tool_calls = tool_calls;
    ProviderResponse {
        message: msg,
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
        metadata: serde_json::Map::new(),
    }
}

/// Helper to create a tool call.
pub fn make_tool_call(name: &str, args: serde_json::Value) -> MessageToolCall {
    MessageToolCall {
        id: format!("call_{name}"),
        name: name.to_string(),
        arguments: serde_json::to_string(&args).unwrap(),
    }
}

/// A stub search tool returning two fixed results.
#[derive(Default)]
pub struct StubSearchTool;

impl StubSearchTool {
    /// The result URLs the stub always returns.
    pub fn urls() -> Vec<String> {
        vec![
            "https://example.com/1".into(),
            "https://example.com/2".into(),
        ]
    }
}

#[async_trait]
impl Tool for StubSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web (stub)"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let query = arguments["query"].as_str().unwrap_or("").to_string();
        let data = serde_json::json!([
            {
                "title": format!("Result one for {query}"),
                "url": "https://example.com/1",
                "snippet": "First stub result."
            },
            {
                "title": format!("Result two for {query}"),
                "url": "https://example.com/2",
                "snippet": "Second stub result."
            }
        ]);

        Ok(ToolResult {
            call_id: String::new(),
            output: serde_json::to_string(&data).unwrap(),
            data: Some(data),
        })
    }
}

/// A search tool whose every invocation fails.
pub struct FailingSearchTool;

#[async_trait]
impl Tool for FailingSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web (always fails)"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object"})
    }

    async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        Err(ToolError::ExecutionFailed {
            tool_name: "web_search".into(),
            reason: "upstream search unavailable".into(),
        })
    }
}
