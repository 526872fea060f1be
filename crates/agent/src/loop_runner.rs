//! The agent loop implementation.
//!
//! One turn alternates between two phases until the model is done:
//! call the model with the full history; if its output requests tool
//! invocations, execute them, extend the history with the tool-call message
//! and all result records, and go again. A response with no tool calls is
//! the final answer.
//!
//! Invocations naming a tool that is not registered are dropped without an
//! error or a result record — the model simply never hears back about them.
//! This permissiveness is deliberate, not a validation gap.

use brook_core::message::{Message, MessageToolCall};
use brook_core::provider::{Provider, ProviderRequest, StreamChunk};
use brook_core::tool::{ToolCall, ToolRegistry};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::stream_event::AgentEvent;

/// The core agent loop that orchestrates model calls and tool execution.
pub struct AgentLoop {
    /// The LLM provider to use
    provider: Arc<dyn Provider>,

    /// The model to use
    model: String,

    /// Temperature setting
    temperature: f32,

    /// Default max tokens per response
    max_tokens: Option<u32>,

    /// Tool registry
    tools: Arc<ToolRegistry>,

    /// Maximum model-call rounds per turn
    max_rounds: u32,
}

impl AgentLoop {
    /// Create a new agent loop.
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        temperature: f32,
        tools: Arc<ToolRegistry>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature,
            max_tokens: None,
            tools,
            max_rounds: 8,
        }
    }

    /// Set the default max tokens per model response.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Cap the number of model-call rounds per turn.
    ///
    /// When the cap is hit while the model still wants tools, the pending
    /// invocations are dropped and the round's text becomes the answer.
    pub fn with_max_rounds(mut self, max: u32) -> Self {
        self.max_rounds = max.max(1);
        self
    }

    fn request(&self, messages: Vec<Message>, stream: bool) -> ProviderRequest {
        ProviderRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools: self.tools.definitions(),
            stream,
        }
    }

    /// Execute the registered invocations among `calls`, extending `history`
    /// with one result record per executed call. Unregistered tool names are
    /// dropped silently. Returns the number of calls executed.
    ///
    /// A failing tool aborts the turn — the loop does not retry or paper
    /// over tool errors with synthetic results.
    async fn invoke_tools<F, Fut>(
        &self,
        calls: &[MessageToolCall],
        history: &mut Vec<Message>,
        mut on_event: F,
    ) -> Result<u32, brook_core::Error>
    where
        F: FnMut(AgentEvent) -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        let mut executed = 0;

        for tc in calls {
            if self.tools.get(&tc.name).is_none() {
                debug!(tool = %tc.name, "Dropping call to unregistered tool");
                continue;
            }

            let arguments: serde_json::Value =
                serde_json::from_str(&tc.arguments).unwrap_or_default();

            on_event(AgentEvent::ToolCall {
                id: tc.id.clone(),
                name: tc.name.clone(),
                input: arguments.clone(),
            })
            .await;

            let call = ToolCall {
                id: tc.id.clone(),
                name: tc.name.clone(),
                arguments,
            };

            let result = self.tools.execute(&call).await?;
            executed += 1;

            on_event(AgentEvent::ToolResult {
                id: tc.id.clone(),
                name: tc.name.clone(),
                output: result.output.clone(),
            })
            .await;

            history.push(Message::tool_result(&tc.id, &result.output));
        }

        Ok(executed)
    }

    /// Process a turn and return the final answer text.
    ///
    /// `history` is the ordered sequence of prior turns plus the new user
    /// message, reconstructed by the caller from the store.
    pub async fn run(&self, mut history: Vec<Message>) -> Result<String, brook_core::Error> {
        let mut round = 0u32;
        let mut total_tool_calls = 0u32;

        info!(model = %self.model, messages = history.len(), "Agent loop starting");

        loop {
            round += 1;
            debug!(round, "Agent loop round");

            let response = self.provider.complete(self.request(history.clone(), false)).await?;

            let tool_calls = response.message.tool_calls.clone();

            if tool_calls.is_empty() || round >= self.max_rounds {
                if !tool_calls.is_empty() {
                    warn!(round, "Round cap reached, dropping pending tool calls");
                }
                info!(rounds = round, tool_calls = total_tool_calls, "Agent loop completed");
                return Ok(response.message.content);
            }

            history.push(response.message);
            total_tool_calls += self
                .invoke_tools(&tool_calls, &mut history, |_| async {})
                .await?;
        }
    }

    /// Streaming variant of [`run`](Self::run).
    ///
    /// Returns an `mpsc::Receiver` that yields [`AgentEvent`]s as the turn
    /// progresses. The receiver is populated by a background task — the
    /// caller simply reads from it. Events are delivered before the turn's
    /// overall result is finalized; nothing is buffered until the end.
    pub fn run_stream(&self, history: Vec<Message>) -> mpsc::Receiver<AgentEvent> {
        let (tx, rx) = mpsc::channel::<AgentEvent>(128);

        let loop_runner = Self {
            provider: self.provider.clone(),
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools: self.tools.clone(),
            max_rounds: self.max_rounds,
        };

        tokio::spawn(async move {
            loop_runner.drive_stream(history, tx).await;
        });

        rx
    }

    async fn drive_stream(&self, mut history: Vec<Message>, tx: mpsc::Sender<AgentEvent>) {
        let mut round = 0u32;
        let mut total_tool_calls = 0u32;

        loop {
            round += 1;
            debug!(round, "Agent stream round");

            let mut stream_rx = match self.provider.stream(self.request(history.clone(), true)).await
            {
                Ok(rx) => rx,
                Err(e) => {
                    let _ = tx
                        .send(AgentEvent::Error {
                            message: format!("Provider error: {e}"),
                        })
                        .await;
                    return;
                }
            };

            // Accumulate the full response from streaming chunks, forwarding
            // text tokens as they arrive.
            let mut full_content = String::new();
            let mut tool_calls: Vec<MessageToolCall> = Vec::new();

            while let Some(chunk_result) = stream_rx.recv().await {
                match chunk_result {
                    Ok(chunk) => {
                        if !self
                            .consume_chunk(chunk, &mut full_content, &mut tool_calls, &tx)
                            .await
                        {
                            return; // receiver dropped, client is gone
                        }
                    }
                    Err(e) => {
                        let _ = tx
                            .send(AgentEvent::Error {
                                message: format!("Stream error: {e}"),
                            })
                            .await;
                        return;
                    }
                }
            }

            // Tool calls with empty names are stream artifacts, never real
            // invocations — a finished accumulator always has a name.
            tool_calls.retain(|tc| !tc.name.is_empty());

            if tool_calls.is_empty() || round >= self.max_rounds {
                if !tool_calls.is_empty() {
                    warn!(round, "Round cap reached, dropping pending tool calls");
                }
                let _ = tx
                    .send(AgentEvent::Done {
                        rounds: round,
                        tool_calls: total_tool_calls,
                    })
                    .await;
                return;
            }

            let mut assistant_msg = Message::assistant(&full_content);
            assistant_msg.tool_calls = tool_calls.clone();
            history.push(assistant_msg);

            let invoked = self
                .invoke_tools(&tool_calls, &mut history, |event| {
                    let tx = tx.clone();
                    async move {
                        let _ = tx.send(event).await;
                    }
                })
                .await;

            match invoked {
                Ok(n) => total_tool_calls += n,
                Err(e) => {
                    let _ = tx
                        .send(AgentEvent::Error {
                            message: format!("Tool error: {e}"),
                        })
                        .await;
                    return;
                }
            }
        }
    }

    /// Fold one provider chunk into the round's accumulators, forwarding
    /// content tokens. Returns `false` when the event receiver is gone.
    async fn consume_chunk(
        &self,
        chunk: StreamChunk,
        full_content: &mut String,
        tool_calls: &mut Vec<MessageToolCall>,
        tx: &mpsc::Sender<AgentEvent>,
    ) -> bool {
        if let Some(ref text) = chunk.content
            && !text.is_empty()
        {
            full_content.push_str(text);
            if tx
                .send(AgentEvent::Chunk {
                    content: text.clone(),
                })
                .await
                .is_err()
            {
                return false;
            }
        }

        for tc in chunk.tool_calls {
            if let Some(existing) = tool_calls.iter_mut().find(|t| t.id == tc.id) {
                existing.arguments.push_str(&tc.arguments);
            } else {
                tool_calls.push(tc);
            }
        }

        true
    }
}
