//! The server-to-client wire protocol.
//!
//! One event per SSE `data:` line, each a small JSON envelope with a `type`
//! discriminator:
//!
//! - `checkpoint`     — the thread identifier of a newly created
//!   conversation, sent once, before any other event, so the client can
//!   store it for subsequent turns
//! - `content`        — one model output token/chunk, in generation order
//! - `search_start`   — the model requested a web search (carries the query)
//! - `search_results` — the search returned (carries the result URLs)
//! - `error`          — the turn failed mid-stream
//! - `end`            — terminal, sent exactly once, last

use serde::{Deserialize, Serialize};

/// One discriminated JSON object sent to the client over the stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireEvent {
    Checkpoint { checkpoint_id: String },
    Content { content: String },
    SearchStart { query: String },
    SearchResults { urls: Vec<String> },
    Error { message: String },
    End,
}

impl WireEvent {
    /// Short name for this event kind (used in logs and tests).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Checkpoint { .. } => "checkpoint",
            Self::Content { .. } => "content",
            Self::SearchStart { .. } => "search_start",
            Self::SearchResults { .. } => "search_results",
            Self::Error { .. } => "error",
            Self::End => "end",
        }
    }
}
