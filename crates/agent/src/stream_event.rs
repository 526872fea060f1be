//! Agent-level streaming events.
//!
//! `AgentEvent` wraps provider-level stream chunks into higher-level events
//! that the session controller translates into the client wire protocol.
//! The loop surfaces them as they occur — tokens while the model generates,
//! a tool-call notice the moment the model's output is known to request one,
//! a tool-result notice the moment the invocation returns. Nothing waits for
//! the end of the turn.

use serde::{Deserialize, Serialize};

/// Events emitted by the agent loop during streaming execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Partial text token from the model.
    Chunk { content: String },

    /// The model requested a tool invocation (emitted before execution).
    ToolCall {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    /// A tool invocation returned.
    ToolResult {
        id: String,
        name: String,
        output: String,
    },

    /// The turn is complete — the model produced a tool-call-free answer
    /// (or the round cap was reached).
    Done { rounds: u32, tool_calls: u32 },

    /// An error occurred mid-turn; no further events follow.
    Error { message: String },
}

impl AgentEvent {
    /// Short name for this event kind (used in logs).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Chunk { .. } => "chunk",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serialization_chunk() {
        let event = AgentEvent::Chunk {
            content: "Hello".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"chunk""#));
        assert!(json.contains(r#""content":"Hello""#));
    }

    #[test]
    fn event_serialization_tool_call() {
        let event = AgentEvent::ToolCall {
            id: "call_1".into(),
            name: "web_search".into(),
            input: serde_json::json!({"query": "weather in Lisbon"}),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"tool_call""#));
        assert!(json.contains(r#""name":"web_search""#));
    }

    #[test]
    fn event_serialization_done() {
        let event = AgentEvent::Done {
            rounds: 2,
            tool_calls: 1,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"done""#));
        assert!(json.contains(r#""rounds":2"#));
    }

    #[test]
    fn event_deserialization() {
        let json = r#"{"type":"chunk","content":"hi"}"#;
        let event: AgentEvent = serde_json::from_str(json).unwrap();
        match event {
            AgentEvent::Chunk { content } => assert_eq!(content, "hi"),
            _ => panic!("Wrong variant"),
        }
    }

    #[test]
    fn event_kind_names() {
        assert_eq!(
            AgentEvent::Error {
                message: "x".into()
            }
            .kind(),
            "error"
        );
        assert_eq!(
            AgentEvent::Done {
                rounds: 0,
                tool_calls: 0
            }
            .kind(),
            "done"
        );
    }
}
