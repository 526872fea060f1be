//! REST and SSE handlers.
//!
//! Endpoints:
//!
//! - `POST   /chat/stream`                        — start or continue a chat
//!   turn, streamed back as SSE wire events
//! - `GET    /conversations`                      — list conversations,
//!   newest first
//! - `GET    /conversations/{thread_id}/messages` — ordered messages of one
//!   thread (empty for unknown threads)
//! - `PUT    /conversations/{thread_id}`          — rename (404 if unknown)
//! - `DELETE /conversations/{thread_id}`          — delete, cascading to
//!   messages (404 if unknown)
//! - `GET    /health`

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event as SseEvent, Sse},
    response::Json,
    routing::{delete, get, post, put},
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info};

use crate::SharedState;

/// Build the API router.
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/chat/stream", post(chat_stream_handler))
        .route("/conversations", get(list_conversations_handler))
        .route("/conversations/{thread_id}", put(rename_conversation_handler))
        .route("/conversations/{thread_id}", delete(delete_conversation_handler))
        .route(
            "/conversations/{thread_id}/messages",
            get(list_messages_handler),
        )
        .with_state(state)
}

// ── Request / Response types ──────────────────────────────────────────────

#[derive(Deserialize)]
struct ChatRequest {
    /// The user's message.
    message: String,
    /// Thread identifier from a previous turn's `checkpoint` event
    /// (omit to start a new conversation).
    #[serde(default)]
    checkpoint_id: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct ConversationDto {
    thread_id: String,
    title: String,
    created_at: String,
}

#[derive(Serialize, Deserialize)]
struct MessageDto {
    id: i64,
    thread_id: String,
    content: String,
    from_user: bool,
    created_at: String,
}

#[derive(Deserialize)]
struct RenameRequest {
    title: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn internal_error(e: impl std::fmt::Display) -> ApiError {
    error!(error = %e, "Store operation failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: "internal error".into(),
        }),
    )
}

fn not_found() -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: "Conversation not found".into(),
        }),
    )
}

// ── Handlers ──────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `POST /chat/stream` — run one chat turn, streaming wire events back.
async fn chat_stream_handler(
    State(state): State<SharedState>,
    Json(payload): Json<ChatRequest>,
) -> Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>> {
    info!(
        continuing = payload.checkpoint_id.is_some(),
        "chat/stream request"
    );

    let rx = state
        .controller
        .stream_turn(payload.message, payload.checkpoint_id);

    let stream = ReceiverStream::new(rx).map(|event| {
        let data = serde_json::to_string(&event).unwrap_or_default();
        Ok(SseEvent::default().data(data))
    });

    Sse::new(stream)
}

async fn list_conversations_handler(
    State(state): State<SharedState>,
) -> Result<Json<Vec<ConversationDto>>, ApiError> {
    let conversations = state
        .store
        .list_conversations()
        .await
        .map_err(internal_error)?;

    Ok(Json(
        conversations
            .into_iter()
            .map(|c| ConversationDto {
                thread_id: c.thread_id,
                title: c.title,
                created_at: c.created_at.to_rfc3339(),
            })
            .collect(),
    ))
}

async fn list_messages_handler(
    State(state): State<SharedState>,
    Path(thread_id): Path<String>,
) -> Result<Json<Vec<MessageDto>>, ApiError> {
    let messages = state
        .store
        .messages(&thread_id)
        .await
        .map_err(internal_error)?;

    Ok(Json(
        messages
            .into_iter()
            .map(|m| MessageDto {
                id: m.id,
                thread_id: m.thread_id,
                content: m.content,
                from_user: m.from_user,
                created_at: m.created_at.to_rfc3339(),
            })
            .collect(),
    ))
}

async fn rename_conversation_handler(
    State(state): State<SharedState>,
    Path(thread_id): Path<String>,
    Json(payload): Json<RenameRequest>,
) -> Result<Json<ConversationDto>, ApiError> {
    let renamed = state
        .store
        .rename_conversation(&thread_id, &payload.title)
        .await
        .map_err(internal_error)?;

    if !renamed {
        return Err(not_found());
    }

    let conversation = state
        .store
        .conversation(&thread_id)
        .await
        .map_err(internal_error)?
        .ok_or_else(not_found)?;

    Ok(Json(ConversationDto {
        thread_id: conversation.thread_id,
        title: conversation.title,
        created_at: conversation.created_at.to_rfc3339(),
    }))
}

async fn delete_conversation_handler(
    State(state): State<SharedState>,
    Path(thread_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let deleted = state
        .store
        .delete_conversation(&thread_id)
        .await
        .map_err(internal_error)?;

    if !deleted {
        return Err(not_found());
    }

    Ok(StatusCode::NO_CONTENT)
}
