//! Conversation title generation.
//!
//! Derives a short (2–3 word) label for a conversation from the user's own
//! messages, applied only during the conversation's early life: once the
//! user has sent more than three messages the title is considered settled.
//!
//! Everything here is best-effort. A model error, a malformed response, or
//! an empty title after sanitization leaves the stored title untouched, and
//! the caller is expected to log-and-swallow rather than fail the turn.

use brook_core::message::Message;
use brook_core::provider::{Provider, ProviderRequest, ProviderResponse};
use brook_core::store::ConversationStore;
use std::sync::Arc;
use tracing::debug;

/// The title every conversation starts with, and the one value the
/// summarizer refuses to store.
pub const PLACEHOLDER_TITLE: &str = "New Chat";

/// Stop refreshing the title after this many user messages.
const USER_MESSAGE_LIMIT: u32 = 3;

/// Keep at most this many words of the model's suggestion.
const MAX_TITLE_WORDS: usize = 3;

/// Derives conversation titles from early user messages.
pub struct TitleSummarizer {
    provider: Arc<dyn Provider>,
    store: Arc<dyn ConversationStore>,
    model: String,
}

impl TitleSummarizer {
    pub fn new(
        provider: Arc<dyn Provider>,
        store: Arc<dyn ConversationStore>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            store,
            model: model.into(),
        }
    }

    /// Refresh the conversation's title if it is still early enough.
    ///
    /// Returns `Ok(true)` when a new title was stored. Counting zero user
    /// messages, or more than the limit, is a no-op — not an error.
    pub async fn maybe_update(&self, thread_id: &str) -> Result<bool, brook_core::Error> {
        let count = self.store.count_user_messages(thread_id).await?;
        if count == 0 || count > USER_MESSAGE_LIMIT {
            return Ok(false);
        }

        let user_messages = self.store.user_messages(thread_id).await?;
        let combined = user_messages
            .iter()
            .filter(|m| !m.is_empty())
            .cloned()
            .collect::<Vec<_>>()
            .join("\n\n");

        let prompt = format!(
            "Create a concise 2-3 word title (no punctuation if possible) that summarizes \
             this conversation's topic based on the user's messages so far. \
             Return only the title.\n\nUser messages so far:\n{combined}\n\nTitle:"
        );

        let response = self
            .provider
            .complete(ProviderRequest {
                model: self.model.clone(),
                messages: vec![Message::user(prompt)],
                temperature: 0.7,
                max_tokens: Some(32),
                tools: vec![],
                stream: false,
            })
            .await?;

        let raw = response_text(&response);
        let Some(title) = sanitize_title(&raw, MAX_TITLE_WORDS) else {
            debug!(thread_id, "Title suggestion empty after sanitization, keeping current title");
            return Ok(false);
        };

        if title == PLACEHOLDER_TITLE {
            return Ok(false);
        }

        let renamed = self.store.rename_conversation(thread_id, &title).await?;
        if renamed {
            debug!(thread_id, title = %title, "Conversation title updated");
        }
        Ok(renamed)
    }
}

/// Pull plain text out of a provider response.
///
/// Providers have been seen to return the text as the message content, or
/// stashed in metadata under `content` or `text`. Anything else yields an
/// empty string, which the caller treats as "no suggestion".
fn response_text(response: &ProviderResponse) -> String {
    if !response.message.content.is_empty() {
        return response.message.content.clone();
    }

    for key in ["content", "text"] {
        if let Some(text) = response.metadata.get(key).and_then(|v| v.as_str())
            && !text.is_empty()
        {
            return text.to_string();
        }
    }

    String::new()
}

/// Reduce a raw model suggestion to at most `max_words` alphanumeric words.
///
/// Surrounding whitespace and quotes are stripped, then maximal alphanumeric
/// runs are extracted and joined with single spaces. Returns `None` when
/// nothing survives.
fn sanitize_title(raw: &str, max_words: usize) -> Option<String> {
    let trimmed = raw
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\'')
        .trim();

    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();
    for c in trimmed.chars() {
        if c.is_alphanumeric() {
            current.push(c);
        } else if !current.is_empty() {
            words.push(std::mem::take(&mut current));
            if words.len() == max_words {
                break;
            }
        }
    }
    if !current.is_empty() && words.len() < max_words {
        words.push(current);
    }

    if words.is_empty() {
        return None;
    }

    words.truncate(max_words);
    Some(words.join(" "))
}
