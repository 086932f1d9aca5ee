//! Domain and wire types for the chat engine.
//!
//! The wire types match the OpenAI-compatible chat completions format used
//! by the upstream gateway: a JSON request body with a `messages` array, and
//! streamed `chat.completion.chunk` objects carrying incremental deltas.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Titles derived from the first user message are capped at this many chars.
const MAX_TITLE_CHARS: usize = 50;

/// The author of a message.
///
/// `System` never appears in a stored conversation; it exists only so the
/// configured system prompt can be prepended to the outbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message in a conversation.
///
/// `content` is mutable while an assistant message is being streamed and
/// immutable once the stream ends. The engine is the only writer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Opaque identifier, unique within the process.
    pub id: String,
    pub role: Role,
    pub content: String,
    /// Creation time, unix milliseconds.
    pub timestamp_ms: u64,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: next_id(),
            role,
            content: content.into(),
            timestamp_ms: now_millis(),
        }
    }
}

/// A conversation header. The messages themselves live in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    /// Derived from the first user message, see [`derive_title`].
    pub title: String,
    pub created_at_ms: u64,
    /// Bumped on every appended message.
    pub updated_at_ms: u64,
}

/// Derive a conversation title from its first user message.
///
/// Messages longer than 50 characters are truncated to 47 plus an ellipsis,
/// counting characters rather than bytes so multi-byte input never splits.
pub fn derive_title(first_message: &str) -> String {
    if first_message.chars().count() > MAX_TITLE_CHARS {
        let head: String = first_message.chars().take(MAX_TITLE_CHARS - 3).collect();
        format!("{head}...")
    } else {
        first_message.to_string()
    }
}

/// Current time as unix milliseconds.
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Timestamp-plus-counter identifier (avoids adding a uuid dependency).
pub(crate) fn next_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("{timestamp:024x}-{seq:08x}")
}

/// Request body for the upstream POST /v1/chat/completions.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub messages: Vec<WireMessage>,
    pub stream: bool,
}

/// A role/content pair as sent upstream. Local ids and timestamps stay home.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: Role,
    pub content: String,
}

impl From<&Message> for WireMessage {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role,
            content: message.content.clone(),
        }
    }
}

/// One streamed `chat.completion.chunk`. Fields the engine does not consume
/// (id, model, usage, ...) are ignored rather than modelled.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionChunk {
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

/// A single choice within a chunk. `delta` defaults so metadata-only chunks
/// (bare `finish_reason`, usage frames) still deserialize.
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub delta: ChunkDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// The incremental payload of a chunk choice.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChunkDelta {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

/// JSON error envelope returned by the gateway on non-success statuses.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorEnvelope {
    pub error: String,
}
