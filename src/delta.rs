//! Classification of decoded SSE lines into text fragments.
//!
//! Each line yields at most one fragment. Comments, keepalives, blank
//! separators and foreign fields are ignored; the `[DONE]` sentinel signals
//! completion; a `data:` payload that fails to parse as JSON is reported as
//! incomplete so the caller can re-buffer it rather than lose it.

use crate::models::ChatCompletionChunk;

/// Literal payload marking the end of the upstream stream.
pub const DONE_SENTINEL: &str = "[DONE]";

const DATA_PREFIX: &str = "data: ";

/// The outcome of classifying one decoded line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// An incremental piece of assistant text.
    Fragment(String),
    /// The terminal sentinel; no further fragments will follow.
    Done,
    /// Nothing to extract (comment, blank, foreign field, empty delta).
    Ignored,
    /// A `data:` payload that is not (yet) valid JSON. Likely truncated
    /// mid-chunk; re-buffer and retry with more data.
    Incomplete,
}

/// Classify one decoded line and extract its fragment, if any.
pub fn extract(line: &str) -> Frame {
    if line.trim().is_empty() || line.starts_with(':') {
        return Frame::Ignored;
    }
    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        return Frame::Ignored;
    };
    let payload = payload.trim();
    if payload == DONE_SENTINEL {
        return Frame::Done;
    }

    match serde_json::from_str::<ChatCompletionChunk>(payload) {
        Ok(chunk) => {
            let content = chunk
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.delta.content);
            match content {
                Some(content) if !content.is_empty() => Frame::Fragment(content),
                _ => Frame::Ignored,
            }
        }
        Err(_) => Frame::Incomplete,
    }
}
