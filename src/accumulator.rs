//! Reassembly of extracted fragments into one running message.

/// Folds a sequence of text fragments into a single growing value.
///
/// Fragments are applied in strict arrival order and never reordered or
/// dropped. The accumulator holds the only mutable copy of the assistant
/// content while a stream is in flight.
#[derive(Debug, Default)]
pub struct Accumulator {
    content: String,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Concatenate a fragment and return the new running value.
    pub fn append(&mut self, fragment: &str) -> &str {
        self.content.push_str(fragment);
        &self.content
    }

    pub fn as_str(&self) -> &str {
        &self.content
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Consume the accumulator, yielding the final message content.
    pub fn into_content(self) -> String {
        self.content
    }
}
