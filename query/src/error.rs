use thiserror::Error;

/// A search string that does not follow the query grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid search query {input:?}: {message} at position {position}")]
pub struct SyntaxError {
    /// The query exactly as the caller supplied it.
    pub input: String,
    /// Byte offset into `input` where the problem was detected.
    pub position: usize,
    pub message: String,
}

impl SyntaxError {
    pub(crate) fn new(input: &str, position: usize, message: impl Into<String>) -> Self {
        Self {
            input: input.to_string(),
            position,
            message: message.into(),
        }
    }
}
