//! Error taxonomy for session operations.

use thiserror::Error;

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by sessions, match results and substitutions.
///
/// None of these are retried internally. Resources held by the session are
/// released on the error path exactly as on the success path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The engine rejected the pattern, the options or a substitution
    /// template, or reported a failure while matching.
    #[error("{message}")]
    Compile { message: String },

    /// A caller-supplied offset lies outside the text.
    #[error("{param} out of range: {value} (text length {limit})")]
    Range {
        param: &'static str,
        value: usize,
        limit: usize,
    },

    /// The session was disposed before this call.
    #[error("session has been disposed")]
    Disposed,

    /// The substitution pass located a different occurrence than the
    /// search that produced the match. This is a defect, never a user error.
    #[error(
        "substitution replaced a different occurrence (index={found_index}, length={found_len}) \
         than the matched one (index={index}, length={len})"
    )]
    SpanMismatch {
        index: usize,
        len: usize,
        found_index: usize,
        found_len: usize,
    },

    /// The substitution pass found no occurrence where the search found one.
    #[error("substitution found no occurrence at the matched span (index={index}, length={len})")]
    OccurrenceLost { index: usize, len: usize },
}

impl Error {
    pub(crate) fn compile(message: impl Into<String>) -> Self {
        Error::Compile {
            message: message.into(),
        }
    }

    /// True for the internal-consistency family: a search/substitution
    /// disagreement that indicates a defect in the wrapping logic.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Error::SpanMismatch { .. } | Error::OccurrenceLost { .. }
        )
    }
}
