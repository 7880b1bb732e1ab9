//! State-matrix error taxonomy

use skiff_core::{FeedRef, RefError};

/// Errors from loading or persisting frontiers.
#[derive(Debug, thiserror::Error)]
pub enum MatrixError {
    /// The peer's state file did not decode. Operator action: the caller
    /// decides whether to discard the file.
    #[error("state file for {peer} is corrupt")]
    Corrupt {
        peer: FeedRef,
        #[source]
        source: serde_json::Error,
    },

    /// Reading or writing a state file failed; retriable.
    #[error("state i/o failed for {peer}")]
    Io {
        peer: FeedRef,
        #[source]
        source: std::io::Error,
    },

    /// A stored frontier key was not a parseable feed ref.
    #[error("bad ref in state matrix")]
    Ref(#[from] RefError),
}

impl MatrixError {
    pub fn corrupt(peer: FeedRef, source: serde_json::Error) -> Self {
        Self::Corrupt { peer, source }
    }

    pub fn io(peer: FeedRef, source: std::io::Error) -> Self {
        Self::Io { peer, source }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io { .. })
    }
}
