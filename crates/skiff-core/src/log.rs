//! Interface to the per-feed append-only message log
//!
//! The log itself (storage, indexing, fsync discipline) is an external
//! collaborator. The replication core only needs the narrow surface below:
//! current head, random access by sequence, append, and a combined
//! historic-then-live subscription used by outbound feed tasks.

use crate::refs::FeedRef;
use async_trait::async_trait;
use futures::stream::BoxStream;

/// One stored message with its position in the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub sequence: i64,
    pub raw: Vec<u8>,
}

/// Failures from the message log.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// No message at the given position.
    #[error("no message at {feed}:{seq}")]
    NotFound { feed: FeedRef, seq: i64 },

    /// The underlying store failed.
    #[error("log store failed for {feed}: {reason}")]
    Store { feed: FeedRef, reason: String },
}

impl LogError {
    pub fn not_found(feed: FeedRef, seq: i64) -> Self {
        Self::NotFound { feed, seq }
    }

    pub fn store(feed: FeedRef, reason: impl Into<String>) -> Self {
        Self::Store {
            feed,
            reason: reason.into(),
        }
    }
}

/// Append-only per-feed message log.
///
/// Sequences start at 1; a head of 0 means the feed is empty locally.
#[async_trait]
pub trait MessageLog: Send + Sync {
    /// Highest sequence held locally for `feed` (0 when none).
    async fn head(&self, feed: &FeedRef) -> Result<i64, LogError>;

    /// Fetch the raw message at `seq`.
    async fn get(&self, feed: &FeedRef, seq: i64) -> Result<Vec<u8>, LogError>;

    /// Append a verified raw message, returning its assigned sequence.
    async fn append(&self, feed: &FeedRef, raw: Vec<u8>) -> Result<i64, LogError>;

    /// Stream entries of `feed` starting at `from_seq`, first replaying
    /// what is already stored and then staying open for live appends.
    async fn subscribe(
        &self,
        feed: &FeedRef,
        from_seq: i64,
    ) -> BoxStream<'static, Result<LogEntry, LogError>>;
}
