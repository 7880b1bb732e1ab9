//! Contact events feeding the trust graph
//!
//! A contact message is a statement by one feed about another: follow,
//! block, or neither. The graph builder consumes these as an ordered
//! stream; only the latest statement per (author, target) pair counts.

use crate::refs::FeedRef;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// The stance an author takes toward a target feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    /// Author follows the target.
    Following,
    /// Author blocks the target. Dominates any prior follow.
    Blocking,
    /// Author retracted both (an unfollow without a block).
    Neutral,
}

/// One contact statement, positioned by the author's own sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactEvent {
    pub author: FeedRef,
    pub target: FeedRef,
    pub relation: Relation,
    /// Sequence of the contact message in the author's feed. Orders
    /// statements from the same author so later ones win.
    pub author_seq: i64,
}

impl ContactEvent {
    pub fn new(author: FeedRef, target: FeedRef, relation: Relation, author_seq: i64) -> Self {
        Self {
            author,
            target,
            relation,
            author_seq,
        }
    }
}

/// Failure reading the contact-message log.
#[derive(Debug, thiserror::Error)]
#[error("contact source failed: {reason}")]
pub struct SourceError {
    pub reason: String,
}

impl SourceError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Lazy, ordered sequence of contact events.
///
/// Implementations must yield events ordered by (author, author_seq
/// ascending); the builder's last-write-wins rule depends on it.
pub trait ContactSource: Send + Sync {
    fn contacts(&self) -> BoxStream<'_, Result<ContactEvent, SourceError>>;
}
