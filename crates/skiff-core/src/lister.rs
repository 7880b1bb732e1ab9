//! Replication list interface
//!
//! Something outside a session decides which feeds this node replicates;
//! usually a hop walk over the trust graph, sometimes a fixed list in
//! tests. Sessions only need the resulting set.

use crate::refs::FeedRef;
use async_trait::async_trait;

/// The replication list could not be produced.
#[derive(Debug, thiserror::Error)]
#[error("replication list unavailable: {reason}")]
pub struct ListError {
    pub reason: String,
}

impl ListError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Provider of the set of feeds this node wishes to replicate.
#[async_trait]
pub trait ReplicationLister: Send + Sync {
    async fn list(&self) -> Result<Vec<FeedRef>, ListError>;
}
