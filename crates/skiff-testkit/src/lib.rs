//! In-memory collaborators for exercising the replication core
//!
//! Deterministic, channel-backed stand-ins for every external interface
//! the core consumes: an append-only [`MemoryLog`] with live
//! subscriptions, a [`ChainVerifier`] over a small JSON message format, a
//! paired in-memory duplex, a scripted [`MemoryContacts`] source, a
//! [`StaticLister`], and a [`MemoryHistoryClient`] for the legacy pull
//! path. No network, no disk, no clocks.

mod contacts;
mod history;
mod log;
mod transport;
mod verify;

pub use contacts::MemoryContacts;
pub use history::MemoryHistoryClient;
pub use log::MemoryLog;
pub use transport::{duplex_pair, ChannelSink, ChannelSource, QueuedTransport};
pub use verify::{test_message, ChainVerifier};

use async_trait::async_trait;
use skiff_core::{FeedRef, ListError, ReplicationLister};

/// Replication lister over a fixed set of feeds.
pub struct StaticLister {
    feeds: Vec<FeedRef>,
}

impl StaticLister {
    pub fn new(feeds: Vec<FeedRef>) -> Self {
        Self { feeds }
    }
}

#[async_trait]
impl ReplicationLister for StaticLister {
    async fn list(&self) -> Result<Vec<FeedRef>, ListError> {
        Ok(self.feeds.clone())
    }
}
