//! Replication list derived from the trust graph

use crate::builder::GraphBuilder;
use async_trait::async_trait;
use skiff_core::{FeedRef, ListError, ReplicationLister};
use std::sync::Arc;

/// [`ReplicationLister`] walking the follow graph out from the local
/// feed: everything within the hop budget, plus the local feed itself.
pub struct HopLister {
    builder: Arc<GraphBuilder>,
    origin: FeedRef,
    max_hops: u64,
}

impl HopLister {
    pub fn new(builder: Arc<GraphBuilder>, origin: FeedRef, max_hops: u64) -> Self {
        Self {
            builder,
            origin,
            max_hops,
        }
    }
}

#[async_trait]
impl ReplicationLister for HopLister {
    async fn list(&self) -> Result<Vec<FeedRef>, ListError> {
        let graph = self
            .builder
            .build()
            .await
            .map_err(|err| ListError::new(err.to_string()))?;

        let mut feeds = vec![self.origin];
        feeds.extend(graph.hops(&self.origin, self.max_hops));
        Ok(feeds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skiff_core::{ContactEvent, Relation};
    use skiff_testkit::MemoryContacts;

    fn feed(seed: u8) -> FeedRef {
        FeedRef::from_bytes([seed; 32])
    }

    #[tokio::test]
    async fn list_is_hop_set_plus_self() {
        let events = vec![
            ContactEvent::new(feed(1), feed(2), Relation::Following, 1),
            ContactEvent::new(feed(2), feed(3), Relation::Following, 1),
            ContactEvent::new(feed(3), feed(4), Relation::Following, 1),
        ];
        let builder = Arc::new(GraphBuilder::new(Arc::new(MemoryContacts::new(events))));
        let lister = HopLister::new(builder, feed(1), 2);

        let list = lister.list().await.unwrap();
        assert_eq!(list[0], feed(1));
        assert!(list.contains(&feed(2)));
        assert!(list.contains(&feed(3)));
        assert!(!list.contains(&feed(4)));
    }

    #[tokio::test]
    async fn empty_graph_lists_only_self() {
        let builder = Arc::new(GraphBuilder::new(Arc::new(MemoryContacts::new(Vec::new()))));
        let lister = HopLister::new(builder, feed(1), 3);
        assert_eq!(lister.list().await.unwrap(), vec![feed(1)]);
    }
}
