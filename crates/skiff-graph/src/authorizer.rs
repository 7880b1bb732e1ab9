//! Hop-bounded admission over the trust graph
//!
//! The authorizer answers one question: should a connection from the
//! configured origin to some candidate feed be admitted for replication?
//! Admission is a pure function of the graph snapshot, the origin, and
//! the hop budget, so repeated calls against the same snapshot always
//! agree.

use crate::builder::GraphBuilder;
use crate::error::GraphError;
use skiff_core::FeedRef;
use std::sync::Arc;
use tracing::{debug, warn};

/// How an admission was reached. The two bootstrap variants are
/// concessions and surfaced distinctly so operators can see them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// A follow path within the hop budget exists.
    Granted,
    /// The graph has no nodes yet; admitted on first use.
    TrustOnFirstUse,
    /// The origin itself is not in the graph, which happens while a
    /// fresh key resyncs its own feed from the network; admitted.
    BootstrapOrigin,
}

/// Decides admission for one origin and hop budget.
pub struct Authorizer {
    builder: Arc<GraphBuilder>,
    origin: FeedRef,
    max_hops: u64,
}

impl Authorizer {
    pub fn new(builder: Arc<GraphBuilder>, origin: FeedRef, max_hops: u64) -> Self {
        Self {
            builder,
            origin,
            max_hops,
        }
    }

    pub fn max_hops(&self) -> u64 {
        self.max_hops
    }

    /// Admit or refuse `to`.
    ///
    /// Ok holds the admission verdict; Err is a refusal or a build
    /// failure. A direct block always refuses, whatever detours exist.
    pub async fn authorize(&self, to: &FeedRef) -> Result<Verdict, GraphError> {
        let graph = self.builder.build().await?;

        if graph.node_count() == 0 {
            warn!(peer = %to.short(), "admitting peer: trust on first use");
            return Ok(Verdict::TrustOnFirstUse);
        }

        if graph.blocks(&self.origin, to) {
            return Err(GraphError::out_of_reach(*to, f64::INFINITY, self.max_hops));
        }

        if graph.follows(&self.origin, to) {
            debug!(peer = %to.short(), "admitting peer: direct follow");
            return Ok(Verdict::Granted);
        }

        let lookup = match graph.dijkstra(&self.origin) {
            Ok(lookup) => lookup,
            Err(GraphError::NoSuchFrom { .. }) => {
                warn!(origin = %self.origin.short(), "origin not in graph yet, admitting for resync");
                return Ok(Verdict::BootstrapOrigin);
            }
            Err(err) => return Err(err),
        };

        let dist = lookup.dist(to);
        debug!(peer = %to.short(), dist, "computed hop distance");
        if dist.is_infinite() || dist.floor() as u64 > self.max_hops {
            return Err(GraphError::out_of_reach(*to, dist, self.max_hops));
        }

        Ok(Verdict::Granted)
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

    fn authorizer(events: Vec<ContactEvent>, origin: FeedRef, max_hops: u64) -> Authorizer {
        let builder = Arc::new(GraphBuilder::new(Arc::new(MemoryContacts::new(events))));
        Authorizer::new(builder, origin, max_hops)
    }

    #[tokio::test]
    async fn empty_graph_admits_on_first_use() {
        let auth = authorizer(Vec::new(), feed(1), 2);
        assert_eq!(
            auth.authorize(&feed(2)).await.unwrap(),
            Verdict::TrustOnFirstUse
        );
    }

    #[tokio::test]
    async fn two_hop_path_within_budget() {
        let events = vec![
            ContactEvent::new(feed(1), feed(10), Relation::Following, 1),
            ContactEvent::new(feed(10), feed(2), Relation::Following, 1),
        ];
        let auth = authorizer(events.clone(), feed(1), 2);
        assert_eq!(auth.authorize(&feed(2)).await.unwrap(), Verdict::Granted);

        let tight = authorizer(events, feed(1), 1);
        match tight.authorize(&feed(2)).await {
            Err(GraphError::OutOfReach { dist, max, .. }) => {
                assert_eq!(dist, 2.0);
                assert_eq!(max, 1);
            }
            other => panic!("expected OutOfReach, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn block_dominates_follow() {
        let events = vec![
            ContactEvent::new(feed(1), feed(2), Relation::Following, 1),
            ContactEvent::new(feed(1), feed(2), Relation::Blocking, 2),
        ];
        let auth = authorizer(events, feed(1), 2);
        match auth.authorize(&feed(2)).await {
            Err(GraphError::OutOfReach { dist, .. }) => assert_eq!(dist, f64::INFINITY),
            other => panic!("expected OutOfReach, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn direct_block_beats_any_detour() {
        let events = vec![
            ContactEvent::new(feed(1), feed(10), Relation::Following, 1),
            ContactEvent::new(feed(10), feed(2), Relation::Following, 1),
            ContactEvent::new(feed(1), feed(2), Relation::Blocking, 2),
        ];
        let auth = authorizer(events, feed(1), 3);
        assert!(matches!(
            auth.authorize(&feed(2)).await,
            Err(GraphError::OutOfReach { .. })
        ));
    }

    #[tokio::test]
    async fn unknown_origin_admits_for_resync() {
        let events = vec![ContactEvent::new(feed(5), feed(6), Relation::Following, 1)];
        let auth = authorizer(events, feed(1), 2);
        assert_eq!(
            auth.authorize(&feed(6)).await.unwrap(),
            Verdict::BootstrapOrigin
        );
    }

    #[tokio::test]
    async fn disconnected_candidate_is_refused() {
        let events = vec![
            ContactEvent::new(feed(1), feed(2), Relation::Following, 1),
            ContactEvent::new(feed(8), feed(9), Relation::Following, 1),
        ];
        let auth = authorizer(events, feed(1), 5);
        match auth.authorize(&feed(9)).await {
            Err(GraphError::OutOfReach { dist, .. }) => {
                assert_eq!(dist, f64::NEG_INFINITY);
            }
            other => panic!("expected OutOfReach, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn verdicts_are_stable_across_rebuilds() {
        let events = vec![
            ContactEvent::new(feed(1), feed(2), Relation::Following, 1),
            ContactEvent::new(feed(2), feed(3), Relation::Following, 1),
        ];
        let builder = Arc::new(GraphBuilder::new(Arc::new(MemoryContacts::new(events))));
        let auth = Authorizer::new(builder.clone(), feed(1), 2);
        let first = auth.authorize(&feed(3)).await.unwrap();
        builder.invalidate().await;
        let second = auth.authorize(&feed(3)).await.unwrap();
        assert_eq!(first, second);
    }
}
