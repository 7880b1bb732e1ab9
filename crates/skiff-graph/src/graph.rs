//! The trust graph itself
//!
//! A directed weighted graph over feed identities, stored as two flat
//! tables plus an index map: a node table (index to [`FeedRef`]) and an
//! edge table ((src, dst) to weight). No pointers between nodes, so a
//! built graph is an immutable snapshot that clones are never needed for;
//! readers share it behind an `Arc`.
//!
//! Edge weights encode the latest contact statement:
//! `1.0` follow, `+inf` block, absent for unfollowed or never-mentioned.

use crate::error::GraphError;
use crate::lookup::Lookup;
use skiff_core::{ContactEvent, FeedRef, Relation};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

/// Weight of a follow edge.
pub(crate) const FOLLOW_WEIGHT: f64 = 1.0;
/// Weight of a block edge. Propagates through any path touching it.
pub(crate) const BLOCK_WEIGHT: f64 = f64::INFINITY;

/// Immutable snapshot of the follow/block graph.
#[derive(Debug, Default)]
pub struct TrustGraph {
    nodes: Vec<FeedRef>,
    index: HashMap<FeedRef, usize>,
    edges: BTreeMap<(usize, usize), f64>,
}

impl TrustGraph {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Apply one contact statement, last write winning per (author, target).
    pub(crate) fn apply(&mut self, event: &ContactEvent) {
        let author = self.intern(event.author);
        let target = self.intern(event.target);
        match event.relation {
            Relation::Following => {
                self.edges.insert((author, target), FOLLOW_WEIGHT);
            }
            Relation::Blocking => {
                self.edges.insert((author, target), BLOCK_WEIGHT);
            }
            Relation::Neutral => {
                self.edges.remove(&(author, target));
            }
        }
    }

    fn intern(&mut self, feed: FeedRef) -> usize {
        if let Some(&idx) = self.index.get(&feed) {
            return idx;
        }
        let idx = self.nodes.len();
        self.nodes.push(feed);
        self.index.insert(feed, idx);
        idx
    }

    /// Number of nodes ever mentioned by a contact statement.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn contains(&self, feed: &FeedRef) -> bool {
        self.index.contains_key(feed)
    }

    pub(crate) fn node_index(&self, feed: &FeedRef) -> Option<usize> {
        self.index.get(feed).copied()
    }

    pub(crate) fn node_at(&self, idx: usize) -> FeedRef {
        self.nodes[idx]
    }

    pub(crate) fn edge_weight(&self, src: usize, dst: usize) -> Option<f64> {
        self.edges.get(&(src, dst)).copied()
    }

    /// Outgoing edges of `src` as (dst, weight) pairs.
    pub(crate) fn edges_from(&self, src: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.edges
            .range((src, 0)..(src + 1, 0))
            .map(|(&(_, dst), &w)| (dst, w))
    }

    /// True when `a`'s latest statement toward `b` is a follow.
    pub fn follows(&self, a: &FeedRef, b: &FeedRef) -> bool {
        match (self.node_index(a), self.node_index(b)) {
            (Some(a), Some(b)) => self
                .edge_weight(a, b)
                .map(f64::is_finite)
                .unwrap_or(false),
            _ => false,
        }
    }

    /// True when `a`'s latest statement toward `b` is a block.
    pub fn blocks(&self, a: &FeedRef, b: &FeedRef) -> bool {
        match (self.node_index(a), self.node_index(b)) {
            (Some(a), Some(b)) => self
                .edge_weight(a, b)
                .map(f64::is_infinite)
                .unwrap_or(false),
            _ => false,
        }
    }

    /// The set of feeds `origin` currently blocks.
    pub fn blocked_by(&self, origin: &FeedRef) -> BTreeSet<FeedRef> {
        let Some(src) = self.node_index(origin) else {
            return BTreeSet::new();
        };
        self.edges_from(src)
            .filter(|(_, w)| w.is_infinite())
            .map(|(dst, _)| self.node_at(dst))
            .collect()
    }

    /// Shortest-path helper from `origin`, follow edges weight 1 and block
    /// edges `+inf`. Fails with [`GraphError::NoSuchFrom`] when `origin`
    /// was never mentioned by any contact statement.
    pub fn dijkstra(&self, origin: &FeedRef) -> Result<Lookup<'_>, GraphError> {
        let src = self
            .node_index(origin)
            .ok_or_else(|| GraphError::no_such_from(*origin))?;
        Ok(Lookup::compute(self, src))
    }

    /// Feeds within `max_hops` of `origin` over follow edges only, with
    /// feeds blocked by `origin` removed. Hop 1 is a direct follow. The
    /// origin itself is not part of the result.
    pub fn hops(&self, origin: &FeedRef, max_hops: u64) -> BTreeSet<FeedRef> {
        let Some(src) = self.node_index(origin) else {
            return BTreeSet::new();
        };

        let blocked: BTreeSet<usize> = self
            .edges_from(src)
            .filter(|(_, w)| w.is_infinite())
            .map(|(dst, _)| dst)
            .collect();

        let mut seen = BTreeSet::from([src]);
        let mut out = BTreeSet::new();
        let mut queue = VecDeque::from([(src, 0u64)]);
        while let Some((node, depth)) = queue.pop_front() {
            if depth == max_hops {
                continue;
            }
            for (dst, weight) in self.edges_from(node) {
                if !weight.is_finite() || !seen.insert(dst) {
                    continue;
                }
                if !blocked.contains(&dst) {
                    out.insert(self.node_at(dst));
                }
                queue.push_back((dst, depth + 1));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(seed: u8) -> FeedRef {
        FeedRef::from_bytes([seed; 32])
    }

    fn contact(author: u8, target: u8, relation: Relation, seq: i64) -> ContactEvent {
        ContactEvent::new(feed(author), feed(target), relation, seq)
    }

    fn graph_of(events: &[ContactEvent]) -> TrustGraph {
        let mut g = TrustGraph::new();
        for ev in events {
            g.apply(ev);
        }
        g
    }

    #[test]
    fn last_write_wins_per_pair() {
        let g = graph_of(&[
            contact(1, 2, Relation::Following, 1),
            contact(1, 2, Relation::Neutral, 2),
        ]);
        assert!(!g.follows(&feed(1), &feed(2)));
        assert!(!g.blocks(&feed(1), &feed(2)));
        // both endpoints stay interned even after the unfollow
        assert_eq!(g.node_count(), 2);
        assert_eq!(g.edge_count(), 0);
    }

    #[test]
    fn block_overwrites_follow() {
        let g = graph_of(&[
            contact(1, 2, Relation::Following, 1),
            contact(1, 2, Relation::Blocking, 9),
        ]);
        assert!(!g.follows(&feed(1), &feed(2)));
        assert!(g.blocks(&feed(1), &feed(2)));
        assert_eq!(g.blocked_by(&feed(1)), BTreeSet::from([feed(2)]));
    }

    #[test]
    fn hops_walks_follow_edges_only() {
        let g = graph_of(&[
            contact(1, 2, Relation::Following, 1),
            contact(2, 3, Relation::Following, 1),
            contact(3, 4, Relation::Following, 1),
            contact(2, 5, Relation::Blocking, 2),
        ]);
        assert_eq!(g.hops(&feed(1), 1), BTreeSet::from([feed(2)]));
        assert_eq!(g.hops(&feed(1), 2), BTreeSet::from([feed(2), feed(3)]));
        assert_eq!(
            g.hops(&feed(1), 3),
            BTreeSet::from([feed(2), feed(3), feed(4)])
        );
        // the block edge from 2 to 5 never contributes reach
        assert!(!g.hops(&feed(1), 4).contains(&feed(5)));
    }

    #[test]
    fn hops_excludes_feeds_blocked_by_origin() {
        let g = graph_of(&[
            contact(1, 2, Relation::Following, 1),
            contact(2, 3, Relation::Following, 1),
            contact(1, 3, Relation::Blocking, 2),
        ]);
        let within = g.hops(&feed(1), 2);
        assert!(within.contains(&feed(2)));
        assert!(!within.contains(&feed(3)));
    }

    #[test]
    fn hops_of_unknown_origin_is_empty() {
        let g = graph_of(&[contact(1, 2, Relation::Following, 1)]);
        assert!(g.hops(&feed(9), 3).is_empty());
    }
}
