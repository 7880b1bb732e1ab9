//! Shortest-path lookup over a graph snapshot
//!
//! A [`Lookup`] bundles the distance and predecessor vectors of one
//! Dijkstra run from a fixed origin. It borrows the snapshot it was
//! computed from, so it is valid exactly as long as the snapshot, and
//! can answer any number of distance queries.
//!
//! Distance conventions, matching the authorizer's taxonomy:
//! - finite: length of the cheapest all-follow path,
//! - `+inf`: every path to the target crosses a block edge,
//! - `-inf`: the target is disconnected from the origin (or unknown).

use crate::graph::TrustGraph;
use skiff_core::FeedRef;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Pending queue entry; ordered so the `BinaryHeap` pops smallest
/// distance first. Weights are 1 or `+inf`, never NaN.
struct Visit {
    dist: f64,
    node: usize,
}

impl PartialEq for Visit {
    fn eq(&self, other: &Self) -> bool {
        self.dist == other.dist && self.node == other.node
    }
}

impl Eq for Visit {}

impl PartialOrd for Visit {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Visit {
    fn cmp(&self, other: &Self) -> Ordering {
        // inverted so the max-heap behaves as a min-heap
        other
            .dist
            .partial_cmp(&self.dist)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.node.cmp(&self.node))
    }
}

/// Immutable distance and predecessor vectors from one origin.
pub struct Lookup<'g> {
    graph: &'g TrustGraph,
    origin: usize,
    dist: Vec<Option<f64>>,
    prev: Vec<Option<usize>>,
}

impl<'g> Lookup<'g> {
    pub(crate) fn compute(graph: &'g TrustGraph, origin: usize) -> Self {
        let n = graph.node_count();
        let mut dist: Vec<Option<f64>> = vec![None; n];
        let mut prev: Vec<Option<usize>> = vec![None; n];
        let mut heap = BinaryHeap::new();

        dist[origin] = Some(0.0);
        heap.push(Visit {
            dist: 0.0,
            node: origin,
        });

        while let Some(Visit { dist: d, node }) = heap.pop() {
            if dist[node].map(|cur| d > cur).unwrap_or(false) {
                continue;
            }
            for (next, weight) in graph.edges_from(node) {
                let candidate = d + weight;
                let better = match dist[next] {
                    None => true,
                    Some(cur) => candidate < cur,
                };
                if better {
                    dist[next] = Some(candidate);
                    prev[next] = Some(node);
                    heap.push(Visit {
                        dist: candidate,
                        node: next,
                    });
                }
            }
        }

        Self {
            graph,
            origin,
            dist,
            prev,
        }
    }

    /// Distance from the origin to `to`, using the conventions above.
    pub fn dist(&self, to: &FeedRef) -> f64 {
        match self.graph.node_index(to) {
            Some(idx) => self.dist[idx].unwrap_or(f64::NEG_INFINITY),
            None => f64::NEG_INFINITY,
        }
    }

    /// The shortest path origin..=to, empty when unreachable. Includes
    /// both endpoints, so a direct follow yields a path of length 2.
    pub fn path(&self, to: &FeedRef) -> Vec<FeedRef> {
        let Some(mut idx) = self.graph.node_index(to) else {
            return Vec::new();
        };
        if self.dist[idx].is_none() {
            return Vec::new();
        }
        let mut path = vec![self.graph.node_at(idx)];
        while idx != self.origin {
            match self.prev[idx] {
                Some(p) => idx = p,
                None => return Vec::new(),
            }
            path.push(self.graph.node_at(idx));
        }
        path.reverse();
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skiff_core::{ContactEvent, Relation};

    fn feed(seed: u8) -> FeedRef {
        FeedRef::from_bytes([seed; 32])
    }

    fn follows(pairs: &[(u8, u8)]) -> TrustGraph {
        let mut g = TrustGraph::new();
        for (i, &(a, b)) in pairs.iter().enumerate() {
            g.apply(&ContactEvent::new(
                feed(a),
                feed(b),
                Relation::Following,
                i as i64 + 1,
            ));
        }
        g
    }

    #[test]
    fn direct_follow_is_distance_one() {
        let g = follows(&[(1, 2)]);
        let lookup = g.dijkstra(&feed(1)).unwrap();
        assert_eq!(lookup.dist(&feed(2)), 1.0);
        assert_eq!(lookup.path(&feed(2)), vec![feed(1), feed(2)]);
    }

    #[test]
    fn picks_the_shorter_path() {
        let g = follows(&[(1, 2), (2, 3), (3, 4), (1, 4)]);
        let lookup = g.dijkstra(&feed(1)).unwrap();
        assert_eq!(lookup.dist(&feed(4)), 1.0);
        assert_eq!(lookup.dist(&feed(3)), 2.0);
    }

    #[test]
    fn disconnected_is_negative_infinity() {
        let g = follows(&[(1, 2), (3, 4)]);
        let lookup = g.dijkstra(&feed(1)).unwrap();
        assert_eq!(lookup.dist(&feed(4)), f64::NEG_INFINITY);
        assert!(lookup.path(&feed(4)).is_empty());
    }

    #[test]
    fn block_only_route_is_positive_infinity() {
        let mut g = follows(&[(2, 3)]);
        g.apply(&ContactEvent::new(feed(1), feed(2), Relation::Blocking, 5));
        let lookup = g.dijkstra(&feed(1)).unwrap();
        assert_eq!(lookup.dist(&feed(2)), f64::INFINITY);
        // infinity propagates through the chain
        assert_eq!(lookup.dist(&feed(3)), f64::INFINITY);
    }

    #[test]
    fn follow_route_beats_block_route() {
        let mut g = follows(&[(1, 2), (2, 3)]);
        g.apply(&ContactEvent::new(feed(1), feed(3), Relation::Blocking, 5));
        // dijkstra reports the finite detour; direct-block dominance is
        // the authorizer's job
        let lookup = g.dijkstra(&feed(1)).unwrap();
        assert_eq!(lookup.dist(&feed(3)), 2.0);
    }

    #[test]
    fn unknown_origin_is_an_error() {
        let g = follows(&[(1, 2)]);
        assert!(matches!(
            g.dijkstra(&feed(9)),
            Err(crate::GraphError::NoSuchFrom { .. })
        ));
    }
}
