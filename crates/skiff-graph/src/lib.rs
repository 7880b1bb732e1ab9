//! Trust graph and replication authorization
//!
//! This crate turns the stream of signed contact messages (follow, block,
//! unfollow) into a weighted directed graph and answers the two questions
//! replication needs from it:
//!
//! - may a given peer connect, i.e. is it reachable from the local feed
//!   over follow edges within the hop budget ([`Authorizer`]),
//! - which feeds should the local node replicate at all ([`HopLister`]).
//!
//! Graph snapshots are immutable and cached; see [`GraphBuilder`] for the
//! rebuild and invalidation discipline.

pub mod authorizer;
pub mod builder;
pub mod error;
pub mod graph;
pub mod lister;
pub mod lookup;

pub use authorizer::{Authorizer, Verdict};
pub use builder::GraphBuilder;
pub use error::GraphError;
pub use graph::TrustGraph;
pub use lister::HopLister;
pub use lookup::Lookup;
