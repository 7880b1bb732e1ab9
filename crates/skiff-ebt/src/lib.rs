//! Epidemic-broadcast-tree replication sessions
//!
//! The execution half of the replication core. Given an admitted peer
//! and an open duplex stream, an [`EbtEngine`] session advertises the
//! local frontier, applies the peer's notes to the state matrix, streams
//! wanted messages out feed by feed, and feeds inbound messages through
//! verify-and-append, until either side closes.
//!
//! The [`Sessions`] registry keeps sessions exclusive per peer and gives
//! reconnecting callers a rendezvous to wait on. Peers that never speak
//! EBT fall back to [`HistoryStreamPuller`].

pub mod config;
pub mod engine;
pub mod error;
pub mod feeds;
pub mod legacy;
pub mod registry;

pub use config::EbtConfig;
pub use engine::{EbtEngine, SessionStats, SessionSummary};
pub use error::SessionError;
pub use legacy::{HistoryStreamPuller, PullSummary};
pub use registry::{SessionHandle, SessionState, Sessions};
