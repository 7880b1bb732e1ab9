//! Per-peer replication state, persisted
//!
//! The state matrix is the middle piece of the replication core: it
//! remembers, across restarts, what every peer claimed to hold and want
//! (one [`NetworkFrontier`](skiff_core::NetworkFrontier) per peer), and
//! answers the session engine's questions about what to advertise and
//! what is worth fetching.

pub mod error;
pub mod matrix;

pub use error::MatrixError;
pub use matrix::{HasLonger, ObservedFeed, StateMatrix};
