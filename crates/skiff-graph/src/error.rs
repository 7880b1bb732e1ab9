//! Trust-graph error taxonomy

use skiff_core::FeedRef;

/// Errors from graph construction and authorization.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// The origin feed is not a node in the graph. During an initial
    /// resync callers may treat this as admission; see
    /// [`Verdict::BootstrapOrigin`](crate::Verdict::BootstrapOrigin).
    #[error("no such origin in trust graph: {feed}")]
    NoSuchFrom { feed: FeedRef },

    /// The candidate is unreachable, blocked, or beyond the hop budget.
    /// `dist` is `+inf` for blocked, `-inf` for disconnected.
    #[error("{feed} is out of reach: distance {dist}, max hops {max}")]
    OutOfReach { feed: FeedRef, dist: f64, max: u64 },

    /// Reading the contact source failed; retriable.
    #[error("building trust graph failed: {reason}")]
    BuildFailed { reason: String },
}

impl GraphError {
    pub fn no_such_from(feed: FeedRef) -> Self {
        Self::NoSuchFrom { feed }
    }

    pub fn out_of_reach(feed: FeedRef, dist: f64, max: u64) -> Self {
        Self::OutOfReach { feed, dist, max }
    }

    pub fn build_failed(reason: impl Into<String>) -> Self {
        Self::BuildFailed {
            reason: reason.into(),
        }
    }

    /// Only build failures are worth retrying; verdicts are stable per
    /// graph snapshot.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::BuildFailed { .. })
    }
}
