//! Session error taxonomy

use skiff_core::{FeedRef, ListError, LogError, TransportError};
use skiff_matrix::MatrixError;

/// Ways a replication session can fail.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A live session with this peer already exists. Callers either use
    /// the existing one or wait for it to finish.
    #[error("a session with {peer} already exists")]
    Exists { peer: FeedRef },

    /// The duplex stream failed in a non-orderly way.
    #[error("session transport failed")]
    Transport(#[from] TransportError),

    /// The peer exceeded the per-session verify failure budget.
    #[error("too many verify failures from {peer}: {count}")]
    VerifyLimit { peer: FeedRef, count: u32 },

    /// Frontier load or persistence failed. Surfaced through teardown so
    /// durability problems are never silent.
    #[error("session state matrix failed")]
    Matrix(#[from] MatrixError),

    /// The local message log failed.
    #[error("session message log failed")]
    Log(#[from] LogError),

    /// The replication list could not be produced.
    #[error("session replication list failed")]
    List(#[from] ListError),
}

impl SessionError {
    pub fn exists(peer: FeedRef) -> Self {
        Self::Exists { peer }
    }

    pub fn verify_limit(peer: FeedRef, count: u32) -> Self {
        Self::VerifyLimit { peer, count }
    }

    /// Coarse bucket for log lines.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Exists { .. } => "registry",
            Self::Transport(_) => "transport",
            Self::VerifyLimit { .. } => "verify",
            Self::Matrix(_) => "matrix",
            Self::Log(_) => "log",
            Self::List(_) => "list",
        }
    }
}
