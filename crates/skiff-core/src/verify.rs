//! Interface to message verification
//!
//! Signature checking and previous-hash linking live outside the core. A
//! [`Verifier`] is stateful per feed: it remembers the last accepted
//! message so it can enforce the append-only chain discipline.

use crate::refs::{FeedRef, MessageRef};
use async_trait::async_trait;

/// A message that passed verification, with its extracted coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedMessage {
    /// Feed that signed the message.
    pub author: FeedRef,
    /// Position in the author's feed.
    pub sequence: i64,
    /// Hash address of the message.
    pub key: MessageRef,
}

/// Verification failures. Per-message failures are local to a session;
/// the engine drops the message and counts them.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    /// The message could not be decoded at all.
    #[error("unparseable message: {reason}")]
    Malformed { reason: String },

    /// Signature, previous-hash, or sequence linking failed.
    #[error("broken feed chain for {feed} at seq {seq}: {reason}")]
    Chain {
        feed: FeedRef,
        seq: i64,
        reason: String,
    },
}

impl VerifyError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }

    pub fn chain(feed: FeedRef, seq: i64, reason: impl Into<String>) -> Self {
        Self::Chain {
            feed,
            seq,
            reason: reason.into(),
        }
    }
}

/// Verify-next-message interface, stateful per feed.
#[async_trait]
pub trait Verifier: Send + Sync {
    async fn verify(&self, raw: &[u8]) -> Result<VerifiedMessage, VerifyError>;
}
