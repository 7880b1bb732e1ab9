//! Duplex frame transport interface
//!
//! Wire framing and the multiplexed RPC layer are external collaborators.
//! The session engine sees a connection as a pair of halves moving
//! [`Frame`]s: a notes batch or a raw message payload. The halves are
//! separate trait objects so the inbound loop and the writer task can own
//! them independently.

use crate::note::NetworkFrontier;
use crate::refs::FeedRef;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// One unit on the duplex stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "snake_case")]
pub enum Frame {
    /// A batch of per-feed cursors. On the wire this body is the plain
    /// JSON object mapping feed-ref strings to notes.
    Notes(NetworkFrontier),
    /// A single raw message, exactly as signed.
    Message(Vec<u8>),
}

impl Frame {
    pub fn is_notes(&self) -> bool {
        matches!(self, Frame::Notes(_))
    }
}

/// Transport failures. Deadline errors are treated by sessions as a
/// normal close, everything else tears the session down.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The other side closed the stream.
    #[error("transport closed")]
    Closed,

    /// An I/O deadline enforced by the transport layer expired.
    #[error("i/o deadline exceeded")]
    Deadline,

    /// Any other transport-level failure.
    #[error("transport failed: {reason}")]
    Failed { reason: String },
}

impl TransportError {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    /// Deadline and orderly close both end a session without alarm.
    pub fn is_orderly(&self) -> bool {
        matches!(self, Self::Closed | Self::Deadline)
    }
}

/// Receiving half of a duplex stream.
#[async_trait]
pub trait FrameSource: Send {
    /// Next inbound frame, or `None` on orderly end of stream.
    async fn recv(&mut self) -> Result<Option<Frame>, TransportError>;
}

/// Sending half of a duplex stream.
#[async_trait]
pub trait FrameSink: Send {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError>;

    /// Flush and close the outbound direction.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// An open duplex connection to one peer.
pub struct Duplex {
    pub source: Box<dyn FrameSource>,
    pub sink: Box<dyn FrameSink>,
}

impl Duplex {
    pub fn new(source: Box<dyn FrameSource>, sink: Box<dyn FrameSink>) -> Self {
        Self { source, sink }
    }

    /// Hand the two halves to their owning tasks.
    pub fn split(self) -> (Box<dyn FrameSource>, Box<dyn FrameSink>) {
        (self.source, self.sink)
    }
}

/// Connection opener used by outgoing replication attempts.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, peer: &FeedRef) -> Result<Duplex, TransportError>;
}

/// Per-feed pull stream for peers that do not speak EBT: the classic
/// "history stream" request, yielding raw messages from `from_seq` on.
#[async_trait]
pub trait HistoryStreamClient: Send + Sync {
    async fn history_stream(
        &self,
        feed: &FeedRef,
        from_seq: i64,
    ) -> Result<BoxStream<'static, Result<Vec<u8>, TransportError>>, TransportError>;
}
