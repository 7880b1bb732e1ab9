//! Paired in-memory duplex streams

use async_trait::async_trait;
use skiff_core::{Duplex, FeedRef, Frame, FrameSink, FrameSource, Transport, TransportError};
use std::collections::VecDeque;
use tokio::sync::{mpsc, Mutex};

/// Receiving half backed by a bounded channel.
pub struct ChannelSource {
    rx: mpsc::Receiver<Frame>,
}

#[async_trait]
impl FrameSource for ChannelSource {
    async fn recv(&mut self) -> Result<Option<Frame>, TransportError> {
        Ok(self.rx.recv().await)
    }
}

/// Sending half backed by a bounded channel. Dropping the sender is the
/// close signal the other side observes.
pub struct ChannelSink {
    tx: Option<mpsc::Sender<Frame>>,
}

#[async_trait]
impl FrameSink for ChannelSink {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        let tx = self.tx.as_ref().ok_or(TransportError::Closed)?;
        tx.send(frame).await.map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.tx = None;
        Ok(())
    }
}

/// Two connected duplex ends, as if a transport had dialed. Channel
/// capacity bounds in-flight frames per direction, so tests observe the
/// same backpressure a real transport exerts.
pub fn duplex_pair(capacity: usize) -> (Duplex, Duplex) {
    let (left_tx, right_rx) = mpsc::channel(capacity);
    let (right_tx, left_rx) = mpsc::channel(capacity);
    let left = Duplex::new(
        Box::new(ChannelSource { rx: left_rx }),
        Box::new(ChannelSink { tx: Some(left_tx) }),
    );
    let right = Duplex::new(
        Box::new(ChannelSource { rx: right_rx }),
        Box::new(ChannelSink { tx: Some(right_tx) }),
    );
    (left, right)
}

/// Transport vending pre-built duplexes in dial order. Pair one end with
/// [`duplex_pair`] and hold the other to play the remote peer.
#[derive(Default)]
pub struct QueuedTransport {
    ends: Mutex<VecDeque<Duplex>>,
}

impl QueuedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the duplex the next `open` call hands out.
    pub async fn enqueue(&self, duplex: Duplex) {
        self.ends.lock().await.push_back(duplex);
    }
}

#[async_trait]
impl Transport for QueuedTransport {
    async fn open(&self, _peer: &FeedRef) -> Result<Duplex, TransportError> {
        self.ends
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| TransportError::failed("no duplex queued for dial"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skiff_core::NetworkFrontier;

    #[tokio::test]
    async fn frames_cross_and_close_propagates() {
        let (mut left, mut right) = duplex_pair(4);

        left.sink
            .send(Frame::Notes(NetworkFrontier::new()))
            .await
            .unwrap();
        let got = right.source.recv().await.unwrap().unwrap();
        assert!(got.is_notes());

        left.sink.close().await.unwrap();
        assert!(right.source.recv().await.unwrap().is_none());
    }
}
