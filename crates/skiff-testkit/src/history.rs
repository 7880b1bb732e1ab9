//! History-stream client over a remote in-memory log

use crate::MemoryLog;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use skiff_core::{FeedRef, HistoryStreamClient, MessageLog, TransportError};

/// Serves history-stream pulls straight out of a "remote" [`MemoryLog`],
/// the way a non-EBT peer answers createHistoryStream: replay from the
/// requested sequence to the head at request time, then end.
pub struct MemoryHistoryClient {
    remote: MemoryLog,
}

impl MemoryHistoryClient {
    pub fn new(remote: MemoryLog) -> Self {
        Self { remote }
    }
}

#[async_trait]
impl HistoryStreamClient for MemoryHistoryClient {
    async fn history_stream(
        &self,
        feed: &FeedRef,
        from_seq: i64,
    ) -> Result<BoxStream<'static, Result<Vec<u8>, TransportError>>, TransportError> {
        let head = self
            .remote
            .head(feed)
            .await
            .map_err(|err| TransportError::failed(err.to_string()))?;

        let mut messages = Vec::new();
        for seq in from_seq.max(1)..=head {
            let raw = self
                .remote
                .get(feed, seq)
                .await
                .map_err(|err| TransportError::failed(err.to_string()))?;
            messages.push(Ok(raw));
        }
        Ok(stream::iter(messages).boxed())
    }
}
