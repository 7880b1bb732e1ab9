//! In-memory append-only message log

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use skiff_core::{FeedRef, LogEntry, LogError, MessageLog};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};

struct Inner {
    feeds: Mutex<HashMap<FeedRef, Vec<Vec<u8>>>>,
    appended: broadcast::Sender<(FeedRef, i64)>,
}

/// Append-only log keeping every feed in a `Vec`, with live append
/// notifications so `subscribe` streams replay history and then follow
/// new messages, the way a real log does.
#[derive(Clone)]
pub struct MemoryLog {
    inner: Arc<Inner>,
}

impl Default for MemoryLog {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLog {
    pub fn new() -> Self {
        let (appended, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(Inner {
                feeds: Mutex::new(HashMap::new()),
                appended,
            }),
        }
    }

    /// Append a batch of raw messages to one feed.
    pub async fn seed(&self, feed: &FeedRef, messages: Vec<Vec<u8>>) {
        for raw in messages {
            // seeding cannot fail, the feed entry is created on demand
            let _ = self.append(feed, raw).await;
        }
    }
}

#[async_trait]
impl MessageLog for MemoryLog {
    async fn head(&self, feed: &FeedRef) -> Result<i64, LogError> {
        let feeds = self.inner.feeds.lock().await;
        Ok(feeds.get(feed).map(|v| v.len() as i64).unwrap_or(0))
    }

    async fn get(&self, feed: &FeedRef, seq: i64) -> Result<Vec<u8>, LogError> {
        if seq < 1 {
            return Err(LogError::not_found(*feed, seq));
        }
        let feeds = self.inner.feeds.lock().await;
        feeds
            .get(feed)
            .and_then(|v| v.get((seq - 1) as usize))
            .cloned()
            .ok_or_else(|| LogError::not_found(*feed, seq))
    }

    async fn append(&self, feed: &FeedRef, raw: Vec<u8>) -> Result<i64, LogError> {
        let seq = {
            let mut feeds = self.inner.feeds.lock().await;
            let entries = feeds.entry(*feed).or_default();
            entries.push(raw);
            entries.len() as i64
        };
        // nobody listening is fine
        let _ = self.inner.appended.send((*feed, seq));
        Ok(seq)
    }

    async fn subscribe(
        &self,
        feed: &FeedRef,
        from_seq: i64,
    ) -> BoxStream<'static, Result<LogEntry, LogError>> {
        let inner = self.inner.clone();
        let feed = *feed;
        let rx = inner.appended.subscribe();
        let next = from_seq.max(1);

        stream::unfold((inner, rx, next), move |(inner, mut rx, next)| async move {
            loop {
                let stored = {
                    let feeds = inner.feeds.lock().await;
                    feeds
                        .get(&feed)
                        .and_then(|v| v.get((next - 1) as usize))
                        .cloned()
                };
                if let Some(raw) = stored {
                    let entry = LogEntry {
                        sequence: next,
                        raw,
                    };
                    return Some((Ok(entry), (inner, rx, next + 1)));
                }
                match rx.recv().await {
                    // wake on any append, the head check above re-runs
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(seed: u8) -> FeedRef {
        FeedRef::from_bytes([seed; 32])
    }

    #[tokio::test]
    async fn append_assigns_dense_sequences() {
        let log = MemoryLog::new();
        let f = feed(1);
        assert_eq!(log.append(&f, b"a".to_vec()).await.unwrap(), 1);
        assert_eq!(log.append(&f, b"b".to_vec()).await.unwrap(), 2);
        assert_eq!(log.head(&f).await.unwrap(), 2);
        assert_eq!(log.get(&f, 1).await.unwrap(), b"a".to_vec());
        assert!(log.get(&f, 3).await.is_err());
    }

    #[tokio::test]
    async fn subscribe_replays_then_follows() {
        let log = MemoryLog::new();
        let f = feed(2);
        log.seed(&f, vec![b"one".to_vec(), b"two".to_vec()]).await;

        let mut sub = log.subscribe(&f, 1).await;
        assert_eq!(sub.next().await.unwrap().unwrap().sequence, 1);
        assert_eq!(sub.next().await.unwrap().unwrap().sequence, 2);

        log.append(&f, b"three".to_vec()).await.unwrap();
        let live = sub.next().await.unwrap().unwrap();
        assert_eq!(live.sequence, 3);
        assert_eq!(live.raw, b"three".to_vec());
    }
}
