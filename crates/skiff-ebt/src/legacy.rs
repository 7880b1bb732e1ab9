//! Legacy per-feed pull replication
//!
//! Peers that never advertise EBT capability still replicate, just less
//! efficiently: one history-stream request per feed in the replication
//! list, starting after the local head, piped through the same
//! verify-and-append path a session uses. The state matrix catches up on
//! its own the next time an EBT session refreshes the self frontier from
//! log heads.

use crate::error::SessionError;
use futures::StreamExt;
use skiff_core::{HistoryStreamClient, MessageLog, ReplicationLister, Verifier};
use std::sync::Arc;
use tracing::{debug, warn};

/// What one full pull did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PullSummary {
    /// Feeds streamed cleanly to their end.
    pub feeds_pulled: usize,
    /// Feeds abandoned because the request failed or the chain broke.
    pub feeds_skipped: usize,
    /// Messages verified and appended.
    pub messages: u64,
}

/// Pull-based replication against one non-EBT peer.
pub struct HistoryStreamPuller {
    log: Arc<dyn MessageLog>,
    verifier: Arc<dyn Verifier>,
    lister: Arc<dyn ReplicationLister>,
}

impl HistoryStreamPuller {
    pub fn new(
        log: Arc<dyn MessageLog>,
        verifier: Arc<dyn Verifier>,
        lister: Arc<dyn ReplicationLister>,
    ) -> Self {
        Self {
            log,
            verifier,
            lister,
        }
    }

    /// Pull every feed in the replication list from `client`. A failing
    /// request or a broken chain skips that feed and moves on; log and
    /// list failures abort the pull.
    pub async fn pull(&self, client: &dyn HistoryStreamClient) -> Result<PullSummary, SessionError> {
        let feeds = self.lister.list().await?;
        let mut summary = PullSummary::default();

        for feed in feeds {
            let head = self.log.head(&feed).await?;
            let mut stream = match client.history_stream(&feed, head + 1).await {
                Ok(stream) => stream,
                Err(err) => {
                    warn!(feed = %feed.short(), error = %err, "history stream request failed");
                    summary.feeds_skipped += 1;
                    continue;
                }
            };

            let mut appended = 0u64;
            let mut broke_off = false;
            while let Some(item) = stream.next().await {
                let raw = match item {
                    Ok(raw) => raw,
                    Err(err) => {
                        warn!(feed = %feed.short(), error = %err, "history stream broke off");
                        broke_off = true;
                        break;
                    }
                };
                match self.verifier.verify(&raw).await {
                    Ok(verified) => {
                        self.log.append(&verified.author, raw).await?;
                        appended += 1;
                    }
                    Err(err) => {
                        warn!(feed = %feed.short(), error = %err, "dropping unverifiable history message");
                        broke_off = true;
                        break;
                    }
                }
            }

            debug!(feed = %feed.short(), appended, broke_off, "history stream done");
            if broke_off {
                summary.feeds_skipped += 1;
            } else {
                summary.feeds_pulled += 1;
            }
            summary.messages += appended;
        }

        Ok(summary)
    }
}
