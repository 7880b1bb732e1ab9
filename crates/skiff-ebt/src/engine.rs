//! The EBT session engine
//!
//! One [`EbtEngine`] serves a node; each admitted connection becomes one
//! session driven by [`EbtEngine::run_session`]. A session is three kinds
//! of task around a pair of channels:
//!
//! - the session loop (this module) owning the inbound half, the peer
//!   frontier in the state matrix, and the per-feed task set,
//! - one writer task owning the outbound half, fed by a bounded channel,
//! - one task per streaming feed (see [`crate::feeds`]).
//!
//! The loop applies notes in receive order and hands message payloads to
//! verify-and-append synchronously, which is what backpressures a peer
//! that sends faster than the log can take.

use crate::config::EbtConfig;
use crate::error::SessionError;
use crate::feeds::FeedTask;
use crate::registry::{SessionHandle, SessionState, Sessions};
use skiff_core::{
    Duplex, FeedRef, Frame, FrameSink, MessageLog, NetworkFrontier, Note, ReplicationLister,
    Transport, TransportError, Verifier,
};
use skiff_matrix::{ObservedFeed, StateMatrix};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Counters one session maintains while running.
#[derive(Debug, Default)]
pub struct SessionStats {
    pub messages_sent: AtomicU64,
    pub messages_received: AtomicU64,
    pub notes_received: AtomicU64,
    pub verify_failures: AtomicU64,
}

/// What a finished session did, reported to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub peer: FeedRef,
    pub messages_sent: u64,
    pub messages_received: u64,
    pub notes_received: u64,
    pub verify_failures: u64,
}

impl SessionSummary {
    fn collect(peer: FeedRef, stats: &SessionStats) -> Self {
        Self {
            peer,
            messages_sent: stats.messages_sent.load(Ordering::Relaxed),
            messages_received: stats.messages_received.load(Ordering::Relaxed),
            notes_received: stats.notes_received.load(Ordering::Relaxed),
            verify_failures: stats.verify_failures.load(Ordering::Relaxed),
        }
    }
}

/// Per-node EBT replication engine.
pub struct EbtEngine {
    self_ref: FeedRef,
    log: Arc<dyn MessageLog>,
    verifier: Arc<dyn Verifier>,
    lister: Arc<dyn ReplicationLister>,
    matrix: Arc<StateMatrix>,
    sessions: Arc<Sessions>,
    config: EbtConfig,
}

impl EbtEngine {
    pub fn new(
        self_ref: FeedRef,
        log: Arc<dyn MessageLog>,
        verifier: Arc<dyn Verifier>,
        lister: Arc<dyn ReplicationLister>,
        matrix: Arc<StateMatrix>,
        config: EbtConfig,
    ) -> Self {
        Self {
            self_ref,
            log,
            verifier,
            lister,
            matrix,
            sessions: Arc::new(Sessions::new()),
            config,
        }
    }

    pub fn sessions(&self) -> &Arc<Sessions> {
        &self.sessions
    }

    pub fn matrix(&self) -> &Arc<StateMatrix> {
        &self.matrix
    }

    /// Dial `peer` through `transport` and run a session over the
    /// resulting duplex. Outgoing counterpart of [`EbtEngine::run_session`].
    pub async fn connect(
        &self,
        peer: &FeedRef,
        transport: &dyn Transport,
    ) -> Result<SessionSummary, SessionError> {
        let duplex = transport.open(peer).await?;
        self.run_session(peer, duplex).await
    }

    /// Drive one EBT session over an established duplex until either side
    /// closes or errors. Returns what the session did.
    ///
    /// Fails with [`SessionError::Exists`] when a session with `peer` is
    /// already live; callers can [`Sessions::wait`] and retry.
    pub async fn run_session(
        &self,
        peer: &FeedRef,
        duplex: Duplex,
    ) -> Result<SessionSummary, SessionError> {
        let (handle, is_new) = self.sessions.open(peer).await;
        if !is_new {
            return Err(SessionError::exists(*peer));
        }

        let stats = Arc::new(SessionStats::default());
        let result = self.drive(peer, &handle, duplex, &stats).await;

        // teardown always runs: persist the peer frontier, free the slot
        handle.set_state(SessionState::Draining);
        let saved = self.matrix.save_and_close(peer).await;
        self.sessions.close(peer).await;

        let summary = SessionSummary::collect(*peer, &stats);
        match (&result, &saved) {
            (Ok(()), Ok(())) => {
                info!(
                    peer = %peer.short(),
                    sent = summary.messages_sent,
                    received = summary.messages_received,
                    "session closed"
                );
            }
            (res, save) => {
                warn!(
                    peer = %peer.short(),
                    drive = ?res.as_ref().err().map(SessionError::category),
                    save_failed = save.is_err(),
                    "session closed with errors"
                );
            }
        }
        result?;
        saved?;
        Ok(summary)
    }

    async fn drive(
        &self,
        peer: &FeedRef,
        handle: &Arc<SessionHandle>,
        duplex: Duplex,
        stats: &Arc<SessionStats>,
    ) -> Result<(), SessionError> {
        info!(peer = %peer.short(), "session opening");

        // what we hold and want, recomputed from the list and log heads
        let replicated = self.refresh_self_frontier().await?;
        let initial = self.matrix.changed(&self.self_ref, peer).await?;

        let (mut source, sink) = duplex.split();
        let (out_tx, out_rx) = mpsc::channel(self.config.outbound_buffer);
        let writer = tokio::spawn(run_writer(sink, out_rx));

        // prime the peer with our frontier
        out_tx
            .send(Frame::Notes(initial))
            .await
            .map_err(|_| SessionError::Transport(TransportError::Closed))?;

        handle.set_state(SessionState::Running);
        info!(peer = %peer.short(), feeds = replicated.len(), "session running");

        let mut shutdown = handle.closing();
        let mut tasks: HashMap<String, FeedTask> = HashMap::new();
        let mut verify_failures: u32 = 0;

        let result = loop {
            // re-checked every turn so a close signalled before the
            // receiver subscribed is not missed
            if *shutdown.borrow_and_update() {
                debug!(peer = %peer.short(), "local close requested");
                break Ok(());
            }
            tokio::select! {
                _ = shutdown.changed() => continue,
                frame = source.recv() => match frame {
                    Ok(Some(Frame::Notes(batch))) => {
                        stats.notes_received.fetch_add(1, Ordering::Relaxed);
                        if let Err(err) = self
                            .handle_notes(peer, &batch, &mut tasks, &out_tx, stats, &replicated)
                            .await
                        {
                            break Err(err);
                        }
                    }
                    Ok(Some(Frame::Message(raw))) => {
                        stats.messages_received.fetch_add(1, Ordering::Relaxed);
                        if let Err(err) = self
                            .handle_message(peer, &raw, stats, &mut verify_failures)
                            .await
                        {
                            break Err(err);
                        }
                    }
                    Ok(None) => {
                        debug!(peer = %peer.short(), "peer closed the stream");
                        break Ok(());
                    }
                    Err(err) if err.is_orderly() => {
                        debug!(peer = %peer.short(), "stream ended: {err}");
                        break Ok(());
                    }
                    Err(err) => break Err(SessionError::Transport(err)),
                }
            }
        };

        // draining: cancel feed tasks, let the writer flush, close the sink
        handle.set_state(SessionState::Draining);
        tasks.clear();
        drop(out_tx);
        if tokio::time::timeout(self.config.drain_timeout, writer)
            .await
            .is_err()
        {
            warn!(peer = %peer.short(), "writer did not drain in time");
        }

        result
    }

    /// Recompute the self frontier from the replication list and log
    /// heads, and return the canonical keys of the replicated set.
    async fn refresh_self_frontier(&self) -> Result<HashSet<String>, SessionError> {
        let feeds = self.lister.list().await?;
        let mut observed = Vec::with_capacity(feeds.len());
        let mut keys = HashSet::with_capacity(feeds.len());
        for feed in feeds {
            let head = self.log.head(&feed).await?;
            observed.push(ObservedFeed::new(feed, Note::replicating(head)));
            keys.insert(feed.to_string());
        }
        self.matrix.fill(&self.self_ref, &observed).await?;
        Ok(keys)
    }

    async fn handle_notes(
        &self,
        peer: &FeedRef,
        batch: &NetworkFrontier,
        tasks: &mut HashMap<String, FeedTask>,
        out_tx: &mpsc::Sender<Frame>,
        stats: &Arc<SessionStats>,
        replicated: &HashSet<String>,
    ) -> Result<(), SessionError> {
        self.matrix.update(peer, batch).await?;

        for (feed_key, note) in batch {
            if !replicated.contains(feed_key) {
                // not a feed we carry, nothing to stream
                continue;
            }

            if note.wants() {
                if let Some(task) = tasks.get(feed_key) {
                    task.advertise(*note);
                    continue;
                }
                let feed: FeedRef = match feed_key.parse() {
                    Ok(feed) => feed,
                    Err(err) => {
                        warn!(key = %feed_key, error = %err, "unparseable feed in notes, skipping");
                        continue;
                    }
                };
                debug!(peer = %peer.short(), feed = %feed.short(), from = note.seq, "peer wants feed");
                tasks.insert(
                    feed_key.clone(),
                    FeedTask::spawn(
                        feed,
                        self.log.clone(),
                        *note,
                        out_tx.clone(),
                        stats.clone(),
                    ),
                );
            } else if tasks.remove(feed_key).is_some() {
                debug!(peer = %peer.short(), feed = %feed_key, "peer stopped wanting feed");
            }
        }

        Ok(())
    }

    async fn handle_message(
        &self,
        peer: &FeedRef,
        raw: &[u8],
        stats: &Arc<SessionStats>,
        verify_failures: &mut u32,
    ) -> Result<(), SessionError> {
        match self.verifier.verify(raw).await {
            Ok(verified) => {
                let seq = self.log.append(&verified.author, raw.to_vec()).await?;
                // both we and the sending peer now hold this message
                let mut advance = NetworkFrontier::new();
                advance.insert(&verified.author, Note::replicating(seq));
                self.matrix.update(&self.self_ref, &advance).await?;
                self.matrix.update(peer, &advance).await?;
                Ok(())
            }
            Err(err) => {
                *verify_failures += 1;
                stats.verify_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    peer = %peer.short(),
                    failures = *verify_failures,
                    error = %err,
                    "dropping unverifiable message"
                );
                if *verify_failures > self.config.verify_failure_limit {
                    Err(SessionError::verify_limit(*peer, *verify_failures))
                } else {
                    Ok(())
                }
            }
        }
    }
}

/// Writer task: the single owner of the outbound half. Ends when every
/// producer dropped its sender or the sink fails.
async fn run_writer(mut sink: Box<dyn FrameSink>, mut frames: mpsc::Receiver<Frame>) {
    while let Some(frame) = frames.recv().await {
        if let Err(err) = sink.send(frame).await {
            if !err.is_orderly() {
                warn!(error = %err, "outbound write failed");
            }
            break;
        }
    }
    let _ = sink.close().await;
}
