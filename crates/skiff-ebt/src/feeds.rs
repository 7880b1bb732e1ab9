//! Per-feed outbound streaming tasks
//!
//! Each feed a peer wants gets one task moving messages from the local
//! log to the shared outbound channel, strictly in sequence order. A task
//! is a small state machine driven by two inputs: the peer's latest note
//! for the feed (a watch channel owned by the session loop) and the log
//! subscription. Cancellation is dropping the note sender; the task sees
//! the closed channel and exits.

use crate::engine::SessionStats;
use futures::StreamExt;
use skiff_core::{FeedRef, Frame, MessageLog, Note};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

/// Handle the session loop keeps per streaming feed. Dropping it cancels
/// the task.
pub(crate) struct FeedTask {
    note_tx: watch::Sender<Note>,
}

impl FeedTask {
    pub(crate) fn spawn(
        feed: FeedRef,
        log: Arc<dyn MessageLog>,
        note: Note,
        out: mpsc::Sender<Frame>,
        stats: Arc<SessionStats>,
    ) -> Self {
        let (note_tx, note_rx) = watch::channel(note);
        tokio::spawn(run_feed_stream(feed, log, note_rx, out, stats));
        Self { note_tx }
    }

    /// Push the peer's newest note for this feed into the task.
    pub(crate) fn advertise(&self, note: Note) {
        self.note_tx.send_replace(note);
    }
}

/// Body of one outbound feed task.
///
/// Waits until the peer wants the feed and is behind the local head,
/// then streams `(peer_seq, head]` in order and keeps following live
/// appends. A note advancing past the cursor fast-forwards without
/// sending; a note turning off `receive` parks the task.
async fn run_feed_stream(
    feed: FeedRef,
    log: Arc<dyn MessageLog>,
    mut notes: watch::Receiver<Note>,
    out: mpsc::Sender<Frame>,
    stats: Arc<SessionStats>,
) {
    let mut cursor: i64 = 0;

    loop {
        let note = *notes.borrow_and_update();
        if !note.wants() {
            // parked until the peer asks again (or the session cancels us)
            if notes.changed().await.is_err() {
                return;
            }
            continue;
        }
        cursor = cursor.max(note.seq.max(0));

        let mut entries = log.subscribe(&feed, cursor + 1).await;
        debug!(feed = %feed.short(), from = cursor + 1, "streaming feed");

        loop {
            tokio::select! {
                changed = notes.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    let note = *notes.borrow_and_update();
                    if !note.wants() {
                        debug!(feed = %feed.short(), "peer paused feed");
                        break;
                    }
                    if note.seq > cursor {
                        // peer already holds more than our cursor, skip ahead
                        cursor = note.seq;
                        break;
                    }
                }
                entry = entries.next() => {
                    match entry {
                        Some(Ok(entry)) => {
                            if entry.sequence <= cursor {
                                continue;
                            }
                            cursor = entry.sequence;
                            if out.send(Frame::Message(entry.raw)).await.is_err() {
                                // session is draining
                                return;
                            }
                            stats.messages_sent.fetch_add(1, Ordering::Relaxed);
                        }
                        Some(Err(err)) => {
                            warn!(feed = %feed.short(), error = %err, "feed stream failed");
                            return;
                        }
                        None => return,
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skiff_testkit::{test_message, MemoryLog};
    use std::time::Duration;

    fn feed(seed: u8) -> FeedRef {
        FeedRef::from_bytes([seed; 32])
    }

    async fn seeded_log(f: &FeedRef, count: i64) -> MemoryLog {
        let log = MemoryLog::new();
        for seq in 1..=count {
            log.append(f, test_message(f, seq)).await.unwrap();
        }
        log
    }

    async fn recv_seq(rx: &mut mpsc::Receiver<Frame>) -> i64 {
        let frame = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("frame in time")
            .expect("channel open");
        match frame {
            Frame::Message(raw) => {
                let value: serde_json::Value = serde_json::from_slice(&raw).unwrap();
                value["sequence"].as_i64().unwrap()
            }
            other => panic!("expected message frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn streams_behind_cursor_in_order_then_follows_appends() {
        let f = feed(10);
        let log = seeded_log(&f, 10).await;
        let (out_tx, mut out_rx) = mpsc::channel(64);
        let stats = Arc::new(SessionStats::default());

        let task = FeedTask::spawn(
            f,
            Arc::new(log.clone()),
            Note::replicating(3),
            out_tx,
            stats.clone(),
        );

        for expected in 4..=10 {
            assert_eq!(recv_seq(&mut out_rx).await, expected);
        }

        // a live append keeps flowing before the task idles
        log.append(&f, test_message(&f, 11)).await.unwrap();
        assert_eq!(recv_seq(&mut out_rx).await, 11);

        // the counter trails the delivery by one task poll
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(stats.messages_sent.load(Ordering::Relaxed), 8);
        drop(task);
    }

    #[tokio::test]
    async fn fast_forward_skips_already_held_messages() {
        let f = feed(10);
        let log = seeded_log(&f, 2).await;
        let (out_tx, mut out_rx) = mpsc::channel(64);
        let stats = Arc::new(SessionStats::default());

        let task = FeedTask::spawn(
            f,
            Arc::new(log.clone()),
            Note::replicating(2),
            out_tx,
            stats,
        );

        // caught up; peer then reports it got up to 6 elsewhere
        task.advertise(Note::replicating(6));
        // let the task observe the new cursor before messages appear
        tokio::time::sleep(Duration::from_millis(50)).await;
        for seq in 3..=7 {
            log.append(&f, test_message(&f, seq)).await.unwrap();
        }

        // first frame is 7, everything at or below the advertised cursor
        // was skipped
        assert_eq!(recv_seq(&mut out_rx).await, 7);
        drop(task);
    }

    #[tokio::test]
    async fn pause_parks_and_resume_continues_from_cursor() {
        let f = feed(10);
        let log = seeded_log(&f, 2).await;
        let (out_tx, mut out_rx) = mpsc::channel(64);
        let stats = Arc::new(SessionStats::default());

        let task = FeedTask::spawn(
            f,
            Arc::new(log.clone()),
            Note::replicating(0),
            out_tx,
            stats,
        );
        assert_eq!(recv_seq(&mut out_rx).await, 1);
        assert_eq!(recv_seq(&mut out_rx).await, 2);

        task.advertise(Note::paused(2));
        // let the pause land before the next append shows up
        tokio::time::sleep(Duration::from_millis(50)).await;
        log.append(&f, test_message(&f, 3)).await.unwrap();
        // parked: nothing may arrive
        assert!(
            tokio::time::timeout(Duration::from_millis(100), out_rx.recv())
                .await
                .is_err()
        );

        task.advertise(Note::replicating(2));
        assert_eq!(recv_seq(&mut out_rx).await, 3);
        drop(task);
    }

    #[tokio::test]
    async fn dropping_the_handle_cancels_the_task() {
        let f = feed(10);
        let log = seeded_log(&f, 1).await;
        let (out_tx, mut out_rx) = mpsc::channel(64);
        let stats = Arc::new(SessionStats::default());

        let task = FeedTask::spawn(f, Arc::new(log), Note::replicating(0), out_tx, stats);
        assert_eq!(recv_seq(&mut out_rx).await, 1);

        drop(task);
        // the task exits and releases its outbound sender
        assert!(
            tokio::time::timeout(Duration::from_secs(1), out_rx.recv())
                .await
                .expect("closed in time")
                .is_none()
        );
    }
}
