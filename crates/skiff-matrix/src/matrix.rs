//! The state matrix: one persisted frontier per peer
//!
//! The matrix records, for every peer this node has gossiped with, that
//! peer's view of the network as a [`NetworkFrontier`], plus one special
//! entry for the local node itself. Frontiers load lazily into an
//! in-memory cache guarded by a single mutex and are written back on
//! `save_and_close` or `close`.
//!
//! On disk each peer is one file named by the hex of its TFK encoding,
//! holding the JSON frontier map. Writes go to `<name>.new`, are synced,
//! and renamed into place; the rename is the commit point, so a crash
//! leaves either the old or the new content and any orphaned `.new` file
//! is ignored on the next load.

use crate::error::MatrixError;
use skiff_core::{FeedRef, NetworkFrontier, Note};
use std::collections::HashMap;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

/// Owner-only permission for the base directory and state files.
#[cfg(unix)]
const ONLY_OWNER: u32 = 0o700;

/// A bulk observation about one feed, used by [`StateMatrix::fill`].
/// `replicate=false` means the entry should be dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObservedFeed {
    pub feed: FeedRef,
    pub note: Note,
}

impl ObservedFeed {
    pub fn new(feed: FeedRef, note: Note) -> Self {
        Self { feed, note }
    }
}

/// One case where a peer holds more of a feed than we do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HasLonger {
    pub peer: FeedRef,
    pub feed: FeedRef,
    pub their_seq: i64,
}

impl fmt::Display for HasLonger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}:{}",
            self.peer.short(),
            self.feed.short(),
            self.their_seq
        )
    }
}

/// Per-peer frontier store with write-through persistence.
pub struct StateMatrix {
    base_dir: PathBuf,
    self_key: String,
    open: Mutex<HashMap<String, NetworkFrontier>>,
}

impl StateMatrix {
    /// Open (or initialize) a matrix under `base_dir`, priming the cache
    /// with the local node's own frontier.
    pub async fn new(base_dir: impl Into<PathBuf>, self_ref: &FeedRef) -> Result<Self, MatrixError> {
        let base_dir = base_dir.into();
        tokio::fs::create_dir_all(&base_dir)
            .await
            .map_err(|source| MatrixError::io(*self_ref, source))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&base_dir, std::fs::Permissions::from_mode(ONLY_OWNER))
                .await
                .map_err(|source| MatrixError::io(*self_ref, source))?;
        }

        let matrix = Self {
            base_dir,
            self_key: self_ref.to_string(),
            open: Mutex::new(HashMap::new()),
        };

        {
            let mut open = matrix.open.lock().await;
            matrix.load(&mut open, self_ref).await?;
        }

        Ok(matrix)
    }

    /// On-disk path of `peer`'s state file.
    pub fn state_file_name(&self, peer: &FeedRef) -> PathBuf {
        self.base_dir.join(hex::encode(peer.tfk()))
    }

    /// Current frontier for `peer`, empty when never seen. Returns a copy.
    pub async fn inspect(&self, peer: &FeedRef) -> Result<NetworkFrontier, MatrixError> {
        let mut open = self.open.lock().await;
        self.load(&mut open, peer).await
    }

    /// Overlay `patch` onto `who`'s frontier and return the merged copy.
    ///
    /// Entries overwrite per feed, except that a replicated entry never
    /// rewinds: when the incoming note has `replicate=true` the merged
    /// sequence is the max of old and new.
    pub async fn update(
        &self,
        who: &FeedRef,
        patch: &NetworkFrontier,
    ) -> Result<NetworkFrontier, MatrixError> {
        let mut open = self.open.lock().await;
        let mut current = self.load(&mut open, who).await?;

        for (feed, note) in patch {
            let merged = match current.get_str(feed) {
                Some(existing) if note.replicate => Note {
                    seq: existing.seq.max(note.seq),
                    ..*note
                },
                _ => *note,
            };
            current.insert_str(feed.clone(), merged);
        }

        open.insert(who.to_string(), current.clone());
        Ok(current)
    }

    /// Bulk upsert of observations about `who`. Observations with
    /// `replicate=false` delete the entry. An empty slice is a no-op.
    pub async fn fill(&self, who: &FeedRef, observed: &[ObservedFeed]) -> Result<(), MatrixError> {
        if observed.is_empty() {
            return Ok(());
        }

        let mut open = self.open.lock().await;
        let mut current = self.load(&mut open, who).await?;

        for obs in observed {
            if obs.note.replicate {
                let merged = match current.get(&obs.feed) {
                    Some(existing) => Note {
                        seq: existing.seq.max(obs.note.seq),
                        ..obs.note
                    },
                    None => obs.note,
                };
                current.insert(&obs.feed, merged);
            } else {
                current.remove(&obs.feed);
            }
        }

        open.insert(who.to_string(), current);
        Ok(())
    }

    /// The subset of `self_ref`'s frontier worth advertising to `peer`:
    /// feeds the peer has no note for yet (if we want them), minus feeds
    /// the peer does not replicate or has paused, except that a peer
    /// always cares about its own feed.
    pub async fn changed(
        &self,
        self_ref: &FeedRef,
        peer: &FeedRef,
    ) -> Result<NetworkFrontier, MatrixError> {
        let mut open = self.open.lock().await;
        let self_front = self.load(&mut open, self_ref).await?;
        let peer_front = self.load(&mut open, peer).await?;
        let peer_key = peer.to_string();

        let mut relevant = NetworkFrontier::new();
        for (feed, my_note) in &self_front {
            match peer_front.get_str(feed) {
                None => {
                    // they have no note for it, tell them we want it
                    if my_note.receive {
                        relevant.insert_str(feed.clone(), *my_note);
                    }
                }
                Some(their_note) => {
                    if !their_note.replicate {
                        continue;
                    }
                    if !their_note.receive && *feed != peer_key {
                        continue;
                    }
                    relevant.insert_str(feed.clone(), *my_note);
                }
            }
        }

        Ok(relevant)
    }

    /// Every (peer, feed) pair where the peer claims more messages than
    /// the local node holds.
    pub async fn has_longer(&self) -> Result<Vec<HasLonger>, MatrixError> {
        let open = self.open.lock().await;
        let Some(self_front) = open.get(&self.self_key) else {
            return Ok(Vec::new());
        };

        let mut res = Vec::new();
        for (peer_key, their_front) in open.iter() {
            for (feed_key, my_note) in self_front {
                let Some(their_note) = their_front.get_str(feed_key) else {
                    continue;
                };
                if their_note.seq > my_note.seq {
                    res.push(HasLonger {
                        peer: peer_key.parse()?,
                        feed: feed_key.parse()?,
                        their_seq: their_note.seq,
                    });
                }
            }
        }
        Ok(res)
    }

    /// Feeds `peer` wants to receive messages for.
    pub async fn wants_list(&self, peer: &FeedRef) -> Result<Vec<FeedRef>, MatrixError> {
        let mut open = self.open.lock().await;
        let front = self.load(&mut open, peer).await?;

        let mut res = Vec::new();
        for (feed_key, note) in &front {
            if note.receive {
                res.push(feed_key.parse()?);
            }
        }
        Ok(res)
    }

    /// `peer`'s note for `feed`, and whether messages should flow.
    pub async fn wants_feed(
        &self,
        peer: &FeedRef,
        feed: &FeedRef,
    ) -> Result<Option<(Note, bool)>, MatrixError> {
        let mut open = self.open.lock().await;
        let front = self.load(&mut open, peer).await?;
        Ok(front.get(feed).map(|note| (note, note.receive)))
    }

    /// Persist `peer`'s frontier and evict it from the cache.
    pub async fn save_and_close(&self, peer: &FeedRef) -> Result<(), MatrixError> {
        let mut open = self.open.lock().await;
        self.save(&open, peer).await?;
        open.remove(&peer.to_string());
        Ok(())
    }

    /// Persist every open frontier and empty the cache.
    pub async fn close(&self) -> Result<(), MatrixError> {
        let mut open = self.open.lock().await;
        let peers: Vec<String> = open.keys().cloned().collect();
        for key in peers {
            let peer: FeedRef = key.parse()?;
            self.save(&open, &peer).await?;
            open.remove(&key);
        }
        Ok(())
    }

    async fn load(
        &self,
        open: &mut HashMap<String, NetworkFrontier>,
        peer: &FeedRef,
    ) -> Result<NetworkFrontier, MatrixError> {
        let key = peer.to_string();
        if let Some(front) = open.get(&key) {
            return Ok(front.clone());
        }

        let front = match tokio::fs::read(self.state_file_name(peer)).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|source| MatrixError::corrupt(*peer, source))?,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                // new peer, nothing on disk yet
                NetworkFrontier::new()
            }
            Err(source) => return Err(MatrixError::io(*peer, source)),
        };

        open.insert(key, front.clone());
        Ok(front)
    }

    async fn save(
        &self,
        open: &HashMap<String, NetworkFrontier>,
        peer: &FeedRef,
    ) -> Result<(), MatrixError> {
        let Some(front) = open.get(&peer.to_string()) else {
            return Ok(());
        };

        let path = self.state_file_name(peer);
        let tmp = tmp_path(&path);
        let bytes = serde_json::to_vec(front).map_err(|source| MatrixError::corrupt(*peer, source))?;

        let mut opts = tokio::fs::OpenOptions::new();
        opts.write(true).create(true).truncate(true);
        #[cfg(unix)]
        opts.mode(ONLY_OWNER);

        let mut file = opts
            .open(&tmp)
            .await
            .map_err(|source| MatrixError::io(*peer, source))?;
        file.write_all(&bytes)
            .await
            .map_err(|source| MatrixError::io(*peer, source))?;
        // fsync before the rename so the commit point is durable
        file.sync_all()
            .await
            .map_err(|source| MatrixError::io(*peer, source))?;
        drop(file);

        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|source| MatrixError::io(*peer, source))?;

        debug!(peer = %peer.short(), entries = front.len(), "persisted frontier");
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".new");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn feed(seed: u8) -> FeedRef {
        FeedRef::from_bytes([seed; 32])
    }

    async fn matrix(dir: &TempDir) -> StateMatrix {
        StateMatrix::new(dir.path(), &feed(0)).await.unwrap()
    }

    #[tokio::test]
    async fn inspect_unknown_peer_is_empty() {
        let dir = TempDir::new().unwrap();
        let sm = matrix(&dir).await;
        assert!(sm.inspect(&feed(1)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_merges_and_persists() {
        let dir = TempDir::new().unwrap();
        let peer = feed(1);
        let (f1, f2) = (feed(10), feed(11));

        {
            let sm = matrix(&dir).await;
            let patch: NetworkFrontier = [
                (f1, Note::replicating(5)),
                (f2, Note::not_replicating()),
            ]
            .into_iter()
            .collect();

            let merged = sm.update(&peer, &patch).await.unwrap();
            assert_eq!(merged.get(&f1), Some(Note::replicating(5)));

            let (note, wants) = sm.wants_feed(&peer, &f1).await.unwrap().unwrap();
            assert_eq!(note.seq, 5);
            assert!(wants);

            let (_, wants) = sm.wants_feed(&peer, &f2).await.unwrap().unwrap();
            assert!(!wants);

            sm.save_and_close(&peer).await.unwrap();
        }

        // reload from disk into a fresh matrix
        let sm = matrix(&dir).await;
        let front = sm.inspect(&peer).await.unwrap();
        assert_eq!(front.get(&f1), Some(Note::replicating(5)));
        assert_eq!(front.get(&f2), Some(Note::not_replicating()));
    }

    #[tokio::test]
    async fn update_returns_a_copy_not_an_alias() {
        let dir = TempDir::new().unwrap();
        let sm = matrix(&dir).await;
        let peer = feed(1);
        let f = feed(10);

        let patch: NetworkFrontier = [(f, Note::replicating(3))].into_iter().collect();
        let mut returned = sm.update(&peer, &patch).await.unwrap();
        returned.insert(&f, Note::replicating(99));

        assert_eq!(
            sm.inspect(&peer).await.unwrap().get(&f),
            Some(Note::replicating(3))
        );
    }

    #[tokio::test]
    async fn replicated_sequences_never_rewind() {
        let dir = TempDir::new().unwrap();
        let sm = matrix(&dir).await;
        let peer = feed(1);
        let f = feed(10);

        let ahead: NetworkFrontier = [(f, Note::replicating(8))].into_iter().collect();
        sm.update(&peer, &ahead).await.unwrap();

        let behind: NetworkFrontier = [(f, Note::replicating(3))].into_iter().collect();
        let merged = sm.update(&peer, &behind).await.unwrap();
        assert_eq!(merged.get(&f).unwrap().seq, 8);

        // pausing keeps the cursor
        let paused: NetworkFrontier = [(f, Note::paused(8))].into_iter().collect();
        let merged = sm.update(&peer, &paused).await.unwrap();
        assert_eq!(merged.get(&f), Some(Note::paused(8)));
    }

    #[tokio::test]
    async fn fill_deletes_on_not_replicate() {
        let dir = TempDir::new().unwrap();
        let sm = matrix(&dir).await;
        let peer = feed(1);
        let f = feed(10);

        sm.fill(&peer, &[ObservedFeed::new(f, Note::replicating(4))])
            .await
            .unwrap();
        assert!(sm.inspect(&peer).await.unwrap().get(&f).is_some());

        sm.fill(&peer, &[ObservedFeed::new(f, Note::not_replicating())])
            .await
            .unwrap();
        assert!(sm.inspect(&peer).await.unwrap().get(&f).is_none());
    }

    #[tokio::test]
    async fn changed_applies_the_advertising_rules() {
        let dir = TempDir::new().unwrap();
        let sm = matrix(&dir).await;
        let me = feed(0);
        let peer = feed(1);
        let (wanted, paused, dropped, fresh) = (feed(10), feed(11), feed(12), feed(13));

        sm.fill(
            &me,
            &[
                ObservedFeed::new(wanted, Note::replicating(5)),
                ObservedFeed::new(paused, Note::replicating(6)),
                ObservedFeed::new(dropped, Note::replicating(7)),
                ObservedFeed::new(fresh, Note::replicating(8)),
                ObservedFeed::new(peer, Note::replicating(2)),
            ],
        )
        .await
        .unwrap();

        let peer_view: NetworkFrontier = [
            (wanted, Note::replicating(3)),
            (paused, Note::paused(6)),
            (dropped, Note::not_replicating()),
            (peer, Note::paused(2)),
        ]
        .into_iter()
        .collect();
        sm.update(&peer, &peer_view).await.unwrap();

        let relevant = sm.changed(&me, &peer).await.unwrap();
        // they replicate and receive it
        assert!(relevant.get(&wanted).is_some());
        // they paused it
        assert!(relevant.get(&paused).is_none());
        // they dropped it entirely
        assert!(relevant.get(&dropped).is_none());
        // no note from them yet, we want it, so advertise
        assert!(relevant.get(&fresh).is_some());
        // a peer always cares about its own feed, even while paused
        assert!(relevant.get(&peer).is_some());
    }

    #[tokio::test]
    async fn wants_list_returns_only_received_feeds() {
        let dir = TempDir::new().unwrap();
        let sm = matrix(&dir).await;
        let peer = feed(1);
        let (wanted, paused, dropped) = (feed(10), feed(11), feed(12));

        let peer_view: NetworkFrontier = [
            (wanted, Note::replicating(4)),
            (paused, Note::paused(7)),
            (dropped, Note::not_replicating()),
        ]
        .into_iter()
        .collect();
        sm.update(&peer, &peer_view).await.unwrap();

        let wants = sm.wants_list(&peer).await.unwrap();
        assert_eq!(wants, vec![wanted]);

        // an unknown peer wants nothing
        assert!(sm.wants_list(&feed(9)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn has_longer_reports_peers_ahead_of_us() {
        let dir = TempDir::new().unwrap();
        let sm = matrix(&dir).await;
        let me = feed(0);
        let peer = feed(1);
        let f = feed(10);

        sm.fill(&me, &[ObservedFeed::new(f, Note::replicating(3))])
            .await
            .unwrap();
        let peer_view: NetworkFrontier = [(f, Note::replicating(9))].into_iter().collect();
        sm.update(&peer, &peer_view).await.unwrap();

        let longer = sm.has_longer().await.unwrap();
        assert_eq!(longer.len(), 1);
        assert_eq!(longer[0].peer, peer);
        assert_eq!(longer[0].feed, f);
        assert_eq!(longer[0].their_seq, 9);
    }

    #[tokio::test]
    async fn corrupt_state_file_surfaces() {
        let dir = TempDir::new().unwrap();
        let peer = feed(1);

        let sm = matrix(&dir).await;
        let path = sm.state_file_name(&peer);
        tokio::fs::write(&path, b"{ not json").await.unwrap();

        match sm.inspect(&peer).await {
            Err(MatrixError::Corrupt { peer: p, .. }) => assert_eq!(p, peer),
            other => panic!("expected Corrupt, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn orphaned_tmp_file_is_ignored() {
        let dir = TempDir::new().unwrap();
        let peer = feed(1);
        let f = feed(10);

        let sm = matrix(&dir).await;
        let patch: NetworkFrontier = [(f, Note::replicating(2))].into_iter().collect();
        sm.update(&peer, &patch).await.unwrap();
        sm.save_and_close(&peer).await.unwrap();

        // simulate a crash that left a half-written temp file behind
        let tmp = tmp_path(&sm.state_file_name(&peer));
        tokio::fs::write(&tmp, b"{\"gar").await.unwrap();

        let front = sm.inspect(&peer).await.unwrap();
        assert_eq!(front.get(&f), Some(Note::replicating(2)));
    }

    #[tokio::test]
    async fn close_persists_every_open_frontier() {
        let dir = TempDir::new().unwrap();
        let (p1, p2) = (feed(1), feed(2));
        let f = feed(10);

        {
            let sm = matrix(&dir).await;
            let patch: NetworkFrontier = [(f, Note::replicating(1))].into_iter().collect();
            sm.update(&p1, &patch).await.unwrap();
            let patch: NetworkFrontier = [(f, Note::replicating(2))].into_iter().collect();
            sm.update(&p2, &patch).await.unwrap();
            sm.close().await.unwrap();
        }

        let sm = matrix(&dir).await;
        assert_eq!(sm.inspect(&p1).await.unwrap().get(&f).unwrap().seq, 1);
        assert_eq!(sm.inspect(&p2).await.unwrap().get(&f).unwrap().seq, 2);
    }
}
