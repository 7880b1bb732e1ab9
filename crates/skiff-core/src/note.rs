//! Replication notes and network frontiers
//!
//! A [`Note`] is one entry of a vector clock: the highest sequence a peer
//! claims for a feed plus two flags steering replication. A
//! [`NetworkFrontier`] is the full per-peer mapping from feed to note. The
//! JSON encoding of a frontier is both the notes wire format and the
//! on-disk state file format, so it is kept deliberately plain: an object
//! mapping canonical feed-ref strings to three-field records.

use crate::refs::FeedRef;
use serde::{Deserialize, Serialize};
use std::collections::{btree_map, BTreeMap};
use std::fmt;

/// Per-feed cursor advertised by a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// Highest sequence the peer claims to hold. `-1` together with
    /// `replicate=false` encodes "I do not replicate this feed".
    pub seq: i64,
    /// Whether the peer participates in replicating the feed at all.
    pub replicate: bool,
    /// Whether the peer currently wants inbound messages for the feed.
    /// Toggling this off pauses delivery without losing the cursor.
    pub receive: bool,
}

impl Note {
    /// Note for a feed that is replicated and wanted.
    pub fn replicating(seq: i64) -> Self {
        Self {
            seq,
            replicate: true,
            receive: true,
        }
    }

    /// Note for a feed that is replicated but currently paused.
    pub fn paused(seq: i64) -> Self {
        Self {
            seq,
            replicate: true,
            receive: false,
        }
    }

    /// The conventional "do not replicate" sentinel.
    pub fn not_replicating() -> Self {
        Self {
            seq: -1,
            replicate: false,
            receive: false,
        }
    }

    /// True when messages for this feed should flow to the note's owner.
    pub fn wants(&self) -> bool {
        self.replicate && self.receive
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}{}",
            self.seq,
            if self.replicate { "r" } else { "-" },
            if self.receive { "x" } else { "-" }
        )
    }
}

/// A peer's view of the network: feed ref string to note.
///
/// Keys are canonical [`FeedRef`] strings. The map is ordered so that
/// encodings and iteration are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkFrontier {
    entries: BTreeMap<String, Note>,
}

impl NetworkFrontier {
    /// An empty frontier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the note for a feed.
    pub fn get(&self, feed: &FeedRef) -> Option<Note> {
        self.entries.get(&feed.to_string()).copied()
    }

    /// Look up by pre-rendered canonical string key.
    pub fn get_str(&self, feed: &str) -> Option<Note> {
        self.entries.get(feed).copied()
    }

    /// Insert or replace the note for a feed.
    pub fn insert(&mut self, feed: &FeedRef, note: Note) -> Option<Note> {
        self.entries.insert(feed.to_string(), note)
    }

    /// Insert by pre-rendered canonical string key.
    pub fn insert_str(&mut self, feed: String, note: Note) -> Option<Note> {
        self.entries.insert(feed, note)
    }

    /// Remove by pre-rendered canonical string key.
    pub fn remove_str(&mut self, feed: &str) -> Option<Note> {
        self.entries.remove(feed)
    }

    /// Remove the entry for a feed.
    pub fn remove(&mut self, feed: &FeedRef) -> Option<Note> {
        self.entries.remove(&feed.to_string())
    }

    /// Iterate entries in key order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, Note> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(FeedRef, Note)> for NetworkFrontier {
    fn from_iter<I: IntoIterator<Item = (FeedRef, Note)>>(iter: I) -> Self {
        let entries = iter
            .into_iter()
            .map(|(feed, note)| (feed.to_string(), note))
            .collect();
        Self { entries }
    }
}

impl<'a> IntoIterator for &'a NetworkFrontier {
    type Item = (&'a String, &'a Note);
    type IntoIter = btree_map::Iter<'a, String, Note>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
