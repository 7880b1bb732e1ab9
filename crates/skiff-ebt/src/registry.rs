//! Process-wide session registry
//!
//! At most one live session per peer. A second connection attempt for the
//! same peer either takes the existing handle or parks on [`Sessions::wait`]
//! until the current session is fully torn down; teardown notifies every
//! waiter. The registry is the rendezvous point that makes reconnects
//! race-free.

use skiff_core::FeedRef;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{oneshot, watch, Mutex};
use tracing::debug;

/// Lifecycle of one session, observable through its handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Admitted, exchanging initial notes.
    Opening,
    /// Notes and messages flowing.
    Running,
    /// Closing down, flushing and persisting.
    Draining,
    /// Gone; the registry slot is free.
    Closed,
}

/// Shared record of one live session.
pub struct SessionHandle {
    peer: FeedRef,
    state: watch::Sender<SessionState>,
    shutdown: watch::Sender<bool>,
}

impl SessionHandle {
    fn new(peer: FeedRef) -> Self {
        let (state, _) = watch::channel(SessionState::Opening);
        let (shutdown, _) = watch::channel(false);
        Self {
            peer,
            state,
            shutdown,
        }
    }

    pub fn peer(&self) -> &FeedRef {
        &self.peer
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub(crate) fn set_state(&self, next: SessionState) {
        self.state.send_replace(next);
    }

    /// Ask the session to drain and close.
    pub fn close(&self) {
        self.shutdown.send_replace(true);
    }

    /// Signal the engine selects on for local close requests.
    pub(crate) fn closing(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }
}

#[derive(Default)]
struct Inner {
    open: HashMap<String, Arc<SessionHandle>>,
    waiting: HashMap<String, Vec<oneshot::Sender<()>>>,
}

/// The registry itself: peer string to handle, plus parked waiters.
#[derive(Default)]
pub struct Sessions {
    inner: Mutex<Inner>,
}

impl Sessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fresh session for `peer`, or return the existing one.
    /// The boolean is true when the returned handle is new and the caller
    /// now owns driving it.
    pub async fn open(&self, peer: &FeedRef) -> (Arc<SessionHandle>, bool) {
        let mut inner = self.inner.lock().await;
        let key = peer.to_string();
        if let Some(existing) = inner.open.get(&key) {
            return (existing.clone(), false);
        }
        let handle = Arc::new(SessionHandle::new(*peer));
        inner.open.insert(key, handle.clone());
        (handle, true)
    }

    /// Current handle for `peer`, if a session is live.
    pub async fn get(&self, peer: &FeedRef) -> Option<Arc<SessionHandle>> {
        self.inner.lock().await.open.get(&peer.to_string()).cloned()
    }

    /// Resolve once no session exists for `peer`. Returns immediately
    /// when the slot is already empty.
    pub async fn wait(&self, peer: &FeedRef) {
        let rx = {
            let mut inner = self.inner.lock().await;
            let key = peer.to_string();
            if !inner.open.contains_key(&key) {
                return;
            }
            let (tx, rx) = oneshot::channel();
            inner.waiting.entry(key).or_default().push(tx);
            rx
        };
        // the sender side is never dropped without a close notification,
        // but a recv error resolves the wait just the same
        let _ = rx.await;
    }

    /// Remove `peer`'s session and release every waiter.
    pub async fn close(&self, peer: &FeedRef) {
        let mut inner = self.inner.lock().await;
        let key = peer.to_string();
        if let Some(handle) = inner.open.remove(&key) {
            handle.set_state(SessionState::Closed);
        }
        if let Some(waiters) = inner.waiting.remove(&key) {
            debug!(peer = %peer.short(), waiters = waiters.len(), "releasing session waiters");
            for waiter in waiters {
                let _ = waiter.send(());
            }
        }
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.open.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.open.is_empty()
    }
}
