//! Scripted contact source

use futures::stream::{self, BoxStream, StreamExt};
use futures::FutureExt;
use skiff_core::{ContactEvent, ContactSource, SourceError};
use tokio::sync::Mutex;

/// Contact source over an in-memory event list.
///
/// Events can be appended between builds, and the next read can be made
/// to fail once to exercise the builder's last-good-snapshot policy.
pub struct MemoryContacts {
    events: Mutex<Vec<ContactEvent>>,
    fail_next: Mutex<Option<String>>,
}

impl MemoryContacts {
    pub fn new(events: Vec<ContactEvent>) -> Self {
        Self {
            events: Mutex::new(events),
            fail_next: Mutex::new(None),
        }
    }

    /// Append another contact statement.
    pub async fn push(&self, event: ContactEvent) {
        self.events.lock().await.push(event);
    }

    /// Make the next `contacts()` read fail with `reason`.
    pub async fn fail_next(&self, reason: &str) {
        *self.fail_next.lock().await = Some(reason.to_string());
    }
}

impl ContactSource for MemoryContacts {
    fn contacts(&self) -> BoxStream<'_, Result<ContactEvent, SourceError>> {
        async move {
            if let Some(reason) = self.fail_next.lock().await.take() {
                return stream::iter(vec![Err(SourceError::new(reason))]).boxed();
            }
            let events = self.events.lock().await.clone();
            stream::iter(events.into_iter().map(Ok)).boxed()
        }
        .flatten_stream()
        .boxed()
    }
}
