//! Core types and trait seams of the skiff replication core
//!
//! This crate holds everything the higher layers share: canonical feed and
//! message identities, replication notes and frontiers, contact events,
//! and the narrow trait interfaces through which the core consumes its
//! external collaborators (message log, verifier, transport, replication
//! lister).
//!
//! Nothing here does I/O on its own; the traits are implemented by the
//! embedding node (or by `skiff-testkit` in tests).

pub mod contacts;
pub mod lister;
pub mod log;
pub mod note;
pub mod refs;
pub mod transport;
pub mod verify;

pub use contacts::{ContactEvent, ContactSource, Relation, SourceError};
pub use lister::{ListError, ReplicationLister};
pub use log::{LogEntry, LogError, MessageLog};
pub use note::{NetworkFrontier, Note};
pub use refs::{FeedFormat, FeedRef, MessageRef, RefError, KEY_LEN};
pub use transport::{
    Duplex, Frame, FrameSink, FrameSource, HistoryStreamClient, Transport, TransportError,
};
pub use verify::{VerifiedMessage, Verifier, VerifyError};
