//! Progress events for drain polling
//!
//! Waiting for a quiesced cluster to drain can take minutes. The sequencer
//! reports each poll through an optional callback so the CLI can show what it
//! is waiting on.

use std::fmt;
use std::time::Duration;

/// What is being drained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainKind {
    /// Export streams, measured in pending tuples
    Export,
    /// Database replication producers, measured in pending bytes
    DrProducer,
}

impl DrainKind {
    /// `@Statistics` selector for this kind
    pub fn selector(self) -> &'static str {
        match self {
            DrainKind::Export => "EXPORT",
            DrainKind::DrProducer => "DRPRODUCER",
        }
    }

    /// Column that must reach zero on every row
    pub fn pending_column(self) -> &'static str {
        match self {
            DrainKind::Export => "TUPLE_PENDING",
            DrainKind::DrProducer => "TOTALBYTES",
        }
    }
}

impl fmt::Display for DrainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DrainKind::Export => write!(f, "export"),
            DrainKind::DrProducer => write!(f, "DR producer"),
        }
    }
}

/// Progress events emitted while waiting for drain
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Started { kind: DrainKind },
    /// One poll; `pending` is the sum over all rows
    Polling {
        kind: DrainKind,
        pending: i64,
        elapsed: Duration,
    },
    Drained { kind: DrainKind, elapsed: Duration },
    /// Statistics timed out and quiesce is being issued again
    Requiescing,
}

/// Callback type for progress updates
pub type ProgressCallback = Box<dyn Fn(ProgressEvent) + Send + Sync>;

/// Helper to emit progress events
pub(crate) fn emit(callback: &Option<ProgressCallback>, event: ProgressEvent) {
    if let Some(cb) = callback {
        cb(event);
    }
}
