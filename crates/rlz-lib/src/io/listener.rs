//! Block event listeners.
//!
//! Listeners observe the pipeline; they never steer it. Every notification
//! runs behind a panic boundary so a faulty listener cannot corrupt codec
//! state or abort a worker.

use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::{debug, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    CompressionStart,
    CompressionEnd,
    DecompressionStart,
    DecompressionEnd,
    BeforeTransform,
    AfterTransform,
    BeforeEntropy,
    AfterEntropy,
    BlockInfo,
}

#[derive(Clone, Debug)]
pub struct Event {
    pub kind: EventKind,
    /// Block ordinal, or usize::MAX for stream-level events.
    pub block_id: usize,
    pub size: usize,
    pub hash: Option<u32>,
}

impl Event {
    pub fn stream(kind: EventKind, size: usize) -> Self {
        Self {
            kind,
            block_id: usize::MAX,
            size,
            hash: None,
        }
    }

    pub fn block(kind: EventKind, block_id: usize, size: usize, hash: Option<u32>) -> Self {
        Self {
            kind,
            block_id,
            size,
            hash,
        }
    }
}

/// Observer of pipeline events. Must be Send + Sync: notifications can come
/// from any worker.
pub trait Listener: Send + Sync {
    fn process_event(&self, event: &Event);
}

/// Notify every listener, isolating panics.
pub fn notify(listeners: &[Box<dyn Listener>], event: &Event) {
    for listener in listeners {
        if catch_unwind(AssertUnwindSafe(|| listener.process_event(event))).is_err() {
            warn!(kind = ?event.kind, block = event.block_id, "listener panicked; event dropped");
        }
    }
}

/// Logs block sizes through tracing at debug level.
pub struct InfoListener;

impl Listener for InfoListener {
    fn process_event(&self, event: &Event) {
        debug!(
            kind = ?event.kind,
            block = event.block_id,
            size = event.size,
            "pipeline event"
        );
    }
}
