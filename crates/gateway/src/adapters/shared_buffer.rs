// Rust guideline compliant 2026-03-07

//! Shared-buffer adapter for the `RecordSink` and `RecordSource` ports.
//!
//! A single-producer, two-consumer FIFO. Each node carries one seen-flag per
//! consumer; a `remove` copies the head out, marks it seen for the calling
//! consumer, and the node is unlinked by whichever consumer marks it second.
//! Either consumer may run at most one node ahead of the other, and a
//! consumer never re-observes the head it has already taken.
//!
//! The buffer consults the shared [`PipelineFlags`]: once storage degrades,
//! both `insert` and `remove` fail and [`SharedBuffer::set_degraded`] has
//! discarded whatever was queued; once the producer is done, `remove` on an
//! empty buffer reports `Closed` so consumers can exit.

use domain::{BufferError, ConsumerTag, PipelineFlags, RecordSink, RecordSource, SensorRecord};
use std::collections::VecDeque;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// One buffered record plus its per-consumer delivery state.
#[derive(Debug)]
struct Node {
    record: SensorRecord,
    analytics_seen: bool,
    storage_seen: bool,
}

impl Node {
    fn new(record: SensorRecord) -> Self {
        Self { record, analytics_seen: false, storage_seen: false }
    }

    fn seen(&self, tag: ConsumerTag) -> bool {
        match tag {
            ConsumerTag::Analytics => self.analytics_seen,
            ConsumerTag::Storage => self.storage_seen,
        }
    }

    fn mark_seen(&mut self, tag: ConsumerTag) {
        match tag {
            ConsumerTag::Analytics => self.analytics_seen = true,
            ConsumerTag::Storage => self.storage_seen = true,
        }
    }

    fn fully_seen(&self) -> bool {
        self.analytics_seen && self.storage_seen
    }
}

// ---------------------------------------------------------------------------
// SharedBuffer
// ---------------------------------------------------------------------------

/// FIFO shared by the connection manager and both consumers.
///
/// Every mutation (insert, seen-flag, unlink) takes the writer lock;
/// `is_empty` takes the cheap read side for consumer idle loops.
#[derive(Debug)]
pub struct SharedBuffer {
    nodes: RwLock<VecDeque<Node>>,
    flags: Arc<PipelineFlags>,
}

impl SharedBuffer {
    /// Create an empty buffer wired to the pipeline flags.
    #[must_use]
    pub fn new(flags: Arc<PipelineFlags>) -> Self {
        Self { nodes: RwLock::new(VecDeque::new()), flags }
    }

    /// Degrade the pipeline: set the flag and discard everything queued.
    ///
    /// After this call every `insert` and `remove` fails; nodes that were
    /// waiting for a second observation are dropped without one.
    pub fn set_degraded(&self) {
        self.flags.set_storage_degraded();
        let dropped = {
            let mut nodes = self.write();
            let n = nodes.len();
            nodes.clear();
            n
        };
        log::warn!("sbuffer.degraded: discarded={dropped}");
    }

    fn write(&self) -> RwLockWriteGuard<'_, VecDeque<Node>> {
        self.nodes.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read(&self) -> RwLockReadGuard<'_, VecDeque<Node>> {
        self.nodes.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RecordSink for SharedBuffer {
    /// Append `record` behind the tail.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::Degraded`] once storage has degraded, or
    /// [`BufferError::Closed`] after the producer side has been closed.
    async fn insert(&self, record: SensorRecord) -> Result<(), BufferError> {
        if self.flags.storage_degraded() {
            return Err(BufferError::Degraded);
        }
        if self.flags.producer_done() {
            return Err(BufferError::Closed);
        }
        self.write().push_back(Node::new(record));
        Ok(())
    }
}

impl RecordSource for SharedBuffer {
    /// Observe the head on behalf of `tag`; unlink it once both consumers
    /// have observed it.
    ///
    /// Returns `Ok(None)` both on an empty buffer and when this consumer has
    /// already seen the current head -- it must wait for the other consumer
    /// to advance rather than re-observe.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::Degraded`] once storage has degraded, or
    /// [`BufferError::Closed`] when the producer is done and the buffer has
    /// drained.
    async fn remove(&self, tag: ConsumerTag) -> Result<Option<SensorRecord>, BufferError> {
        if self.flags.storage_degraded() {
            return Err(BufferError::Degraded);
        }
        let mut nodes = self.write();
        let Some(head) = nodes.front_mut() else {
            return if self.flags.producer_done() {
                Err(BufferError::Closed)
            } else {
                Ok(None)
            };
        };
        if head.seen(tag) {
            return Ok(None);
        }
        let record = head.record;
        head.mark_seen(tag);
        if head.fully_seen() {
            nodes.pop_front();
        }
        Ok(Some(record))
    }

    fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
