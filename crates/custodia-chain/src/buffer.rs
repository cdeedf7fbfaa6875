//! In-memory event buffer between `log_event` and trail ingestion.
//!
//! Events accumulate here until the flush worker drains them, either because
//! the buffer crossed its size threshold or because the flush timer fired.
//! The drain is an atomic swap: flush always operates on a detached batch,
//! never on the live buffer, so `log_event` callers are never blocked by
//! ingestion or forwarding.
//!
//! Flush is at-least-once: a batch whose persistence fails is pushed back to
//! the front in its original order, and the trail store dedupes by event id
//! on the retry.

use std::collections::VecDeque;
use std::sync::Mutex;

use tracing::warn;

use custodia_contracts::event::AuditEvent;

/// A guarded FIFO of stamped, not-yet-ingested events.
pub struct EventBuffer {
    inner: Mutex<VecDeque<AuditEvent>>,
    max_size: usize,
}

impl EventBuffer {
    /// Create a buffer that signals a flush at `max_size` events.
    pub fn new(max_size: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
            max_size,
        }
    }

    /// Append one event and return the buffer length afterwards.
    ///
    /// The caller compares the returned length against [`Self::max_size`] to
    /// decide whether to signal an early flush.
    pub fn append(&self, event: AuditEvent) -> usize {
        let mut inner = self.inner.lock().expect("event buffer lock poisoned");
        inner.push_back(event);
        inner.len()
    }

    /// Drain all buffered events atomically (swap-and-clear).
    ///
    /// Returns the detached batch in append order. Draining an empty buffer
    /// returns an empty batch and has no other effect.
    pub fn drain(&self) -> Vec<AuditEvent> {
        let mut inner = self.inner.lock().expect("event buffer lock poisoned");
        inner.drain(..).collect()
    }

    /// Push a failed batch back to the front, preserving order.
    ///
    /// Events logged while the flush was in flight stay behind the requeued
    /// batch, keeping the overall order stable for the next attempt.
    pub fn requeue_front(&self, batch: Vec<AuditEvent>) {
        if batch.is_empty() {
            return;
        }
        let mut inner = self.inner.lock().expect("event buffer lock poisoned");
        warn!(batch_len = batch.len(), buffered = inner.len(), "requeueing failed flush batch");
        for event in batch.into_iter().rev() {
            inner.push_front(event);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("event buffer lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The size threshold at which a flush should be signaled.
    pub fn max_size(&self) -> usize {
        self.max_size
    }
}
