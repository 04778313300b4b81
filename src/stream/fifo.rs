//! Synchronous FIFO buffer.
//!
//! Stores payload plus first/last flags. Both ends are registered:
//! `ready` is "not full" and `valid` is "not empty" as of the previous clock
//! edge, so a word pushed on tick `t` is offered on tick `t + 1`. A pop on
//! the same tick does not free a slot for a same-tick push; the bound is
//! never exceeded.

use std::collections::VecDeque;

use super::{StreamItem, StreamStage};

/// Bounded FIFO of stream items.
#[derive(Debug, Clone)]
pub struct SyncFifo {
    entries: VecDeque<StreamItem>,
    depth: usize,
    high_water: usize,
}

impl SyncFifo {
    /// Create a FIFO holding at most `depth` items.
    pub fn new(depth: usize) -> Self {
        debug_assert!(depth > 0, "FIFO depth must be non-zero");
        Self {
            entries: VecDeque::with_capacity(depth),
            depth,
            high_water: 0,
        }
    }

    /// Capacity in items.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Number of stored items.
    pub fn level(&self) -> usize {
        self.entries.len()
    }

    /// Highest level observed since creation.
    pub fn high_water(&self) -> usize {
        self.high_water
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.depth
    }

    /// Push directly (returns false if full).
    pub fn push(&mut self, item: StreamItem) -> bool {
        if self.is_full() {
            return false;
        }
        self.entries.push_back(StreamItem { valid: true, ready: false, ..item });
        self.high_water = self.high_water.max(self.entries.len());
        true
    }

    /// Pop directly.
    pub fn pop(&mut self) -> Option<StreamItem> {
        self.entries.pop_front()
    }

    /// Drop every stored item.
    pub fn flush(&mut self) {
        if !self.entries.is_empty() {
            log::debug!("FIFO flush: discarding {} item(s)", self.entries.len());
        }
        self.entries.clear();
    }
}

impl StreamStage for SyncFifo {
    fn source(&self, _sink: &StreamItem) -> StreamItem {
        self.entries.front().copied().unwrap_or_default()
    }

    fn sink_ready(&self, _sink: &StreamItem, _source_ready: bool) -> bool {
        !self.is_full()
    }

    fn commit(&mut self, sink: &StreamItem, source: &StreamItem) {
        if source.fires() {
            let popped = self.entries.pop_front();
            debug_assert!(popped.is_some(), "FIFO emitted while empty");
        }
        if sink.fires() {
            let pushed = self.push(*sink);
            debug_assert!(pushed, "FIFO accepted while full");
            log::trace!(
                "FIFO push 0x{:X} (level {}/{})",
                sink.data,
                self.entries.len(),
                self.depth
            );
        }
    }
}
