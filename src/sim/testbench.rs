//! Testbench stream drivers.
//!
//! A [`StreamProducer`] presents queued words on a sink port and retires one
//! per accepted transfer; a [`StreamConsumer`] raises ready according to a
//! schedule and records every word it accepts.

use std::collections::VecDeque;

use crate::stream::StreamItem;

/// Upstream driver feeding queued words into a stream sink.
#[derive(Debug, Clone, Default)]
pub struct StreamProducer {
    queue: VecDeque<StreamItem>,
    sent: usize,
}

impl StreamProducer {
    /// Create an empty producer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a producer with unframed words (first/last left low).
    pub fn from_words<I: IntoIterator<Item = u64>>(words: I) -> Self {
        let mut producer = Self::new();
        for w in words {
            producer.push(w, false, false);
        }
        producer
    }

    /// Queue one word with explicit framing flags.
    pub fn push(&mut self, data: u64, first: bool, last: bool) {
        self.queue.push_back(StreamItem::word(data).with_first(first).with_last(last));
    }

    /// Item presented this tick (valid only while words remain).
    pub fn item(&self) -> StreamItem {
        self.queue.front().copied().unwrap_or_default()
    }

    /// Retire the front word if the resolved transfer fired.
    pub fn advance(&mut self, resolved: &StreamItem) {
        if resolved.fires() {
            self.queue.pop_front();
            self.sent += 1;
        }
    }

    /// Words still waiting to be accepted.
    pub fn remaining(&self) -> usize {
        self.queue.len()
    }

    /// Words accepted so far.
    pub fn sent(&self) -> usize {
        self.sent
    }

    /// True once every queued word was accepted.
    pub fn is_done(&self) -> bool {
        self.queue.is_empty()
    }
}

/// Downstream driver draining a stream source.
#[derive(Debug, Clone)]
pub struct StreamConsumer {
    received: Vec<StreamItem>,
    ready_pattern: Vec<bool>,
    tick: usize,
}

impl Default for StreamConsumer {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamConsumer {
    /// Consumer that is always ready.
    pub fn new() -> Self {
        Self::with_ready_pattern(vec![true])
    }

    /// Consumer whose ready follows `pattern`, repeating cyclically.
    ///
    /// An empty pattern means never ready.
    pub fn with_ready_pattern(pattern: Vec<bool>) -> Self {
        Self {
            received: Vec::new(),
            ready_pattern: pattern,
            tick: 0,
        }
    }

    /// Ready presented this tick.
    pub fn ready(&self) -> bool {
        if self.ready_pattern.is_empty() {
            return false;
        }
        self.ready_pattern[self.tick % self.ready_pattern.len()]
    }

    /// Record the resolved transfer and move to the next tick.
    pub fn advance(&mut self, resolved: &StreamItem) {
        if resolved.fires() {
            self.received.push(*resolved);
        }
        self.tick += 1;
    }

    /// Every accepted item, in order.
    pub fn received(&self) -> &[StreamItem] {
        &self.received
    }

    /// Payloads of every accepted item, in order.
    pub fn words(&self) -> Vec<u64> {
        self.received.iter().map(|i| i.data).collect()
    }
}
