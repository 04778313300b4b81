//! Ready/valid streams.
//!
//! A stream connects a producer (source side of one stage) to a consumer
//! (sink side of the next). A word moves on a tick iff `valid && ready`.
//! `first`/`last` delimit blocks and only mean something on a transfer tick.
//!
//! # Stage Contract
//!
//! Stages implement [`StreamStage`]. Valid and payload flow forward and may
//! depend on the upstream item; ready flows backward and may depend on the
//! downstream ready. Valid never depends on ready, so a chain always settles
//! in one forward pass followed by one backward pass:
//!
//! ```text
//!   input ──► stage0 ──► stage1 ──► ... ──► stageN ──► output
//!         ◄──        ◄──        ◄──     ◄──        ◄── output_ready
//! ```

pub mod converter;
pub mod fifo;

pub use converter::{Converter, SubwordOrder};
pub use fifo::SyncFifo;

use smallvec::SmallVec;

/// Wire state of one stream endpoint for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamItem {
    /// Data word
    pub data: u64,
    /// Producer asserts data is present
    pub valid: bool,
    /// Consumer asserts it can accept
    pub ready: bool,
    /// First word of a block
    pub first: bool,
    /// Final word of a block
    pub last: bool,
}

impl StreamItem {
    /// An idle endpoint (nothing offered, nothing accepted).
    pub fn idle() -> Self {
        Self::default()
    }

    /// A valid, unframed word.
    pub fn word(data: u64) -> Self {
        Self {
            data,
            valid: true,
            ..Self::default()
        }
    }

    /// Set the first flag.
    pub fn with_first(mut self, first: bool) -> Self {
        self.first = first;
        self
    }

    /// Set the last flag.
    pub fn with_last(mut self, last: bool) -> Self {
        self.last = last;
        self
    }

    /// Set the ready flag.
    pub fn with_ready(mut self, ready: bool) -> Self {
        self.ready = ready;
        self
    }

    /// True when a transfer occurs this tick.
    #[inline]
    pub fn fires(&self) -> bool {
        self.valid && self.ready
    }
}

/// One stage of a stream pipeline.
pub trait StreamStage {
    /// Valid, payload and flags presented on the source side this tick.
    ///
    /// `sink` carries the upstream valid/payload; its ready field is not yet
    /// resolved and must not be read.
    fn source(&self, sink: &StreamItem) -> StreamItem;

    /// Ready presented on the sink side this tick.
    fn sink_ready(&self, sink: &StreamItem, source_ready: bool) -> bool;

    /// Commit registered state at the clock edge, given both resolved ends.
    fn commit(&mut self, sink: &StreamItem, source: &StreamItem);
}

/// Resolved wires of a chain: `stages.len() + 1` items, input first.
pub type ChainWires = SmallVec<[StreamItem; 8]>;

/// Resolve every wire of a chain of stages for one tick.
pub fn settle(
    stages: &[&dyn StreamStage],
    input: StreamItem,
    output_ready: bool,
) -> ChainWires {
    let mut wires = ChainWires::with_capacity(stages.len() + 1);
    wires.push(input.with_ready(false));
    for (i, stage) in stages.iter().enumerate() {
        let next = stage.source(&wires[i]).with_ready(false);
        wires.push(next);
    }

    let n = stages.len();
    wires[n].ready = output_ready;
    for i in (0..n).rev() {
        let downstream_ready = wires[i + 1].ready;
        wires[i].ready = stages[i].sink_ready(&wires[i], downstream_ready);
    }
    wires
}

/// Commit a chain with wires previously resolved by [`settle`].
pub fn commit_chain(stages: &mut [&mut dyn StreamStage], wires: &[StreamItem]) {
    debug_assert_eq!(wires.len(), stages.len() + 1);
    for (i, stage) in stages.iter_mut().enumerate() {
        stage.commit(&wires[i], &wires[i + 1]);
    }
}

/// Settle and commit a chain in one step, returning the resolved wires.
pub fn step_chain(
    stages: &mut [&mut dyn StreamStage],
    input: StreamItem,
    output_ready: bool,
) -> ChainWires {
    let wires = {
        let view: SmallVec<[&dyn StreamStage; 8]> = stages.iter().map(|s| &**s).collect();
        settle(&view, input, output_ready)
    };
    commit_chain(stages, &wires);
    wires
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_item_fires() {
        let item = StreamItem::word(0xAB);
        assert!(!item.fires());
        assert!(item.with_ready(true).fires());
        assert!(!StreamItem::idle().with_ready(true).fires());
    }

    #[test]
    fn test_chain_of_fifos_preserves_order() {
        let mut a = SyncFifo::new(2);
        let mut b = SyncFifo::new(2);
        let mut out = Vec::new();
        let mut next = 0u64;

        for _ in 0..40 {
            let input = if next < 10 { StreamItem::word(next) } else { StreamItem::idle() };
            let wires = step_chain(&mut [&mut a, &mut b], input, true);
            if wires[0].fires() {
                next += 1;
            }
            if wires[2].fires() {
                out.push(wires[2].data);
            }
        }
        assert_eq!(out, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_backpressure_reaches_input() {
        let mut a = SyncFifo::new(1);
        let mut b = SyncFifo::new(1);

        // Output never ready: two words fill both FIFOs, then input stalls
        let mut accepted = 0;
        for _ in 0..10 {
            let w = step_chain(&mut [&mut a, &mut b], StreamItem::word(accepted), false);
            if w[0].fires() {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 2);
        assert!(a.is_full());
        assert!(b.is_full());
    }
}
