//! DMA control core.
//!
//! Moves one fixed-size block from the sink into a buffer, then replays it to
//! the source on host request.
//!
//! # State Machine
//!
//! ```text
//!            start                 last in               start
//!   IDLE ──────────► DATA_WRITE ─────────────► WAIT ──────────► DATA_READ
//!    ▲ ▲                                                           │
//!    │ └──────────────── abort (from any state) ───────────────────┤
//!    │                                                              │ last out
//!    │        start → DATA_WRITE                                    ▼
//!    └──────────────────────────────────────────────────────── READ_DONE
//! ```
//!
//! Status codes: 0 IDLE, 1 DATA_WRITE, 2 WAIT, 3 DATA_READ, 4 READ_DONE.
//! READ_DONE behaves as IDLE except that both completion flags stay held
//! until the next start.
//!
//! `start` and `abort` act on the host write strobe, never on the stored
//! value, so one host write triggers exactly one transition.

use std::fmt;

use super::{BLOCK_WORDS, CORE_BUFFER_DEPTH};
use crate::csr::{ControlRegister, StatusRegister};
use crate::stream::{StreamItem, StreamStage, SyncFifo};

/// Control FSM state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ControlState {
    #[default]
    Idle,
    DataWrite,
    Wait,
    DataRead,
    /// IDLE entered from a completed read; completion flags held
    ReadDone,
}

impl ControlState {
    /// Code exposed on the `state` status register.
    pub fn status_code(self) -> u64 {
        match self {
            ControlState::Idle => 0,
            ControlState::DataWrite => 1,
            ControlState::Wait => 2,
            ControlState::DataRead => 3,
            ControlState::ReadDone => 4,
        }
    }
}

impl fmt::Display for ControlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControlState::Idle => "IDLE",
            ControlState::DataWrite => "DATA_WRITE",
            ControlState::Wait => "WAIT",
            ControlState::DataRead => "DATA_READ",
            ControlState::ReadDone => "READ_DONE",
        };
        write!(f, "{}", name)
    }
}

/// Counter-driven block framing.
///
/// Overrides upstream `first`/`last`: `first` is set when the count is 0,
/// `last` when it is `BLOCK_WORDS - 1`. The count advances on every transfer
/// and wraps on a `last` transfer, so it always lies in `[0, BLOCK_WORDS)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockFramer {
    count: u32,
}

impl BlockFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Words transferred in the current block.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Apply counter-derived flags to an item.
    pub fn frame(&self, item: StreamItem) -> StreamItem {
        item.with_first(self.count == 0)
            .with_last(self.count == BLOCK_WORDS - 1)
    }

    /// Advance on a transfer of a framed item.
    pub fn commit(&mut self, framed: &StreamItem) {
        if framed.fires() {
            self.count = if framed.last { 0 } else { self.count + 1 };
        }
    }

    pub fn clear(&mut self) {
        self.count = 0;
    }
}

/// Host-visible registers of the control core.
#[derive(Debug, Clone)]
pub struct CoreRegisters {
    /// Run the test (strobe-triggered)
    pub start: ControlRegister,
    /// Return to IDLE from any state (strobe-triggered)
    pub abort: ControlRegister,
    /// Writing complete
    pub wr_done: StatusRegister,
    /// Reading complete
    pub rd_done: StatusRegister,
    /// Current state code
    pub state: StatusRegister,
    /// Block word counter
    pub count: StatusRegister,
}

impl CoreRegisters {
    fn new() -> Self {
        Self {
            start: ControlRegister::new(1, 0),
            abort: ControlRegister::new(1, 0),
            wr_done: StatusRegister::new(1),
            rd_done: StatusRegister::new(1),
            state: StatusRegister::new(3),
            count: StatusRegister::new(8),
        }
    }
}

/// Block-framing DMA control core.
///
/// As a [`StreamStage`], its sink accepts only in DATA_WRITE and its source
/// offers only in DATA_READ.
#[derive(Debug, Clone)]
pub struct DmaControlCore {
    data_width: u32,
    state: ControlState,
    framer: BlockFramer,
    fifo: SyncFifo,
    wr_done: bool,
    rd_done: bool,
    regs: CoreRegisters,
}

impl DmaControlCore {
    /// Create a core with the default block buffer.
    pub fn new(data_width: u32) -> Self {
        Self::with_buffer_depth(data_width, CORE_BUFFER_DEPTH)
    }

    /// Create a core with an explicit block buffer depth.
    pub fn with_buffer_depth(data_width: u32, depth: usize) -> Self {
        Self {
            data_width,
            state: ControlState::Idle,
            framer: BlockFramer::new(),
            fifo: SyncFifo::new(depth),
            wr_done: false,
            rd_done: false,
            regs: CoreRegisters::new(),
        }
    }

    pub fn data_width(&self) -> u32 {
        self.data_width
    }

    pub fn state(&self) -> ControlState {
        self.state
    }

    pub fn registers(&self) -> &CoreRegisters {
        &self.regs
    }

    /// Words currently buffered.
    pub fn buffer_level(&self) -> usize {
        self.fifo.level()
    }

    /// Host write to `start`.
    pub fn write_start(&mut self) {
        self.regs.start.write(1);
    }

    /// Host write to `abort`.
    pub fn write_abort(&mut self) {
        self.regs.abort.write(1);
    }

    /// Host read of `wr_done`.
    pub fn wr_done(&self) -> bool {
        self.regs.wr_done.read() != 0
    }

    /// Host read of `rd_done`.
    pub fn rd_done(&self) -> bool {
        self.regs.rd_done.read() != 0
    }

    /// Host read of `state`.
    pub fn status_code(&self) -> u64 {
        self.regs.state.read()
    }

    /// Host read of `count`.
    pub fn count(&self) -> u64 {
        self.regs.count.read()
    }

    fn transition(&mut self, next: ControlState, cause: &str) {
        log::debug!("DMA core: {} -> {} ({})", self.state, next, cause);
        self.state = next;
    }

    fn step_fsm(&mut self, sink: &StreamItem, source: &StreamItem) {
        let start = self.regs.start.strobe();

        if self.regs.abort.strobe() {
            self.fifo.flush();
            self.framer.clear();
            self.wr_done = false;
            self.rd_done = false;
            if self.state != ControlState::Idle {
                self.transition(ControlState::Idle, "abort");
            }
            return;
        }

        match self.state {
            ControlState::Idle | ControlState::ReadDone => {
                self.framer.clear();
                if self.state == ControlState::Idle || start {
                    self.wr_done = false;
                    self.rd_done = false;
                }
                if start {
                    self.transition(ControlState::DataWrite, "start");
                }
            }
            ControlState::DataWrite => {
                let framed = self.framer.frame(*sink);
                if framed.fires() {
                    self.fifo.commit(&framed, &StreamItem::idle());
                    self.framer.commit(&framed);
                    if framed.last {
                        self.wr_done = true;
                        self.transition(ControlState::Wait, "last word buffered");
                    }
                }
            }
            ControlState::Wait => {
                if start {
                    self.transition(ControlState::DataRead, "start");
                }
            }
            ControlState::DataRead => {
                if source.fires() {
                    self.fifo.commit(&StreamItem::idle(), source);
                    if source.last {
                        self.rd_done = true;
                        self.transition(ControlState::ReadDone, "last word replayed");
                    }
                }
            }
        }
    }
}

impl StreamStage for DmaControlCore {
    fn source(&self, _sink: &StreamItem) -> StreamItem {
        match self.state {
            ControlState::DataRead => self.fifo.source(&StreamItem::idle()),
            _ => StreamItem::idle(),
        }
    }

    fn sink_ready(&self, _sink: &StreamItem, _source_ready: bool) -> bool {
        match self.state {
            ControlState::DataWrite => !self.fifo.is_full(),
            _ => false,
        }
    }

    fn commit(&mut self, sink: &StreamItem, source: &StreamItem) {
        self.step_fsm(sink, source);

        self.regs.wr_done.update(self.wr_done as u64);
        self.regs.rd_done.update(self.rd_done as u64);
        self.regs.state.update(self.state.status_code());
        self.regs.count.update(self.framer.count() as u64);

        self.regs.start.tick();
        self.regs.abort.tick();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{step_chain, ChainWires};

    fn tick(core: &mut DmaControlCore, input: StreamItem, out_ready: bool) -> ChainWires {
        step_chain(&mut [core as &mut dyn StreamStage], input, out_ready)
    }

    /// Host start, then the two ticks it takes to act.
    fn start(core: &mut DmaControlCore) {
        core.write_start();
        tick(core, StreamItem::idle(), false);
        tick(core, StreamItem::idle(), false);
    }

    /// Feed `n` words (one per tick while accepted); returns words accepted.
    fn feed(core: &mut DmaControlCore, n: u64) -> u64 {
        let mut accepted = 0;
        for _ in 0..(n * 2) {
            if accepted == n {
                break;
            }
            let w = tick(core, StreamItem::word(0x100 + accepted), false);
            if w[0].fires() {
                accepted += 1;
            }
        }
        accepted
    }

    /// Drain the source until `rd_done`, collecting fired items.
    fn drain(core: &mut DmaControlCore) -> Vec<StreamItem> {
        let mut out = Vec::new();
        for _ in 0..200 {
            let w = tick(core, StreamItem::idle(), true);
            if w[1].fires() {
                out.push(w[1]);
            }
            if core.state() == ControlState::ReadDone {
                break;
            }
        }
        out
    }

    #[test]
    fn test_write_block_then_wait() {
        let mut core = DmaControlCore::new(8);
        assert_eq!(core.state(), ControlState::Idle);

        start(&mut core);
        assert_eq!(core.state(), ControlState::DataWrite);
        assert_eq!(core.status_code(), 1);

        assert_eq!(feed(&mut core, 32), 32);
        for _ in 0..10 {
            tick(&mut core, StreamItem::idle(), false);
        }

        assert_eq!(core.state(), ControlState::Wait);
        assert!(core.wr_done());
        assert!(!core.rd_done());
        assert_eq!(core.status_code(), 2);
        assert_eq!(core.buffer_level(), 32);
    }

    #[test]
    fn test_sink_stalls_after_block() {
        let mut core = DmaControlCore::new(8);
        start(&mut core);
        // Offer more than a block; only 32 are accepted
        assert_eq!(feed(&mut core, 40), 32);
        assert_eq!(core.state(), ControlState::Wait);
    }

    #[test]
    fn test_start_is_edge_sensitive() {
        let mut core = DmaControlCore::new(8);
        start(&mut core);
        feed(&mut core, 32);

        // The stored start value stays 1 but no new write happened
        assert_eq!(core.registers().start.storage(), 1);
        for _ in 0..50 {
            tick(&mut core, StreamItem::idle(), true);
        }
        assert_eq!(core.state(), ControlState::Wait);
    }

    #[test]
    fn test_full_cycle_reuses_start() {
        let mut core = DmaControlCore::new(8);
        start(&mut core);
        feed(&mut core, 32);

        start(&mut core);
        assert_eq!(core.state(), ControlState::DataRead);
        assert_eq!(core.status_code(), 3);

        let out = drain(&mut core);
        assert_eq!(out.len(), 32);
        assert_eq!(
            out.iter().map(|i| i.data).collect::<Vec<_>>(),
            (0x100..0x120).collect::<Vec<_>>()
        );
        assert!(out[0].first);
        assert!(out[31].last);
        assert!(out[1..31].iter().all(|i| !i.first && !i.last));

        assert_eq!(core.state(), ControlState::ReadDone);
        assert_eq!(core.status_code(), 4);
        assert!(core.wr_done());
        assert!(core.rd_done());

        // Flags hold in READ_DONE
        for _ in 0..5 {
            tick(&mut core, StreamItem::idle(), true);
        }
        assert!(core.wr_done() && core.rd_done());

        // A new start clears them and begins the next block
        start(&mut core);
        assert_eq!(core.state(), ControlState::DataWrite);
        assert!(!core.wr_done());
        assert!(!core.rd_done());
        assert_eq!(core.count(), 0);
    }

    #[test]
    fn test_framing_overrides_upstream_flags() {
        let mut core = DmaControlCore::new(8);
        start(&mut core);

        let mut accepted = 0u64;
        while accepted < 32 {
            // Upstream claims every word is both first and last
            let input = StreamItem::word(accepted).with_first(true).with_last(true);
            let w = tick(&mut core, input, false);
            if w[0].fires() {
                accepted += 1;
                assert!(core.count() < BLOCK_WORDS as u64);
            }
        }

        start(&mut core);
        let out = drain(&mut core);
        let firsts: Vec<usize> = out
            .iter()
            .enumerate()
            .filter(|(_, i)| i.first)
            .map(|(n, _)| n)
            .collect();
        let lasts: Vec<usize> = out
            .iter()
            .enumerate()
            .filter(|(_, i)| i.last)
            .map(|(n, _)| n)
            .collect();
        assert_eq!(firsts, vec![0]);
        assert_eq!(lasts, vec![31]);
    }

    #[test]
    fn test_framer_every_32nd_transfer() {
        let mut framer = BlockFramer::new();
        for n in 0..100u32 {
            let framed = framer.frame(StreamItem::word(n as u64).with_ready(true));
            assert_eq!(framed.first, n % 32 == 0, "first at transfer {}", n);
            assert_eq!(framed.last, n % 32 == 31, "last at transfer {}", n);
            framer.commit(&framed);
            assert!(framer.count() < BLOCK_WORDS);
        }
    }

    #[test]
    fn test_framer_holds_without_transfer() {
        let mut framer = BlockFramer::new();
        framer.commit(&framer.frame(StreamItem::word(0)));
        assert_eq!(framer.count(), 0, "no ready, no transfer");
    }

    #[test]
    fn test_abort_from_write() {
        let mut core = DmaControlCore::new(8);
        start(&mut core);
        feed(&mut core, 10);
        assert_eq!(core.buffer_level(), 10);

        core.write_abort();
        tick(&mut core, StreamItem::idle(), false);
        tick(&mut core, StreamItem::idle(), false);

        assert_eq!(core.state(), ControlState::Idle);
        assert_eq!(core.status_code(), 0);
        assert_eq!(core.buffer_level(), 0);
        assert_eq!(core.count(), 0);
        assert!(!core.wr_done());

        // Next block starts with a fresh first word
        start(&mut core);
        assert_eq!(feed(&mut core, 32), 32);
        assert_eq!(core.state(), ControlState::Wait);
    }

    #[test]
    fn test_abort_from_read_done_returns_to_idle() {
        let mut core = DmaControlCore::new(8);
        start(&mut core);
        feed(&mut core, 32);
        start(&mut core);
        drain(&mut core);
        assert_eq!(core.state(), ControlState::ReadDone);

        core.write_abort();
        tick(&mut core, StreamItem::idle(), false);
        tick(&mut core, StreamItem::idle(), false);
        assert_eq!(core.state(), ControlState::Idle);
        assert!(!core.wr_done() && !core.rd_done());
    }

    #[test]
    fn test_every_state_has_a_next_state() {
        // Drive each reachable state, then apply each control input.
        let reach: [fn() -> DmaControlCore; 5] = [
            || DmaControlCore::new(8),
            || {
                let mut c = DmaControlCore::new(8);
                start(&mut c);
                c
            },
            || {
                let mut c = DmaControlCore::new(8);
                start(&mut c);
                feed(&mut c, 32);
                c
            },
            || {
                let mut c = DmaControlCore::new(8);
                start(&mut c);
                feed(&mut c, 32);
                start(&mut c);
                c
            },
            || {
                let mut c = DmaControlCore::new(8);
                start(&mut c);
                feed(&mut c, 32);
                start(&mut c);
                drain(&mut c);
                c
            },
        ];
        let expected = [
            ControlState::Idle,
            ControlState::DataWrite,
            ControlState::Wait,
            ControlState::DataRead,
            ControlState::ReadDone,
        ];

        for (make, from) in reach.iter().zip(expected) {
            assert_eq!(make().state(), from);

            // No input and no consumer: every state holds
            let mut c = make();
            tick(&mut c, StreamItem::idle(), false);
            tick(&mut c, StreamItem::idle(), false);
            assert_eq!(c.state(), from);

            // Start
            let mut c = make();
            start(&mut c);
            let after_start = match from {
                ControlState::Idle | ControlState::ReadDone => ControlState::DataWrite,
                ControlState::Wait => ControlState::DataRead,
                other => other,
            };
            assert_eq!(c.state(), after_start, "start from {}", from);

            // Abort
            let mut c = make();
            c.write_abort();
            tick(&mut c, StreamItem::idle(), false);
            tick(&mut c, StreamItem::idle(), false);
            assert_eq!(c.state(), ControlState::Idle, "abort from {}", from);
        }
    }
}
