//! DMA test system: control core plus the legs selected by mode.
//!
//! # Tick Order
//!
//! Evaluation runs source-to-sink, then every component commits:
//!
//! ```text
//!   1. mem2x.source         (or external sink port)
//!   2. core.source          (FIFO head in DATA_READ)
//!   3. x2mem.sink_ready     (or external source_ready)
//!   4. core.sink_ready      (FIFO space in DATA_WRITE)
//!   5. leg interrupt pulses
//!   6. commit mem2x, core, x2mem, event manager
//! ```

use smallvec::SmallVec;

use super::channel::{ExternalToMem, MemToExternal};
use super::control::{ControlState, DmaControlCore};
use super::irq::EventManager;
use super::memory::SystemMemory;
use super::DmaParams;
use crate::error::ConfigResult;
use crate::sim::{ClockDomain, StreamConsumer, StreamProducer};
use crate::stream::{StreamItem, StreamStage};

/// Event source names and descriptions.
pub const X2MEM_EVENT: (&str, &str) = ("x2mem_dma", "Block2Mem DMA terminated.");
pub const MEM2X_EVENT: (&str, &str) = ("mem2x_dma", "Mem2Block DMA terminated.");

/// Externally driven stream ports, used where a leg is absent.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExternalPorts {
    /// Offered to the core's sink when there is no mem→external leg
    pub sink: StreamItem,
    /// Ready for the core's source when there is no external→mem leg
    pub source_ready: bool,
}

/// Resolved core boundary wires and interrupt state after one tick.
#[derive(Debug, Clone, Copy)]
pub struct TickReport {
    pub core_sink: StreamItem,
    pub core_source: StreamItem,
    /// Interrupt line after the edge
    pub irq: bool,
    /// Core state after the edge
    pub state: ControlState,
}

/// Complete DMA test system.
#[derive(Debug, Clone)]
pub struct DmaTestSystem {
    params: DmaParams,
    clock: ClockDomain,
    core: DmaControlCore,
    mem2x: Option<MemToExternal>,
    x2mem: Option<ExternalToMem>,
    events: EventManager,
    memory: SystemMemory,
    cycles: u64,
}

impl DmaTestSystem {
    /// Build a system for `params` in the given clock domain.
    pub fn new(params: &DmaParams, clock: &ClockDomain) -> ConfigResult<Self> {
        params.validate()?;

        let x2mem = if params.mode.has_read() {
            Some(ExternalToMem::new(params)?)
        } else {
            None
        };
        let mem2x = if params.mode.has_write() {
            Some(MemToExternal::new(params)?)
        } else {
            None
        };

        let mut events = EventManager::new();
        if x2mem.is_some() {
            events.add_source(X2MEM_EVENT.0, X2MEM_EVENT.1);
        }
        if mem2x.is_some() {
            events.add_source(MEM2X_EVENT.0, MEM2X_EVENT.1);
        }

        log::info!(
            "DMA test system: mode {}, data width {}, bus width {}, fifo depth {}, domain {}",
            params.mode,
            params.data_width,
            params.bus_width,
            params.fifo_depth,
            clock
        );

        Ok(Self {
            params: params.clone(),
            clock: clock.clone(),
            core: DmaControlCore::new(params.data_width),
            mem2x,
            x2mem,
            events,
            memory: SystemMemory::new(params.memory_size, params.endianness),
            cycles: 0,
        })
    }

    pub fn params(&self) -> &DmaParams {
        &self.params
    }

    pub fn clock(&self) -> &ClockDomain {
        &self.clock
    }

    pub fn core(&self) -> &DmaControlCore {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut DmaControlCore {
        &mut self.core
    }

    /// Memory → external leg, present when the mode includes `write`.
    pub fn mem2x(&self) -> Option<&MemToExternal> {
        self.mem2x.as_ref()
    }

    pub fn mem2x_mut(&mut self) -> Option<&mut MemToExternal> {
        self.mem2x.as_mut()
    }

    /// External → memory leg, present when the mode includes `read`.
    pub fn x2mem(&self) -> Option<&ExternalToMem> {
        self.x2mem.as_ref()
    }

    pub fn x2mem_mut(&mut self) -> Option<&mut ExternalToMem> {
        self.x2mem.as_mut()
    }

    pub fn events(&self) -> &EventManager {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut EventManager {
        &mut self.events
    }

    pub fn memory(&self) -> &SystemMemory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut SystemMemory {
        &mut self.memory
    }

    /// Ticks elapsed since construction or the last reset.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Sample the reset signal; when asserted, every component returns to
    /// its initial state. Memory contents are kept.
    pub fn apply_reset(&mut self, level: bool) -> ConfigResult<bool> {
        if !self.clock.reset_asserted(level) {
            return Ok(false);
        }
        log::debug!("DMA test system reset via {}", self.clock.reset);
        let mut fresh = Self::new(&self.params, &self.clock)?;
        std::mem::swap(&mut fresh.memory, &mut self.memory);
        *self = fresh;
        Ok(true)
    }

    /// Advance one clock tick.
    pub fn tick(&mut self, ports: ExternalPorts) -> TickReport {
        let core_in = match &self.mem2x {
            Some(leg) => leg.source(),
            None => ports.sink.with_ready(false),
        };
        let core_out = self.core.source(&core_in);
        let out_ready = match &self.x2mem {
            Some(leg) => leg.sink_ready(&core_out),
            None => ports.source_ready,
        };
        let core_out = core_out.with_ready(out_ready);
        let core_in = core_in.with_ready(self.core.sink_ready(&core_in, out_ready));

        let mut triggers: SmallVec<[bool; 2]> = SmallVec::new();
        if let Some(leg) = &self.x2mem {
            triggers.push(leg.irq());
        }
        if let Some(leg) = &self.mem2x {
            triggers.push(leg.irq());
        }

        if let Some(leg) = &mut self.mem2x {
            leg.commit(&self.memory, &core_in);
        }
        self.core.commit(&core_in, &core_out);
        if let Some(leg) = &mut self.x2mem {
            leg.commit(&mut self.memory, &core_out);
        }
        self.events.commit(&triggers);
        self.cycles += 1;

        TickReport {
            core_sink: core_in,
            core_source: core_out,
            irq: self.events.irq(),
            state: self.core.state(),
        }
    }

    /// Advance one tick with testbench drivers on the external ports.
    ///
    /// The producer feeds the core's sink and the consumer drains its source;
    /// each is ignored where the corresponding leg is present.
    pub fn step(
        &mut self,
        producer: &mut StreamProducer,
        consumer: &mut StreamConsumer,
    ) -> TickReport {
        let ports = ExternalPorts {
            sink: producer.item(),
            source_ready: consumer.ready(),
        };
        let report = self.tick(ports);
        if self.mem2x.is_none() {
            producer.advance(&report.core_sink);
        }
        if self.x2mem.is_none() {
            consumer.advance(&report.core_source);
        } else {
            consumer.advance(&StreamItem::idle());
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dma::{DmaMode, Endianness};

    const SRC: u64 = 0x0000;
    const DST: u64 = 0x0100;

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i as u8).wrapping_mul(7).wrapping_add(3)).collect()
    }

    fn build(mode: DmaMode) -> DmaTestSystem {
        let params = DmaParams {
            mode,
            memory_size: 1024,
            ..DmaParams::default()
        };
        DmaTestSystem::new(&params, &ClockDomain::default()).unwrap()
    }

    fn run_until(
        sys: &mut DmaTestSystem,
        producer: &mut StreamProducer,
        consumer: &mut StreamConsumer,
        max: usize,
        done: impl Fn(&DmaTestSystem) -> bool,
    ) -> usize {
        let mut irqs = 0;
        for _ in 0..max {
            if done(sys) {
                break;
            }
            if sys.step(producer, consumer).irq {
                irqs += 1;
            }
        }
        assert!(done(sys), "condition not reached within {} ticks", max);
        irqs
    }

    #[test]
    fn test_read_write_loopback() {
        let mut sys = build(DmaMode::ReadWrite);
        let data = pattern(32);
        sys.memory_mut().load(SRC, &data);

        let r = sys.mem2x_mut().unwrap().reader_mut();
        r.write_base(SRC);
        r.write_length(32);
        r.write_enable(true);
        let w = sys.x2mem_mut().unwrap().writer_mut();
        w.write_base(DST);
        w.write_length(32);
        w.write_enable(true);
        sys.events_mut().set_enable(0b11);

        let mut producer = StreamProducer::new();
        let mut consumer = StreamConsumer::new();

        sys.core_mut().write_start();
        run_until(&mut sys, &mut producer, &mut consumer, 500, |s| {
            s.core().state() == ControlState::Wait
        });
        assert!(sys.core().wr_done());
        assert!(!sys.core().rd_done());
        assert_eq!(sys.core().status_code(), 2);
        assert_eq!(sys.events().pending(), 0b10, "mem2x finished reading memory");

        sys.core_mut().write_start();
        run_until(&mut sys, &mut producer, &mut consumer, 500, |s| {
            s.x2mem().is_some_and(|leg| leg.writer().done())
        });
        // Let the edge detector and event manager settle
        for _ in 0..3 {
            sys.step(&mut producer, &mut consumer);
        }

        assert_eq!(sys.core().state(), ControlState::ReadDone);
        assert_eq!(sys.core().status_code(), 4);
        assert!(sys.core().wr_done() && sys.core().rd_done());
        assert_eq!(sys.memory().slice(DST, 32).unwrap(), &data[..]);
        assert_eq!(sys.events().pending(), 0b11);
        assert!(sys.events().irq());

        sys.events_mut().clear_pending(0b11);
        assert!(!sys.events().irq());
    }

    #[test]
    fn test_write_mode_exposes_source_port() {
        let mut sys = build(DmaMode::Write);
        assert!(sys.x2mem().is_none());
        assert_eq!(sys.events().index_of("mem2x_dma"), Some(0));
        assert_eq!(sys.events().index_of("x2mem_dma"), None);

        let data = pattern(32);
        sys.memory_mut().load(SRC, &data);
        let r = sys.mem2x_mut().unwrap().reader_mut();
        r.write_length(32);
        r.write_enable(true);

        let mut producer = StreamProducer::new();
        let mut consumer = StreamConsumer::with_ready_pattern(vec![true, false]);

        sys.core_mut().write_start();
        run_until(&mut sys, &mut producer, &mut consumer, 500, |s| {
            s.core().state() == ControlState::Wait
        });
        sys.core_mut().write_start();
        run_until(&mut sys, &mut producer, &mut consumer, 500, |s| {
            s.core().state() == ControlState::ReadDone
        });

        let words: Vec<u8> = consumer.words().iter().map(|&w| w as u8).collect();
        assert_eq!(words, data);
        assert!(consumer.received()[0].first);
        assert!(consumer.received()[31].last);
    }

    #[test]
    fn test_read_mode_takes_external_sink() {
        let mut sys = build(DmaMode::Read);
        assert!(sys.mem2x().is_none());
        sys.events_mut().set_enable(0b1);

        let w = sys.x2mem_mut().unwrap().writer_mut();
        w.write_base(DST);
        w.write_length(32);
        w.write_enable(true);

        let data = pattern(32);
        let mut producer = StreamProducer::from_words(data.iter().map(|&b| b as u64));
        let mut consumer = StreamConsumer::new();

        sys.core_mut().write_start();
        run_until(&mut sys, &mut producer, &mut consumer, 500, |s| {
            s.core().state() == ControlState::Wait
        });
        assert!(producer.is_done());

        sys.core_mut().write_start();
        let irqs = run_until(&mut sys, &mut producer, &mut consumer, 500, |s| s.events().irq());
        assert_eq!(irqs, 1);
        assert_eq!(sys.memory().slice(DST, 32).unwrap(), &data[..]);
    }

    #[test]
    fn test_core_idle_without_start() {
        let mut sys = build(DmaMode::Read);
        let mut producer = StreamProducer::from_words(0..8);
        let mut consumer = StreamConsumer::new();
        for _ in 0..20 {
            let report = sys.step(&mut producer, &mut consumer);
            assert!(!report.core_sink.ready);
            assert_eq!(report.state, ControlState::Idle);
        }
        assert_eq!(producer.sent(), 0);
    }

    #[test]
    fn test_reset_keeps_memory() {
        let params = DmaParams {
            endianness: Endianness::Big,
            memory_size: 64,
            ..DmaParams::default()
        };
        let mut sys = DmaTestSystem::new(&params, &ClockDomain::default()).unwrap();
        sys.memory_mut().load(0, &[9, 9]);
        sys.core_mut().write_start();
        sys.tick(ExternalPorts::default());
        sys.tick(ExternalPorts::default());
        assert_eq!(sys.core().state(), ControlState::DataWrite);

        assert!(!sys.apply_reset(false).unwrap());
        assert!(sys.apply_reset(true).unwrap());
        assert_eq!(sys.core().state(), ControlState::Idle);
        assert_eq!(sys.cycles(), 0);
        assert_eq!(sys.memory().slice(0, 2).unwrap(), &[9, 9]);
        assert_eq!(sys.memory().endianness(), Endianness::Big);
    }

    #[test]
    fn test_invalid_params_rejected() {
        let params = DmaParams { data_width: 0, ..DmaParams::default() };
        assert!(DmaTestSystem::new(&params, &ClockDomain::default()).is_err());
    }
}
