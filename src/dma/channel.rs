//! Width-converting legs between system memory and the core's data width.
//!
//! ```text
//!   MemToExternal:  DmaReader ──► Converter(bus→data) ──► SyncFifo ──► source
//!   ExternalToMem:  sink ──► gate ──► SyncFifo ──► Converter(data→bus) ──► DmaWriter
//! ```
//!
//! Each leg exposes a pure evaluation half (`source` / `sink_ready`) and a
//! `commit` that takes the resolved boundary wire, so legs compose with the
//! control core inside one tick.
//!
//! The interrupt of each leg is a one-tick pulse on the rising edge of its
//! endpoint's `done` status.

use super::irq::EdgeDetector;
use super::memory::{DmaReader, DmaWriter, SystemMemory};
use super::DmaParams;
use crate::error::ConfigResult;
use crate::stream::{commit_chain, settle, Converter, StreamItem, StreamStage, SyncFifo};

/// Memory → external stream leg.
#[derive(Debug, Clone)]
pub struct MemToExternal {
    reader: DmaReader,
    converter: Converter,
    fifo: SyncFifo,
    edge: EdgeDetector,
}

impl MemToExternal {
    pub fn new(params: &DmaParams) -> ConfigResult<Self> {
        Ok(Self {
            reader: DmaReader::new(params.bus_width),
            converter: Converter::new(
                params.bus_width,
                params.data_width,
                params.endianness.subword_order(),
            )?,
            fifo: SyncFifo::new(params.fifo_depth),
            edge: EdgeDetector::new(),
        })
    }

    pub fn reader(&self) -> &DmaReader {
        &self.reader
    }

    pub fn reader_mut(&mut self) -> &mut DmaReader {
        &mut self.reader
    }

    /// Words waiting in the leg's FIFO.
    pub fn buffer_level(&self) -> usize {
        self.fifo.level()
    }

    /// Word offered to the downstream consumer this tick.
    pub fn source(&self) -> StreamItem {
        self.fifo.source(&StreamItem::idle())
    }

    /// Interrupt pulse this tick.
    pub fn irq(&self) -> bool {
        self.edge.pulse(self.reader.done())
    }

    /// Clock edge, given the resolved source wire.
    pub fn commit(&mut self, memory: &SystemMemory, source: &StreamItem) {
        let fetched = self.reader.source(memory);
        let wires = settle(
            &[&self.converter as &dyn StreamStage, &self.fifo],
            fetched,
            source.ready,
        );
        debug_assert_eq!(wires[2].valid, source.valid);

        let done = self.reader.done();
        let enable = self.reader.enabled();
        self.reader.commit(&wires[0]);
        commit_chain(&mut [&mut self.converter as &mut dyn StreamStage, &mut self.fifo], &wires);
        if !enable {
            self.converter.clear();
        }
        self.edge.commit(done);
    }
}

/// Latch that opens the external→memory leg on the first word of a block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectGate {
    connect: bool,
}

impl ConnectGate {
    /// Whether `sink` passes into the FIFO this tick.
    pub fn passes(&self, enable: bool, sink: &StreamItem) -> bool {
        enable && ((sink.valid && sink.first) || self.connect)
    }

    /// Clear while disabled; set on a `valid && first` word while enabled.
    pub fn commit(&mut self, enable: bool, sink: &StreamItem) {
        if !enable {
            self.connect = false;
        } else if sink.valid && sink.first {
            self.connect = true;
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connect
    }
}

/// External stream → memory leg.
#[derive(Debug, Clone)]
pub struct ExternalToMem {
    gate: ConnectGate,
    fifo: SyncFifo,
    converter: Converter,
    writer: DmaWriter,
    edge: EdgeDetector,
}

impl ExternalToMem {
    pub fn new(params: &DmaParams) -> ConfigResult<Self> {
        Ok(Self {
            gate: ConnectGate::default(),
            fifo: SyncFifo::new(params.fifo_depth),
            converter: Converter::new(
                params.data_width,
                params.bus_width,
                params.endianness.subword_order(),
            )?,
            writer: DmaWriter::new(params.bus_width),
            edge: EdgeDetector::new(),
        })
    }

    pub fn writer(&self) -> &DmaWriter {
        &self.writer
    }

    pub fn writer_mut(&mut self) -> &mut DmaWriter {
        &mut self.writer
    }

    pub fn gate(&self) -> &ConnectGate {
        &self.gate
    }

    /// Words waiting in the leg's FIFO.
    pub fn buffer_level(&self) -> usize {
        self.fifo.level()
    }

    /// Ready presented to the upstream producer this tick.
    ///
    /// While the gate is closed every word is absorbed and discarded.
    pub fn sink_ready(&self, sink: &StreamItem) -> bool {
        if self.gate.passes(self.writer.enabled(), sink) {
            self.fifo.sink_ready(sink, false)
        } else {
            true
        }
    }

    /// Interrupt pulse this tick.
    pub fn irq(&self) -> bool {
        self.edge.pulse(self.writer.done())
    }

    /// Clock edge, given the resolved sink wire.
    pub fn commit(&mut self, memory: &mut SystemMemory, sink: &StreamItem) {
        let enable = self.writer.enabled();
        let fifo_in = if self.gate.passes(enable, sink) {
            *sink
        } else {
            if sink.fires() {
                log::trace!("x2mem: gate closed, dropping 0x{:X}", sink.data);
            }
            StreamItem::idle()
        };

        let wires = settle(
            &[&self.fifo as &dyn StreamStage, &self.converter],
            fifo_in,
            self.writer.sink_ready(),
        );

        let done = self.writer.done();
        commit_chain(&mut [&mut self.fifo as &mut dyn StreamStage, &mut self.converter], &wires);
        if !enable {
            self.converter.clear();
        }
        self.writer.commit(memory, &wires[2]);
        self.gate.commit(enable, sink);
        self.edge.commit(done);
    }
}
