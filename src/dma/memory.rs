//! Simulated system memory and the bus-side DMA endpoints.
//!
//! [`SystemMemory`] is a flat byte array with a fixed word endianness.
//! [`DmaReader`] turns a memory range into a stream of bus words;
//! [`DmaWriter`] stores a stream of bus words into a memory range. Both move
//! at most one bus word per tick and are programmed through the same
//! register block:
//!
//! ```text
//!   control: base, length (bytes), enable, loop
//!   status:  done, offset (bytes)
//! ```
//!
//! Only whole bus words are moved: a `length` that is not a multiple of the
//! bus width is rounded down. Clearing `enable` rewinds `offset` and clears
//! `done`. With `loop` set the endpoint wraps to the start of the range
//! instead of finishing.

use std::str::FromStr;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

use crate::csr::{ControlRegister, StatusRegister};
use crate::error::ConfigError;
use crate::stream::{StreamItem, SubwordOrder};

/// Byte order of bus words in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endianness {
    #[default]
    Little,
    Big,
}

impl Endianness {
    /// Sub-word order that keeps narrow stream words in address order.
    pub fn subword_order(self) -> SubwordOrder {
        match self {
            Endianness::Little => SubwordOrder::LsbFirst,
            Endianness::Big => SubwordOrder::MsbFirst,
        }
    }
}

impl FromStr for Endianness {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "little" => Ok(Endianness::Little),
            "big" => Ok(Endianness::Big),
            _ => Err(ConfigError::InvalidEndianness { value: s.to_string() }),
        }
    }
}

/// Flat byte-addressed memory.
#[derive(Debug, Clone)]
pub struct SystemMemory {
    bytes: Vec<u8>,
    endianness: Endianness,
}

impl SystemMemory {
    /// Create zero-filled memory of `size` bytes.
    pub fn new(size: usize, endianness: Endianness) -> Self {
        Self {
            bytes: vec![0; size],
            endianness,
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    fn range(&self, addr: u64, len: usize) -> Option<std::ops::Range<usize>> {
        let start = usize::try_from(addr).ok()?;
        let end = start.checked_add(len)?;
        (end <= self.bytes.len()).then_some(start..end)
    }

    /// Read a `nbytes`-wide word (1..=8). Out-of-range reads return 0.
    pub fn read_word(&self, addr: u64, nbytes: usize) -> u64 {
        let Some(range) = self.range(addr, nbytes).filter(|_| (1..=8).contains(&nbytes)) else {
            log::warn!("Memory read of {} byte(s) at 0x{:X} out of range", nbytes, addr);
            return 0;
        };
        let buf = &self.bytes[range];
        match self.endianness {
            Endianness::Little => LittleEndian::read_uint(buf, nbytes),
            Endianness::Big => BigEndian::read_uint(buf, nbytes),
        }
    }

    /// Write a `nbytes`-wide word (1..=8). Out-of-range writes are dropped.
    pub fn write_word(&mut self, addr: u64, nbytes: usize, value: u64) {
        let Some(range) = self.range(addr, nbytes).filter(|_| (1..=8).contains(&nbytes)) else {
            log::warn!("Memory write of {} byte(s) at 0x{:X} out of range", nbytes, addr);
            return;
        };
        let value = value & crate::sim::width_mask(nbytes as u32 * 8);
        let endianness = self.endianness;
        let buf = &mut self.bytes[range];
        match endianness {
            Endianness::Little => LittleEndian::write_uint(buf, value, nbytes),
            Endianness::Big => BigEndian::write_uint(buf, value, nbytes),
        }
    }

    /// Copy bytes into memory; returns false (and copies nothing) if out of range.
    pub fn load(&mut self, addr: u64, data: &[u8]) -> bool {
        match self.range(addr, data.len()) {
            Some(range) => {
                self.bytes[range].copy_from_slice(data);
                true
            }
            None => {
                log::warn!("Memory load of {} byte(s) at 0x{:X} out of range", data.len(), addr);
                false
            }
        }
    }

    /// View a byte range, if in range.
    pub fn slice(&self, addr: u64, len: usize) -> Option<&[u8]> {
        self.range(addr, len).map(|r| &self.bytes[r])
    }
}

/// Register block shared by reader and writer.
#[derive(Debug, Clone)]
pub struct DmaRegisters {
    pub base: ControlRegister,
    pub length: ControlRegister,
    pub enable: ControlRegister,
    pub looping: ControlRegister,
    pub done: StatusRegister,
    pub offset: StatusRegister,
}

impl DmaRegisters {
    fn new() -> Self {
        Self {
            base: ControlRegister::new(32, 0),
            length: ControlRegister::new(32, 0),
            enable: ControlRegister::new(1, 0),
            looping: ControlRegister::new(1, 0),
            done: StatusRegister::new(1),
            offset: StatusRegister::new(32),
        }
    }

    fn tick(&mut self, done: bool, offset: u64) {
        self.done.update(done as u64);
        self.offset.update(offset);
        self.base.tick();
        self.length.tick();
        self.enable.tick();
        self.looping.tick();
    }
}

/// Position of an endpoint within its programmed range.
#[derive(Debug, Clone)]
struct Cursor {
    word_bytes: u64,
    offset: u64,
    done: bool,
}

impl Cursor {
    fn new(word_bytes: usize) -> Self {
        Self {
            word_bytes: word_bytes as u64,
            offset: 0,
            done: false,
        }
    }

    /// Programmed length truncated to whole words.
    fn span(&self, regs: &DmaRegisters) -> u64 {
        regs.length.storage() / self.word_bytes * self.word_bytes
    }

    fn active(&self, regs: &DmaRegisters) -> bool {
        regs.enable.storage() != 0 && !self.done && self.offset < self.span(regs)
    }

    /// True when the word at the current offset is the last of the range.
    fn at_last(&self, regs: &DmaRegisters) -> bool {
        self.offset + self.word_bytes >= self.span(regs)
    }

    /// Advance past one word; returns true when the range just completed.
    fn advance(&mut self, regs: &DmaRegisters) -> bool {
        self.offset += self.word_bytes;
        if self.offset < self.span(regs) {
            return false;
        }
        if regs.looping.storage() != 0 {
            self.offset = 0;
        } else {
            self.done = true;
        }
        true
    }

    fn rewind(&mut self) {
        self.offset = 0;
        self.done = false;
    }
}

macro_rules! host_interface {
    ($ty:ident) => {
        impl $ty {
            /// Host write to `base`.
            pub fn write_base(&mut self, addr: u64) {
                self.regs.base.write(addr);
            }

            /// Host write to `length` (bytes).
            pub fn write_length(&mut self, bytes: u64) {
                self.regs.length.write(bytes);
            }

            /// Host write to `enable`.
            pub fn write_enable(&mut self, enable: bool) {
                self.regs.enable.write(enable as u64);
            }

            /// Host write to `loop`.
            pub fn write_loop(&mut self, looping: bool) {
                self.regs.looping.write(looping as u64);
            }

            /// Host read of `done`.
            pub fn done(&self) -> bool {
                self.regs.done.read() != 0
            }

            /// Host read of `offset`.
            pub fn offset(&self) -> u64 {
                self.regs.offset.read()
            }

            /// Stored value of `enable`, as seen by hardware.
            pub fn enabled(&self) -> bool {
                self.regs.enable.storage() != 0
            }

            pub fn registers(&self) -> &DmaRegisters {
                &self.regs
            }
        }
    };
}

/// Memory → stream endpoint.
#[derive(Debug, Clone)]
pub struct DmaReader {
    bus_bytes: usize,
    regs: DmaRegisters,
    cursor: Cursor,
}

host_interface!(DmaReader);

impl DmaReader {
    pub fn new(bus_width: u32) -> Self {
        Self {
            bus_bytes: (bus_width / 8) as usize,
            regs: DmaRegisters::new(),
            cursor: Cursor::new((bus_width / 8) as usize),
        }
    }

    /// Word offered this tick. `last` marks the final word of the range.
    pub fn source(&self, memory: &SystemMemory) -> StreamItem {
        if !self.cursor.active(&self.regs) {
            return StreamItem::idle();
        }
        let addr = self.regs.base.storage() + self.cursor.offset;
        StreamItem::word(memory.read_word(addr, self.bus_bytes))
            .with_first(self.cursor.offset == 0)
            .with_last(self.cursor.at_last(&self.regs))
    }

    /// Clock edge with the resolved source wire.
    pub fn commit(&mut self, source: &StreamItem) {
        if !self.enabled() {
            self.cursor.rewind();
        } else if source.fires() {
            log::trace!("DMA reader: word 0x{:X} at offset {}", source.data, self.cursor.offset);
            if self.cursor.advance(&self.regs) && self.cursor.done {
                log::debug!("DMA reader done after {} byte(s)", self.cursor.offset);
            }
        }
        self.regs.tick(self.cursor.done, self.cursor.offset);
    }
}

/// Stream → memory endpoint.
#[derive(Debug, Clone)]
pub struct DmaWriter {
    bus_bytes: usize,
    regs: DmaRegisters,
    cursor: Cursor,
}

host_interface!(DmaWriter);

impl DmaWriter {
    pub fn new(bus_width: u32) -> Self {
        Self {
            bus_bytes: (bus_width / 8) as usize,
            regs: DmaRegisters::new(),
            cursor: Cursor::new((bus_width / 8) as usize),
        }
    }

    /// Ready presented this tick.
    pub fn sink_ready(&self) -> bool {
        self.cursor.active(&self.regs)
    }

    /// Clock edge with the resolved sink wire.
    pub fn commit(&mut self, memory: &mut SystemMemory, sink: &StreamItem) {
        if !self.enabled() {
            self.cursor.rewind();
        } else if sink.fires() {
            let addr = self.regs.base.storage() + self.cursor.offset;
            memory.write_word(addr, self.bus_bytes, sink.data);
            log::trace!("DMA writer: word 0x{:X} at 0x{:X}", sink.data, addr);
            if self.cursor.advance(&self.regs) && self.cursor.done {
                log::debug!("DMA writer done after {} byte(s)", self.cursor.offset);
            }
        }
        self.regs.tick(self.cursor.done, self.cursor.offset);
    }
}
