//! Control and status register cells.
//!
//! A [`ControlRegister`] is written by the host and read by hardware. A host
//! write is latched at the next clock edge: from that tick on the stored value
//! is visible, and the write strobe is high for that one tick only.
//!
//! A [`StatusRegister`] is written by hardware every tick and read by the
//! host.

use crate::sim::width_mask;

/// Host-writable, hardware-readable register.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlRegister {
    width: u32,
    storage: u64,
    strobe: bool,
    pending: Option<u64>,
    reset_value: u64,
}

impl ControlRegister {
    /// Create a register holding `reset_value` (masked to `width`).
    pub fn new(width: u32, reset_value: u64) -> Self {
        let reset_value = reset_value & width_mask(width);
        Self {
            width,
            storage: reset_value,
            strobe: false,
            pending: None,
            reset_value,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    /// Host write; takes effect at the next [`tick`](Self::tick).
    ///
    /// A second write before the tick replaces the first.
    pub fn write(&mut self, value: u64) {
        self.pending = Some(value & width_mask(self.width));
    }

    /// Stored value as seen by hardware.
    #[inline]
    pub fn storage(&self) -> u64 {
        self.storage
    }

    /// Write strobe: high for exactly one tick per host write.
    #[inline]
    pub fn strobe(&self) -> bool {
        self.strobe
    }

    /// Clock edge.
    pub fn tick(&mut self) {
        match self.pending.take() {
            Some(value) => {
                self.storage = value;
                self.strobe = true;
            }
            None => self.strobe = false,
        }
    }

    pub fn reset(&mut self) {
        self.storage = self.reset_value;
        self.strobe = false;
        self.pending = None;
    }
}

/// Hardware-writable, host-readable register.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRegister {
    width: u32,
    status: u64,
}

impl StatusRegister {
    pub fn new(width: u32) -> Self {
        Self { width, status: 0 }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    /// Host read.
    #[inline]
    pub fn read(&self) -> u64 {
        self.status
    }

    /// Hardware update at the clock edge.
    #[inline]
    pub fn update(&mut self, value: u64) {
        self.status = value & width_mask(self.width);
    }

    pub fn reset(&mut self) {
        self.status = 0;
    }
}

/// Kind of register allocated for a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterKind {
    Control,
    Status,
}

/// A compiled register, tagged by kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Register {
    Control(ControlRegister),
    Status(StatusRegister),
}

impl Register {
    pub fn kind(&self) -> RegisterKind {
        match self {
            Register::Control(_) => RegisterKind::Control,
            Register::Status(_) => RegisterKind::Status,
        }
    }

    pub fn width(&self) -> u32 {
        match self {
            Register::Control(r) => r.width(),
            Register::Status(r) => r.width(),
        }
    }

    /// Value as seen by the host.
    pub fn value(&self) -> u64 {
        match self {
            Register::Control(r) => r.storage(),
            Register::Status(r) => r.read(),
        }
    }

    pub fn reset(&mut self) {
        match self {
            Register::Control(r) => r.reset(),
            Register::Status(r) => r.reset(),
        }
    }
}
