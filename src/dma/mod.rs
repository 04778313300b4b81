//! Streaming DMA.
//!
//! ```text
//!                    ┌───────────── DmaTestSystem ─────────────┐
//!   memory ──► MemToExternal ──► DmaControlCore ──► ExternalToMem ──► memory
//!   (reader)   conv ► fifo         fsm + fifo        gate ► fifo ► conv (writer)
//!                 │ irq                                  │ irq
//!                 └──────────────► EventManager ◄────────┘
//! ```
//!
//! The control core moves one 32-word block from its sink into its buffer,
//! waits for the host, then replays the block to its source. The two legs
//! bridge the system bus width to the core's data width. A mode selects which
//! legs exist; a missing leg leaves that side of the core as an external
//! stream port.

pub mod channel;
pub mod control;
pub mod irq;
pub mod memory;
pub mod system;

pub use self::channel::{ExternalToMem, MemToExternal};
pub use self::control::{BlockFramer, ControlState, DmaControlCore};
pub use self::irq::{EdgeDetector, EventManager, EventSource};
pub use self::memory::{DmaReader, DmaRegisters, DmaWriter, Endianness, SystemMemory};
pub use self::system::{DmaTestSystem, ExternalPorts, TickReport};

use std::fmt;
use std::str::FromStr;

use crate::error::{ConfigError, ConfigResult};
use crate::stream::converter::MAX_DATA_WIDTH;

/// Words per block.
pub const BLOCK_WORDS: u32 = 32;

/// Capacity of the control core's block buffer.
pub const CORE_BUFFER_DEPTH: usize = 512;

/// Which memory-facing legs a DMA system carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DmaMode {
    /// External → memory only
    Read,
    /// Memory → external only
    Write,
    /// Both legs
    ReadWrite,
}

impl DmaMode {
    /// Whether the external→memory leg is present.
    pub fn has_read(self) -> bool {
        matches!(self, DmaMode::Read | DmaMode::ReadWrite)
    }

    /// Whether the memory→external leg is present.
    pub fn has_write(self) -> bool {
        matches!(self, DmaMode::Write | DmaMode::ReadWrite)
    }
}

impl FromStr for DmaMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(DmaMode::Read),
            "write" => Ok(DmaMode::Write),
            "read+write" => Ok(DmaMode::ReadWrite),
            _ => Err(ConfigError::InvalidMode { mode: s.to_string() }),
        }
    }
}

impl fmt::Display for DmaMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DmaMode::Read => write!(f, "read"),
            DmaMode::Write => write!(f, "write"),
            DmaMode::ReadWrite => write!(f, "read+write"),
        }
    }
}

/// Validated parameters of one DMA test system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DmaParams {
    pub mode: DmaMode,
    /// Core stream width in bits
    pub data_width: u32,
    /// System bus width in bits
    pub bus_width: u32,
    /// Depth of each leg's FIFO
    pub fifo_depth: usize,
    pub endianness: Endianness,
    /// Size of the simulated memory in bytes
    pub memory_size: usize,
}

impl Default for DmaParams {
    fn default() -> Self {
        Self {
            mode: DmaMode::ReadWrite,
            data_width: 8,
            bus_width: 32,
            fifo_depth: 32,
            endianness: Endianness::Little,
            memory_size: 64 * 1024,
        }
    }
}

impl DmaParams {
    /// Check widths and depths.
    ///
    /// Both widths must be byte multiples of at most 64 bits, and one must
    /// divide the other.
    pub fn validate(&self) -> ConfigResult<()> {
        let bad = |reason| ConfigError::InvalidDataWidth {
            width: self.data_width,
            bus_width: self.bus_width,
            reason,
        };

        for width in [self.data_width, self.bus_width] {
            if width == 0 || width > MAX_DATA_WIDTH {
                return Err(bad("widths must be between 1 and 64 bits"));
            }
            if width % 8 != 0 {
                return Err(bad("widths must be a whole number of bytes"));
            }
        }
        let (wide, narrow) = if self.bus_width >= self.data_width {
            (self.bus_width, self.data_width)
        } else {
            (self.data_width, self.bus_width)
        };
        if wide % narrow != 0 {
            return Err(bad("one width must be an integer multiple of the other"));
        }
        if self.fifo_depth == 0 {
            return Err(ConfigError::InvalidFifoDepth { depth: self.fifo_depth });
        }
        Ok(())
    }

    /// Bytes moved per bus word.
    pub fn bus_bytes(&self) -> usize {
        (self.bus_width / 8) as usize
    }

    /// Bytes covered by one block of core words.
    pub fn block_bytes(&self) -> usize {
        BLOCK_WORDS as usize * (self.data_width / 8) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parse() {
        assert_eq!("read".parse::<DmaMode>().unwrap(), DmaMode::Read);
        assert_eq!("write".parse::<DmaMode>().unwrap(), DmaMode::Write);
        assert_eq!("read+write".parse::<DmaMode>().unwrap(), DmaMode::ReadWrite);
        assert_eq!(
            "both".parse::<DmaMode>(),
            Err(ConfigError::InvalidMode { mode: "both".to_string() })
        );
        assert_eq!(DmaMode::ReadWrite.to_string(), "read+write");
    }

    #[test]
    fn test_mode_legs() {
        assert!(DmaMode::Read.has_read() && !DmaMode::Read.has_write());
        assert!(!DmaMode::Write.has_read() && DmaMode::Write.has_write());
        assert!(DmaMode::ReadWrite.has_read() && DmaMode::ReadWrite.has_write());
    }

    #[test]
    fn test_params_validate() {
        assert!(DmaParams::default().validate().is_ok());
        assert_eq!(DmaParams::default().block_bytes(), 32);

        let p = DmaParams { data_width: 24, ..DmaParams::default() };
        assert!(matches!(p.validate(), Err(ConfigError::InvalidDataWidth { .. })));

        let p = DmaParams { data_width: 12, ..DmaParams::default() };
        assert!(matches!(p.validate(), Err(ConfigError::InvalidDataWidth { .. })));

        let p = DmaParams { data_width: 64, ..DmaParams::default() };
        assert!(p.validate().is_ok());

        let p = DmaParams { fifo_depth: 0, ..DmaParams::default() };
        assert_eq!(p.validate(), Err(ConfigError::InvalidFifoDepth { depth: 0 }));
    }
}
