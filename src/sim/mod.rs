//! Simulation substrate.
//!
//! Every component in this crate is a synchronous register-transfer model
//! evaluated once per clock tick in two halves:
//!
//! ```text
//!   ┌──────────────────────────┐      ┌──────────────────────────┐
//!   │ evaluate (combinational) │ ───► │ commit (clock edge)      │
//!   │ valid/ready/first/last,  │      │ FSM state, counters,     │
//!   │ gating, pass-through     │      │ FIFO contents, registers │
//!   └──────────────────────────┘      └──────────────────────────┘
//! ```
//!
//! The clock and reset are never global. A [`ClockDomain`] names them and is
//! handed by reference to whatever needs to bind or react to them.

pub mod testbench;

pub use testbench::{StreamConsumer, StreamProducer};

use serde::{Deserialize, Serialize};

/// Bit mask covering the low `width` bits.
#[inline]
pub fn width_mask(width: u32) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

/// Active level of the reset signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResetPolarity {
    /// Reset asserted when the signal is 1
    #[default]
    ActiveHigh,
    /// Reset asserted when the signal is 0
    ActiveLow,
}

/// Clock/reset identity shared by all components of one design.
///
/// Supplied by the external clock/reset generation subsystem; nothing in
/// this crate generates clocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClockDomain {
    /// Domain name (e.g. "sys")
    pub name: String,
    /// Clock signal name
    pub clock: String,
    /// Reset signal name
    pub reset: String,
    /// Reset polarity
    pub reset_polarity: ResetPolarity,
}

impl Default for ClockDomain {
    fn default() -> Self {
        Self::new("sys", "sys_clk", "sys_rst", ResetPolarity::ActiveHigh)
    }
}

impl ClockDomain {
    /// Create a clock domain.
    pub fn new(name: &str, clock: &str, reset: &str, reset_polarity: ResetPolarity) -> Self {
        Self {
            name: name.to_string(),
            clock: clock.to_string(),
            reset: reset.to_string(),
            reset_polarity,
        }
    }

    /// Whether the given reset signal level asserts reset in this domain.
    pub fn reset_asserted(&self, level: bool) -> bool {
        match self.reset_polarity {
            ResetPolarity::ActiveHigh => level,
            ResetPolarity::ActiveLow => !level,
        }
    }
}

impl std::fmt::Display for ClockDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let pol = match self.reset_polarity {
            ResetPolarity::ActiveHigh => "active-high",
            ResetPolarity::ActiveLow => "active-low",
        };
        write!(f, "{} (clk={}, rst={} {})", self.name, self.clock, self.reset, pol)
    }
}
