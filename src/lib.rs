//! csr-dma library
//!
//! Register interface compiler and cycle-level model of a streaming DMA
//! control core.
//!
//! - [`csr`]: turns a list of named, directioned, sized ports into control and
//!   status registers plus the wiring to their external signals.
//! - [`stream`]: ready/valid stream items, FIFO buffers and width converters.
//! - [`dma`]: the block-framing DMA control FSM, the memory-facing legs, and
//!   interrupt edge detection.
//! - [`sim`]: clock/reset context and testbench stream drivers.

pub mod config;
pub mod csr;
pub mod dma;
pub mod error;
pub mod sim;
pub mod stream;

pub use config::Config;
pub use error::{ConfigError, ConfigResult};
