//! Configuration and compile-time error types.
//!
//! Every error is raised before any register or wiring is produced, so a
//! failed compilation never leaves a partial interface behind.

use thiserror::Error;

/// Result alias for configuration and compilation.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors detected while validating configuration or compiling ports.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Two ports in one list share a name.
    #[error("duplicate port name '{port}' in port list")]
    DuplicatePortName {
        /// Offending port name
        port: String,
    },

    /// Port width is below one bit or wider than a register cell.
    #[error("port '{port}' has invalid width {width}: width must be between 1 and 64")]
    InvalidWidth {
        /// Offending port name
        port: String,
        /// Width as resolved from configuration
        width: i64,
    },

    /// Port direction is neither `in` nor `out`.
    #[error("port '{port}' has unknown direction '{direction}': expected 'in' or 'out'")]
    UnknownDirection {
        /// Offending port name
        port: String,
        /// Direction string from configuration
        direction: String,
    },

    /// DMA mode string is outside the allowed set.
    #[error("invalid DMA mode '{mode}': expected one of 'read', 'write', 'read+write'")]
    InvalidMode {
        /// Mode string from configuration
        mode: String,
    },

    /// A reserved clock/reset port is not one bit wide.
    #[error("port '{port}' binds to {signal} and must be {expected} bit(s) wide, found {found}")]
    WidthMismatch {
        /// Offending port name
        port: String,
        /// Signal the port binds to
        signal: String,
        /// Required width
        expected: u32,
        /// Configured width
        found: u32,
    },

    /// Port size expression could not be parsed.
    #[error("port '{port}' has malformed size expression '{expr}': expected \"N\" or \"[HI:LO]\"")]
    InvalidWidthExpr {
        /// Offending port name
        port: String,
        /// Size expression
        expr: String,
    },

    /// Port size expression references an undefined parameter.
    #[error("port '{port}' size references unknown parameter '{parameter}'")]
    UnknownParameter {
        /// Offending port name
        port: String,
        /// Parameter name
        parameter: String,
    },

    /// Stream data width is unusable.
    #[error("invalid data width {width} (bus width {bus_width}): {reason}")]
    InvalidDataWidth {
        /// Requested data width in bits
        width: u32,
        /// System bus width in bits
        bus_width: u32,
        /// Rule violated
        reason: &'static str,
    },

    /// FIFO depth is zero.
    #[error("invalid FIFO depth {depth}: depth must be at least 1")]
    InvalidFifoDepth {
        /// Requested depth
        depth: usize,
    },

    /// Endianness string is neither `little` nor `big`.
    #[error("invalid endianness '{value}': expected 'little' or 'big'")]
    InvalidEndianness {
        /// Endianness string from configuration
        value: String,
    },

    /// Configuration text could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Parse(String),
}
