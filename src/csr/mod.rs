//! Register interface compiler.
//!
//! Turns an ordered list of named, directioned, sized ports into control and
//! status registers plus the wiring between each register and its external
//! signal.
//!
//! # Port Direction Rule
//!
//! ```text
//!   direction   register          host     hardware   binding
//!   ---------   ---------------   ------   --------   -------------
//!   in          ControlRegister   write    read       combinational
//!   out         StatusRegister    read     write      registered (+1 tick)
//! ```
//!
//! Two integration patterns share the same port grammar:
//!
//! - [`compile_external_registers`]: registers at the boundary of the whole
//!   system, each bound to a top-level IO named `<instance>_<port>`.
//! - [`compile_module_instance`]: registers feeding one embedded instance,
//!   with `clk`/`clock` and `rst`/`reset` bound to the clock domain instead.

pub mod compiler;
pub mod register;
pub mod width;

pub use compiler::{
    compile_external_registers, compile_module_instance, BindingKind, CompiledPort,
    InstanceConnection, InstanceDescriptor, RegisterSet, Signal, WireBinding,
};
pub use register::{ControlRegister, Register, RegisterKind, StatusRegister};
pub use width::resolve_width;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Direction of a port as seen from the external component.
///
/// Unrecognised strings are kept as [`PortDirection::Unknown`] so the
/// compiler can reject them with the offending port name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PortDirection {
    /// Host-writable, hardware-readable
    In,
    /// Hardware-writable, host-readable
    Out,
    /// Anything else found in configuration
    Unknown(String),
}

impl From<String> for PortDirection {
    fn from(s: String) -> Self {
        match s.as_str() {
            "in" => PortDirection::In,
            "out" => PortDirection::Out,
            _ => PortDirection::Unknown(s),
        }
    }
}

impl From<&str> for PortDirection {
    fn from(s: &str) -> Self {
        PortDirection::from(s.to_string())
    }
}

impl From<PortDirection> for String {
    fn from(d: PortDirection) -> Self {
        d.to_string()
    }
}

impl fmt::Display for PortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortDirection::In => write!(f, "in"),
            PortDirection::Out => write!(f, "out"),
            PortDirection::Unknown(s) => write!(f, "{}", s),
        }
    }
}

/// Port width as written in configuration: a bit count or a `[HI:LO]` range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PortWidth {
    /// Plain bit count
    Bits(i64),
    /// Size expression, resolved against module parameters
    Expr(String),
}

impl Default for PortWidth {
    fn default() -> Self {
        PortWidth::Bits(1)
    }
}

impl From<i64> for PortWidth {
    fn from(bits: i64) -> Self {
        PortWidth::Bits(bits)
    }
}

impl From<i32> for PortWidth {
    fn from(bits: i32) -> Self {
        PortWidth::Bits(bits as i64)
    }
}

impl From<&str> for PortWidth {
    fn from(expr: &str) -> Self {
        PortWidth::Expr(expr.to_string())
    }
}

/// One port of a module or top-level interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSpec {
    /// Port name, unique within one list
    pub name: String,
    /// Direction (`in` or `out`)
    pub direction: PortDirection,
    /// Width in bits or a size expression
    #[serde(rename = "size", default)]
    pub width: PortWidth,
}

impl PortSpec {
    /// Create a port with an arbitrary direction.
    pub fn new(name: &str, direction: PortDirection, width: impl Into<PortWidth>) -> Self {
        Self {
            name: name.to_string(),
            direction,
            width: width.into(),
        }
    }

    /// Create an `in` port.
    pub fn input(name: &str, width: impl Into<PortWidth>) -> Self {
        Self::new(name, PortDirection::In, width)
    }

    /// Create an `out` port.
    pub fn output(name: &str, width: impl Into<PortWidth>) -> Self {
        Self::new(name, PortDirection::Out, width)
    }
}

/// Scalar parameter value, passed through verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl ParamValue {
    /// Integer value, if this parameter is an integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(v) => write!(f, "{}", v),
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Str(v) => write!(f, "\"{}\"", v),
        }
    }
}

/// Named parameter handed to an instantiated component.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpec {
    pub name: String,
    pub value: ParamValue,
}

impl ParameterSpec {
    pub fn new(name: &str, value: ParamValue) -> Self {
        Self { name: name.to_string(), value }
    }

    /// Shorthand for an integer parameter.
    pub fn int(name: &str, value: i64) -> Self {
        Self::new(name, ParamValue::Int(value))
    }
}

/// Runtime access errors on a compiled register set.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegisterAccessError {
    /// No register exists for the given port name.
    #[error("no register for port '{0}'")]
    UnknownRegister(String),

    /// Host attempted to write a status register.
    #[error("register '{0}' is a status register and is not host-writable")]
    NotWritable(String),

    /// Hardware attempted to drive the external signal of an `in` port.
    #[error("signal for port '{0}' is driven by its control register")]
    NotDrivable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_from_string() {
        assert_eq!(PortDirection::from("in"), PortDirection::In);
        assert_eq!(PortDirection::from("out"), PortDirection::Out);
        assert_eq!(
            PortDirection::from("inout"),
            PortDirection::Unknown("inout".to_string())
        );
        assert_eq!(String::from(PortDirection::Out), "out");
    }

    #[test]
    fn test_port_spec_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            ports: Vec<PortSpec>,
        }

        let text = r#"
            ports = [
                { name = "led", direction = "out", size = 1 },
                { name = "data", direction = "in", size = "[WIDTH-1:0]" },
                { name = "en", direction = "in" },
            ]
        "#;
        let w: Wrapper = toml::from_str(text).unwrap();
        assert_eq!(w.ports[0], PortSpec::output("led", 1));
        assert_eq!(w.ports[1].width, PortWidth::Expr("[WIDTH-1:0]".to_string()));
        assert_eq!(w.ports[2].width, PortWidth::Bits(1));
    }

    #[test]
    fn test_param_value_display() {
        assert_eq!(ParamValue::Int(8).to_string(), "8");
        assert_eq!(ParamValue::Str("fast".to_string()).to_string(), "\"fast\"");
        assert_eq!(ParamValue::Int(3).as_int(), Some(3));
        assert_eq!(ParamValue::Bool(true).as_int(), None);
    }
}
