//! Port list compilation.
//!
//! Both compile operations validate the whole port list before allocating
//! anything, so an error never leaves a partial register set behind.
//!
//! # Naming
//!
//! ```text
//!   register (top-level)   <port>
//!   register (instance)    csr_of_<port>
//!   connector              con_<port>
//!   external IO            <instance>_<port>
//!   instance connection    i_<port> | o_<port> | p_<parameter>
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt;

use super::register::{ControlRegister, Register, StatusRegister};
use super::width::resolve_width;
use super::{ParamValue, ParameterSpec, PortDirection, PortSpec, RegisterAccessError};
use crate::error::{ConfigError, ConfigResult};
use crate::sim::{width_mask, ClockDomain};

/// Widest port a register cell can hold.
pub const MAX_PORT_WIDTH: i64 = 64;

/// How a register is tied to its external signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingKind {
    /// Signal mirrors the control register on the same tick
    Combinational,
    /// Status register samples the signal at each clock edge
    Registered,
    /// Port tied to the domain clock, no register
    Clock,
    /// Port tied to the domain reset, no register
    Reset,
}

/// A named, width-matched signal handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signal {
    pub name: String,
    pub width: u32,
    pub value: u64,
}

impl Signal {
    pub fn new(name: String, width: u32) -> Self {
        Self { name, width, value: 0 }
    }
}

/// Wiring record between one register and its external signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireBinding {
    /// Register name
    pub register: String,
    /// Internal connector name (`con_<port>`)
    pub connector: String,
    /// External signal (`<instance>_<port>`)
    pub external: Signal,
    pub kind: BindingKind,
}

/// One compiled port: its register and the binding to its signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledPort {
    pub port: String,
    pub register: Register,
    pub binding: WireBinding,
}

/// Registers of one compiled interface, indexed by port name.
#[derive(Debug, Clone, Default)]
pub struct RegisterSet {
    instance_name: String,
    ports: Vec<CompiledPort>,
    index: HashMap<String, usize>,
}

impl RegisterSet {
    fn new(instance_name: &str) -> Self {
        Self {
            instance_name: instance_name.to_string(),
            ..Self::default()
        }
    }

    fn insert(&mut self, compiled: CompiledPort) {
        self.index.insert(compiled.port.clone(), self.ports.len());
        self.ports.push(compiled);
    }

    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    /// Compiled ports in declaration order.
    pub fn ports(&self) -> &[CompiledPort] {
        &self.ports
    }

    pub fn get(&self, port: &str) -> Option<&CompiledPort> {
        self.index.get(port).map(|&i| &self.ports[i])
    }

    pub fn register(&self, port: &str) -> Option<&Register> {
        self.get(port).map(|p| &p.register)
    }

    /// Every wiring record, in declaration order.
    pub fn bindings(&self) -> impl Iterator<Item = &WireBinding> {
        self.ports.iter().map(|p| &p.binding)
    }

    /// External IO names and widths.
    pub fn ios(&self) -> Vec<(String, u32)> {
        self.bindings()
            .map(|b| (b.external.name.clone(), b.external.width))
            .collect()
    }

    fn lookup_mut(&mut self, port: &str) -> Result<&mut CompiledPort, RegisterAccessError> {
        match self.index.get(port) {
            Some(&i) => Ok(&mut self.ports[i]),
            None => Err(RegisterAccessError::UnknownRegister(port.to_string())),
        }
    }

    fn lookup(&self, port: &str) -> Result<&CompiledPort, RegisterAccessError> {
        self.get(port)
            .ok_or_else(|| RegisterAccessError::UnknownRegister(port.to_string()))
    }

    /// Host write to a control register (visible after the next tick).
    pub fn host_write(&mut self, port: &str, value: u64) -> Result<(), RegisterAccessError> {
        match &mut self.lookup_mut(port)?.register {
            Register::Control(reg) => {
                reg.write(value);
                Ok(())
            }
            Register::Status(_) => Err(RegisterAccessError::NotWritable(port.to_string())),
        }
    }

    /// Host read of any register.
    pub fn host_read(&self, port: &str) -> Result<u64, RegisterAccessError> {
        Ok(self.lookup(port)?.register.value())
    }

    /// Write strobe of a control register (false for status registers).
    pub fn strobe(&self, port: &str) -> Result<bool, RegisterAccessError> {
        Ok(match &self.lookup(port)?.register {
            Register::Control(reg) => reg.strobe(),
            Register::Status(_) => false,
        })
    }

    /// Hardware drives the external signal of an `out` port.
    pub fn drive_external(&mut self, port: &str, value: u64) -> Result<(), RegisterAccessError> {
        let compiled = self.lookup_mut(port)?;
        if compiled.binding.kind != BindingKind::Registered {
            return Err(RegisterAccessError::NotDrivable(port.to_string()));
        }
        let signal = &mut compiled.binding.external;
        signal.value = value & width_mask(signal.width);
        Ok(())
    }

    /// Current value on the external signal of a port.
    pub fn external_value(&self, port: &str) -> Result<u64, RegisterAccessError> {
        let compiled = self.lookup(port)?;
        Ok(match &compiled.register {
            Register::Control(reg) => reg.storage(),
            Register::Status(_) => compiled.binding.external.value,
        })
    }

    /// Clock edge for every register in the set.
    pub fn tick(&mut self) {
        for compiled in &mut self.ports {
            match &mut compiled.register {
                Register::Control(reg) => {
                    reg.tick();
                    compiled.binding.external.value = reg.storage();
                }
                Register::Status(reg) => reg.update(compiled.binding.external.value),
            }
        }
    }

    pub fn reset(&mut self) {
        for compiled in &mut self.ports {
            compiled.register.reset();
            compiled.binding.external.value = compiled.register.value();
        }
    }
}

/// A port that passed validation.
struct ValidPort<'a> {
    name: &'a str,
    input: bool,
    width: u32,
}

/// Check directions, widths and name uniqueness for a whole list.
fn validate_ports<'a>(
    ports: &'a [PortSpec],
    params: &[ParameterSpec],
) -> ConfigResult<Vec<ValidPort<'a>>> {
    let mut seen = HashSet::new();
    let mut valid = Vec::with_capacity(ports.len());

    for port in ports {
        if !seen.insert(port.name.as_str()) {
            return Err(ConfigError::DuplicatePortName { port: port.name.clone() });
        }

        let input = match &port.direction {
            PortDirection::In => true,
            PortDirection::Out => false,
            PortDirection::Unknown(direction) => {
                return Err(ConfigError::UnknownDirection {
                    port: port.name.clone(),
                    direction: direction.clone(),
                });
            }
        };

        let width = resolve_width(&port.name, &port.width, params)?;
        if !(1..=MAX_PORT_WIDTH).contains(&width) {
            return Err(ConfigError::InvalidWidth { port: port.name.clone(), width });
        }

        valid.push(ValidPort { name: &port.name, input, width: width as u32 });
    }

    Ok(valid)
}

fn compile_port(instance_name: &str, register_name: String, port: &ValidPort<'_>) -> CompiledPort {
    let (register, kind) = if port.input {
        (Register::Control(ControlRegister::new(port.width, 0)), BindingKind::Combinational)
    } else {
        (Register::Status(StatusRegister::new(port.width)), BindingKind::Registered)
    };

    CompiledPort {
        port: port.name.to_string(),
        register,
        binding: WireBinding {
            register: register_name,
            connector: format!("con_{}", port.name),
            external: Signal::new(format!("{}_{}", instance_name, port.name), port.width),
            kind,
        },
    }
}

/// Compile a top-level register interface.
///
/// One register per port: `in` becomes a control register driving the IO
/// `<instance_name>_<port>`, `out` a status register sampling it.
pub fn compile_external_registers(
    instance_name: &str,
    ports: &[PortSpec],
    params: &[ParameterSpec],
) -> ConfigResult<RegisterSet> {
    let valid = validate_ports(ports, params)?;

    let mut set = RegisterSet::new(instance_name);
    for port in &valid {
        set.insert(compile_port(instance_name, port.name.to_string(), port));
    }

    log::info!(
        "Compiled register interface '{}': {} register(s)",
        instance_name,
        set.len()
    );
    Ok(set)
}

/// One keyed connection on an instantiated module.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceConnection {
    /// `i_<port>`, `o_<port>` or `p_<parameter>`
    pub key: String,
    /// Connected signal or register name, or the rendered parameter value
    pub target: String,
    /// Binding kind for ports, `None` for parameters
    pub kind: Option<BindingKind>,
}

/// Compiled embedded-module instance.
#[derive(Debug, Clone)]
pub struct InstanceDescriptor {
    pub module_name: String,
    pub instance_name: String,
    /// Registers for every non-reserved port
    pub registers: RegisterSet,
    /// Parameters, verbatim and in declaration order
    pub parameters: Vec<ParameterSpec>,
    /// Connections in render order: parameters, then ports
    pub connections: Vec<InstanceConnection>,
}

impl InstanceDescriptor {
    pub fn parameter(&self, name: &str) -> Option<&ParamValue> {
        self.parameters.iter().find(|p| p.name == name).map(|p| &p.value)
    }

    pub fn connection(&self, key: &str) -> Option<&InstanceConnection> {
        self.connections.iter().find(|c| c.key == key)
    }
}

impl fmt::Display for InstanceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {} (", self.module_name, self.instance_name)?;
        for conn in &self.connections {
            writeln!(f, "    {} = {},", conn.key, conn.target)?;
        }
        write!(f, ")")
    }
}

fn reserved_binding(name: &str) -> Option<BindingKind> {
    match name {
        "clk" | "clock" => Some(BindingKind::Clock),
        "rst" | "reset" => Some(BindingKind::Reset),
        _ => None,
    }
}

/// Compile the register interface of one embedded module instance.
///
/// `in` ports named `clk`/`clock` and `rst`/`reset` bind to `clock` and get no
/// register; they must be one bit wide. Every other port becomes a register
/// named `csr_of_<port>`.
pub fn compile_module_instance(
    params: &[ParameterSpec],
    ports: &[PortSpec],
    module_name: &str,
    instance_name: &str,
    clock: &ClockDomain,
) -> ConfigResult<InstanceDescriptor> {
    let valid = validate_ports(ports, params)?;

    for port in &valid {
        if let (true, Some(kind)) = (port.input, reserved_binding(port.name)) {
            if port.width != 1 {
                let signal = match kind {
                    BindingKind::Clock => &clock.clock,
                    _ => &clock.reset,
                };
                return Err(ConfigError::WidthMismatch {
                    port: port.name.to_string(),
                    signal: signal.clone(),
                    expected: 1,
                    found: port.width,
                });
            }
        }
    }

    let mut registers = RegisterSet::new(instance_name);
    let mut connections: Vec<InstanceConnection> = params
        .iter()
        .map(|p| InstanceConnection {
            key: format!("p_{}", p.name),
            target: p.value.to_string(),
            kind: None,
        })
        .collect();

    for port in &valid {
        let prefix = if port.input { "i" } else { "o" };
        let key = format!("{}_{}", prefix, port.name);

        match (port.input, reserved_binding(port.name)) {
            (true, Some(kind)) => {
                let target = match kind {
                    BindingKind::Clock => clock.clock.clone(),
                    _ => clock.reset.clone(),
                };
                connections.push(InstanceConnection { key, target, kind: Some(kind) });
            }
            _ => {
                let register_name = format!("csr_of_{}", port.name);
                let compiled = compile_port(instance_name, register_name.clone(), port);
                connections.push(InstanceConnection {
                    key,
                    target: register_name,
                    kind: Some(compiled.binding.kind),
                });
                registers.insert(compiled);
            }
        }
    }

    log::info!(
        "Compiled instance {} of '{}' in domain {}: {} register(s), {} parameter(s)",
        instance_name,
        module_name,
        clock.name,
        registers.len(),
        params.len()
    );

    Ok(InstanceDescriptor {
        module_name: module_name.to_string(),
        instance_name: instance_name.to_string(),
        registers,
        parameters: params.to_vec(),
        connections,
    })
}
