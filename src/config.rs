//! Configuration management for csr-dma.
//!
//! Configuration is loaded from multiple sources in priority order:
//! 1. Environment variables (CSR_DMA_MODE, CSR_DMA_DATA_WIDTH, CSR_DMA_FIFO_DEPTH)
//! 2. Project-local config file (`./csr-dma.toml`)
//! 3. User config file (`~/.config/csr-dma/config.toml`)
//! 4. Built-in defaults
//!
//! # Config File Format
//!
//! ```toml
//! [dma]
//! mode = "read+write"
//! data_width = 8
//! fifo_depth = 32
//!
//! [clock]
//! clock = "sys_clk"
//! reset = "sys_rst"
//! reset_polarity = "active-high"
//!
//! # Top-level IO registers (no source)
//! [[modules]]
//! instance_name = "gpio"
//! ports = [
//!     { name = "led", direction = "out", size = 4 },
//! ]
//!
//! # Embedded instance (has a source)
//! [[modules]]
//! instance_name = "acc0"
//! module_name = "accumulator"
//! source = "rtl/accumulator.v"
//! parameters = { WIDTH = 16 }
//! ports = [
//!     { name = "clk", direction = "in", size = "1" },
//!     { name = "din", direction = "in", size = "[WIDTH-1:0]" },
//! ]
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::csr::{
    compile_external_registers, compile_module_instance, InstanceDescriptor, ParamValue,
    ParameterSpec, PortSpec, RegisterSet,
};
use crate::dma::{DmaMode, DmaParams, Endianness};
use crate::error::{ConfigError, ConfigResult};
use crate::sim::{ClockDomain, ResetPolarity};

/// Project-local config file name.
const LOCAL_CONFIG: &str = "csr-dma.toml";

/// csr-dma configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    /// DMA test system settings.
    pub dma: DmaConfig,

    /// Clock/reset identity.
    pub clock: ClockConfig,

    /// Register interfaces to compile.
    pub modules: Vec<ModuleConfig>,
}

/// `[dma]` section.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct DmaConfig {
    /// One of "read", "write", "read+write".
    pub mode: Option<String>,

    /// Core stream width in bits.
    pub data_width: Option<u32>,

    /// System bus width in bits.
    pub bus_data_width: Option<u32>,

    /// Depth of each leg's FIFO.
    pub fifo_depth: Option<usize>,

    /// "little" or "big".
    pub endianness: Option<String>,

    /// Simulated memory size in bytes.
    pub memory_size: Option<usize>,
}

impl DmaConfig {
    pub fn mode(&self) -> &str {
        self.mode.as_deref().unwrap_or("read+write")
    }

    pub fn data_width(&self) -> u32 {
        self.data_width.unwrap_or(8)
    }

    pub fn bus_data_width(&self) -> u32 {
        self.bus_data_width.unwrap_or(32)
    }

    pub fn fifo_depth(&self) -> usize {
        self.fifo_depth.unwrap_or(32)
    }

    pub fn endianness(&self) -> &str {
        self.endianness.as_deref().unwrap_or("little")
    }

    pub fn memory_size(&self) -> usize {
        self.memory_size.unwrap_or(64 * 1024)
    }

    /// Convert to typed, validated parameters.
    pub fn validate(&self) -> ConfigResult<DmaParams> {
        let params = DmaParams {
            mode: self.mode().parse::<DmaMode>()?,
            data_width: self.data_width(),
            bus_width: self.bus_data_width(),
            fifo_depth: self.fifo_depth(),
            endianness: self.endianness().parse::<Endianness>()?,
            memory_size: self.memory_size(),
        };
        params.validate()?;
        Ok(params)
    }

    fn merge(&mut self, other: Self) {
        if other.mode.is_some() {
            self.mode = other.mode;
        }
        if other.data_width.is_some() {
            self.data_width = other.data_width;
        }
        if other.bus_data_width.is_some() {
            self.bus_data_width = other.bus_data_width;
        }
        if other.fifo_depth.is_some() {
            self.fifo_depth = other.fifo_depth;
        }
        if other.endianness.is_some() {
            self.endianness = other.endianness;
        }
        if other.memory_size.is_some() {
            self.memory_size = other.memory_size;
        }
    }
}

/// `[clock]` section.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct ClockConfig {
    /// Domain name (default "sys").
    pub name: Option<String>,

    /// Clock signal name (default "sys_clk").
    pub clock: Option<String>,

    /// Reset signal name (default "sys_rst").
    pub reset: Option<String>,

    /// Reset polarity (default active-high).
    pub reset_polarity: Option<ResetPolarity>,
}

impl ClockConfig {
    /// Build the clock domain shared by every compiled component.
    pub fn to_domain(&self) -> ClockDomain {
        let default = ClockDomain::default();
        ClockDomain {
            name: self.name.clone().unwrap_or(default.name),
            clock: self.clock.clone().unwrap_or(default.clock),
            reset: self.reset.clone().unwrap_or(default.reset),
            reset_polarity: self.reset_polarity.unwrap_or(default.reset_polarity),
        }
    }

    fn merge(&mut self, other: Self) {
        if other.name.is_some() {
            self.name = other.name;
        }
        if other.clock.is_some() {
            self.clock = other.clock;
        }
        if other.reset.is_some() {
            self.reset = other.reset;
        }
        if other.reset_polarity.is_some() {
            self.reset_polarity = other.reset_polarity;
        }
    }
}

/// One `[[modules]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModuleConfig {
    /// Instance name, prefix of every external IO.
    pub instance_name: String,

    /// Module to instantiate (defaults to the instance name).
    #[serde(default)]
    pub module_name: Option<String>,

    /// Source file of an embedded module. Entries without a source compile
    /// to top-level IO registers.
    #[serde(default)]
    pub source: Option<String>,

    /// Ports in declaration order.
    #[serde(default)]
    pub ports: Vec<PortSpec>,

    /// Parameters passed verbatim to the instance.
    #[serde(default)]
    pub parameters: BTreeMap<String, ParamValue>,
}

/// Result of compiling one module entry.
#[derive(Debug, Clone)]
pub enum CompiledModule {
    /// Top-level IO registers
    External(RegisterSet),
    /// Embedded instance
    Instance(InstanceDescriptor),
}

impl CompiledModule {
    pub fn registers(&self) -> &RegisterSet {
        match self {
            CompiledModule::External(set) => set,
            CompiledModule::Instance(inst) => &inst.registers,
        }
    }
}

impl ModuleConfig {
    pub fn module_name(&self) -> &str {
        self.module_name.as_deref().unwrap_or(&self.instance_name)
    }

    /// Parameters as specs, in key order.
    pub fn parameters(&self) -> Vec<ParameterSpec> {
        self.parameters
            .iter()
            .map(|(name, value)| ParameterSpec::new(name, value.clone()))
            .collect()
    }

    /// Compile this entry with the integration pattern its fields select.
    pub fn compile(&self, clock: &ClockDomain) -> ConfigResult<CompiledModule> {
        let params = self.parameters();
        match &self.source {
            None => compile_external_registers(&self.instance_name, &self.ports, &params)
                .map(CompiledModule::External),
            Some(_) => compile_module_instance(
                &params,
                &self.ports,
                self.module_name(),
                &self.instance_name,
                clock,
            )
            .map(CompiledModule::Instance),
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. Project-local `csr-dma.toml`
    /// 3. User config `~/.config/csr-dma/config.toml`
    /// 4. Defaults
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(user_config) = Self::load_user_config() {
            config.merge(user_config);
        }

        if let Some(local_config) = Self::load_from_file(Path::new(LOCAL_CONFIG)) {
            config.merge(local_config);
        }

        config.apply_env_overrides();
        config
    }

    /// Parse configuration text.
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load user configuration from ~/.config/csr-dma/config.toml
    fn load_user_config() -> Option<Self> {
        let config_path = Self::user_config_path()?;
        Self::load_from_file(&config_path)
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match Self::from_toml_str(&content) {
                Ok(config) => {
                    log::debug!("Loaded config from {}", path.display());
                    Some(config)
                }
                Err(e) => {
                    log::warn!("Failed to parse {}: {}", path.display(), e);
                    None
                }
            },
            Err(e) => {
                log::warn!("Failed to read {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Merge another config into this one.
    /// Only overrides fields that are set in the other config; a non-empty
    /// module list replaces the current one.
    pub fn merge(&mut self, other: Self) {
        self.dma.merge(other.dma);
        self.clock.merge(other.clock);
        if !other.modules.is_empty() {
            self.modules = other.modules;
        }
    }

    /// Apply environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(mode) = lookup("CSR_DMA_MODE") {
            log::info!("Using CSR_DMA_MODE from environment: {}", mode);
            self.dma.mode = Some(mode);
        }
        if let Some(width) = lookup("CSR_DMA_DATA_WIDTH") {
            match width.parse() {
                Ok(w) => {
                    log::info!("Using CSR_DMA_DATA_WIDTH from environment: {}", w);
                    self.dma.data_width = Some(w);
                }
                Err(_) => log::warn!("Ignoring CSR_DMA_DATA_WIDTH={}: not a number", width),
            }
        }
        if let Some(depth) = lookup("CSR_DMA_FIFO_DEPTH") {
            match depth.parse() {
                Ok(d) => {
                    log::info!("Using CSR_DMA_FIFO_DEPTH from environment: {}", d);
                    self.dma.fifo_depth = Some(d);
                }
                Err(_) => log::warn!("Ignoring CSR_DMA_FIFO_DEPTH={}: not a number", depth),
            }
        }
    }

    /// Get the path to the user config file (for display/creation).
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("csr-dma").join("config.toml"))
    }

    /// Generate a sample config file content.
    pub fn sample_config() -> String {
        r#"# csr-dma configuration
# Place this file at ~/.config/csr-dma/config.toml or ./csr-dma.toml

[dma]
# Which legs to build: "read", "write" or "read+write"
mode = "read+write"
# Core stream width in bits (must divide or be divided by the bus width)
data_width = 8
# System bus width in bits
bus_data_width = 32
# Depth of each leg's FIFO
fifo_depth = 32
# Byte order of bus words in memory: "little" or "big"
endianness = "little"

[clock]
clock = "sys_clk"
reset = "sys_rst"
reset_polarity = "active-high"

# Top-level IO registers: one register per port, IO named <instance>_<port>
[[modules]]
instance_name = "gpio"
ports = [
    { name = "led", direction = "out", size = 4 },
    { name = "switch", direction = "in", size = "1" },
]

# Embedded instance: clk/rst bind to the clock domain, other ports get
# csr_of_<port> registers
[[modules]]
instance_name = "acc0"
module_name = "accumulator"
source = "rtl/accumulator.v"
parameters = { WIDTH = 16 }
ports = [
    { name = "clk", direction = "in", size = "1" },
    { name = "rst", direction = "in", size = "1" },
    { name = "din", direction = "in", size = "[WIDTH-1:0]" },
    { name = "sum", direction = "out", size = "[WIDTH+7:0]" },
]
"#
        .to_string()
    }
}
