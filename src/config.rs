//! Emulator core configuration
//!
//! Loaded from TOML, every field has a default so a partial (or empty)
//! file is valid.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PsxError, Result};
use crate::psx::memory_map::CodeRegion;

/// CPU clock frequency
pub const CPU_FREQ_HZ: u32 = 33_868_800;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cpu: CpuConfig,
    pub timing: TimingConfig,
}

/// Which execution engine drives the CPU
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    #[default]
    Interpreter,
    Recompiler,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CpuConfig {
    pub engine: Engine,
    /// Log the text the BIOS prints through its putchar functions
    pub tty_trace: bool,
}

impl Default for CpuConfig {
    fn default() -> Self {
        CpuConfig {
            engine: Engine::Interpreter,
            tty_trace: true,
        }
    }
}

/// Cycle cost model. Instruction fetches are charged per region, data
/// accesses are charged by the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// CPU cycles in one video frame
    pub cycles_per_frame: u32,
    /// Cost of executing one instruction fetched from the BIOS ROM
    pub bios_fetch_cycles: u32,
    /// Cost of executing one instruction fetched from RAM
    pub ram_fetch_cycles: u32,
    /// Cost of executing one instruction fetched anywhere else
    pub other_fetch_cycles: u32,
    pub ram_access_cycles: u32,
    pub bios_access_cycles: u32,
    pub scratchpad_access_cycles: u32,
    pub io_access_cycles: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        TimingConfig {
            // NTSC
            cycles_per_frame: CPU_FREQ_HZ / 60,
            bios_fetch_cycles: 22,
            ram_fetch_cycles: 1,
            other_fetch_cycles: 4,
            ram_access_cycles: 5,
            bios_access_cycles: 22,
            scratchpad_access_cycles: 1,
            io_access_cycles: 3,
        }
    }
}

impl TimingConfig {
    /// Cost of one instruction fetched from `region`
    pub fn fetch_cycles(&self, region: Option<CodeRegion>) -> u32 {
        match region {
            Some(CodeRegion::Bios) => self.bios_fetch_cycles,
            Some(CodeRegion::Ram) => self.ram_fetch_cycles,
            None => self.other_fetch_cycles,
        }
    }
}

impl Config {
    pub fn from_toml_str(source: &str) -> Result<Config> {
        let config: Config = toml::from_str(source)?;

        config.validate()?;

        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config> {
        let source = fs::read_to_string(path)?;

        Config::from_toml_str(&source)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string(self)?)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.to_toml_string()?)?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let t = &self.timing;

        if t.cycles_per_frame == 0 {
            return Err(PsxError::Config("cycles_per_frame can't be 0".into()));
        }

        // A free fetch would let the frame loop spin forever on a tight
        // loop that never touches the bus
        if t.bios_fetch_cycles == 0 || t.ram_fetch_cycles == 0 || t.other_fetch_cycles == 0 {
            return Err(PsxError::Config(
                "instruction fetch costs must be at least 1 cycle".into(),
            ));
        }

        Ok(())
    }
}
