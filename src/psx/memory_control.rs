//! Memory control registers and the bus access cost model
//!
//! The BIOS programs the expansion base addresses and the per-device
//! delay/size registers early during boot. We store them for read back
//! and save states, actual access costs come from the configured cost
//! model.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::memory_map;
use crate::config::TimingConfig;

/// Number of registers at 0x1f801000
const REGISTER_COUNT: usize = 9;

/// Values written by the BIOS during initialization
const RESET_VALUES: [u32; REGISTER_COUNT] = [
    0x1f00_0000, // Expansion 1 base
    0x1f80_2000, // Expansion 2 base
    0x0013_243f, // Expansion 1 delay/size
    0x0000_3022, // Expansion 3 delay/size
    0x0013_243f, // BIOS ROM delay/size
    0x2009_31e1, // SPU delay/size
    0x0002_0843, // CDROM delay/size
    0x0007_0777, // Expansion 2 delay/size
    0x0003_1125, // Common delay
];

/// The only expansion base addresses we support, anything else is
/// probably a bug in the emulator
const EXPECTED_BASES: [u32; 2] = [memory_map::EXP1_BASE, memory_map::EXP2_BASE];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryControl {
    registers: [u32; REGISTER_COUNT],
    /// RAM_SIZE register at 0x1f801060
    ram_size: u32,
}

impl MemoryControl {
    pub fn new() -> MemoryControl {
        MemoryControl {
            registers: RESET_VALUES,
            ram_size: 0x0000_0b88,
        }
    }

    pub fn load(&self, offset: u32) -> u32 {
        match self.registers.get((offset >> 2) as usize) {
            Some(&v) => v,
            None => {
                warn!("Memory control read from unknown register 0x{:x}", offset);
                !0
            }
        }
    }

    pub fn store(&mut self, offset: u32, val: u32) {
        let index = (offset >> 2) as usize;

        if index < EXPECTED_BASES.len() && val != EXPECTED_BASES[index] {
            warn!(
                "Unexpected expansion {} base address 0x{:08x}",
                index + 1,
                val
            );
        }

        match self.registers.get_mut(index) {
            Some(r) => {
                *r = val;
                debug!("Memory control [{}] = 0x{:08x}", index, val);
            }
            None => warn!(
                "Memory control write to unknown register 0x{:x}: 0x{:08x}",
                offset, val
            ),
        }
    }

    pub fn ram_size(&self) -> u32 {
        self.ram_size
    }

    pub fn set_ram_size(&mut self, val: u32) {
        debug!("RAM_SIZE = 0x{:08x}", val);
        self.ram_size = val;
    }
}

impl Default for MemoryControl {
    fn default() -> MemoryControl {
        MemoryControl::new()
    }
}

/// Per-region data access cost, derived from the timing configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessCosts {
    pub ram: u32,
    pub bios: u32,
    pub scratchpad: u32,
    pub io: u32,
}

impl AccessCosts {
    pub fn from_timing(timing: &TimingConfig) -> AccessCosts {
        AccessCosts {
            ram: timing.ram_access_cycles,
            bios: timing.bios_access_cycles,
            scratchpad: timing.scratchpad_access_cycles,
            io: timing.io_access_cycles,
        }
    }

    /// Cycles charged for one data access at physical address `addr`
    pub fn cost(&self, addr: u32) -> u32 {
        if memory_map::RAM.contains(addr).is_some() {
            self.ram
        } else if memory_map::SCRATCHPAD.contains(addr).is_some() {
            self.scratchpad
        } else if memory_map::BIOS.contains(addr).is_some() {
            self.bios
        } else {
            // Hardware registers, expansion regions and cache control
            self.io
        }
    }
}
