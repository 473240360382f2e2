//! The CPU's view of the outside world
//!
//! `Bus` is the contract the CPU core executes against, `Interconnect` is
//! the concrete implementation: memories, the handful of system
//! registers the core needs and any number of external peripherals
//! mapped by address range.

use log::{debug, trace, warn};

use super::bios::Bios;
use super::irq::{Interrupt, InterruptState};
use super::memory_control::{AccessCosts, MemoryControl};
use super::memory_map::{self, mask_region, Range, RAM_MASK, RAM_SIZE, SCRATCHPAD_SIZE};
use crate::config::TimingConfig;
use crate::error::{PsxError, Result};
use crate::save_state::MemoryState;

const SCRATCHPAD_MASK: usize = SCRATCHPAD_SIZE - 1;

/// Width of a memory access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessWidth {
    Byte = 1,
    HalfWord = 2,
    Word = 4,
}

/// Everything the CPU core needs from the system. Addresses are
/// virtual, the bus does the region masking.
pub trait Bus {
    fn load_byte(&mut self, addr: u32) -> u8;
    fn load_half(&mut self, addr: u32) -> u16;
    fn load_word(&mut self, addr: u32) -> u32;

    fn store_byte(&mut self, addr: u32, val: u8);
    fn store_half(&mut self, addr: u32, val: u16);
    fn store_word(&mut self, addr: u32, val: u32);

    /// Fetch an instruction word. Must not have side effects and is not
    /// charged: the CPU accounts for instruction fetches itself.
    fn load_instruction(&mut self, addr: u32) -> u32;

    /// Advance the peripherals by `cycles` CPU cycles
    fn tick(&mut self, cycles: u32);

    /// Level of the interrupt controller output
    fn interrupt_pending(&self) -> bool;

    /// Return and reset the cycles spent on data accesses
    fn drain_cycles(&mut self) -> u32;
}

/// A device living outside of the CPU core (GPU, timers, DMA, CD...)
pub trait Peripheral {
    fn name(&self) -> &'static str;

    /// Physical address range decoded by the device
    fn range(&self) -> Range;

    fn load(&mut self, offset: u32, width: AccessWidth) -> u32;

    fn store(&mut self, offset: u32, val: u32, width: AccessWidth);

    /// Called after every batch of CPU cycles, the device can raise
    /// interrupts through `irq`
    fn tick(&mut self, _cycles: u32, _irq: &mut InterruptState) {}
}

pub struct Interconnect {
    ram: Box<[u8]>,
    scratchpad: Box<[u8]>,
    bios: Bios,
    irq: InterruptState,
    mem_control: MemoryControl,
    /// Cache control register at 0xfffe0130
    cache_control: u32,
    costs: AccessCosts,
    /// Data access cycles not yet reported to the CPU
    pending_cycles: u32,
    peripherals: Vec<Box<dyn Peripheral>>,
}

impl Interconnect {
    pub fn new(bios: Bios, timing: &TimingConfig) -> Interconnect {
        Interconnect {
            ram: vec![0xca; RAM_SIZE].into_boxed_slice(),
            scratchpad: vec![0; SCRATCHPAD_SIZE].into_boxed_slice(),
            bios,
            irq: InterruptState::new(),
            mem_control: MemoryControl::new(),
            cache_control: 0,
            costs: AccessCosts::from_timing(timing),
            pending_cycles: 0,
            peripherals: Vec::new(),
        }
    }

    /// Put the system registers and memories back in their power on
    /// state. Peripherals are kept.
    pub fn reset(&mut self) {
        self.ram.fill(0xca);
        self.scratchpad.fill(0);
        self.irq = InterruptState::new();
        self.mem_control = MemoryControl::new();
        self.cache_control = 0;
        self.pending_cycles = 0;
    }

    pub fn add_peripheral(&mut self, peripheral: Box<dyn Peripheral>) {
        debug!(
            "Mapping {} at 0x{:08x}",
            peripheral.name(),
            peripheral.range().0
        );

        self.peripherals.push(peripheral);
    }

    pub fn set_timing(&mut self, timing: &TimingConfig) {
        self.costs = AccessCosts::from_timing(timing);
    }

    pub fn bios(&self) -> &Bios {
        &self.bios
    }

    pub fn set_bios(&mut self, bios: Bios) {
        self.bios = bios;
    }

    /// The 2MB of RAM
    pub fn ram(&self) -> &[u8] {
        &self.ram
    }

    pub fn ram_mut(&mut self) -> &mut [u8] {
        &mut self.ram
    }

    pub fn scratchpad(&self) -> &[u8] {
        &self.scratchpad
    }

    pub fn scratchpad_mut(&mut self) -> &mut [u8] {
        &mut self.scratchpad
    }

    pub fn irq(&self) -> &InterruptState {
        &self.irq
    }

    pub fn irq_mut(&mut self) -> &mut InterruptState {
        &mut self.irq
    }

    pub fn raise_irq(&mut self, which: Interrupt) {
        self.irq.raise(which);
    }

    pub fn mem_control(&self) -> &MemoryControl {
        &self.mem_control
    }

    pub fn mem_control_mut(&mut self) -> &mut MemoryControl {
        &mut self.mem_control
    }

    pub fn cache_control(&self) -> u32 {
        self.cache_control
    }

    pub fn set_cache_control(&mut self, val: u32) {
        self.cache_control = val;
    }

    /// Capture the memories and system registers
    pub fn snapshot(&self) -> MemoryState {
        MemoryState {
            ram: self.ram.to_vec(),
            scratchpad: self.scratchpad.to_vec(),
            irq: self.irq,
            mem_control: self.mem_control.clone(),
            cache_control: self.cache_control,
        }
    }

    pub fn restore(&mut self, state: &MemoryState) -> Result<()> {
        if state.ram.len() != RAM_SIZE || state.scratchpad.len() != SCRATCHPAD_SIZE {
            return Err(PsxError::CorruptedState(format!(
                "invalid memory sizes: RAM {} scratchpad {}",
                state.ram.len(),
                state.scratchpad.len()
            )));
        }

        self.ram.copy_from_slice(&state.ram);
        self.scratchpad.copy_from_slice(&state.scratchpad);
        self.irq = state.irq;
        self.mem_control = state.mem_control.clone();
        self.cache_control = state.cache_control;
        self.pending_cycles = 0;

        Ok(())
    }

    /// Copy `data` in RAM at `offset`, wrapping around the 2MB
    pub fn copy_to_ram(&mut self, offset: u32, data: &[u8]) {
        for (i, &b) in data.iter().enumerate() {
            let addr = (offset.wrapping_add(i as u32) & RAM_MASK) as usize;
            self.ram[addr] = b;
        }
    }

    fn ram_load(&self, offset: u32, width: AccessWidth) -> u32 {
        let offset = offset & RAM_MASK;

        let mut v = 0;
        for i in 0..width as u32 {
            v |= (self.ram[((offset + i) & RAM_MASK) as usize] as u32) << (i * 8);
        }

        v
    }

    fn ram_store(&mut self, offset: u32, val: u32, width: AccessWidth) {
        let offset = offset & RAM_MASK;

        for i in 0..width as u32 {
            self.ram[((offset + i) & RAM_MASK) as usize] = (val >> (i * 8)) as u8;
        }
    }

    fn load(&mut self, addr: u32, width: AccessWidth) -> u32 {
        let abs_addr = mask_region(addr);

        if let Some(offset) = memory_map::RAM.contains(abs_addr) {
            return self.ram_load(offset, width);
        }

        if let Some(offset) = memory_map::BIOS.contains(abs_addr) {
            return match width {
                AccessWidth::Byte => self.bios.load_bytes::<1>(offset),
                AccessWidth::HalfWord => self.bios.load_bytes::<2>(offset),
                AccessWidth::Word => self.bios.load_bytes::<4>(offset),
            };
        }

        if let Some(offset) = memory_map::SCRATCHPAD.contains(abs_addr) {
            let mut v = 0;
            for i in 0..width as usize {
                let o = (offset as usize + i) & SCRATCHPAD_MASK;
                v |= (self.scratchpad[o] as u32) << (i * 8);
            }
            return v;
        }

        if let Some(offset) = memory_map::IRQ_CONTROL.contains(abs_addr) {
            return self.irq.load(offset);
        }

        if let Some(offset) = memory_map::MEM_CONTROL.contains(abs_addr) {
            return self.mem_control.load(offset);
        }

        if memory_map::RAM_SIZE_REG.contains(abs_addr).is_some() {
            return self.mem_control.ram_size();
        }

        if abs_addr == memory_map::CACHE_CONTROL {
            return self.cache_control;
        }

        if memory_map::EXPANSION_1.contains(abs_addr).is_some() {
            // Nothing connected, open bus
            return !0u32 >> (32 - 8 * width as u32);
        }

        for p in self.peripherals.iter_mut() {
            if let Some(offset) = p.range().contains(abs_addr) {
                return p.load(offset, width);
            }
        }

        warn!("Unhandled {:?} load from 0x{:08x}", width, addr);
        0
    }

    fn store(&mut self, addr: u32, val: u32, width: AccessWidth) {
        let abs_addr = mask_region(addr);

        if let Some(offset) = memory_map::RAM.contains(abs_addr) {
            return self.ram_store(offset, val, width);
        }

        if let Some(offset) = memory_map::SCRATCHPAD.contains(abs_addr) {
            for i in 0..width as usize {
                let o = (offset as usize + i) & SCRATCHPAD_MASK;
                self.scratchpad[o] = (val >> (i * 8)) as u8;
            }
            return;
        }

        if memory_map::BIOS.contains(abs_addr).is_some() {
            warn!("Write to BIOS ROM at 0x{:08x}: 0x{:08x}", addr, val);
            return;
        }

        if let Some(offset) = memory_map::IRQ_CONTROL.contains(abs_addr) {
            return self.irq.store(offset, val);
        }

        if let Some(offset) = memory_map::MEM_CONTROL.contains(abs_addr) {
            return self.mem_control.store(offset, val);
        }

        if memory_map::RAM_SIZE_REG.contains(abs_addr).is_some() {
            return self.mem_control.set_ram_size(val);
        }

        if abs_addr == memory_map::CACHE_CONTROL {
            debug!("Cache control = 0x{:08x}", val);
            self.cache_control = val;
            return;
        }

        if let Some(offset) = memory_map::EXPANSION_2.contains(abs_addr) {
            // BIOS POST status and debug UART, nothing listens
            trace!("Expansion 2 write 0x{:x}: 0x{:02x}", offset, val);
            return;
        }

        for p in self.peripherals.iter_mut() {
            if let Some(offset) = p.range().contains(abs_addr) {
                return p.store(offset, val, width);
            }
        }

        warn!(
            "Unhandled {:?} store to 0x{:08x}: 0x{:08x}",
            width, addr, val
        );
    }

    #[inline(always)]
    fn charge(&mut self, addr: u32) {
        self.pending_cycles = self
            .pending_cycles
            .wrapping_add(self.costs.cost(mask_region(addr)));
    }
}

impl Bus for Interconnect {
    fn load_byte(&mut self, addr: u32) -> u8 {
        self.charge(addr);
        self.load(addr, AccessWidth::Byte) as u8
    }

    fn load_half(&mut self, addr: u32) -> u16 {
        self.charge(addr);
        self.load(addr, AccessWidth::HalfWord) as u16
    }

    fn load_word(&mut self, addr: u32) -> u32 {
        self.charge(addr);
        self.load(addr, AccessWidth::Word)
    }

    fn store_byte(&mut self, addr: u32, val: u8) {
        self.charge(addr);
        self.store(addr, val as u32, AccessWidth::Byte)
    }

    fn store_half(&mut self, addr: u32, val: u16) {
        self.charge(addr);
        self.store(addr, val as u32, AccessWidth::HalfWord)
    }

    fn store_word(&mut self, addr: u32, val: u32) {
        self.charge(addr);
        self.store(addr, val, AccessWidth::Word)
    }

    fn load_instruction(&mut self, addr: u32) -> u32 {
        let abs_addr = mask_region(addr);

        if let Some(offset) = memory_map::RAM.contains(abs_addr) {
            return self.ram_load(offset, AccessWidth::Word);
        }

        if let Some(offset) = memory_map::BIOS.contains(abs_addr) {
            return self.bios.load_word(offset);
        }

        if let Some(offset) = memory_map::SCRATCHPAD.contains(abs_addr) {
            let o = (offset & !3) as usize & SCRATCHPAD_MASK;
            return u32::from_le_bytes([
                self.scratchpad[o],
                self.scratchpad[o + 1],
                self.scratchpad[o + 2],
                self.scratchpad[o + 3],
            ]);
        }

        if memory_map::EXPANSION_1.contains(abs_addr).is_some() {
            return !0;
        }

        warn!("Instruction fetch from unmapped address 0x{:08x}", addr);
        0
    }

    fn tick(&mut self, cycles: u32) {
        let irq = &mut self.irq;

        for p in self.peripherals.iter_mut() {
            p.tick(cycles, irq);
        }
    }

    fn interrupt_pending(&self) -> bool {
        self.irq.active()
    }

    fn drain_cycles(&mut self) -> u32 {
        std::mem::take(&mut self.pending_cycles)
    }
}
