//! Interrupt controller (I_STAT at 0x1f801070, I_MASK at 0x1f801074)

use bitflags::bitflags;
use log::debug;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Interrupt request lines. Peripherals raise them, the CPU sees the
    /// OR of `status & mask` on Cause.IP[2].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Interrupt: u16 {
        const VBLANK = 1 << 0;
        const GPU = 1 << 1;
        const CDROM = 1 << 2;
        const DMA = 1 << 3;
        const TIMER0 = 1 << 4;
        const TIMER1 = 1 << 5;
        const TIMER2 = 1 << 6;
        const PAD_MEMCARD = 1 << 7;
        const SIO = 1 << 8;
        const SPU = 1 << 9;
        const LIGHTPEN = 1 << 10;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterruptState {
    /// Interrupt status
    status: u16,
    /// Interrupt mask
    mask: u16,
}

impl InterruptState {
    pub fn new() -> InterruptState {
        InterruptState::default()
    }

    /// Level of the line going into the CPU
    pub fn active(&self) -> bool {
        (self.status & self.mask) != 0
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    /// Writing to I_STAT acknowledges the interrupts whose bit is 0
    pub fn ack(&mut self, ack: u16) {
        self.status &= ack;
    }

    pub fn mask(&self) -> u16 {
        self.mask
    }

    pub fn set_mask(&mut self, mask: u16) {
        let mask = mask & Interrupt::all().bits();

        debug!("IRQ mask: {:?}", Interrupt::from_bits_truncate(mask));

        self.mask = mask;
    }

    /// Trigger `which`
    pub fn raise(&mut self, which: Interrupt) {
        self.status |= which.bits();
    }

    /// Register access, `offset` relative to I_STAT
    pub fn load(&self, offset: u32) -> u32 {
        match offset & !3 {
            0 => self.status as u32,
            _ => self.mask as u32,
        }
    }

    pub fn store(&mut self, offset: u32, val: u32) {
        match offset & !3 {
            0 => self.ack(val as u16),
            _ => self.set_mask(val as u16),
        }
    }
}
