//! Load delay emulation
//!
//! A value fetched from memory only reaches the register file once the
//! following instruction has run. ALU results are visible right away but
//! still go through this pipeline so that a same-cycle ALU write always
//! wins over a load targeting the same register.

use serde::{Deserialize, Serialize};

/// A pending register write. Register 0 means "empty" since writes to
/// it are discarded anyway.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterWrite {
    pub reg: u8,
    pub value: u32,
}

impl RegisterWrite {
    pub const NONE: RegisterWrite = RegisterWrite { reg: 0, value: 0 };

    pub fn new(reg: usize, value: u32) -> RegisterWrite {
        RegisterWrite {
            reg: reg as u8,
            value,
        }
    }

    pub fn is_empty(self) -> bool {
        self.reg == 0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayedLoad {
    /// Load issued by the previous instruction, committed at the next
    /// boundary
    pub ready: RegisterWrite,
    /// Load issued by the instruction currently executing
    pub delayed: RegisterWrite,
    /// ALU, link or MFHI/MFLO result of the current instruction
    pub direct: RegisterWrite,
}

impl DelayedLoad {
    pub fn new() -> DelayedLoad {
        DelayedLoad::default()
    }

    /// Queue a memory load, it becomes visible one instruction later
    #[inline(always)]
    pub fn load(&mut self, reg: usize, value: u32) {
        self.delayed = RegisterWrite::new(reg, value);
    }

    /// Queue an immediate register write
    #[inline(always)]
    pub fn write(&mut self, reg: usize, value: u32) {
        self.direct = RegisterWrite::new(reg, value);
    }

    /// False if a slot targets a register that doesn't exist
    pub fn is_valid(&self) -> bool {
        [self.ready, self.delayed, self.direct]
            .iter()
            .all(|w| w.reg < 32)
    }

    /// Value of `reg` as seen by LWL/LWR: if a load to `reg` is about to
    /// be committed the merge must build upon it.
    #[inline(always)]
    pub fn in_flight(&self, regs: &[u32; 32], reg: usize) -> u32 {
        if !self.ready.is_empty() && self.ready.reg as usize == reg {
            self.ready.value
        } else {
            regs[reg]
        }
    }

    /// Instruction boundary. The order of the four steps is what
    /// resolves same-cycle write conflicts.
    #[inline(always)]
    pub fn advance(&mut self, regs: &mut [u32; 32]) {
        // A load to the same register is already queued behind us, it
        // would overwrite this value anyway
        if self.ready.reg != self.delayed.reg {
            regs[self.ready.reg as usize] = self.ready.value;
        }

        self.ready = self.delayed;
        self.delayed = RegisterWrite::NONE;

        regs[self.direct.reg as usize] = self.direct.value;
        self.direct = RegisterWrite::NONE;

        regs[0] = 0;
    }
}
