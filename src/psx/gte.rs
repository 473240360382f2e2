//! Geometry Transformation Engine (COP2) collaborator
//!
//! The CPU only moves data in and out of the GTE and forwards commands,
//! the actual math lives behind the `Gte` trait.

use log::trace;

/// Coprocessor 2 as seen from the CPU. Registers 0-31 are the data
/// registers, 32-63 the control registers.
pub trait Gte {
    fn read(&mut self, reg: u32) -> u32;

    fn write(&mut self, reg: u32, val: u32);

    /// Run a GTE command, `command` is the low 25 bits of the COP2
    /// instruction
    fn execute(&mut self, command: u32);

    /// Snapshot of the 64 registers for save states
    fn registers(&mut self) -> [u32; 64] {
        let mut regs = [0; 64];

        for (i, r) in regs.iter_mut().enumerate() {
            *r = self.read(i as u32);
        }

        regs
    }

    fn restore_registers(&mut self, regs: &[u32; 64]) {
        for (i, &r) in regs.iter().enumerate() {
            self.write(i as u32, r);
        }
    }
}

/// Register storage only, commands are counted and ignored
#[derive(Debug, Clone)]
pub struct RegisterGte {
    regs: [u32; 64],
    commands: u64,
}

impl RegisterGte {
    pub fn new() -> RegisterGte {
        RegisterGte {
            regs: [0; 64],
            commands: 0,
        }
    }

    /// Number of commands executed since reset
    pub fn commands(&self) -> u64 {
        self.commands
    }
}

impl Default for RegisterGte {
    fn default() -> RegisterGte {
        RegisterGte::new()
    }
}

impl Gte for RegisterGte {
    fn read(&mut self, reg: u32) -> u32 {
        self.regs[(reg & 0x3f) as usize]
    }

    fn write(&mut self, reg: u32, val: u32) {
        self.regs[(reg & 0x3f) as usize] = val;
    }

    fn execute(&mut self, command: u32) {
        trace!("GTE command 0x{:07x}", command);
        self.commands += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_snapshot() {
        let mut gte = RegisterGte::new();

        gte.write(3, 0x1234);
        gte.write(32 + 31, 0xffff);
        gte.execute(0x0180001);

        let regs = gte.registers();
        assert_eq!(regs[3], 0x1234);
        assert_eq!(regs[63], 0xffff);
        assert_eq!(gte.commands(), 1);

        let mut other = RegisterGte::new();
        other.restore_registers(&regs);
        assert_eq!(other.read(63), 0xffff);
    }
}
