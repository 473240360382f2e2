// Scenario tests running small hand assembled programs on a real
// interconnect

mod interpreter_tests;
mod recompiler_tests;

use crate::config::{Config, Engine};
use crate::psx::bios::Bios;
use crate::psx::bus::Interconnect;
use crate::psx::cpu::Cpu;

/// Where test programs are loaded
pub const BASE: u32 = 0x8001_0000;

/// Scratch data area
pub const DATA: u32 = 0x8002_0000;

/// Minimal MIPS assembler, just enough to write test programs
pub mod asm {
    pub const ZERO: u32 = 0;
    pub const AT: u32 = 1;
    pub const V0: u32 = 2;
    pub const A0: u32 = 4;
    pub const T0: u32 = 8;
    pub const T1: u32 = 9;
    pub const T2: u32 = 10;
    pub const T3: u32 = 11;
    pub const T4: u32 = 12;
    pub const T5: u32 = 13;
    pub const S0: u32 = 16;
    pub const S1: u32 = 17;
    pub const S7: u32 = 23;
    pub const K0: u32 = 26;
    pub const RA: u32 = 31;

    fn i_type(op: u32, s: u32, t: u32, imm: u16) -> u32 {
        (op << 26) | (s << 21) | (t << 16) | imm as u32
    }

    fn r_type(s: u32, t: u32, d: u32, shift: u32, funct: u32) -> u32 {
        (s << 21) | (t << 16) | (d << 11) | (shift << 6) | funct
    }

    pub fn nop() -> u32 {
        0
    }

    pub fn sll(d: u32, t: u32, shift: u32) -> u32 {
        r_type(0, t, d, shift, 0x00)
    }

    pub fn jr(s: u32) -> u32 {
        r_type(s, 0, 0, 0, 0x08)
    }

    pub fn jalr(d: u32, s: u32) -> u32 {
        r_type(s, 0, d, 0, 0x09)
    }

    pub fn syscall() -> u32 {
        0x0000_000c
    }

    pub fn brk() -> u32 {
        0x0000_000d
    }

    pub fn mfhi(d: u32) -> u32 {
        r_type(0, 0, d, 0, 0x10)
    }

    pub fn mflo(d: u32) -> u32 {
        r_type(0, 0, d, 0, 0x12)
    }

    pub fn mult(s: u32, t: u32) -> u32 {
        r_type(s, t, 0, 0, 0x18)
    }

    pub fn div(s: u32, t: u32) -> u32 {
        r_type(s, t, 0, 0, 0x1a)
    }

    pub fn divu(s: u32, t: u32) -> u32 {
        r_type(s, t, 0, 0, 0x1b)
    }

    pub fn add(d: u32, s: u32, t: u32) -> u32 {
        r_type(s, t, d, 0, 0x20)
    }

    pub fn addu(d: u32, s: u32, t: u32) -> u32 {
        r_type(s, t, d, 0, 0x21)
    }

    pub fn subu(d: u32, s: u32, t: u32) -> u32 {
        r_type(s, t, d, 0, 0x23)
    }

    pub fn slt(d: u32, s: u32, t: u32) -> u32 {
        r_type(s, t, d, 0, 0x2a)
    }

    pub fn bltzal(s: u32, offset: i16) -> u32 {
        i_type(0x01, s, 0x10, offset as u16)
    }

    pub fn bgezal(s: u32, offset: i16) -> u32 {
        i_type(0x01, s, 0x11, offset as u16)
    }

    /// `target` is absolute, only its low 28 bits are encoded
    pub fn j(target: u32) -> u32 {
        (0x02 << 26) | ((target >> 2) & 0x03ff_ffff)
    }

    pub fn jal(target: u32) -> u32 {
        (0x03 << 26) | ((target >> 2) & 0x03ff_ffff)
    }

    pub fn beq(s: u32, t: u32, offset: i16) -> u32 {
        i_type(0x04, s, t, offset as u16)
    }

    pub fn bne(s: u32, t: u32, offset: i16) -> u32 {
        i_type(0x05, s, t, offset as u16)
    }

    pub fn addi(t: u32, s: u32, imm: i16) -> u32 {
        i_type(0x08, s, t, imm as u16)
    }

    pub fn addiu(t: u32, s: u32, imm: i16) -> u32 {
        i_type(0x09, s, t, imm as u16)
    }

    pub fn ori(t: u32, s: u32, imm: u16) -> u32 {
        i_type(0x0d, s, t, imm)
    }

    pub fn lui(t: u32, imm: u16) -> u32 {
        i_type(0x0f, 0, t, imm)
    }

    pub fn mfc0(t: u32, d: u32) -> u32 {
        0x4000_0000 | (t << 16) | (d << 11)
    }

    pub fn mtc0(t: u32, d: u32) -> u32 {
        0x4080_0000 | (t << 16) | (d << 11)
    }

    pub fn rfe() -> u32 {
        0x4200_0010
    }

    pub fn mtc2(t: u32, d: u32) -> u32 {
        0x4880_0000 | (t << 16) | (d << 11)
    }

    pub fn mfc2(t: u32, d: u32) -> u32 {
        0x4800_0000 | (t << 16) | (d << 11)
    }

    /// GTE command word
    pub fn cop2(command: u32) -> u32 {
        0x4a00_0000 | (command & 0x1ff_ffff)
    }

    pub fn lb(t: u32, s: u32, offset: i16) -> u32 {
        i_type(0x20, s, t, offset as u16)
    }

    pub fn lwl(t: u32, s: u32, offset: i16) -> u32 {
        i_type(0x22, s, t, offset as u16)
    }

    pub fn lw(t: u32, s: u32, offset: i16) -> u32 {
        i_type(0x23, s, t, offset as u16)
    }

    pub fn lwr(t: u32, s: u32, offset: i16) -> u32 {
        i_type(0x26, s, t, offset as u16)
    }

    pub fn sb(t: u32, s: u32, offset: i16) -> u32 {
        i_type(0x28, s, t, offset as u16)
    }

    pub fn sw(t: u32, s: u32, offset: i16) -> u32 {
        i_type(0x2b, s, t, offset as u16)
    }

    pub fn swl(t: u32, s: u32, offset: i16) -> u32 {
        i_type(0x2a, s, t, offset as u16)
    }

    pub fn swr(t: u32, s: u32, offset: i16) -> u32 {
        i_type(0x2e, s, t, offset as u16)
    }
}

/// A CPU and its bus, without the frame loop
pub struct Machine {
    pub cpu: Cpu,
    pub bus: Interconnect,
}

impl Machine {
    pub fn new(engine: Engine) -> Machine {
        Machine::with_bios(engine, Bios::new_dummy())
    }

    pub fn with_bios(engine: Engine, bios: Bios) -> Machine {
        let mut config = Config::default();
        config.cpu.engine = engine;

        Machine {
            cpu: Cpu::new(&config),
            bus: Interconnect::new(bios, &config.timing),
        }
    }

    /// Copy `program` at `base` without touching the CPU
    pub fn write(&mut self, base: u32, program: &[u32]) {
        let bytes: Vec<u8> = program.iter().flat_map(|w| w.to_le_bytes()).collect();

        self.bus.copy_to_ram(base, &bytes);
    }

    /// Copy `program` at `base` and jump to it
    pub fn load(&mut self, base: u32, program: &[u32]) {
        self.write(base, program);
        self.cpu.set_pc(base);
    }

    /// One interpreter step regardless of the configured engine
    pub fn step(&mut self) -> u32 {
        self.cpu.step(&mut self.bus)
    }

    pub fn steps(&mut self, n: usize) {
        for _ in 0..n {
            self.step();
        }
    }

    /// One step of the configured engine
    pub fn run_next(&mut self) -> u32 {
        self.cpu.run_next(&mut self.bus).unwrap()
    }

    /// Run the configured engine until the PC reaches `pc`. Panics if
    /// it takes more than `limit` calls.
    pub fn run_until(&mut self, pc: u32, limit: usize) {
        for _ in 0..limit {
            if self.cpu.pc() == pc {
                return;
            }
            self.run_next();
        }

        panic!(
            "PC never reached 0x{:08x}, stuck at 0x{:08x}",
            pc,
            self.cpu.pc()
        );
    }

    pub fn reg(&self, r: u32) -> u32 {
        self.cpu.reg(r as usize)
    }

    pub fn set_reg(&mut self, r: u32, val: u32) {
        self.cpu.set_reg(r as usize, val);
    }

    pub fn ram_word(&self, addr: u32) -> u32 {
        let o = (addr & 0x1f_ffff) as usize;
        let ram = self.bus.ram();

        u32::from_le_bytes([ram[o], ram[o + 1], ram[o + 2], ram[o + 3]])
    }

    /// Exception code latched in Cause
    pub fn cause_code(&self) -> u32 {
        (self.cpu.cop0().cause >> 2) & 0x1f
    }
}
