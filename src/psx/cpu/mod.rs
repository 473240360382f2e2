//! MIPS R3000A CPU core
//!
//! Two engines share the register file, the load delay pipeline and the
//! exception logic: a plain interpreter and a block recompiler that
//! caches pre-decoded basic blocks. Both go through the semantic kernel
//! in `ops` so they can't drift apart.

pub mod cop0;
pub mod instruction;
pub mod interpreter;
pub mod ops;
pub mod pipeline;
pub mod recompiler;
pub mod tty;

use std::fmt;

use log::trace;

use self::cop0::{Cop0, Exception};
use self::instruction::REGISTER_NAMES;
use self::pipeline::DelayedLoad;
use self::recompiler::{Recompiler, RecompilerStats};
use self::tty::Tty;
use super::bus::Bus;
use super::gte::{Gte, RegisterGte};
use super::memory_map::{CodeRegion, RESET_VECTOR};
use crate::config::{Config, Engine, TimingConfig};
use crate::error::{PsxError, Result};
use crate::save_state::CpuState;

pub struct Cpu {
    /// Address of the next instruction to be fetched
    pc: u32,
    /// Next value of `pc`, used to emulate the branch delay slot
    next_pc: u32,
    /// Address of the instruction currently executing, EPC anchor
    current_pc: u32,
    /// General purpose registers. `regs[0]` is always 0.
    regs: [u32; 32],
    hi: u32,
    lo: u32,
    /// Set by branches and jumps, the next instruction is their delay
    /// slot
    branch: bool,
    /// True while executing a delay slot instruction
    delay_slot: bool,
    load: DelayedLoad,
    cop0: Cop0,
    gte: Box<dyn Gte>,
    tty: Option<Tty>,
    engine: Engine,
    timing: TimingConfig,
    recompiler: Recompiler,
}

impl Cpu {
    pub fn new(config: &Config) -> Cpu {
        Cpu {
            pc: RESET_VECTOR,
            next_pc: RESET_VECTOR.wrapping_add(4),
            current_pc: RESET_VECTOR,
            regs: [0; 32],
            hi: 0,
            lo: 0,
            branch: false,
            delay_slot: false,
            load: DelayedLoad::new(),
            cop0: Cop0::new(),
            gte: Box::new(RegisterGte::new()),
            tty: if config.cpu.tty_trace {
                Some(Tty::new())
            } else {
                None
            },
            engine: config.cpu.engine,
            timing: config.timing.clone(),
            recompiler: Recompiler::new(),
        }
    }

    /// Power on state. The GTE registers are cleared, the GTE itself is
    /// kept.
    pub fn reset(&mut self) {
        self.pc = RESET_VECTOR;
        self.next_pc = RESET_VECTOR.wrapping_add(4);
        self.current_pc = RESET_VECTOR;
        self.regs = [0; 32];
        self.hi = 0;
        self.lo = 0;
        self.branch = false;
        self.delay_slot = false;
        self.load = DelayedLoad::new();
        self.cop0.reset();
        self.gte.restore_registers(&[0; 64]);
        if let Some(tty) = self.tty.as_mut() {
            tty.clear();
        }
        self.recompiler.flush();
    }

    /// Run one instruction (interpreter) or one block (recompiler) and
    /// return the number of cycles elapsed
    pub fn run_next(&mut self, bus: &mut dyn Bus) -> Result<u32> {
        match self.engine {
            Engine::Interpreter => Ok(self.step(bus)),
            Engine::Recompiler => self.run_block(bus),
        }
    }

    pub fn engine(&self) -> Engine {
        self.engine
    }

    pub fn set_engine(&mut self, engine: Engine) {
        self.engine = engine;
    }

    pub fn set_timing(&mut self, timing: &TimingConfig) {
        self.timing = timing.clone();
    }

    pub fn pc(&self) -> u32 {
        self.pc
    }

    pub fn next_pc(&self) -> u32 {
        self.next_pc
    }

    pub fn current_pc(&self) -> u32 {
        self.current_pc
    }

    /// Force the PC, discarding any pending branch. Used to jump into
    /// side-loaded executables.
    pub fn set_pc(&mut self, pc: u32) {
        self.pc = pc;
        self.next_pc = pc.wrapping_add(4);
        self.branch = false;
        self.delay_slot = false;
    }

    pub fn reg(&self, index: usize) -> u32 {
        self.regs[index]
    }

    /// Write a register immediately, bypassing the load delay pipeline
    pub fn set_reg(&mut self, index: usize, val: u32) {
        self.regs[index] = val;
        self.regs[0] = 0;
    }

    pub fn regs(&self) -> &[u32; 32] {
        &self.regs
    }

    pub fn hi(&self) -> u32 {
        self.hi
    }

    pub fn lo(&self) -> u32 {
        self.lo
    }

    pub fn in_delay_slot(&self) -> bool {
        self.delay_slot
    }

    pub fn pipeline(&self) -> &DelayedLoad {
        &self.load
    }

    pub fn cop0(&self) -> &Cop0 {
        &self.cop0
    }

    pub fn cop0_mut(&mut self) -> &mut Cop0 {
        &mut self.cop0
    }

    pub fn gte_mut(&mut self) -> &mut dyn Gte {
        self.gte.as_mut()
    }

    pub fn set_gte(&mut self, gte: Box<dyn Gte>) {
        self.gte = gte;
    }

    pub fn stats(&self) -> &RecompilerStats {
        self.recompiler.stats()
    }

    /// Drop every compiled block
    pub fn flush_block_cache(&mut self) {
        self.recompiler.flush();
    }

    /// Capture the architectural state
    pub fn snapshot(&mut self) -> CpuState {
        CpuState {
            pc: self.pc,
            next_pc: self.next_pc,
            current_pc: self.current_pc,
            regs: self.regs,
            hi: self.hi,
            lo: self.lo,
            branch: self.branch,
            delay_slot: self.delay_slot,
            load: self.load,
            cop0: self.cop0.clone(),
            gte: self.gte.registers().to_vec(),
        }
    }

    /// Load a state captured by `snapshot`. Compiled blocks are dropped
    /// since RAM is about to change under them.
    pub fn restore(&mut self, state: &CpuState) -> Result<()> {
        let gte: [u32; 64] = state.gte.as_slice().try_into().map_err(|_| {
            PsxError::CorruptedState(format!(
                "invalid GTE register count {}",
                state.gte.len()
            ))
        })?;

        self.pc = state.pc;
        self.next_pc = state.next_pc;
        self.current_pc = state.current_pc;
        self.regs = state.regs;
        self.regs[0] = 0;
        self.hi = state.hi;
        self.lo = state.lo;
        self.branch = state.branch;
        self.delay_slot = state.delay_slot;
        self.load = state.load;
        self.cop0 = state.cop0.clone();
        self.gte.restore_registers(&gte);
        if let Some(tty) = self.tty.as_mut() {
            tty.clear();
        }
        self.recompiler.flush();

        Ok(())
    }

    /// Cost of executing an instruction fetched from `pc`
    fn fetch_cycles(&self, pc: u32) -> u32 {
        self.timing.fetch_cycles(CodeRegion::of(pc))
    }

    /// First half of the instruction boundary bookkeeping, shared by
    /// both engines
    #[inline(always)]
    fn enter_instruction(&mut self) {
        self.current_pc = self.pc;

        if let Some(tty) = self.tty.as_mut() {
            tty.intercept(self.pc, &self.regs);
        }

        self.delay_slot = self.branch;
        self.branch = false;
    }

    #[inline(always)]
    fn advance_pc(&mut self) {
        self.pc = self.next_pc;
        self.next_pc = self.pc.wrapping_add(4);
    }

    /// Commit the pipeline at the end of an instruction
    #[inline(always)]
    fn retire(&mut self) {
        self.load.advance(&mut self.regs);
    }

    /// Sample the interrupt line and return true if the CPU should take
    /// an interrupt
    fn irq_pending(&mut self, bus: &mut dyn Bus) -> bool {
        self.cop0.set_hardware_irq(bus.interrupt_pending());

        self.cop0.irq_active()
    }

    /// Enter the exception handler
    pub(crate) fn exception(&mut self, exception: Exception) {
        if exception != Exception::Interrupt {
            trace!(
                "{:?} at 0x{:08x}{}",
                exception,
                self.current_pc,
                if self.delay_slot { " (delay slot)" } else { "" }
            );
        }

        let handler = self
            .cop0
            .enter_exception(exception, self.current_pc, self.delay_slot);

        // Exceptions don't have a branch delay, we jump directly into
        // the handler
        self.pc = handler;
        self.next_pc = handler.wrapping_add(4);
        self.branch = false;
    }
}

impl fmt::Debug for Cpu {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "PC: 0x{:08x} (next 0x{:08x})", self.pc, self.next_pc)?;

        for (i, chunk) in self.regs.chunks(4).enumerate() {
            for (j, v) in chunk.iter().enumerate() {
                write!(f, "{}: 0x{:08x}  ", REGISTER_NAMES[i * 4 + j], v)?;
            }
            writeln!(f)?;
        }

        writeln!(f, "HI: 0x{:08x}  LO: 0x{:08x}", self.hi, self.lo)?;
        write!(
            f,
            "SR: 0x{:08x}  CAUSE: 0x{:08x}  EPC: 0x{:08x}",
            self.cop0.sr, self.cop0.cause, self.cop0.epc
        )
    }
}
