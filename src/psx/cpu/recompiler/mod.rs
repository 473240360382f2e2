//! Block recompiler
//!
//! Guest code is translated one basic block at a time into a list of
//! pre-decoded ops, cached per region. BIOS blocks live forever, RAM
//! blocks are validated against a checksum of their code every time
//! they're about to run so self-modifying code and overlays are picked
//! up without any write tracking.

pub mod block;
pub mod builder;
pub mod emit;

use log::debug;

use self::block::{Block, BlockCache};
use super::Cpu;
use crate::error::Result;
use crate::psx::bus::Bus;
use crate::psx::memory_map::CodeRegion;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecompilerStats {
    pub blocks_compiled: u64,
    /// RAM blocks rebuilt because their code changed
    pub blocks_invalidated: u64,
    pub cache_hits: u64,
    pub blocks_executed: u64,
    /// Steps handed over to the interpreter
    pub interpreter_fallbacks: u64,
}

pub struct Recompiler {
    bios: BlockCache,
    ram: BlockCache,
    stats: RecompilerStats,
}

impl Recompiler {
    pub fn new() -> Recompiler {
        Recompiler {
            bios: BlockCache::new(CodeRegion::Bios),
            ram: BlockCache::new(CodeRegion::Ram),
            stats: RecompilerStats::default(),
        }
    }

    pub fn stats(&self) -> &RecompilerStats {
        &self.stats
    }

    /// Drop all compiled code
    pub fn flush(&mut self) {
        debug!("Flushing block caches");

        self.bios.flush();
        self.ram.flush();
    }

    fn cache(&mut self, region: CodeRegion) -> &mut BlockCache {
        match region {
            CodeRegion::Bios => &mut self.bios,
            CodeRegion::Ram => &mut self.ram,
        }
    }

    /// Take the block for `pc` out of the cache, rebuilding it if it's
    /// missing or stale. It must be given back with `release`.
    fn acquire(&mut self, bus: &mut dyn Bus, pc: u32, region: CodeRegion) -> Result<Box<Block>> {
        let cached = self.cache(region).take(pc)?;

        match cached {
            Some(block) if block.is_valid(bus, pc, region) => {
                self.stats.cache_hits += 1;
                Ok(block)
            }
            stale => {
                if stale.is_some() {
                    debug!("Invalidating block at 0x{:08x}", pc);
                    self.stats.blocks_invalidated += 1;
                }

                // Replacing the old block drops it, it can't run again
                let block = builder::build(bus, pc, region)?;
                self.stats.blocks_compiled += 1;

                Ok(Box::new(block))
            }
        }
    }

    fn release(&mut self, pc: u32, region: CodeRegion, block: Box<Block>) {
        self.cache(region).insert(pc, block);
    }

    /// Number of blocks currently cached for `region`
    pub fn cached_blocks(&self, region: CodeRegion) -> usize {
        match region {
            CodeRegion::Bios => self.bios.len(),
            CodeRegion::Ram => self.ram.len(),
        }
    }
}

impl Default for Recompiler {
    fn default() -> Recompiler {
        Recompiler::new()
    }
}

impl Cpu {
    /// Run the block at the current PC and return the number of cycles
    /// elapsed. Anything the block machinery can't handle (pending
    /// interrupt, misaligned PC, unfinished delay slot, code outside of
    /// RAM and BIOS) goes through a single interpreter step instead.
    pub fn run_block(&mut self, bus: &mut dyn Bus) -> Result<u32> {
        let pc = self.pc;

        let interpret = self.branch || pc % 4 != 0 || self.irq_pending(bus);

        let region = match CodeRegion::of(pc) {
            Some(r) if !interpret => r,
            _ => {
                self.recompiler.stats.interpreter_fallbacks += 1;
                return Ok(self.step(bus));
            }
        };

        let block = self.recompiler.acquire(bus, pc, region)?;

        let executed = self.execute_block(bus, &block);

        self.recompiler.release(pc, region, block);
        self.recompiler.stats.blocks_executed += 1;

        Ok(executed * self.fetch_cycles(pc) + bus.drain_cycles())
    }

    /// Retire one NOP
    #[inline(always)]
    fn skip_nop(&mut self) {
        self.enter_instruction();
        self.advance_pc();
        self.retire();
    }

    /// Run the ops of `block` in order. Stops early if one of them
    /// raises an exception. Returns the number of guest instructions
    /// executed.
    fn execute_block(&mut self, bus: &mut dyn Bus, block: &Block) -> u32 {
        let mut executed = 0;

        for op in &block.ops {
            for _ in 0..op.nops_before {
                self.skip_nop();
            }
            executed += op.nops_before as u32 + 1;

            self.enter_instruction();
            self.advance_pc();

            let result = (op.run)(self, bus, &op.args);

            if let Err(e) = result {
                self.exception(e);
                self.retire();
                return executed;
            }

            self.retire();
        }

        for _ in 0..block.trailing_nops {
            self.skip_nop();
        }

        executed + block.trailing_nops as u32
    }

    pub fn cached_blocks(&self, region: CodeRegion) -> usize {
        self.recompiler.cached_blocks(region)
    }
}
