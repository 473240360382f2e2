//! Compiled blocks and the per-region block cache

use crate::error::{PsxError, Result};
use crate::psx::bus::Bus;
use crate::psx::cpu::instruction::Instruction;
use crate::psx::cpu::ops::OpResult;
use crate::psx::cpu::Cpu;
use crate::psx::memory_map::CodeRegion;

/// Host function implementing one guest instruction
pub type OpFn = fn(&mut Cpu, &mut dyn Bus, &OpArgs) -> OpResult;

/// Operands resolved at build time
#[derive(Debug, Clone, Copy)]
pub struct OpArgs {
    pub s: usize,
    pub t: usize,
    pub d: usize,
    /// Immediate, already sign or zero extended as the instruction
    /// wants it. Shift amount for constant shifts.
    pub imm: u32,
    /// Absolute branch or jump target
    pub target: u32,
    /// Return address for linking instructions
    pub link: u32,
    /// Original instruction, used by the interpreter fallback
    pub word: Instruction,
}

#[derive(Clone, Copy)]
pub struct Op {
    pub run: OpFn,
    pub args: OpArgs,
    /// Number of NOPs preceding this op in the guest code. They aren't
    /// emitted but still have to go through the pipeline.
    pub nops_before: u8,
}

/// A straight run of guest code ending with a control transfer and its
/// delay slot, a trap, the length cap or the end of the region
pub struct Block {
    pub start_address: u32,
    /// Guest instructions covered, NOPs included
    pub instruction_count: u32,
    /// XOR of every instruction word in the block
    pub checksum: u32,
    pub compiled: bool,
    pub ops: Vec<Op>,
    /// NOPs after the last emitted op
    pub trailing_nops: u8,
}

impl Block {
    /// Fold the `count` instruction words starting at `start`
    pub fn checksum_of(bus: &mut dyn Bus, start: u32, count: u32) -> u32 {
        (0..count).fold(0, |sum, i| {
            sum ^ bus.load_instruction(start.wrapping_add(i * 4))
        })
    }

    /// True if the block can be run at `pc`. ROM never changes so a
    /// compiled BIOS block stays valid, RAM blocks are checked against
    /// the current memory contents.
    pub fn is_valid(&self, bus: &mut dyn Bus, pc: u32, region: CodeRegion) -> bool {
        // Jump targets are relative to the segment the block was built
        // for
        if !self.compiled || self.start_address != pc {
            return false;
        }

        match region {
            CodeRegion::Bios => true,
            CodeRegion::Ram => {
                Block::checksum_of(bus, pc, self.instruction_count) == self.checksum
            }
        }
    }
}

/// One slot per instruction word of a region. Allocated on first use
/// since most games never run code from the BIOS after boot.
pub struct BlockCache {
    region: CodeRegion,
    slots: Vec<Option<Box<Block>>>,
}

impl BlockCache {
    pub fn new(region: CodeRegion) -> BlockCache {
        BlockCache {
            region,
            slots: Vec::new(),
        }
    }

    fn ensure_allocated(&mut self) -> Result<()> {
        if !self.slots.is_empty() {
            return Ok(());
        }

        let requested = self.region.words();

        self.slots
            .try_reserve_exact(requested)
            .map_err(|_| PsxError::BlockCacheExhausted {
                region: self.region.name(),
                requested,
            })?;

        self.slots.resize_with(requested, || None);

        Ok(())
    }

    /// Remove the block cached for `pc` from its slot. The caller puts
    /// it back (or a rebuilt one) with `insert`.
    pub fn take(&mut self, pc: u32) -> Result<Option<Box<Block>>> {
        self.ensure_allocated()?;

        let index = self.region.index(pc);

        Ok(self.slots[index].take())
    }

    pub fn insert(&mut self, pc: u32, block: Box<Block>) {
        debug_assert!(
            !self.slots.is_empty(),
            "block inserted before the cache was allocated"
        );

        let index = self.region.index(pc);

        self.slots[index] = Some(block);
    }

    /// Drop every block, keeping the slot array
    pub fn flush(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = None;
        }
    }

    /// Number of compiled blocks currently cached
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
