use arrayvec::ArrayVec;
use log::debug;

use super::block::{Block, Op};
use super::emit::emit;
use crate::error::{PsxError, Result};
use crate::psx::bus::Bus;
use crate::psx::cpu::instruction::Instruction;
use crate::psx::memory_map::CodeRegion;

/// Longest block we build, in guest instructions
pub const MAX_BLOCK_INSTRUCTIONS: usize = 127;

/// Decode and translate the code starting at `start` until the end of
/// the basic block
pub fn build(bus: &mut dyn Bus, start: u32, region: CodeRegion) -> Result<Block> {
    let mut scratch: ArrayVec<Op, MAX_BLOCK_INSTRUCTIONS> = ArrayVec::new();

    let mut pc = start;
    let mut count = 0u32;
    let mut checksum = 0u32;
    let mut nops = 0u8;
    // Set once we've seen a control transfer, the next instruction is
    // its delay slot and the last one in the block
    let mut in_delay_slot = false;

    loop {
        let word = Instruction(bus.load_instruction(pc));

        count += 1;
        checksum ^= word.0;

        match emit(word, pc) {
            Some(mut op) => {
                op.nops_before = nops;
                nops = 0;
                scratch.push(op);
            }
            None => nops += 1,
        }

        if in_delay_slot || word.is_trap() {
            break;
        }

        if word.is_control_transfer() {
            in_delay_slot = true;
        }

        if count as usize >= MAX_BLOCK_INSTRUCTIONS {
            break;
        }

        // Don't run past the end of the region
        if region.index(pc) + 1 >= region.words() {
            break;
        }

        pc = pc.wrapping_add(4);
    }

    let mut ops = Vec::new();

    ops.try_reserve_exact(scratch.len())
        .map_err(|_| PsxError::BlockCacheExhausted {
            region: region.name(),
            requested: scratch.len(),
        })?;

    ops.extend(scratch);

    debug!(
        "Compiled {} block at 0x{:08x}: {} instructions, {} ops",
        region.name(),
        start,
        count,
        ops.len()
    );

    Ok(Block {
        start_address: start,
        instruction_count: count,
        checksum,
        compiled: true,
        ops,
        trailing_nops: nops,
    })
}
