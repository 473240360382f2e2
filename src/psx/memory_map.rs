//! PSX Memory Map Constants
//!
//! Addresses, sizes and masks of the regions the CPU core cares about,
//! plus the virtual to physical region masking shared by the bus and the
//! recompiler's block cache indexing.

// ============================================================================
// Memory Segments
// ============================================================================

/// KSEG0 - Kernel segment 0 (cached, unmapped)
pub const KSEG0_BASE: u32 = 0x80000000;

/// KSEG1 - Kernel segment 1 (uncached, unmapped)
pub const KSEG1_BASE: u32 = 0xa0000000;

/// KSEG2 - Kernel segment 2 (cache control register lives here)
pub const KSEG2_BASE: u32 = 0xc0000000;

/// Mask applied to a virtual address depending on its top 3 bits.
/// KUSEG is mirrored 4 times with no mask, KSEG0 drops the top bit,
/// KSEG1 drops the top 3 bits and KSEG2 is left untouched.
const REGION_MASK: [u32; 8] = [
    0xffffffff, 0xffffffff, 0xffffffff, 0xffffffff, // KUSEG
    0x7fffffff, // KSEG0
    0x1fffffff, // KSEG1
    0xffffffff, 0xffffffff, // KSEG2
];

// ============================================================================
// Main Memory (RAM)
// ============================================================================

/// Main RAM size
pub const RAM_SIZE: usize = 2 * 1024 * 1024;

/// RAM is mirrored four times in the first 8MB of the physical space
pub const RAM_MIRRORED_SIZE: u32 = 8 * 1024 * 1024;

pub const RAM_MASK: u32 = RAM_SIZE as u32 - 1;

// ============================================================================
// BIOS ROM
// ============================================================================

pub const BIOS_PHYSICAL_ADDR: u32 = 0x1fc00000;
pub const BIOS_SIZE: usize = 512 * 1024;
pub const BIOS_MASK: u32 = BIOS_SIZE as u32 - 1;

/// Reset vector (CPU starts here)
pub const RESET_VECTOR: u32 = 0xbfc00000;

// ============================================================================
// Hardware Registers
// ============================================================================

pub const EXP1_BASE: u32 = 0x1f000000;
pub const EXP1_SIZE: u32 = 0x00800000;

pub const SCRATCHPAD_ADDR: u32 = 0x1f800000;
pub const SCRATCHPAD_SIZE: usize = 1024;

pub const MEMCTRL_BASE: u32 = 0x1f801000;
pub const MEMCTRL_SIZE: u32 = 0x24;

pub const RAM_SIZE_REGISTER: u32 = 0x1f801060;

pub const IRQ_BASE: u32 = 0x1f801070;
pub const IRQ_SIZE: u32 = 8;

pub const EXP2_BASE: u32 = 0x1f802000;
pub const EXP2_SIZE: u32 = 0x80;

/// Cache control register, the only thing living in KSEG2
pub const CACHE_CONTROL: u32 = 0xfffe0130;

// ============================================================================
// CPU Instruction Constants
// ============================================================================

/// PC segment mask for jump instructions
pub const PC_SEGMENT_MASK: u32 = 0xf0000000;

/// Exception handler addresses
pub const EXCEPTION_VECTOR_RAM: u32 = 0x80000080;
pub const EXCEPTION_VECTOR_ROM: u32 = 0xbfc00180;

// ============================================================================
// Helper Functions
// ============================================================================

/// Convert a virtual address into the physical address the bus decodes
#[inline(always)]
pub fn mask_region(addr: u32) -> u32 {
    let region = (addr >> 29) as usize;

    addr & REGION_MASK[region]
}

/// `[start, start + length)` range in the physical address space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range(pub u32, pub u32);

impl Range {
    /// Return `Some(offset)` if `addr` is contained in the range
    #[inline(always)]
    pub fn contains(self, addr: u32) -> Option<u32> {
        let Range(start, length) = self;

        if addr >= start && addr - start < length {
            Some(addr - start)
        } else {
            None
        }
    }
}

pub const RAM: Range = Range(0x00000000, RAM_MIRRORED_SIZE);
pub const BIOS: Range = Range(BIOS_PHYSICAL_ADDR, BIOS_SIZE as u32);
pub const EXPANSION_1: Range = Range(EXP1_BASE, EXP1_SIZE);
pub const SCRATCHPAD: Range = Range(SCRATCHPAD_ADDR, SCRATCHPAD_SIZE as u32);
pub const MEM_CONTROL: Range = Range(MEMCTRL_BASE, MEMCTRL_SIZE);
pub const RAM_SIZE_REG: Range = Range(RAM_SIZE_REGISTER, 4);
pub const IRQ_CONTROL: Range = Range(IRQ_BASE, IRQ_SIZE);
pub const EXPANSION_2: Range = Range(EXP2_BASE, EXP2_SIZE);

/// Memory regions the recompiler knows how to cache code for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodeRegion {
    Bios,
    Ram,
}

impl CodeRegion {
    /// Figure out which code region `pc` lives in, if any
    pub fn of(pc: u32) -> Option<CodeRegion> {
        let physical = mask_region(pc);

        if RAM.contains(physical).is_some() {
            Some(CodeRegion::Ram)
        } else if BIOS.contains(physical).is_some() {
            Some(CodeRegion::Bios)
        } else {
            None
        }
    }

    /// Mask turning a physical address into an offset in the region.
    /// For RAM this also folds the mirrors together.
    pub fn mask(self) -> u32 {
        match self {
            CodeRegion::Bios => BIOS_MASK,
            CodeRegion::Ram => RAM_MASK,
        }
    }

    /// Number of 32bit words in the region
    pub fn words(self) -> usize {
        match self {
            CodeRegion::Bios => BIOS_SIZE / 4,
            CodeRegion::Ram => RAM_SIZE / 4,
        }
    }

    /// Index of `pc`'s word in the region
    pub fn index(self, pc: u32) -> usize {
        ((mask_region(pc) & self.mask()) >> 2) as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            CodeRegion::Bios => "BIOS",
            CodeRegion::Ram => "RAM",
        }
    }
}
