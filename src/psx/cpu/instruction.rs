//! Instruction bitfield view and disassembler

use std::fmt;

/// A raw 32bit MIPS instruction. Every accessor is a pure bitfield
/// extraction, any pattern decodes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Instruction(pub u32);

impl Instruction {
    /// Primary opcode, bits [31:26]
    #[inline(always)]
    pub fn function(self) -> u32 {
        self.0 >> 26
    }

    /// Secondary opcode for the SPECIAL (0x00) group, bits [5:0]
    #[inline(always)]
    pub fn subfunction(self) -> u32 {
        self.0 & 0x3f
    }

    /// Source register, bits [25:21]
    #[inline(always)]
    pub fn s(self) -> usize {
        ((self.0 >> 21) & 0x1f) as usize
    }

    /// Target register, bits [20:16]
    #[inline(always)]
    pub fn t(self) -> usize {
        ((self.0 >> 16) & 0x1f) as usize
    }

    /// Destination register, bits [15:11]
    #[inline(always)]
    pub fn d(self) -> usize {
        ((self.0 >> 11) & 0x1f) as usize
    }

    /// Immediate value, bits [15:0]
    #[inline(always)]
    pub fn imm(self) -> u32 {
        self.0 & 0xffff
    }

    /// Immediate value sign-extended to 32 bits
    #[inline(always)]
    pub fn imm_se(self) -> u32 {
        (self.0 & 0xffff) as i16 as u32
    }

    /// Shift amount, bits [10:6]
    #[inline(always)]
    pub fn shift(self) -> u32 {
        (self.0 >> 6) & 0x1f
    }

    /// Jump target, bits [25:0]
    #[inline(always)]
    pub fn imm_jump(self) -> u32 {
        self.0 & 0x3ff_ffff
    }

    /// Coprocessor sub-opcode, bits [25:21]
    #[inline(always)]
    pub fn cop_opcode(self) -> u32 {
        (self.0 >> 21) & 0x1f
    }

    pub fn is_nop(self) -> bool {
        self.0 == 0
    }

    /// True for GTE commands (COP2 with bit 25 set)
    pub fn is_gte_command(self) -> bool {
        self.0 & 0xfe00_0000 == 0x4a00_0000
    }

    /// True if the instruction redirects control flow and is therefore
    /// followed by a delay slot
    pub fn is_control_transfer(self) -> bool {
        match self.function() {
            0x00 => matches!(self.subfunction(), 0x08 | 0x09),
            0x01..=0x07 => true,
            _ => false,
        }
    }

    /// True for SYSCALL and BREAK
    pub fn is_trap(self) -> bool {
        self.function() == 0x00 && matches!(self.subfunction(), 0x0c | 0x0d)
    }

    /// Branch target of a relative branch located at `pc`
    pub fn branch_target(self, pc: u32) -> u32 {
        pc.wrapping_add(4).wrapping_add(self.imm_se() << 2)
    }

    /// Target of a J/JAL located at `pc`, the top 4 bits come from the
    /// delay slot address
    pub fn jump_target(self, pc: u32) -> u32 {
        (pc.wrapping_add(4) & 0xf000_0000) | (self.imm_jump() << 2)
    }
}

impl fmt::Debug for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:08x} ({})", self.0, self)
    }
}

pub const REGISTER_NAMES: [&str; 32] = [
    "r0", "at", "v0", "v1", "a0", "a1", "a2", "a3", "t0", "t1", "t2", "t3", "t4", "t5", "t6", "t7",
    "s0", "s1", "s2", "s3", "s4", "s5", "s6", "s7", "t8", "t9", "k0", "k1", "gp", "sp", "fp", "ra",
];

fn reg(index: usize) -> &'static str {
    REGISTER_NAMES[index]
}

impl fmt::Display for Instruction {
    /// Disassemble the instruction. Branch offsets are displayed
    /// relative since the address isn't known here.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let i = *self;
        let (s, t, d) = (reg(i.s()), reg(i.t()), reg(i.d()));
        let simm = i.imm_se() as i32;
        let offset = simm << 2;

        match i.function() {
            0x00 => {
                let op = match i.subfunction() {
                    0x00 if i.0 == 0 => return write!(f, "nop"),
                    0x00 => return write!(f, "sll ${}, ${}, {}", d, t, i.shift()),
                    0x02 => return write!(f, "srl ${}, ${}, {}", d, t, i.shift()),
                    0x03 => return write!(f, "sra ${}, ${}, {}", d, t, i.shift()),
                    0x04 => return write!(f, "sllv ${}, ${}, ${}", d, t, s),
                    0x06 => return write!(f, "srlv ${}, ${}, ${}", d, t, s),
                    0x07 => return write!(f, "srav ${}, ${}, ${}", d, t, s),
                    0x08 => return write!(f, "jr ${}", s),
                    0x09 => return write!(f, "jalr ${}, ${}", d, s),
                    0x0c => return write!(f, "syscall"),
                    0x0d => return write!(f, "break"),
                    0x10 => return write!(f, "mfhi ${}", d),
                    0x11 => return write!(f, "mthi ${}", s),
                    0x12 => return write!(f, "mflo ${}", d),
                    0x13 => return write!(f, "mtlo ${}", s),
                    0x18 => return write!(f, "mult ${}, ${}", s, t),
                    0x19 => return write!(f, "multu ${}, ${}", s, t),
                    0x1a => return write!(f, "div ${}, ${}", s, t),
                    0x1b => return write!(f, "divu ${}, ${}", s, t),
                    0x20 => "add",
                    0x21 => "addu",
                    0x22 => "sub",
                    0x23 => "subu",
                    0x24 => "and",
                    0x25 => "or",
                    0x26 => "xor",
                    0x27 => "nor",
                    0x2a => "slt",
                    0x2b => "sltu",
                    _ => return write!(f, "illegal 0x{:08x}", i.0),
                };

                write!(f, "{} ${}, ${}, ${}", op, d, s, t)
            }
            0x01 => {
                let op = match (i.t() & 1 != 0, i.t() & 0x1e == 0x10) {
                    (false, false) => "bltz",
                    (true, false) => "bgez",
                    (false, true) => "bltzal",
                    (true, true) => "bgezal",
                };

                write!(f, "{} ${}, {}", op, s, offset)
            }
            0x02 => write!(f, "j 0x{:07x}", i.imm_jump() << 2),
            0x03 => write!(f, "jal 0x{:07x}", i.imm_jump() << 2),
            0x04 => write!(f, "beq ${}, ${}, {}", s, t, offset),
            0x05 => write!(f, "bne ${}, ${}, {}", s, t, offset),
            0x06 => write!(f, "blez ${}, {}", s, offset),
            0x07 => write!(f, "bgtz ${}, {}", s, offset),
            0x08 => write!(f, "addi ${}, ${}, {}", t, s, simm),
            0x09 => write!(f, "addiu ${}, ${}, {}", t, s, simm),
            0x0a => write!(f, "slti ${}, ${}, {}", t, s, simm),
            0x0b => write!(f, "sltiu ${}, ${}, {}", t, s, simm),
            0x0c => write!(f, "andi ${}, ${}, 0x{:04x}", t, s, i.imm()),
            0x0d => write!(f, "ori ${}, ${}, 0x{:04x}", t, s, i.imm()),
            0x0e => write!(f, "xori ${}, ${}, 0x{:04x}", t, s, i.imm()),
            0x0f => write!(f, "lui ${}, 0x{:04x}", t, i.imm()),
            0x10 => match i.cop_opcode() {
                0x00 => write!(f, "mfc0 ${}, $cop0r{}", t, i.d()),
                0x04 => write!(f, "mtc0 ${}, $cop0r{}", t, i.d()),
                0x10 if i.subfunction() == 0x10 => write!(f, "rfe"),
                _ => write!(f, "illegal 0x{:08x}", i.0),
            },
            0x12 => match i.cop_opcode() {
                0x00 => write!(f, "mfc2 ${}, $cop2r{}", t, i.d()),
                0x02 => write!(f, "cfc2 ${}, $cop2r{}", t, i.d() + 32),
                0x04 => write!(f, "mtc2 ${}, $cop2r{}", t, i.d()),
                0x06 => write!(f, "ctc2 ${}, $cop2r{}", t, i.d() + 32),
                n if n & 0x10 != 0 => write!(f, "gte 0x{:07x}", i.0 & 0x1ff_ffff),
                _ => write!(f, "illegal 0x{:08x}", i.0),
            },
            0x11 | 0x13 => write!(f, "cop{} 0x{:07x}", i.function() & 3, i.0 & 0x3ff_ffff),
            0x20..=0x26 | 0x28..=0x2b | 0x2e => {
                let op = match i.function() {
                    0x20 => "lb",
                    0x21 => "lh",
                    0x22 => "lwl",
                    0x23 => "lw",
                    0x24 => "lbu",
                    0x25 => "lhu",
                    0x26 => "lwr",
                    0x28 => "sb",
                    0x29 => "sh",
                    0x2a => "swl",
                    0x2b => "sw",
                    _ => "swr",
                };

                write!(f, "{} ${}, {}(${})", op, t, simm, s)
            }
            0x30..=0x33 => write!(f, "lwc{} $cop{}r{}, {}(${})", i.function() & 3, i.function() & 3, i.t(), simm, s),
            0x38..=0x3b => write!(f, "swc{} $cop{}r{}, {}(${})", i.function() & 3, i.function() & 3, i.t(), simm, s),
            _ => write!(f, "illegal 0x{:08x}", i.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields() {
        // addiu $sp, $sp, -24
        let i = Instruction(0x27bd_ffe8);

        assert_eq!(i.function(), 0x09);
        assert_eq!(i.s(), 29);
        assert_eq!(i.t(), 29);
        assert_eq!(i.imm(), 0xffe8);
        assert_eq!(i.imm_se(), 0xffff_ffe8);

        // sll $t0, $t1, 4
        let i = Instruction(0x0009_4100);
        assert_eq!(i.function(), 0);
        assert_eq!(i.subfunction(), 0);
        assert_eq!(i.d(), 8);
        assert_eq!(i.t(), 9);
        assert_eq!(i.shift(), 4);
    }

    #[test]
    fn test_targets() {
        // j 0x0123450
        let i = Instruction((0x02 << 26) | (0x0123450 >> 2));
        assert_eq!(i.jump_target(0xbfc0_0100), 0xb012_3450);

        // beq $zero, $zero, -1
        let b = Instruction(0x1000_ffff);
        assert_eq!(b.branch_target(0x8001_0000), 0x8001_0000);
        assert!(b.is_control_transfer());
        assert!(!i.is_trap());
    }

    #[test]
    fn test_classification() {
        assert!(Instruction(0).is_nop());
        assert!(Instruction(0x0000_000c).is_trap());
        assert!(Instruction(0x0000_000d).is_trap());
        assert!(Instruction(0x03e0_0008).is_control_transfer());
        assert!(Instruction(0x4a18_0001).is_gte_command());
        assert!(!Instruction(0x4800_0000).is_gte_command());
    }

    #[test]
    fn test_disassembly() {
        assert_eq!(Instruction(0).to_string(), "nop");
        assert_eq!(Instruction(0x27bd_ffe8).to_string(), "addiu $sp, $sp, -24");
        assert_eq!(Instruction(0x3c08_1f80).to_string(), "lui $t0, 0x1f80");
        assert_eq!(Instruction(0x8fbf_0010).to_string(), "lw $ra, 16($sp)");
        assert_eq!(Instruction(0x03e0_0008).to_string(), "jr $ra");
        assert_eq!(Instruction(0x4200_0010).to_string(), "rfe");
        assert_eq!(Instruction(0xffff_ffff).to_string(), "illegal 0xffffffff");
    }
}
