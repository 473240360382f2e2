//! Translation of guest instructions into pre-decoded host ops
//!
//! Everything that can be computed from the instruction word and its
//! address is resolved here, once per block build. Instructions without
//! a dedicated op run through the interpreter's dispatch.

use super::block::{Op, OpArgs, OpFn};
use crate::psx::bus::Bus;
use crate::psx::cpu::cop0::Exception;
use crate::psx::cpu::instruction::Instruction;
use crate::psx::cpu::ops::{self, OpResult};
use crate::psx::cpu::Cpu;

/// Translate the instruction `word` located at `pc`. Returns `None` for
/// NOPs, which don't need any host code.
pub fn emit(word: Instruction, pc: u32) -> Option<Op> {
    if word.is_nop() {
        return None;
    }

    let mut args = OpArgs {
        s: word.s(),
        t: word.t(),
        d: word.d(),
        imm: word.imm_se(),
        target: 0,
        link: pc.wrapping_add(8),
        word,
    };

    let run: OpFn = match word.function() {
        0x00 => match word.subfunction() {
            0x00 => {
                args.imm = word.shift();
                op_sll
            }
            0x02 => {
                args.imm = word.shift();
                op_srl
            }
            0x03 => {
                args.imm = word.shift();
                op_sra
            }
            0x04 => op_sllv,
            0x06 => op_srlv,
            0x07 => op_srav,
            0x08 => op_jr,
            0x09 => op_jalr,
            0x0c => op_syscall,
            0x0d => op_break,
            0x20 => op_add,
            0x21 => op_addu,
            0x22 => op_sub,
            0x23 => op_subu,
            0x24 => op_and,
            0x25 => op_or,
            0x26 => op_xor,
            0x27 => op_nor,
            0x2a => op_slt,
            0x2b => op_sltu,
            // HI/LO moves, multiply and divide, illegal encodings
            _ => op_interpreted,
        },
        0x01 => {
            args.target = word.branch_target(pc);
            op_bxx
        }
        0x02 => {
            args.target = word.jump_target(pc);
            op_j
        }
        0x03 => {
            args.target = word.jump_target(pc);
            op_jal
        }
        0x04..=0x07 => {
            args.target = word.branch_target(pc);
            match word.function() {
                0x04 => op_beq,
                0x05 => op_bne,
                0x06 => op_blez,
                _ => op_bgtz,
            }
        }
        // Immediate ops with $zero as source just load a constant. ADDI
        // can't overflow in that case.
        0x08 | 0x09 if args.s == 0 => op_constant,
        0x08 => op_addi,
        0x09 => op_addiu,
        0x0a => op_slti,
        0x0b => op_sltiu,
        0x0c..=0x0e => {
            args.imm = word.imm();
            match (word.function(), args.s) {
                (0x0c, 0) => {
                    args.imm = 0;
                    op_constant
                }
                (0x0d, 0) | (0x0e, 0) => op_constant,
                (0x0c, _) => op_andi,
                (0x0d, _) => op_ori,
                _ => op_xori,
            }
        }
        0x0f => {
            args.imm = word.imm() << 16;
            op_constant
        }
        0x20 => op_lb,
        0x21 => op_lh,
        0x22 => op_lwl,
        0x23 => op_lw,
        0x24 => op_lbu,
        0x25 => op_lhu,
        0x26 => op_lwr,
        0x28 => op_sb,
        0x29 => op_sh,
        0x2a => op_swl,
        0x2b => op_sw,
        0x2e => op_swr,
        // Coprocessors and illegal opcodes
        _ => op_interpreted,
    };

    Some(Op {
        run,
        args,
        nops_before: 0,
    })
}

/// Run the instruction through the interpreter's dispatch tables
fn op_interpreted(cpu: &mut Cpu, bus: &mut dyn Bus, a: &OpArgs) -> OpResult {
    cpu.execute(bus, a.word)
}

fn op_constant(cpu: &mut Cpu, _: &mut dyn Bus, a: &OpArgs) -> OpResult {
    ops::set_constant(cpu, a.t, a.imm);
    Ok(())
}

fn op_sll(cpu: &mut Cpu, _: &mut dyn Bus, a: &OpArgs) -> OpResult {
    ops::sll(cpu, a.d, a.t, a.imm);
    Ok(())
}

fn op_srl(cpu: &mut Cpu, _: &mut dyn Bus, a: &OpArgs) -> OpResult {
    ops::srl(cpu, a.d, a.t, a.imm);
    Ok(())
}

fn op_sra(cpu: &mut Cpu, _: &mut dyn Bus, a: &OpArgs) -> OpResult {
    ops::sra(cpu, a.d, a.t, a.imm);
    Ok(())
}

fn op_sllv(cpu: &mut Cpu, _: &mut dyn Bus, a: &OpArgs) -> OpResult {
    ops::sllv(cpu, a.d, a.t, a.s);
    Ok(())
}

fn op_srlv(cpu: &mut Cpu, _: &mut dyn Bus, a: &OpArgs) -> OpResult {
    ops::srlv(cpu, a.d, a.t, a.s);
    Ok(())
}

fn op_srav(cpu: &mut Cpu, _: &mut dyn Bus, a: &OpArgs) -> OpResult {
    ops::srav(cpu, a.d, a.t, a.s);
    Ok(())
}

fn op_jr(cpu: &mut Cpu, _: &mut dyn Bus, a: &OpArgs) -> OpResult {
    ops::jr(cpu, a.s);
    Ok(())
}

fn op_jalr(cpu: &mut Cpu, _: &mut dyn Bus, a: &OpArgs) -> OpResult {
    ops::jalr(cpu, a.d, a.s, a.link);
    Ok(())
}

fn op_syscall(_: &mut Cpu, _: &mut dyn Bus, _: &OpArgs) -> OpResult {
    Err(Exception::SysCall)
}

fn op_break(_: &mut Cpu, _: &mut dyn Bus, _: &OpArgs) -> OpResult {
    Err(Exception::Break)
}

fn op_add(cpu: &mut Cpu, _: &mut dyn Bus, a: &OpArgs) -> OpResult {
    ops::add(cpu, a.d, a.s, a.t)
}

fn op_addu(cpu: &mut Cpu, _: &mut dyn Bus, a: &OpArgs) -> OpResult {
    ops::addu(cpu, a.d, a.s, a.t);
    Ok(())
}

fn op_sub(cpu: &mut Cpu, _: &mut dyn Bus, a: &OpArgs) -> OpResult {
    ops::sub(cpu, a.d, a.s, a.t)
}

fn op_subu(cpu: &mut Cpu, _: &mut dyn Bus, a: &OpArgs) -> OpResult {
    ops::subu(cpu, a.d, a.s, a.t);
    Ok(())
}

fn op_and(cpu: &mut Cpu, _: &mut dyn Bus, a: &OpArgs) -> OpResult {
    ops::and(cpu, a.d, a.s, a.t);
    Ok(())
}

fn op_or(cpu: &mut Cpu, _: &mut dyn Bus, a: &OpArgs) -> OpResult {
    ops::or(cpu, a.d, a.s, a.t);
    Ok(())
}

fn op_xor(cpu: &mut Cpu, _: &mut dyn Bus, a: &OpArgs) -> OpResult {
    ops::xor(cpu, a.d, a.s, a.t);
    Ok(())
}

fn op_nor(cpu: &mut Cpu, _: &mut dyn Bus, a: &OpArgs) -> OpResult {
    ops::nor(cpu, a.d, a.s, a.t);
    Ok(())
}

fn op_slt(cpu: &mut Cpu, _: &mut dyn Bus, a: &OpArgs) -> OpResult {
    ops::slt(cpu, a.d, a.s, a.t);
    Ok(())
}

fn op_sltu(cpu: &mut Cpu, _: &mut dyn Bus, a: &OpArgs) -> OpResult {
    ops::sltu(cpu, a.d, a.s, a.t);
    Ok(())
}

fn op_bxx(cpu: &mut Cpu, _: &mut dyn Bus, a: &OpArgs) -> OpResult {
    ops::bxx(cpu, a.s, a.t, a.target, a.link);
    Ok(())
}

fn op_j(cpu: &mut Cpu, _: &mut dyn Bus, a: &OpArgs) -> OpResult {
    ops::jump(cpu, a.target);
    Ok(())
}

fn op_jal(cpu: &mut Cpu, _: &mut dyn Bus, a: &OpArgs) -> OpResult {
    ops::link(cpu, 31, a.link);
    ops::jump(cpu, a.target);
    Ok(())
}

fn op_beq(cpu: &mut Cpu, _: &mut dyn Bus, a: &OpArgs) -> OpResult {
    ops::beq(cpu, a.s, a.t, a.target);
    Ok(())
}

fn op_bne(cpu: &mut Cpu, _: &mut dyn Bus, a: &OpArgs) -> OpResult {
    ops::bne(cpu, a.s, a.t, a.target);
    Ok(())
}

fn op_blez(cpu: &mut Cpu, _: &mut dyn Bus, a: &OpArgs) -> OpResult {
    ops::blez(cpu, a.s, a.target);
    Ok(())
}

fn op_bgtz(cpu: &mut Cpu, _: &mut dyn Bus, a: &OpArgs) -> OpResult {
    ops::bgtz(cpu, a.s, a.target);
    Ok(())
}

fn op_addi(cpu: &mut Cpu, _: &mut dyn Bus, a: &OpArgs) -> OpResult {
    ops::addi(cpu, a.t, a.s, a.imm)
}

fn op_addiu(cpu: &mut Cpu, _: &mut dyn Bus, a: &OpArgs) -> OpResult {
    ops::addiu(cpu, a.t, a.s, a.imm);
    Ok(())
}

fn op_slti(cpu: &mut Cpu, _: &mut dyn Bus, a: &OpArgs) -> OpResult {
    ops::slti(cpu, a.t, a.s, a.imm);
    Ok(())
}

fn op_sltiu(cpu: &mut Cpu, _: &mut dyn Bus, a: &OpArgs) -> OpResult {
    ops::sltiu(cpu, a.t, a.s, a.imm);
    Ok(())
}

fn op_andi(cpu: &mut Cpu, _: &mut dyn Bus, a: &OpArgs) -> OpResult {
    ops::andi(cpu, a.t, a.s, a.imm);
    Ok(())
}

fn op_ori(cpu: &mut Cpu, _: &mut dyn Bus, a: &OpArgs) -> OpResult {
    ops::ori(cpu, a.t, a.s, a.imm);
    Ok(())
}

fn op_xori(cpu: &mut Cpu, _: &mut dyn Bus, a: &OpArgs) -> OpResult {
    ops::xori(cpu, a.t, a.s, a.imm);
    Ok(())
}

fn op_lb(cpu: &mut Cpu, bus: &mut dyn Bus, a: &OpArgs) -> OpResult {
    ops::lb(cpu, bus, a.t, a.s, a.imm);
    Ok(())
}

fn op_lh(cpu: &mut Cpu, bus: &mut dyn Bus, a: &OpArgs) -> OpResult {
    ops::lh(cpu, bus, a.t, a.s, a.imm)
}

fn op_lwl(cpu: &mut Cpu, bus: &mut dyn Bus, a: &OpArgs) -> OpResult {
    ops::lwl(cpu, bus, a.t, a.s, a.imm);
    Ok(())
}

fn op_lw(cpu: &mut Cpu, bus: &mut dyn Bus, a: &OpArgs) -> OpResult {
    ops::lw(cpu, bus, a.t, a.s, a.imm)
}

fn op_lbu(cpu: &mut Cpu, bus: &mut dyn Bus, a: &OpArgs) -> OpResult {
    ops::lbu(cpu, bus, a.t, a.s, a.imm);
    Ok(())
}

fn op_lhu(cpu: &mut Cpu, bus: &mut dyn Bus, a: &OpArgs) -> OpResult {
    ops::lhu(cpu, bus, a.t, a.s, a.imm)
}

fn op_lwr(cpu: &mut Cpu, bus: &mut dyn Bus, a: &OpArgs) -> OpResult {
    ops::lwr(cpu, bus, a.t, a.s, a.imm);
    Ok(())
}

fn op_sb(cpu: &mut Cpu, bus: &mut dyn Bus, a: &OpArgs) -> OpResult {
    ops::sb(cpu, bus, a.t, a.s, a.imm);
    Ok(())
}

fn op_sh(cpu: &mut Cpu, bus: &mut dyn Bus, a: &OpArgs) -> OpResult {
    ops::sh(cpu, bus, a.t, a.s, a.imm)
}

fn op_swl(cpu: &mut Cpu, bus: &mut dyn Bus, a: &OpArgs) -> OpResult {
    ops::swl(cpu, bus, a.t, a.s, a.imm);
    Ok(())
}

fn op_sw(cpu: &mut Cpu, bus: &mut dyn Bus, a: &OpArgs) -> OpResult {
    ops::sw(cpu, bus, a.t, a.s, a.imm)
}

fn op_swr(cpu: &mut Cpu, bus: &mut dyn Bus, a: &OpArgs) -> OpResult {
    ops::swr(cpu, bus, a.t, a.s, a.imm);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emitted(word: u32, pc: u32) -> Op {
        match emit(Instruction(word), pc) {
            Some(op) => op,
            None => panic!("{:08x} wasn't emitted", word),
        }
    }

    #[test]
    fn test_nop_not_emitted() {
        assert!(emit(Instruction(0), 0x8000_0000).is_none());

        // sll $t0, $t0, 0 isn't the canonical NOP, it's emitted
        assert!(emit(Instruction(0x0008_4000), 0x8000_0000).is_some());
    }

    #[test]
    fn test_constants_resolved() {
        // lui $t0, 0x1f80
        let op = emitted(0x3c08_1f80, 0x8000_0000);
        assert_eq!(op.run as usize, op_constant as OpFn as usize);
        assert_eq!(op.args.imm, 0x1f80_0000);

        // addiu $t0, $zero, -1
        let op = emitted(0x2408_ffff, 0x8000_0000);
        assert_eq!(op.run as usize, op_constant as OpFn as usize);
        assert_eq!(op.args.imm, 0xffff_ffff);

        // ori $t0, $zero, 0xffff is zero extended
        let op = emitted(0x3408_ffff, 0x8000_0000);
        assert_eq!(op.args.imm, 0x0000_ffff);

        // andi $t0, $zero, 0xffff is always 0
        let op = emitted(0x3008_ffff, 0x8000_0000);
        assert_eq!(op.args.imm, 0);
    }

    #[test]
    fn test_targets_resolved() {
        // bne $t0, $zero, -2 at 0x80010010
        let op = emitted(0x1500_fffe, 0x8001_0010);
        assert_eq!(op.args.target, 0x8001_000c);

        // jal 0x00020000 at 0xbfc00100
        let op = emitted(0x0c00_8000, 0xbfc0_0100);
        assert_eq!(op.args.target, 0xb002_0000);
        assert_eq!(op.args.link, 0xbfc0_0108);
    }

    #[test]
    fn test_fallback() {
        // mult $t0, $t1
        let op = emitted(0x0109_0018, 0);
        assert_eq!(op.run as usize, op_interpreted as OpFn as usize);

        // mtc0 $t0, $sr
        let op = emitted(0x4088_6000, 0);
        assert_eq!(op.run as usize, op_interpreted as OpFn as usize);
    }
}
