//! Reference interpreter
//!
//! Decodes and executes one instruction per call. Dispatch goes through
//! two constant function pointer tables, one indexed by the primary
//! opcode and one by the SPECIAL subfunction.

use log::{trace, warn};

use super::cop0::Exception;
use super::instruction::Instruction;
use super::ops::{self, OpResult};
use super::Cpu;
use crate::psx::bus::Bus;

pub type Handler = fn(&mut Cpu, &mut dyn Bus, Instruction) -> OpResult;

impl Cpu {
    /// Run a single instruction and return the number of cycles it took
    pub fn step(&mut self, bus: &mut dyn Bus) -> u32 {
        self.enter_instruction();

        let pc = self.current_pc;
        let mut cycles = self.fetch_cycles(pc);

        if pc % 4 != 0 {
            // PC is misaligned, the fetch itself faults
            self.exception(Exception::LoadAddressError(pc));
            self.retire();
            return cycles + bus.drain_cycles();
        }

        let instruction = Instruction(bus.load_instruction(pc));

        self.advance_pc();

        if self.irq_pending(bus) {
            self.interrupt(bus, instruction);
        } else {
            trace!("0x{:08x}: {}", pc, instruction);

            if let Err(e) = self.execute(bus, instruction) {
                self.exception(e);
            }
        }

        self.retire();

        cycles += bus.drain_cycles();

        cycles
    }

    /// Dispatch `instruction` to its handler
    #[inline(always)]
    pub(super) fn execute(&mut self, bus: &mut dyn Bus, instruction: Instruction) -> OpResult {
        let handler = OPCODE_HANDLERS[instruction.function() as usize];

        handler(self, bus, instruction)
    }

    /// Take the interrupt instead of executing `instruction`.
    ///
    /// GTE commands are special: the hardware has already started
    /// executing them when the interrupt is taken so we run the command
    /// and make EPC point after it, otherwise it would run twice.
    fn interrupt(&mut self, bus: &mut dyn Bus, instruction: Instruction) {
        let gte_command = !self.delay_slot && instruction.is_gte_command();

        if gte_command {
            if let Err(e) = self.execute(bus, instruction) {
                // Coprocessor disabled, the fault wins over the IRQ
                self.exception(e);
                return;
            }
        }

        self.exception(Exception::Interrupt);

        if gte_command {
            self.cop0.epc = self.cop0.epc.wrapping_add(4);
        }
    }
}

const OPCODE_HANDLERS: [Handler; 64] = [
    // 0x00
    op_special,
    op_bxx,
    op_j,
    op_jal,
    op_beq,
    op_bne,
    op_blez,
    op_bgtz,
    op_addi,
    op_addiu,
    op_slti,
    op_sltiu,
    op_andi,
    op_ori,
    op_xori,
    op_lui,
    // 0x10
    op_cop0,
    op_cop1,
    op_cop2,
    op_cop3,
    op_illegal,
    op_illegal,
    op_illegal,
    op_illegal,
    op_illegal,
    op_illegal,
    op_illegal,
    op_illegal,
    op_illegal,
    op_illegal,
    op_illegal,
    op_illegal,
    // 0x20
    op_lb,
    op_lh,
    op_lwl,
    op_lw,
    op_lbu,
    op_lhu,
    op_lwr,
    op_illegal,
    op_sb,
    op_sh,
    op_swl,
    op_sw,
    op_illegal,
    op_illegal,
    op_swr,
    op_illegal,
    // 0x30
    op_lwc0,
    op_lwc1,
    op_lwc2,
    op_lwc3,
    op_illegal,
    op_illegal,
    op_illegal,
    op_illegal,
    op_swc0,
    op_swc1,
    op_swc2,
    op_swc3,
    op_illegal,
    op_illegal,
    op_illegal,
    op_illegal,
];

const SPECIAL_HANDLERS: [Handler; 64] = [
    // 0x00
    op_sll,
    op_illegal,
    op_srl,
    op_sra,
    op_sllv,
    op_illegal,
    op_srlv,
    op_srav,
    op_jr,
    op_jalr,
    op_illegal,
    op_illegal,
    op_syscall,
    op_break,
    op_illegal,
    op_illegal,
    // 0x10
    op_mfhi,
    op_mthi,
    op_mflo,
    op_mtlo,
    op_illegal,
    op_illegal,
    op_illegal,
    op_illegal,
    op_mult,
    op_multu,
    op_div,
    op_divu,
    op_illegal,
    op_illegal,
    op_illegal,
    op_illegal,
    // 0x20
    op_add,
    op_addu,
    op_sub,
    op_subu,
    op_and,
    op_or,
    op_xor,
    op_nor,
    op_illegal,
    op_illegal,
    op_slt,
    op_sltu,
    op_illegal,
    op_illegal,
    op_illegal,
    op_illegal,
    // 0x30
    op_illegal,
    op_illegal,
    op_illegal,
    op_illegal,
    op_illegal,
    op_illegal,
    op_illegal,
    op_illegal,
    op_illegal,
    op_illegal,
    op_illegal,
    op_illegal,
    op_illegal,
    op_illegal,
    op_illegal,
    op_illegal,
];

pub(super) fn op_illegal(cpu: &mut Cpu, _: &mut dyn Bus, instruction: Instruction) -> OpResult {
    warn!(
        "Illegal instruction {:08x} at PC 0x{:08x}",
        instruction.0, cpu.current_pc
    );

    Err(Exception::IllegalInstruction)
}

fn op_special(cpu: &mut Cpu, bus: &mut dyn Bus, instruction: Instruction) -> OpResult {
    let handler = SPECIAL_HANDLERS[instruction.subfunction() as usize];

    handler(cpu, bus, instruction)
}

fn op_sll(cpu: &mut Cpu, _: &mut dyn Bus, i: Instruction) -> OpResult {
    ops::sll(cpu, i.d(), i.t(), i.shift());
    Ok(())
}

fn op_srl(cpu: &mut Cpu, _: &mut dyn Bus, i: Instruction) -> OpResult {
    ops::srl(cpu, i.d(), i.t(), i.shift());
    Ok(())
}

fn op_sra(cpu: &mut Cpu, _: &mut dyn Bus, i: Instruction) -> OpResult {
    ops::sra(cpu, i.d(), i.t(), i.shift());
    Ok(())
}

fn op_sllv(cpu: &mut Cpu, _: &mut dyn Bus, i: Instruction) -> OpResult {
    ops::sllv(cpu, i.d(), i.t(), i.s());
    Ok(())
}

fn op_srlv(cpu: &mut Cpu, _: &mut dyn Bus, i: Instruction) -> OpResult {
    ops::srlv(cpu, i.d(), i.t(), i.s());
    Ok(())
}

fn op_srav(cpu: &mut Cpu, _: &mut dyn Bus, i: Instruction) -> OpResult {
    ops::srav(cpu, i.d(), i.t(), i.s());
    Ok(())
}

fn op_jr(cpu: &mut Cpu, _: &mut dyn Bus, i: Instruction) -> OpResult {
    ops::jr(cpu, i.s());
    Ok(())
}

fn op_jalr(cpu: &mut Cpu, _: &mut dyn Bus, i: Instruction) -> OpResult {
    let ra = cpu.next_pc;

    ops::jalr(cpu, i.d(), i.s(), ra);
    Ok(())
}

fn op_syscall(_: &mut Cpu, _: &mut dyn Bus, _: Instruction) -> OpResult {
    Err(Exception::SysCall)
}

fn op_break(_: &mut Cpu, _: &mut dyn Bus, _: Instruction) -> OpResult {
    Err(Exception::Break)
}

fn op_mfhi(cpu: &mut Cpu, _: &mut dyn Bus, i: Instruction) -> OpResult {
    ops::mfhi(cpu, i.d());
    Ok(())
}

fn op_mthi(cpu: &mut Cpu, _: &mut dyn Bus, i: Instruction) -> OpResult {
    ops::mthi(cpu, i.s());
    Ok(())
}

fn op_mflo(cpu: &mut Cpu, _: &mut dyn Bus, i: Instruction) -> OpResult {
    ops::mflo(cpu, i.d());
    Ok(())
}

fn op_mtlo(cpu: &mut Cpu, _: &mut dyn Bus, i: Instruction) -> OpResult {
    ops::mtlo(cpu, i.s());
    Ok(())
}

fn op_mult(cpu: &mut Cpu, _: &mut dyn Bus, i: Instruction) -> OpResult {
    ops::mult(cpu, i.s(), i.t());
    Ok(())
}

fn op_multu(cpu: &mut Cpu, _: &mut dyn Bus, i: Instruction) -> OpResult {
    ops::multu(cpu, i.s(), i.t());
    Ok(())
}

fn op_div(cpu: &mut Cpu, _: &mut dyn Bus, i: Instruction) -> OpResult {
    ops::div(cpu, i.s(), i.t());
    Ok(())
}

fn op_divu(cpu: &mut Cpu, _: &mut dyn Bus, i: Instruction) -> OpResult {
    ops::divu(cpu, i.s(), i.t());
    Ok(())
}

fn op_add(cpu: &mut Cpu, _: &mut dyn Bus, i: Instruction) -> OpResult {
    ops::add(cpu, i.d(), i.s(), i.t())
}

fn op_addu(cpu: &mut Cpu, _: &mut dyn Bus, i: Instruction) -> OpResult {
    ops::addu(cpu, i.d(), i.s(), i.t());
    Ok(())
}

fn op_sub(cpu: &mut Cpu, _: &mut dyn Bus, i: Instruction) -> OpResult {
    ops::sub(cpu, i.d(), i.s(), i.t())
}

fn op_subu(cpu: &mut Cpu, _: &mut dyn Bus, i: Instruction) -> OpResult {
    ops::subu(cpu, i.d(), i.s(), i.t());
    Ok(())
}

fn op_and(cpu: &mut Cpu, _: &mut dyn Bus, i: Instruction) -> OpResult {
    ops::and(cpu, i.d(), i.s(), i.t());
    Ok(())
}

fn op_or(cpu: &mut Cpu, _: &mut dyn Bus, i: Instruction) -> OpResult {
    ops::or(cpu, i.d(), i.s(), i.t());
    Ok(())
}

fn op_xor(cpu: &mut Cpu, _: &mut dyn Bus, i: Instruction) -> OpResult {
    ops::xor(cpu, i.d(), i.s(), i.t());
    Ok(())
}

fn op_nor(cpu: &mut Cpu, _: &mut dyn Bus, i: Instruction) -> OpResult {
    ops::nor(cpu, i.d(), i.s(), i.t());
    Ok(())
}

fn op_slt(cpu: &mut Cpu, _: &mut dyn Bus, i: Instruction) -> OpResult {
    ops::slt(cpu, i.d(), i.s(), i.t());
    Ok(())
}

fn op_sltu(cpu: &mut Cpu, _: &mut dyn Bus, i: Instruction) -> OpResult {
    ops::sltu(cpu, i.d(), i.s(), i.t());
    Ok(())
}

fn op_bxx(cpu: &mut Cpu, _: &mut dyn Bus, i: Instruction) -> OpResult {
    let target = cpu.pc.wrapping_add(i.imm_se() << 2);
    let ra = cpu.next_pc;

    ops::bxx(cpu, i.s(), i.t(), target, ra);
    Ok(())
}

fn op_j(cpu: &mut Cpu, _: &mut dyn Bus, i: Instruction) -> OpResult {
    let target = (cpu.pc & 0xf000_0000) | (i.imm_jump() << 2);

    ops::jump(cpu, target);
    Ok(())
}

fn op_jal(cpu: &mut Cpu, bus: &mut dyn Bus, i: Instruction) -> OpResult {
    let ra = cpu.next_pc;

    ops::link(cpu, 31, ra);
    op_j(cpu, bus, i)
}

fn op_beq(cpu: &mut Cpu, _: &mut dyn Bus, i: Instruction) -> OpResult {
    let target = cpu.pc.wrapping_add(i.imm_se() << 2);

    ops::beq(cpu, i.s(), i.t(), target);
    Ok(())
}

fn op_bne(cpu: &mut Cpu, _: &mut dyn Bus, i: Instruction) -> OpResult {
    let target = cpu.pc.wrapping_add(i.imm_se() << 2);

    ops::bne(cpu, i.s(), i.t(), target);
    Ok(())
}

fn op_blez(cpu: &mut Cpu, _: &mut dyn Bus, i: Instruction) -> OpResult {
    let target = cpu.pc.wrapping_add(i.imm_se() << 2);

    ops::blez(cpu, i.s(), target);
    Ok(())
}

fn op_bgtz(cpu: &mut Cpu, _: &mut dyn Bus, i: Instruction) -> OpResult {
    let target = cpu.pc.wrapping_add(i.imm_se() << 2);

    ops::bgtz(cpu, i.s(), target);
    Ok(())
}

fn op_addi(cpu: &mut Cpu, _: &mut dyn Bus, i: Instruction) -> OpResult {
    ops::addi(cpu, i.t(), i.s(), i.imm_se())
}

fn op_addiu(cpu: &mut Cpu, _: &mut dyn Bus, i: Instruction) -> OpResult {
    ops::addiu(cpu, i.t(), i.s(), i.imm_se());
    Ok(())
}

fn op_slti(cpu: &mut Cpu, _: &mut dyn Bus, i: Instruction) -> OpResult {
    ops::slti(cpu, i.t(), i.s(), i.imm_se());
    Ok(())
}

fn op_sltiu(cpu: &mut Cpu, _: &mut dyn Bus, i: Instruction) -> OpResult {
    ops::sltiu(cpu, i.t(), i.s(), i.imm_se());
    Ok(())
}

fn op_andi(cpu: &mut Cpu, _: &mut dyn Bus, i: Instruction) -> OpResult {
    ops::andi(cpu, i.t(), i.s(), i.imm());
    Ok(())
}

fn op_ori(cpu: &mut Cpu, _: &mut dyn Bus, i: Instruction) -> OpResult {
    ops::ori(cpu, i.t(), i.s(), i.imm());
    Ok(())
}

fn op_xori(cpu: &mut Cpu, _: &mut dyn Bus, i: Instruction) -> OpResult {
    ops::xori(cpu, i.t(), i.s(), i.imm());
    Ok(())
}

fn op_lui(cpu: &mut Cpu, _: &mut dyn Bus, i: Instruction) -> OpResult {
    // Low 16bits are set to 0
    ops::set_constant(cpu, i.t(), i.imm() << 16);
    Ok(())
}

fn op_cop0(cpu: &mut Cpu, bus: &mut dyn Bus, i: Instruction) -> OpResult {
    match i.cop_opcode() {
        0x00 => ops::mfc0(cpu, i.t(), i.d()),
        0x04 => ops::mtc0(cpu, i.t(), i.d()),
        0x10 if i.subfunction() == 0x10 => {
            ops::rfe(cpu);
            Ok(())
        }
        _ => op_illegal(cpu, bus, i),
    }
}

fn op_cop1(_: &mut Cpu, _: &mut dyn Bus, _: Instruction) -> OpResult {
    Err(Exception::CoprocessorError(1))
}

fn op_cop2(cpu: &mut Cpu, bus: &mut dyn Bus, i: Instruction) -> OpResult {
    let d = i.d() as u32;

    match i.cop_opcode() {
        0x00 => ops::mfc2(cpu, i.t(), d),
        0x02 => ops::mfc2(cpu, i.t(), d + 32),
        0x04 => ops::mtc2(cpu, i.t(), d),
        0x06 => ops::mtc2(cpu, i.t(), d + 32),
        n if n & 0x10 != 0 => ops::gte_command(cpu, i.0),
        _ => op_illegal(cpu, bus, i),
    }
}

fn op_cop3(_: &mut Cpu, _: &mut dyn Bus, _: Instruction) -> OpResult {
    Err(Exception::CoprocessorError(3))
}

fn op_lb(cpu: &mut Cpu, bus: &mut dyn Bus, i: Instruction) -> OpResult {
    ops::lb(cpu, bus, i.t(), i.s(), i.imm_se());
    Ok(())
}

fn op_lh(cpu: &mut Cpu, bus: &mut dyn Bus, i: Instruction) -> OpResult {
    ops::lh(cpu, bus, i.t(), i.s(), i.imm_se())
}

fn op_lwl(cpu: &mut Cpu, bus: &mut dyn Bus, i: Instruction) -> OpResult {
    ops::lwl(cpu, bus, i.t(), i.s(), i.imm_se());
    Ok(())
}

fn op_lw(cpu: &mut Cpu, bus: &mut dyn Bus, i: Instruction) -> OpResult {
    ops::lw(cpu, bus, i.t(), i.s(), i.imm_se())
}

fn op_lbu(cpu: &mut Cpu, bus: &mut dyn Bus, i: Instruction) -> OpResult {
    ops::lbu(cpu, bus, i.t(), i.s(), i.imm_se());
    Ok(())
}

fn op_lhu(cpu: &mut Cpu, bus: &mut dyn Bus, i: Instruction) -> OpResult {
    ops::lhu(cpu, bus, i.t(), i.s(), i.imm_se())
}

fn op_lwr(cpu: &mut Cpu, bus: &mut dyn Bus, i: Instruction) -> OpResult {
    ops::lwr(cpu, bus, i.t(), i.s(), i.imm_se());
    Ok(())
}

fn op_sb(cpu: &mut Cpu, bus: &mut dyn Bus, i: Instruction) -> OpResult {
    ops::sb(cpu, bus, i.t(), i.s(), i.imm_se());
    Ok(())
}

fn op_sh(cpu: &mut Cpu, bus: &mut dyn Bus, i: Instruction) -> OpResult {
    ops::sh(cpu, bus, i.t(), i.s(), i.imm_se())
}

fn op_swl(cpu: &mut Cpu, bus: &mut dyn Bus, i: Instruction) -> OpResult {
    ops::swl(cpu, bus, i.t(), i.s(), i.imm_se());
    Ok(())
}

fn op_sw(cpu: &mut Cpu, bus: &mut dyn Bus, i: Instruction) -> OpResult {
    ops::sw(cpu, bus, i.t(), i.s(), i.imm_se())
}

fn op_swr(cpu: &mut Cpu, bus: &mut dyn Bus, i: Instruction) -> OpResult {
    ops::swr(cpu, bus, i.t(), i.s(), i.imm_se());
    Ok(())
}

fn op_lwc0(_: &mut Cpu, _: &mut dyn Bus, _: Instruction) -> OpResult {
    Err(Exception::CoprocessorError(0))
}

fn op_lwc1(_: &mut Cpu, _: &mut dyn Bus, _: Instruction) -> OpResult {
    Err(Exception::CoprocessorError(1))
}

fn op_lwc2(cpu: &mut Cpu, bus: &mut dyn Bus, i: Instruction) -> OpResult {
    ops::lwc2(cpu, bus, i.t(), i.s(), i.imm_se())
}

fn op_lwc3(_: &mut Cpu, _: &mut dyn Bus, _: Instruction) -> OpResult {
    Err(Exception::CoprocessorError(3))
}

fn op_swc0(_: &mut Cpu, _: &mut dyn Bus, _: Instruction) -> OpResult {
    Err(Exception::CoprocessorError(0))
}

fn op_swc1(_: &mut Cpu, _: &mut dyn Bus, _: Instruction) -> OpResult {
    Err(Exception::CoprocessorError(1))
}

fn op_swc2(cpu: &mut Cpu, bus: &mut dyn Bus, i: Instruction) -> OpResult {
    ops::swc2(cpu, bus, i.t(), i.s(), i.imm_se())
}

fn op_swc3(_: &mut Cpu, _: &mut dyn Bus, _: Instruction) -> OpResult {
    Err(Exception::CoprocessorError(3))
}
