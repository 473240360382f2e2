//! Instruction semantics shared by the interpreter and the recompiler
//!
//! Operands are already decoded: the interpreter extracts them from the
//! instruction word on every execution, the recompiler once at block
//! build time. Register results go through the load delay pipeline,
//! never straight into `regs`.

use log::trace;

use super::cop0::{Exception, Status};
use super::Cpu;
use crate::psx::bus::Bus;

pub type OpResult = Result<(), Exception>;

/// SR bit enabling coprocessor 2
const SR_CU2: u32 = 1 << 30;

#[inline(always)]
fn write(cpu: &mut Cpu, reg: usize, val: u32) {
    cpu.load.write(reg, val);
}

#[inline(always)]
fn load_delayed(cpu: &mut Cpu, reg: usize, val: u32) {
    cpu.load.load(reg, val);
}

#[inline(always)]
fn address(cpu: &Cpu, base: usize, offset: u32) -> u32 {
    cpu.regs[base].wrapping_add(offset)
}

// ---------------------------------------------------------------------------
// ALU
// ---------------------------------------------------------------------------

/// Write a constant, used by the recompiler for LUI and immediate ops
/// whose source is $zero
#[inline(always)]
pub fn set_constant(cpu: &mut Cpu, t: usize, val: u32) {
    write(cpu, t, val);
}

pub fn sll(cpu: &mut Cpu, d: usize, t: usize, shift: u32) {
    let v = cpu.regs[t] << shift;
    write(cpu, d, v);
}

pub fn srl(cpu: &mut Cpu, d: usize, t: usize, shift: u32) {
    let v = cpu.regs[t] >> shift;
    write(cpu, d, v);
}

pub fn sra(cpu: &mut Cpu, d: usize, t: usize, shift: u32) {
    let v = (cpu.regs[t] as i32) >> shift;
    write(cpu, d, v as u32);
}

pub fn sllv(cpu: &mut Cpu, d: usize, t: usize, s: usize) {
    // Shift amount is truncated to 5 bits
    let v = cpu.regs[t] << (cpu.regs[s] & 0x1f);
    write(cpu, d, v);
}

pub fn srlv(cpu: &mut Cpu, d: usize, t: usize, s: usize) {
    let v = cpu.regs[t] >> (cpu.regs[s] & 0x1f);
    write(cpu, d, v);
}

pub fn srav(cpu: &mut Cpu, d: usize, t: usize, s: usize) {
    let v = (cpu.regs[t] as i32) >> (cpu.regs[s] & 0x1f);
    write(cpu, d, v as u32);
}

pub fn add(cpu: &mut Cpu, d: usize, s: usize, t: usize) -> OpResult {
    let s = cpu.regs[s] as i32;
    let t = cpu.regs[t] as i32;

    match s.checked_add(t) {
        Some(v) => {
            write(cpu, d, v as u32);
            Ok(())
        }
        None => Err(Exception::Overflow),
    }
}

pub fn addu(cpu: &mut Cpu, d: usize, s: usize, t: usize) {
    let v = cpu.regs[s].wrapping_add(cpu.regs[t]);
    write(cpu, d, v);
}

pub fn sub(cpu: &mut Cpu, d: usize, s: usize, t: usize) -> OpResult {
    let s = cpu.regs[s] as i32;
    let t = cpu.regs[t] as i32;

    match s.checked_sub(t) {
        Some(v) => {
            write(cpu, d, v as u32);
            Ok(())
        }
        None => Err(Exception::Overflow),
    }
}

pub fn subu(cpu: &mut Cpu, d: usize, s: usize, t: usize) {
    let v = cpu.regs[s].wrapping_sub(cpu.regs[t]);
    write(cpu, d, v);
}

pub fn and(cpu: &mut Cpu, d: usize, s: usize, t: usize) {
    let v = cpu.regs[s] & cpu.regs[t];
    write(cpu, d, v);
}

pub fn or(cpu: &mut Cpu, d: usize, s: usize, t: usize) {
    let v = cpu.regs[s] | cpu.regs[t];
    write(cpu, d, v);
}

pub fn xor(cpu: &mut Cpu, d: usize, s: usize, t: usize) {
    let v = cpu.regs[s] ^ cpu.regs[t];
    write(cpu, d, v);
}

pub fn nor(cpu: &mut Cpu, d: usize, s: usize, t: usize) {
    let v = !(cpu.regs[s] | cpu.regs[t]);
    write(cpu, d, v);
}

pub fn slt(cpu: &mut Cpu, d: usize, s: usize, t: usize) {
    let v = (cpu.regs[s] as i32) < (cpu.regs[t] as i32);
    write(cpu, d, v as u32);
}

pub fn sltu(cpu: &mut Cpu, d: usize, s: usize, t: usize) {
    let v = cpu.regs[s] < cpu.regs[t];
    write(cpu, d, v as u32);
}

/// `imm` is sign-extended
pub fn addi(cpu: &mut Cpu, t: usize, s: usize, imm: u32) -> OpResult {
    let s = cpu.regs[s] as i32;

    match s.checked_add(imm as i32) {
        Some(v) => {
            write(cpu, t, v as u32);
            Ok(())
        }
        None => Err(Exception::Overflow),
    }
}

pub fn addiu(cpu: &mut Cpu, t: usize, s: usize, imm: u32) {
    let v = cpu.regs[s].wrapping_add(imm);
    write(cpu, t, v);
}

pub fn slti(cpu: &mut Cpu, t: usize, s: usize, imm: u32) {
    let v = (cpu.regs[s] as i32) < (imm as i32);
    write(cpu, t, v as u32);
}

/// The immediate is sign-extended but the comparison is unsigned
pub fn sltiu(cpu: &mut Cpu, t: usize, s: usize, imm: u32) {
    let v = cpu.regs[s] < imm;
    write(cpu, t, v as u32);
}

pub fn andi(cpu: &mut Cpu, t: usize, s: usize, imm: u32) {
    let v = cpu.regs[s] & imm;
    write(cpu, t, v);
}

pub fn ori(cpu: &mut Cpu, t: usize, s: usize, imm: u32) {
    let v = cpu.regs[s] | imm;
    write(cpu, t, v);
}

pub fn xori(cpu: &mut Cpu, t: usize, s: usize, imm: u32) {
    let v = cpu.regs[s] ^ imm;
    write(cpu, t, v);
}

// ---------------------------------------------------------------------------
// Multiply and divide
// ---------------------------------------------------------------------------

pub fn mfhi(cpu: &mut Cpu, d: usize) {
    let hi = cpu.hi;
    write(cpu, d, hi);
}

pub fn mthi(cpu: &mut Cpu, s: usize) {
    cpu.hi = cpu.regs[s];
}

pub fn mflo(cpu: &mut Cpu, d: usize) {
    let lo = cpu.lo;
    write(cpu, d, lo);
}

pub fn mtlo(cpu: &mut Cpu, s: usize) {
    cpu.lo = cpu.regs[s];
}

pub fn mult(cpu: &mut Cpu, s: usize, t: usize) {
    let a = (cpu.regs[s] as i32) as i64;
    let b = (cpu.regs[t] as i32) as i64;

    let v = (a * b) as u64;

    cpu.hi = (v >> 32) as u32;
    cpu.lo = v as u32;
}

pub fn multu(cpu: &mut Cpu, s: usize, t: usize) {
    let a = cpu.regs[s] as u64;
    let b = cpu.regs[t] as u64;

    let v = a * b;

    cpu.hi = (v >> 32) as u32;
    cpu.lo = v as u32;
}

/// Signed division never traps, the hardware returns well defined
/// garbage for the corner cases
pub fn div(cpu: &mut Cpu, s: usize, t: usize) {
    let n = cpu.regs[s] as i32;
    let d = cpu.regs[t] as i32;

    if d == 0 {
        cpu.hi = n as u32;
        cpu.lo = if n >= 0 { 0xffff_ffff } else { 1 };
    } else if n as u32 == 0x8000_0000 && d == -1 {
        // Result is not representable in a 32bit signed integer
        cpu.hi = 0;
        cpu.lo = 0x8000_0000;
    } else {
        cpu.hi = (n % d) as u32;
        cpu.lo = (n / d) as u32;
    }
}

pub fn divu(cpu: &mut Cpu, s: usize, t: usize) {
    let n = cpu.regs[s];
    let d = cpu.regs[t];

    if d == 0 {
        cpu.hi = n;
        cpu.lo = 0xffff_ffff;
    } else {
        cpu.hi = n % d;
        cpu.lo = n / d;
    }
}

// ---------------------------------------------------------------------------
// Control flow
// ---------------------------------------------------------------------------

/// Unconditional jump to `target` after the delay slot
#[inline(always)]
pub fn jump(cpu: &mut Cpu, target: u32) {
    cpu.next_pc = target;
    cpu.branch = true;
}

/// Conditional branch. The following instruction is a delay slot
/// whether or not the branch is taken.
#[inline(always)]
pub fn branch_if(cpu: &mut Cpu, taken: bool, target: u32) {
    if taken {
        cpu.next_pc = target;
    }
    cpu.branch = true;
}

/// Store the return address in `reg`
#[inline(always)]
pub fn link(cpu: &mut Cpu, reg: usize, return_address: u32) {
    write(cpu, reg, return_address);
}

pub fn jr(cpu: &mut Cpu, s: usize) {
    let target = cpu.regs[s];
    jump(cpu, target);
}

pub fn jalr(cpu: &mut Cpu, d: usize, s: usize, return_address: u32) {
    // Read the target before the link in case d == s
    let target = cpu.regs[s];

    link(cpu, d, return_address);
    jump(cpu, target);
}

pub fn beq(cpu: &mut Cpu, s: usize, t: usize, target: u32) {
    let taken = cpu.regs[s] == cpu.regs[t];
    branch_if(cpu, taken, target);
}

pub fn bne(cpu: &mut Cpu, s: usize, t: usize, target: u32) {
    let taken = cpu.regs[s] != cpu.regs[t];
    branch_if(cpu, taken, target);
}

pub fn blez(cpu: &mut Cpu, s: usize, target: u32) {
    let taken = (cpu.regs[s] as i32) <= 0;
    branch_if(cpu, taken, target);
}

pub fn bgtz(cpu: &mut Cpu, s: usize, target: u32) {
    let taken = (cpu.regs[s] as i32) > 0;
    branch_if(cpu, taken, target);
}

/// BLTZ, BGEZ, BLTZAL and BGEZAL, all encoded in `rt`. Bit 0 selects
/// GEZ over LTZ, `rt & 0x1e == 0x10` links. Any other `rt` value is
/// decoded as one of the four, the way the hardware does it.
pub fn bxx(cpu: &mut Cpu, s: usize, rt: usize, target: u32, return_address: u32) {
    let is_bgez = (rt & 1) != 0;
    let is_link = (rt & 0x1e) == 0x10;

    let v = cpu.regs[s] as i32;
    let taken = (v < 0) != is_bgez;

    // The link happens whether or not the branch is taken
    if is_link {
        link(cpu, 31, return_address);
    }

    branch_if(cpu, taken, target);
}

// ---------------------------------------------------------------------------
// Memory
// ---------------------------------------------------------------------------

pub fn lb(cpu: &mut Cpu, bus: &mut dyn Bus, t: usize, s: usize, offset: u32) {
    let addr = address(cpu, s, offset);
    let v = bus.load_byte(addr) as i8;

    load_delayed(cpu, t, v as u32);
}

pub fn lbu(cpu: &mut Cpu, bus: &mut dyn Bus, t: usize, s: usize, offset: u32) {
    let addr = address(cpu, s, offset);
    let v = bus.load_byte(addr);

    load_delayed(cpu, t, v as u32);
}

pub fn lh(cpu: &mut Cpu, bus: &mut dyn Bus, t: usize, s: usize, offset: u32) -> OpResult {
    let addr = address(cpu, s, offset);

    if addr % 2 != 0 {
        return Err(Exception::LoadAddressError(addr));
    }

    let v = bus.load_half(addr) as i16;
    load_delayed(cpu, t, v as u32);

    Ok(())
}

pub fn lhu(cpu: &mut Cpu, bus: &mut dyn Bus, t: usize, s: usize, offset: u32) -> OpResult {
    let addr = address(cpu, s, offset);

    if addr % 2 != 0 {
        return Err(Exception::LoadAddressError(addr));
    }

    let v = bus.load_half(addr);
    load_delayed(cpu, t, v as u32);

    Ok(())
}

pub fn lw(cpu: &mut Cpu, bus: &mut dyn Bus, t: usize, s: usize, offset: u32) -> OpResult {
    let addr = address(cpu, s, offset);

    if addr % 4 != 0 {
        return Err(Exception::LoadAddressError(addr));
    }

    let v = bus.load_word(addr);
    load_delayed(cpu, t, v);

    Ok(())
}

/// Load word left: the most significant bytes of an unaligned word.
/// Merges with the value in flight for `t` if there's one.
pub fn lwl(cpu: &mut Cpu, bus: &mut dyn Bus, t: usize, s: usize, offset: u32) {
    let addr = address(cpu, s, offset);

    let cur = cpu.load.in_flight(&cpu.regs, t);

    let aligned_word = bus.load_word(addr & !3);

    let v = match addr & 3 {
        0 => (cur & 0x00ff_ffff) | (aligned_word << 24),
        1 => (cur & 0x0000_ffff) | (aligned_word << 16),
        2 => (cur & 0x0000_00ff) | (aligned_word << 8),
        _ => aligned_word,
    };

    load_delayed(cpu, t, v);
}

/// Load word right: the least significant bytes of an unaligned word
pub fn lwr(cpu: &mut Cpu, bus: &mut dyn Bus, t: usize, s: usize, offset: u32) {
    let addr = address(cpu, s, offset);

    let cur = cpu.load.in_flight(&cpu.regs, t);

    let aligned_word = bus.load_word(addr & !3);

    let v = match addr & 3 {
        0 => aligned_word,
        1 => (cur & 0xff00_0000) | (aligned_word >> 8),
        2 => (cur & 0xffff_0000) | (aligned_word >> 16),
        _ => (cur & 0xffff_ff00) | (aligned_word >> 24),
    };

    load_delayed(cpu, t, v);
}

/// True if stores must be dropped because the cache is isolated
#[inline(always)]
fn store_isolated(cpu: &Cpu, addr: u32) -> bool {
    if cpu.cop0.status().contains(Status::ISC) {
        trace!("Ignoring store to 0x{:08x} while the cache is isolated", addr);
        true
    } else {
        false
    }
}

pub fn sb(cpu: &mut Cpu, bus: &mut dyn Bus, t: usize, s: usize, offset: u32) {
    let addr = address(cpu, s, offset);

    if !store_isolated(cpu, addr) {
        bus.store_byte(addr, cpu.regs[t] as u8);
    }
}

pub fn sh(cpu: &mut Cpu, bus: &mut dyn Bus, t: usize, s: usize, offset: u32) -> OpResult {
    let addr = address(cpu, s, offset);

    if addr % 2 != 0 {
        return Err(Exception::StoreAddressError(addr));
    }

    if !store_isolated(cpu, addr) {
        bus.store_half(addr, cpu.regs[t] as u16);
    }

    Ok(())
}

pub fn sw(cpu: &mut Cpu, bus: &mut dyn Bus, t: usize, s: usize, offset: u32) -> OpResult {
    let addr = address(cpu, s, offset);

    if addr % 4 != 0 {
        return Err(Exception::StoreAddressError(addr));
    }

    if !store_isolated(cpu, addr) {
        bus.store_word(addr, cpu.regs[t]);
    }

    Ok(())
}

/// Store word left
pub fn swl(cpu: &mut Cpu, bus: &mut dyn Bus, t: usize, s: usize, offset: u32) {
    let addr = address(cpu, s, offset);

    if store_isolated(cpu, addr) {
        return;
    }

    let v = cpu.regs[t];
    let aligned_addr = addr & !3;
    let cur_mem = bus.load_word(aligned_addr);

    let mem = match addr & 3 {
        0 => (cur_mem & 0xffff_ff00) | (v >> 24),
        1 => (cur_mem & 0xffff_0000) | (v >> 16),
        2 => (cur_mem & 0xff00_0000) | (v >> 8),
        _ => v,
    };

    bus.store_word(aligned_addr, mem);
}

/// Store word right
pub fn swr(cpu: &mut Cpu, bus: &mut dyn Bus, t: usize, s: usize, offset: u32) {
    let addr = address(cpu, s, offset);

    if store_isolated(cpu, addr) {
        return;
    }

    let v = cpu.regs[t];
    let aligned_addr = addr & !3;
    let cur_mem = bus.load_word(aligned_addr);

    let mem = match addr & 3 {
        0 => v,
        1 => (cur_mem & 0x0000_00ff) | (v << 8),
        2 => (cur_mem & 0x0000_ffff) | (v << 16),
        _ => (cur_mem & 0x00ff_ffff) | (v << 24),
    };

    bus.store_word(aligned_addr, mem);
}

// ---------------------------------------------------------------------------
// Coprocessors
// ---------------------------------------------------------------------------

pub fn mfc0(cpu: &mut Cpu, t: usize, d: usize) -> OpResult {
    match cpu.cop0.mfc0(d) {
        Some(v) => {
            load_delayed(cpu, t, v);
            Ok(())
        }
        None => Err(Exception::IllegalInstruction),
    }
}

pub fn mtc0(cpu: &mut Cpu, t: usize, d: usize) -> OpResult {
    let v = cpu.regs[t];

    if cpu.cop0.mtc0(d, v) {
        Ok(())
    } else {
        Err(Exception::IllegalInstruction)
    }
}

pub fn rfe(cpu: &mut Cpu) {
    cpu.cop0.return_from_exception();
}

#[inline(always)]
fn check_cop2(cpu: &Cpu) -> OpResult {
    if cpu.cop0.sr & SR_CU2 == 0 {
        Err(Exception::CoprocessorError(2))
    } else {
        Ok(())
    }
}

/// MFC2 and CFC2, `reg` already includes the +32 for control registers
pub fn mfc2(cpu: &mut Cpu, t: usize, reg: u32) -> OpResult {
    check_cop2(cpu)?;

    let v = cpu.gte.read(reg);
    load_delayed(cpu, t, v);

    Ok(())
}

/// MTC2 and CTC2
pub fn mtc2(cpu: &mut Cpu, t: usize, reg: u32) -> OpResult {
    check_cop2(cpu)?;

    let v = cpu.regs[t];
    cpu.gte.write(reg, v);

    Ok(())
}

pub fn gte_command(cpu: &mut Cpu, command: u32) -> OpResult {
    check_cop2(cpu)?;

    cpu.gte.execute(command & 0x1ff_ffff);

    Ok(())
}

pub fn lwc2(cpu: &mut Cpu, bus: &mut dyn Bus, t: usize, s: usize, offset: u32) -> OpResult {
    check_cop2(cpu)?;

    let addr = address(cpu, s, offset);

    if addr % 4 != 0 {
        return Err(Exception::LoadAddressError(addr));
    }

    let v = bus.load_word(addr);
    cpu.gte.write(t as u32, v);

    Ok(())
}

pub fn swc2(cpu: &mut Cpu, bus: &mut dyn Bus, t: usize, s: usize, offset: u32) -> OpResult {
    check_cop2(cpu)?;

    let addr = address(cpu, s, offset);

    if addr % 4 != 0 {
        return Err(Exception::StoreAddressError(addr));
    }

    let v = cpu.gte.read(t as u32);

    if !store_isolated(cpu, addr) {
        bus.store_word(addr, v);
    }

    Ok(())
}
