// Block recompiler: caching, invalidation and interpreter fallbacks

use super::asm::*;
use super::{Machine, BASE, DATA};
use crate::config::{Engine, TimingConfig};
use crate::psx::bios::Bios;
use crate::psx::irq::Interrupt;
use crate::psx::memory_map::{CodeRegion, BIOS_SIZE};

fn machine(program: &[u32]) -> Machine {
    let mut m = Machine::new(Engine::Recompiler);
    m.load(BASE, program);
    m
}

#[test]
fn test_block_runs_to_end_of_delay_slot() {
    let mut m = machine(&[
        addiu(T0, ZERO, 1),
        addiu(T1, T0, 1),
        j(BASE),
        addiu(T2, T1, 1),
        addiu(T3, ZERO, 1),
    ]);

    m.run_next();

    assert_eq!(m.reg(T0), 1);
    assert_eq!(m.reg(T1), 2);
    assert_eq!(m.reg(T2), 3);
    assert_eq!(m.reg(T3), 0);
    assert_eq!(m.cpu.pc(), BASE);
    assert_eq!(m.cpu.stats().blocks_compiled, 1);
    assert_eq!(m.cpu.cached_blocks(CodeRegion::Ram), 1);
}

#[test]
fn test_modified_code_is_recompiled() {
    let mut m = machine(&[addiu(T0, T0, 1), j(BASE), nop()]);

    m.run_next();
    assert_eq!(m.reg(T0), 1);

    m.run_next();
    assert_eq!(m.reg(T0), 2);
    assert_eq!(m.cpu.stats().cache_hits, 1);

    // Patch the first instruction, the stale block must never run again
    m.write(BASE, &[addiu(T0, T0, 0x10)]);

    m.run_next();
    assert_eq!(m.reg(T0), 0x12);

    m.run_next();
    assert_eq!(m.reg(T0), 0x22);

    let stats = m.cpu.stats();
    assert_eq!(stats.blocks_invalidated, 1);
    assert_eq!(stats.blocks_compiled, 2);
    assert_eq!(stats.blocks_executed, 4);
}

#[test]
fn test_self_modifying_store() {
    // The block patches its own first instruction through the bus
    let mut m = machine(&[
        addiu(T0, T0, 1),
        sw(T1, T2, 0),
        j(BASE),
        nop(),
    ]);
    m.set_reg(T1, addiu(T0, T0, 0x100));
    m.set_reg(T2, BASE);

    m.run_next();
    assert_eq!(m.reg(T0), 1);

    m.run_next();
    assert_eq!(m.reg(T0), 0x101);
    assert_eq!(m.cpu.stats().blocks_invalidated, 1);
}

#[test]
fn test_nops_are_counted() {
    let mut m = machine(&[
        nop(),
        nop(),
        addiu(T0, ZERO, 1),
        nop(),
        j(BASE),
        nop(),
    ]);

    let cycles = m.run_next();

    let timing = TimingConfig::default();
    assert_eq!(cycles, 6 * timing.ram_fetch_cycles);
    assert_eq!(m.cpu.pc(), BASE);
    assert_eq!(m.reg(T0), 1);
}

#[test]
fn test_data_access_cycles() {
    let mut m = machine(&[lw(T0, T1, 0), j(BASE), nop()]);
    m.set_reg(T1, DATA);

    let timing = TimingConfig::default();

    assert_eq!(
        m.run_next(),
        3 * timing.ram_fetch_cycles + timing.ram_access_cycles
    );
}

#[test]
fn test_exception_stops_block() {
    let mut m = machine(&[
        addiu(T1, ZERO, 1),
        addi(T2, T0, 1),
        addiu(T3, ZERO, 1),
        j(BASE),
        nop(),
    ]);
    m.set_reg(T0, 0x7fff_ffff);
    m.set_reg(T2, 0x55);

    let cycles = m.run_next();

    assert_eq!(cycles, 2 * TimingConfig::default().ram_fetch_cycles);
    assert_eq!(m.reg(T1), 1);
    assert_eq!(m.reg(T2), 0x55);
    assert_eq!(m.reg(T3), 0);
    assert_eq!(m.cause_code(), 12);
    assert_eq!(m.cpu.cop0().epc, BASE + 4);
    assert_eq!(m.cpu.pc(), 0xbfc0_0180);
}

#[test]
fn test_syscall_in_delay_slot() {
    let mut m = machine(&[j(BASE + 0x100), syscall()]);

    m.run_next();

    assert_eq!(m.cause_code(), 8);
    assert_eq!(m.cpu.cop0().epc, BASE);
    assert_ne!(m.cpu.cop0().cause & (1 << 31), 0);
}

#[test]
fn test_load_delay_across_ops() {
    let mut m = machine(&[
        lw(T1, T0, 0),
        addu(T2, T1, ZERO),
        addu(T3, T1, ZERO),
        j(BASE),
        nop(),
    ]);
    m.write(DATA, &[0xdead_beef]);
    m.set_reg(T0, DATA);
    m.set_reg(T1, 7);

    m.run_next();

    assert_eq!(m.reg(T2), 7);
    assert_eq!(m.reg(T3), 0xdead_beef);
}

#[test]
fn test_interpreter_fallbacks() {
    // Pending interrupt
    let mut m = machine(&[addiu(T0, ZERO, 1), j(BASE), nop()]);
    m.cpu.cop0_mut().sr = 1 | (1 << 10);
    m.bus.irq_mut().set_mask(Interrupt::VBLANK.bits());
    m.bus.raise_irq(Interrupt::VBLANK);

    m.run_next();
    assert_eq!(m.cause_code(), 0);
    assert_eq!(m.reg(T0), 0);
    assert_eq!(m.cpu.stats().interpreter_fallbacks, 1);
    assert_eq!(m.cpu.stats().blocks_compiled, 0);

    // Misaligned PC
    let mut m = machine(&[]);
    m.cpu.set_pc(BASE + 2);
    m.run_next();
    assert_eq!(m.cause_code(), 4);
    assert_eq!(m.cpu.cop0().bad_vaddr, BASE + 2);
    assert_eq!(m.cpu.stats().interpreter_fallbacks, 1);

    // Code running from the scratchpad
    let mut m = machine(&[]);
    m.cpu.set_pc(0x1f80_0000);
    let cycles = m.run_next();
    assert_eq!(cycles, TimingConfig::default().other_fetch_cycles);
    assert_eq!(m.cpu.pc(), 0x1f80_0004);
    assert_eq!(m.cpu.stats().interpreter_fallbacks, 1);
}

#[test]
fn test_unfinished_delay_slot_is_interpreted() {
    let mut m = machine(&[j(BASE + 0x20), addiu(T0, ZERO, 1)]);
    m.write(BASE + 0x20, &[addiu(T1, ZERO, 1), j(BASE + 0x20), nop()]);

    // Leave the CPU right after the jump, as the interpreter would
    m.step();

    m.run_next();
    assert_eq!(m.reg(T0), 1);
    assert_eq!(m.cpu.pc(), BASE + 0x20);
    assert_eq!(m.cpu.stats().interpreter_fallbacks, 1);

    m.run_next();
    assert_eq!(m.reg(T1), 1);
    assert_eq!(m.cpu.stats().blocks_executed, 1);
}

#[test]
fn test_bios_blocks() {
    let program = [addiu(T0, T0, 1), j(0xbfc0_0000), nop()];

    let mut rom = vec![0; BIOS_SIZE];
    for (i, w) in program.iter().enumerate() {
        rom[i * 4..i * 4 + 4].copy_from_slice(&w.to_le_bytes());
    }

    let mut m = Machine::with_bios(Engine::Recompiler, Bios::new(&rom).unwrap());

    let cycles = m.run_next();
    assert_eq!(cycles, 3 * TimingConfig::default().bios_fetch_cycles);
    assert_eq!(m.cpu.pc(), 0xbfc0_0000);

    m.run_next();
    assert_eq!(m.reg(T0), 2);

    let stats = m.cpu.stats();
    assert_eq!(stats.blocks_compiled, 1);
    assert_eq!(stats.cache_hits, 1);
    assert_eq!(m.cpu.cached_blocks(CodeRegion::Bios), 1);

    // Same ROM word through KSEG0: jump targets differ, rebuild
    m.cpu.set_pc(0x9fc0_0000);
    m.run_next();
    assert_eq!(m.cpu.pc(), 0x9fc0_0000);
    assert_eq!(m.cpu.stats().blocks_compiled, 2);
}

#[test]
fn test_flush() {
    let mut m = machine(&[j(BASE), nop()]);

    m.run_next();
    assert_eq!(m.cpu.cached_blocks(CodeRegion::Ram), 1);

    m.cpu.flush_block_cache();
    assert_eq!(m.cpu.cached_blocks(CodeRegion::Ram), 0);

    m.run_next();
    assert_eq!(m.cpu.stats().blocks_compiled, 2);
    assert_eq!(m.cpu.stats().blocks_invalidated, 0);
}
