// Interpreter pipeline behaviour: load delay, branch delay, $zero

use super::asm::*;
use super::{Machine, BASE, DATA};
use crate::config::Engine;

fn machine(program: &[u32]) -> Machine {
    let mut m = Machine::new(Engine::Interpreter);
    m.load(BASE, program);
    m
}

#[test]
fn test_zero_register_is_hardwired() {
    let mut m = machine(&[
        addiu(ZERO, ZERO, 5),
        lui(ZERO, 0x1234),
        lw(ZERO, T0, 0),
        addu(T1, ZERO, ZERO),
        nop(),
    ]);
    m.write(DATA, &[0xdead_beef]);
    m.set_reg(T0, DATA);
    m.set_reg(T1, 7);

    for _ in 0..5 {
        m.step();
        assert_eq!(m.reg(ZERO), 0);
    }

    // The load into $zero never shows up either
    assert_eq!(m.reg(T1), 0);
    assert!(m.cpu.pipeline().ready.is_empty());
}

#[test]
fn test_load_delay_slot() {
    let mut m = machine(&[
        lw(T1, T0, 0),
        addu(T2, T1, ZERO), // load delay slot, sees the old value
        addu(T3, T1, ZERO),
    ]);
    m.write(DATA, &[0xdead_beef]);
    m.set_reg(T0, DATA);
    m.set_reg(T1, 7);

    m.step();
    assert_eq!(m.reg(T1), 7);

    m.step();
    assert_eq!(m.reg(T1), 0xdead_beef);
    assert_eq!(m.reg(T2), 7);

    m.step();
    assert_eq!(m.reg(T3), 0xdead_beef);
}

#[test]
fn test_write_in_load_delay_slot_wins() {
    let mut m = machine(&[lw(T1, T0, 0), addiu(T1, ZERO, 1), nop()]);
    m.write(DATA, &[0xdead_beef]);
    m.set_reg(T0, DATA);

    m.steps(3);

    assert_eq!(m.reg(T1), 1);
}

#[test]
fn test_back_to_back_loads_to_same_register() {
    let mut m = machine(&[
        lw(T1, T0, 0),
        lw(T1, T0, 4),
        addu(T2, T1, ZERO),
        nop(),
    ]);
    m.write(DATA, &[0x1111_1111, 0x2222_2222]);
    m.set_reg(T0, DATA);
    m.set_reg(T1, 7);

    m.steps(2);
    // The first load is cancelled by the second one
    assert_eq!(m.reg(T1), 7);

    m.steps(2);
    assert_eq!(m.reg(T2), 7);
    assert_eq!(m.reg(T1), 0x2222_2222);
}

#[test]
fn test_unaligned_load_merges_in_flight_value() {
    let mut m = machine(&[lwr(T1, T0, 1), lwl(T1, T0, 4), nop()]);
    m.write(DATA, &[0x4433_2211, 0x8877_6655]);
    m.set_reg(T0, DATA);

    m.steps(3);

    assert_eq!(m.reg(T1), 0x5544_3322);
}

#[test]
fn test_unaligned_store() {
    let mut m = machine(&[swr(T1, T0, 1), swl(T1, T0, 4)]);
    m.write(DATA, &[0xaaaa_aaaa, 0xbbbb_bbbb]);
    m.set_reg(T0, DATA);
    m.set_reg(T1, 0x1122_3344);

    m.steps(2);

    assert_eq!(m.ram_word(DATA), 0x2233_44aa);
    assert_eq!(m.ram_word(DATA + 4), 0xbbbb_bb11);
}

#[test]
fn test_sign_extended_byte_load() {
    let mut m = machine(&[lb(T1, T0, 0), nop(), sb(T1, T0, 5)]);
    m.write(DATA, &[0x0000_0080, 0]);
    m.set_reg(T0, DATA);

    m.steps(3);

    assert_eq!(m.reg(T1), 0xffff_ff80);
    assert_eq!(m.ram_word(DATA + 4), 0x0000_8000);
}

#[test]
fn test_taken_branch_runs_delay_slot_once() {
    let mut m = machine(&[
        beq(ZERO, ZERO, 2),
        addiu(T0, T0, 1), // delay slot
        addiu(T1, ZERO, 1),
        addiu(T2, ZERO, 1), // target
    ]);

    m.step();
    assert_eq!(m.cpu.pc(), BASE + 4);
    assert_eq!(m.cpu.next_pc(), BASE + 12);

    m.step();
    assert!(m.cpu.in_delay_slot());
    assert_eq!(m.cpu.pc(), BASE + 12);

    m.step();
    assert!(!m.cpu.in_delay_slot());

    assert_eq!(m.reg(T0), 1);
    assert_eq!(m.reg(T1), 0);
    assert_eq!(m.reg(T2), 1);
}

#[test]
fn test_not_taken_branch_still_has_delay_slot() {
    let mut m = machine(&[
        bne(ZERO, ZERO, 2),
        addiu(T0, ZERO, 1),
        addiu(T1, ZERO, 1),
    ]);

    m.step();
    m.step();
    // The slot after a branch is a delay slot even if not taken
    assert!(m.cpu.in_delay_slot());
    m.step();

    assert_eq!(m.reg(T0), 1);
    assert_eq!(m.reg(T1), 1);
    assert_eq!(m.cpu.pc(), BASE + 12);
}

#[test]
fn test_jal_links_past_delay_slot() {
    let target = BASE + 0x100;
    let mut m = machine(&[jal(target), nop()]);

    m.step();
    assert_eq!(m.reg(RA), BASE + 8);

    m.step();
    assert_eq!(m.cpu.pc(), target);
}

#[test]
fn test_jalr_reads_target_before_link() {
    let mut m = machine(&[jalr(T0, T0), nop()]);
    m.set_reg(T0, BASE + 0x40);

    m.steps(2);

    assert_eq!(m.cpu.pc(), BASE + 0x40);
    assert_eq!(m.reg(T0), BASE + 8);
}

#[test]
fn test_regimm_link_is_unconditional() {
    let mut m = machine(&[
        bltzal(ZERO, 4), // not taken, links anyway
        nop(),
        bgezal(ZERO, 4), // taken
        nop(),
    ]);

    m.steps(2);
    assert_eq!(m.reg(RA), BASE + 8);
    assert_eq!(m.cpu.pc(), BASE + 8);

    m.steps(2);
    assert_eq!(m.reg(RA), BASE + 16);
    assert_eq!(m.cpu.pc(), BASE + 8 + 4 + 16);
}

#[test]
fn test_addi_overflow_leaves_destination() {
    let mut m = machine(&[addi(T1, T0, 1), addi(T3, T2, 1)]);
    m.set_reg(T0, 0x7fff_ffff);
    m.set_reg(T1, 0x55);

    m.step();
    assert_eq!(m.reg(T1), 0x55);
    assert_eq!(m.cause_code(), 12);

    m.set_reg(T2, 1);
    m.cpu.set_pc(BASE + 4);
    m.step();
    assert_eq!(m.reg(T3), 2);
}

#[test]
fn test_add_overflow() {
    let mut m = machine(&[add(T2, T0, T1)]);
    m.set_reg(T0, 0x8000_0000);
    m.set_reg(T1, 0xffff_ffff);
    m.set_reg(T2, 3);

    m.step();

    assert_eq!(m.reg(T2), 3);
    assert_eq!(m.cause_code(), 12);
}

#[test]
fn test_multiply_and_divide() {
    let mut m = machine(&[
        mult(T0, T1),
        mfhi(T2),
        mflo(T3),
        div(T0, ZERO),
        mfhi(S0),
        mflo(S1),
        divu(T1, T0),
        mflo(V0),
    ]);
    m.set_reg(T0, (-6i32) as u32);
    m.set_reg(T1, 7);

    m.steps(8);

    assert_eq!(m.reg(T2), 0xffff_ffff);
    assert_eq!(m.reg(T3), (-42i32) as u32);
    // Negative dividend over zero
    assert_eq!(m.reg(S0), (-6i32) as u32);
    assert_eq!(m.reg(S1), 1);
    assert_eq!(m.reg(V0), 0);
    assert_eq!(m.cpu.hi(), 7);
}

#[test]
fn test_signed_division_overflow() {
    let mut m = machine(&[div(T0, T1)]);
    m.set_reg(T0, 0x8000_0000);
    m.set_reg(T1, 0xffff_ffff);

    m.step();

    assert_eq!(m.cpu.hi(), 0);
    assert_eq!(m.cpu.lo(), 0x8000_0000);
}

#[test]
fn test_set_less_than_and_shifts() {
    let mut m = machine(&[
        slt(T2, T0, T1),
        sll(T3, T1, 4),
        subu(S0, ZERO, T1),
        ori(S1, ZERO, 0xbeef),
    ]);
    m.set_reg(T0, 0xffff_fff0);
    m.set_reg(T1, 3);

    m.steps(4);

    assert_eq!(m.reg(T2), 1);
    assert_eq!(m.reg(T3), 0x30);
    assert_eq!(m.reg(S0), 0xffff_fffd);
    assert_eq!(m.reg(S1), 0xbeef);
}

#[test]
fn test_cache_isolation_swallows_stores() {
    let mut m = machine(&[mtc0(T0, 12), sw(T1, T2, 0), mtc0(ZERO, 12), sw(T1, T2, 0)]);
    m.write(DATA, &[0x1234_5678]);
    m.set_reg(T0, 1 << 16);
    m.set_reg(T1, 0xcafe_babe);
    m.set_reg(T2, DATA);

    m.steps(2);
    assert!(m.cpu.cop0().cache_isolated());
    assert_eq!(m.ram_word(DATA), 0x1234_5678);

    m.steps(2);
    assert_eq!(m.ram_word(DATA), 0xcafe_babe);
}

#[test]
fn test_mfc0_is_delayed() {
    let mut m = machine(&[mfc0(T0, 15), addu(T1, T0, ZERO), addu(T2, T0, ZERO)]);

    m.steps(3);

    assert_eq!(m.reg(T1), 0);
    assert_eq!(m.reg(T2), 2);
}

#[test]
fn test_cycle_accounting() {
    let mut m = machine(&[addiu(T0, ZERO, 1), lw(T1, T2, 0)]);
    m.set_reg(T2, DATA);

    let timing = crate::config::TimingConfig::default();

    assert_eq!(m.step(), timing.ram_fetch_cycles);
    assert_eq!(m.step(), timing.ram_fetch_cycles + timing.ram_access_cycles);
}
