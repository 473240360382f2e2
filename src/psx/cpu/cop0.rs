//! Coprocessor 0: system control, exceptions and interrupts

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::psx::memory_map::{EXCEPTION_VECTOR_RAM, EXCEPTION_VECTOR_ROM};

bitflags! {
    /// Status register (COP0 r12) bits the core acts upon
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Status: u32 {
        /// Current interrupt enable
        const IEC = 1 << 0;
        /// Current kernel/user mode
        const KUC = 1 << 1;
        /// Previous interrupt enable
        const IEP = 1 << 2;
        const KUP = 1 << 3;
        /// Old interrupt enable
        const IEO = 1 << 4;
        const KUO = 1 << 5;
        /// Interrupt mask, one bit per Cause.IP bit
        const IM = 0xff << 8;
        /// Isolate cache: stores hit the cache instead of memory
        const ISC = 1 << 16;
        /// Boot exception vectors in ROM
        const BEV = 1 << 22;

        const _ = !0;
    }
}

/// Mode/interrupt enable stack, bits [5:0] of SR
const MODE_STACK: u32 = 0x3f;

/// Cause bits: software interrupts
const CAUSE_SW_IRQ: u32 = 0x300;
/// Cause bits: hardware interrupt line
const CAUSE_HW_IRQ: u32 = 1 << 10;
/// Cause bits: interrupt pending field
const CAUSE_IP: u32 = 0xff00;
/// Cause bits: branch delay
const CAUSE_BD: u32 = 1 << 31;
/// Cause bits: coprocessor error number
const CAUSE_CE: u32 = 3 << 28;
/// Cause bits: exception code
const CAUSE_EXCODE: u32 = 0x1f << 2;

/// Exceptions the R3000A can raise. Address errors carry the faulting
/// address which ends up in BadVaddr.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exception {
    Interrupt,
    LoadAddressError(u32),
    StoreAddressError(u32),
    SysCall,
    Break,
    IllegalInstruction,
    /// Coprocessor number in the payload
    CoprocessorError(u32),
    Overflow,
}

impl Exception {
    /// Code stored in Cause bits [6:2]
    pub fn code(self) -> u32 {
        match self {
            Exception::Interrupt => 0x0,
            Exception::LoadAddressError(_) => 0x4,
            Exception::StoreAddressError(_) => 0x5,
            Exception::SysCall => 0x8,
            Exception::Break => 0x9,
            Exception::IllegalInstruction => 0xa,
            Exception::CoprocessorError(_) => 0xb,
            Exception::Overflow => 0xc,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cop0 {
    /// r12
    pub sr: u32,
    /// r13
    pub cause: u32,
    /// r14
    pub epc: u32,
    /// r8
    pub bad_vaddr: u32,
    /// Breakpoint registers (r3, r5, r6, r7, r9, r11). Stored but never
    /// acted upon.
    pub debug: [u32; 6],
}

/// Processor revision reported in PRId (r15)
const PRID: u32 = 0x0000_0002;

impl Cop0 {
    pub fn new() -> Cop0 {
        Cop0 {
            sr: Status::BEV.bits(),
            cause: 0,
            epc: 0,
            bad_vaddr: 0,
            debug: [0; 6],
        }
    }

    pub fn reset(&mut self) {
        *self = Cop0::new();
    }

    pub fn status(&self) -> Status {
        Status::from_bits_retain(self.sr)
    }

    pub fn cache_isolated(&self) -> bool {
        self.status().contains(Status::ISC)
    }

    fn debug_index(reg: usize) -> Option<usize> {
        match reg {
            3 => Some(0),
            5 => Some(1),
            6 => Some(2),
            7 => Some(3),
            9 => Some(4),
            11 => Some(5),
            _ => None,
        }
    }

    /// Handle MFC0. Returns `None` for registers that don't exist, which
    /// makes the instruction illegal.
    pub fn mfc0(&self, reg: usize) -> Option<u32> {
        match reg {
            8 => Some(self.bad_vaddr),
            12 => Some(self.sr),
            13 => Some(self.cause),
            14 => Some(self.epc),
            15 => Some(PRID),
            _ => Cop0::debug_index(reg).map(|i| self.debug[i]),
        }
    }

    /// Handle MTC0. Returns `false` for registers that can't be written.
    pub fn mtc0(&mut self, reg: usize, val: u32) -> bool {
        match reg {
            12 => self.sr = val,
            // Only the software interrupt bits are writable
            13 => self.cause = (self.cause & !CAUSE_SW_IRQ) | (val & CAUSE_SW_IRQ),
            // Read only, writes are dropped
            8 | 14 | 15 => (),
            _ => match Cop0::debug_index(reg) {
                Some(i) => self.debug[i] = val,
                None => return false,
            },
        }

        true
    }

    /// Mirror the level of the interrupt controller output in Cause.IP[2]
    pub fn set_hardware_irq(&mut self, active: bool) {
        if active {
            self.cause |= CAUSE_HW_IRQ;
        } else {
            self.cause &= !CAUSE_HW_IRQ;
        }
    }

    /// True if an interrupt is pending and enabled
    pub fn irq_active(&self) -> bool {
        let status = self.status();

        status.contains(Status::IEC) && (self.sr & self.cause & CAUSE_IP) != 0
    }

    /// Latch the exception state and return the handler address.
    /// `pc` is the address of the faulting instruction.
    pub fn enter_exception(&mut self, exception: Exception, pc: u32, delay_slot: bool) -> u32 {
        // Push the mode stack, entering kernel mode with interrupts
        // disabled
        let mode = self.sr & MODE_STACK;
        self.sr = (self.sr & !MODE_STACK) | ((mode << 2) & MODE_STACK);

        let ce = match exception {
            Exception::CoprocessorError(n) => (n & 3) << 28,
            _ => 0,
        };

        self.cause &= !(CAUSE_EXCODE | CAUSE_BD | CAUSE_CE);
        self.cause |= (exception.code() << 2) | ce;

        match exception {
            Exception::LoadAddressError(addr) | Exception::StoreAddressError(addr) => {
                self.bad_vaddr = addr
            }
            _ => (),
        }

        self.epc = if delay_slot {
            self.cause |= CAUSE_BD;
            pc.wrapping_sub(4)
        } else {
            pc
        };

        if self.status().contains(Status::BEV) {
            EXCEPTION_VECTOR_ROM
        } else {
            EXCEPTION_VECTOR_RAM
        }
    }

    /// RFE: pop the mode stack. Bits [5:4] are left untouched.
    pub fn return_from_exception(&mut self) {
        let mode = self.sr & MODE_STACK;
        self.sr = (self.sr & !0xf) | (mode >> 2);
    }
}

impl Default for Cop0 {
    fn default() -> Cop0 {
        Cop0::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_selection() {
        let mut cop0 = Cop0::new();

        cop0.sr = Status::BEV.bits() | 0b01_0101;
        assert_eq!(cop0.enter_exception(Exception::SysCall, 0x1000, false), 0xbfc0_0180);
        assert_eq!(cop0.sr & 0x3f, 0b01_0100);
        assert_eq!((cop0.cause >> 2) & 0x1f, 8);
        assert_eq!(cop0.epc, 0x1000);

        cop0.sr = 0b00_0011;
        assert_eq!(cop0.enter_exception(Exception::Overflow, 0x2000, false), 0x8000_0080);
        assert_eq!(cop0.sr & 0x3f, 0b00_1100);
        assert_eq!((cop0.cause >> 2) & 0x1f, 12);
    }

    #[test]
    fn test_delay_slot_epc() {
        let mut cop0 = Cop0::new();

        cop0.enter_exception(Exception::Break, 0x8001_0004, true);
        assert_eq!(cop0.epc, 0x8001_0000);
        assert_ne!(cop0.cause & CAUSE_BD, 0);

        cop0.enter_exception(Exception::Break, 0x8001_0004, false);
        assert_eq!(cop0.epc, 0x8001_0004);
        assert_eq!(cop0.cause & CAUSE_BD, 0);
    }

    #[test]
    fn test_cause_ip_preserved() {
        let mut cop0 = Cop0::new();

        cop0.set_hardware_irq(true);
        cop0.mtc0(13, 0x100);
        cop0.enter_exception(Exception::CoprocessorError(3), 0, false);

        assert_eq!(cop0.cause & CAUSE_IP, 0x500);
        assert_eq!((cop0.cause >> 28) & 3, 3);
        assert_eq!((cop0.cause >> 2) & 0x1f, 11);
    }

    #[test]
    fn test_address_error_latches_bad_vaddr() {
        let mut cop0 = Cop0::new();

        cop0.enter_exception(Exception::StoreAddressError(0x8000_0001), 0x100, false);
        assert_eq!(cop0.mfc0(8), Some(0x8000_0001));
    }

    #[test]
    fn test_rfe() {
        let mut cop0 = Cop0::new();

        cop0.sr = 0b11_0100;
        cop0.return_from_exception();
        assert_eq!(cop0.sr & 0x3f, 0b11_1101);
    }

    #[test]
    fn test_irq_active() {
        let mut cop0 = Cop0::new();

        cop0.set_hardware_irq(true);
        assert!(!cop0.irq_active());

        cop0.sr = Status::IEC.bits() | (1 << 10);
        assert!(cop0.irq_active());

        cop0.set_hardware_irq(false);
        assert!(!cop0.irq_active());

        // Software interrupt
        cop0.sr |= 1 << 8;
        cop0.mtc0(13, 1 << 8);
        assert!(cop0.irq_active());
    }

    #[test]
    fn test_register_access() {
        let mut cop0 = Cop0::new();

        assert_eq!(cop0.mfc0(15), Some(PRID));
        assert_eq!(cop0.mfc0(20), None);
        assert!(cop0.mtc0(7, 0x1234));
        assert_eq!(cop0.mfc0(7), Some(0x1234));
        assert!(!cop0.mtc0(0, 1));

        // EPC is read only
        assert!(cop0.mtc0(14, 0xdead));
        assert_eq!(cop0.mfc0(14), Some(0));
    }
}
