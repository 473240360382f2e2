//! BIOS console output interception
//!
//! The BIOS exposes `putchar` through its A (0xa0) and B (0xb0) function
//! tables, the function number being in $t1. We grab the character from
//! $a0 on the way in. Purely a debugging aid: nothing in the emulated
//! state is touched.

use log::info;

const A_FUNCTIONS: u32 = 0xa0;
const B_FUNCTIONS: u32 = 0xb0;

/// A(0x3c) putchar
const A_PUTCHAR: u32 = 0x3c;
/// B(0x3d) putchar
const B_PUTCHAR: u32 = 0x3d;

/// Longest line buffered before we flush it anyway
const MAX_LINE: usize = 1024;

#[derive(Debug, Default)]
pub struct Tty {
    line: String,
}

impl Tty {
    pub fn new() -> Tty {
        Tty::default()
    }

    pub fn clear(&mut self) {
        self.line.clear();
    }

    /// Text received since the last newline
    pub fn pending(&self) -> &str {
        &self.line
    }

    /// Called with the PC of every instruction about to execute
    #[inline(always)]
    pub fn intercept(&mut self, pc: u32, regs: &[u32; 32]) {
        let function = match pc & 0x1fff_ffff {
            A_FUNCTIONS => A_PUTCHAR,
            B_FUNCTIONS => B_PUTCHAR,
            _ => return,
        };

        if regs[9] == function {
            self.putchar(regs[4] as u8);
        }
    }

    fn putchar(&mut self, c: u8) {
        match c {
            b'\n' => self.flush(),
            b'\r' => (),
            _ => {
                self.line.push(c as char);

                if self.line.len() >= MAX_LINE {
                    self.flush();
                }
            }
        }
    }

    fn flush(&mut self) {
        info!("TTY: {}", self.line);
        self.line.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(tty: &mut Tty, pc: u32, function: u32, c: u8) {
        let mut regs = [0; 32];
        regs[9] = function;
        regs[4] = c as u32;

        tty.intercept(pc, &regs);
    }

    #[test]
    fn test_putchar() {
        let mut tty = Tty::new();

        call(&mut tty, 0xa0, 0x3c, b'o');
        call(&mut tty, 0x800000b0, 0x3d, b'k');
        assert_eq!(tty.pending(), "ok");

        // Wrong function number
        call(&mut tty, 0xa0, 0x3d, b'!');
        // Not an entry point
        call(&mut tty, 0xa4, 0x3c, b'!');
        assert_eq!(tty.pending(), "ok");

        call(&mut tty, 0xb0, 0x3d, b'\n');
        assert_eq!(tty.pending(), "");
    }
}
