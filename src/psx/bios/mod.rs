use std::fs;
use std::path::Path;

use log::{info, warn};

use crate::error::{PsxError, Result};
use crate::psx::memory_map::{BIOS_MASK, BIOS_SIZE};

/// Offset of the "Sony Computer Entertainment Inc." string found in
/// every retail BIOS
const COPYRIGHT_OFFSET: usize = 0x108;
const COPYRIGHT: &[u8] = b"Sony Computer Entertainment Inc.";

/// BIOS ROM image, always 512KB
pub struct Bios {
    rom: Box<[u8]>,
}

impl Bios {
    pub fn new(binary: &[u8]) -> Result<Bios> {
        if binary.len() != BIOS_SIZE {
            return Err(PsxError::bad_bios(format!(
                "expected {} bytes, got {}",
                BIOS_SIZE,
                binary.len()
            )));
        }

        let bios = Bios {
            rom: binary.into(),
        };

        if bios.is_retail() {
            info!("Loaded BIOS image");
        } else {
            warn!("BIOS image doesn't carry the usual copyright string, it may not boot");
        }

        Ok(bios)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Bios> {
        let binary = fs::read(path)?;

        Bios::new(&binary)
    }

    /// Creates a BIOS instance with content set to all 0s.
    pub fn new_dummy() -> Bios {
        Bios {
            rom: vec![0; BIOS_SIZE].into_boxed_slice(),
        }
    }

    fn is_retail(&self) -> bool {
        self.rom[COPYRIGHT_OFFSET..].starts_with(COPYRIGHT)
    }

    /// Little endian load of `N` bytes at `offset`
    pub fn load_bytes<const N: usize>(&self, offset: u32) -> u32 {
        let mut v = 0;
        for i in 0..N {
            let o = (offset.wrapping_add(i as u32) & BIOS_MASK) as usize;
            v |= (self.rom[o] as u32) << (i * 8);
        }

        v
    }

    pub fn load_word(&self, offset: u32) -> u32 {
        self.load_bytes::<4>(offset & !3)
    }

    /// Return the raw BIOS ROM
    pub fn rom(&self) -> &[u8] {
        &self.rom
    }
}
