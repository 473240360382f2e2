//! Save states
//!
//! On disk a save state is a gzip compressed bincode envelope: a header
//! carrying a CRC-32 of the payload, followed by the bincode encoded CPU
//! and memory state.

use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};

use crate::error::{PsxError, Result};
use crate::psx::cpu::cop0::Cop0;
use crate::psx::cpu::pipeline::DelayedLoad;
use crate::psx::irq::InterruptState;
use crate::psx::memory_control::MemoryControl;
use crate::psx::memory_map::{RAM_SIZE, SCRATCHPAD_SIZE};

const SAVE_STATE_VERSION: u32 = 1;
const SAVE_STATE_MAGIC: &[u8; 8] = b"R3KSTATE";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SaveStateHeader {
    magic: [u8; 8],
    version: u32,
    timestamp: u64,
    /// CRC-32 of the bincode encoded payload
    checksum: u32,
}

impl SaveStateHeader {
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Seconds since the UNIX epoch when the state was created
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CpuState {
    pub pc: u32,
    pub next_pc: u32,
    pub current_pc: u32,
    pub regs: [u32; 32],
    pub hi: u32,
    pub lo: u32,
    pub branch: bool,
    pub delay_slot: bool,
    pub load: DelayedLoad,
    pub cop0: Cop0,
    /// GTE data then control registers
    pub gte: Vec<u32>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MemoryState {
    pub ram: Vec<u8>,
    pub scratchpad: Vec<u8>,
    pub irq: InterruptState,
    pub mem_control: MemoryControl,
    pub cache_control: u32,
}

/// Complete machine state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveState {
    pub header: SaveStateHeader,
    pub cpu: CpuState,
    pub memory: MemoryState,
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    header: SaveStateHeader,
    payload: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct Payload {
    cpu: CpuState,
    memory: MemoryState,
}

impl SaveState {
    pub fn new(cpu: CpuState, memory: MemoryState) -> SaveState {
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        SaveState {
            header: SaveStateHeader {
                magic: *SAVE_STATE_MAGIC,
                version: SAVE_STATE_VERSION,
                timestamp,
                checksum: 0,
            },
            cpu,
            memory,
        }
    }

    /// Serialize save state to compressed bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let payload = Payload {
            cpu: self.cpu.clone(),
            memory: self.memory.clone(),
        };

        let payload =
            bincode::serialize(&payload).map_err(|e| PsxError::save_state("serialize", e))?;

        let mut header = self.header.clone();
        header.checksum = crc32fast::hash(&payload);

        let data = bincode::serialize(&Envelope { header, payload })
            .map_err(|e| PsxError::save_state("serialize", e))?;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());

        encoder
            .write_all(&data)
            .map_err(|e| PsxError::save_state("compress", e))?;

        encoder
            .finish()
            .map_err(|e| PsxError::save_state("finalize", e))
    }

    /// Deserialize and validate a save state
    pub fn from_bytes(data: &[u8]) -> Result<SaveState> {
        let mut decoder = GzDecoder::new(data);
        let mut decompressed = Vec::new();

        decoder
            .read_to_end(&mut decompressed)
            .map_err(|e| PsxError::save_state("decompress", e))?;

        let envelope: Envelope = bincode::deserialize(&decompressed)
            .map_err(|e| PsxError::save_state("deserialize", e))?;

        let header = envelope.header;

        if header.magic != *SAVE_STATE_MAGIC {
            return Err(PsxError::CorruptedState("invalid save state magic".into()));
        }

        if header.version != SAVE_STATE_VERSION {
            return Err(PsxError::save_state(
                "validate",
                format!(
                    "incompatible save state version: expected {}, got {}",
                    SAVE_STATE_VERSION, header.version
                ),
            ));
        }

        let checksum = crc32fast::hash(&envelope.payload);
        if checksum != header.checksum {
            return Err(PsxError::CorruptedState(format!(
                "checksum mismatch: expected 0x{:08x}, got 0x{:08x}",
                header.checksum, checksum
            )));
        }

        let payload: Payload = bincode::deserialize(&envelope.payload)
            .map_err(|e| PsxError::CorruptedState(e.to_string()))?;

        let state = SaveState {
            header,
            cpu: payload.cpu,
            memory: payload.memory,
        };

        state.validate()?;

        Ok(state)
    }

    /// Check the sizes of the variable length fields and the register
    /// indices of the load pipeline
    pub fn validate(&self) -> Result<()> {
        if !self.cpu.load.is_valid() {
            return Err(PsxError::CorruptedState(format!(
                "invalid load pipeline {:?}",
                self.cpu.load
            )));
        }

        if self.memory.ram.len() != RAM_SIZE {
            return Err(PsxError::CorruptedState(format!(
                "invalid RAM size {}",
                self.memory.ram.len()
            )));
        }

        if self.memory.scratchpad.len() != SCRATCHPAD_SIZE {
            return Err(PsxError::CorruptedState(format!(
                "invalid scratchpad size {}",
                self.memory.scratchpad.len()
            )));
        }

        if self.cpu.gte.len() != 64 {
            return Err(PsxError::CorruptedState(format!(
                "invalid GTE register count {}",
                self.cpu.gte.len()
            )));
        }

        Ok(())
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.to_bytes()?)?;

        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<SaveState> {
        let data = fs::read(path)?;

        SaveState::from_bytes(&data)
    }
}
