//! The machine: a CPU wired to the interconnect, driven one video frame
//! at a time.

pub mod bios;
pub mod bus;
pub mod cpu;
pub mod gte;
pub mod irq;
pub mod memory_control;
pub mod memory_map;

use log::{debug, info};

use self::bios::Bios;
use self::bus::{Bus, Interconnect, Peripheral};
use self::cpu::Cpu;
use self::gte::Gte;
use self::irq::Interrupt;
use self::memory_map::{CodeRegion, RAM_SIZE};
use crate::config::Config;
use crate::error::{PsxError, Result};
use crate::save_state::SaveState;

/// Size of the PS-X EXE header, the text follows it
const EXE_HEADER_SIZE: usize = 0x800;

/// What happened during a call to `run_frame`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Index of the frame that just completed
    pub frame: u64,
    /// CPU cycles elapsed, can overshoot the frame budget by one block
    pub cycles: u32,
    /// Calls to the execution engine
    pub steps: u32,
    /// False if the machine was paused and nothing ran
    pub completed: bool,
}

pub struct Psx {
    cpu: Cpu,
    bus: Interconnect,
    config: Config,
    paused: bool,
    frame: u64,
}

impl Psx {
    pub fn new(config: Config, bios: Bios) -> Result<Psx> {
        config.validate()?;

        let bus = Interconnect::new(bios, &config.timing);
        let cpu = Cpu::new(&config);

        Ok(Psx {
            cpu,
            bus,
            config,
            paused: false,
            frame: 0,
        })
    }

    /// Power cycle. Peripherals and the GTE collaborator stay connected.
    pub fn reset(&mut self) {
        info!("Reset");

        self.cpu.reset();
        self.bus.reset();
        self.frame = 0;
    }

    /// Side-load a PS-X EXE: copy its text to RAM and point the CPU at
    /// its entry point. The BIOS is bypassed entirely.
    pub fn load_exe(&mut self, exe: &[u8]) -> Result<()> {
        if exe.len() < EXE_HEADER_SIZE {
            return Err(PsxError::bad_exe(format!(
                "image too small ({} bytes)",
                exe.len()
            )));
        }

        if &exe[0..8] != b"PS-X EXE" {
            return Err(PsxError::bad_exe("missing PS-X EXE magic"));
        }

        let word = |offset: usize| {
            u32::from_le_bytes([
                exe[offset],
                exe[offset + 1],
                exe[offset + 2],
                exe[offset + 3],
            ])
        };

        let pc = word(0x10);
        let gp = word(0x14);
        let dest = word(0x18);
        let size = word(0x1c) as usize;
        let sp_base = word(0x30);
        let sp_offset = word(0x34);

        let text = &exe[EXE_HEADER_SIZE..];

        if size > text.len() {
            return Err(PsxError::bad_exe(format!(
                "text size 0x{:x} exceeds image (0x{:x} bytes available)",
                size,
                text.len()
            )));
        }

        if size > RAM_SIZE || CodeRegion::of(dest) != Some(CodeRegion::Ram) {
            return Err(PsxError::bad_exe(format!(
                "text doesn't fit in RAM (0x{:08x}, 0x{:x} bytes)",
                dest, size
            )));
        }

        if pc % 4 != 0 {
            return Err(PsxError::bad_exe(format!("misaligned entry point 0x{:08x}", pc)));
        }

        info!(
            "Loading EXE: 0x{:x} bytes at 0x{:08x}, entry point 0x{:08x}",
            size, dest, pc
        );

        self.bus.copy_to_ram(dest, &text[..size]);

        self.cpu.set_pc(pc);
        self.cpu.set_reg(28, gp);
        if sp_base != 0 {
            let sp = sp_base.wrapping_add(sp_offset);
            self.cpu.set_reg(29, sp);
            self.cpu.set_reg(30, sp);
        }

        self.cpu.flush_block_cache();

        Ok(())
    }

    /// Run the CPU for one frame worth of cycles and signal the vertical
    /// blank
    pub fn run_frame(&mut self) -> Result<FrameStats> {
        let mut stats = FrameStats {
            frame: self.frame,
            ..FrameStats::default()
        };

        if self.paused {
            return Ok(stats);
        }

        let budget = self.config.timing.cycles_per_frame;

        while stats.cycles < budget {
            stats.cycles += self.run_once()?;
            stats.steps += 1;
        }

        self.bus.raise_irq(Interrupt::VBLANK);

        stats.completed = true;
        self.frame += 1;

        Ok(stats)
    }

    /// Run a single instruction (or block, depending on the engine) and
    /// return the cycles it took
    pub fn step(&mut self) -> Result<u32> {
        self.run_once()
    }

    fn run_once(&mut self) -> Result<u32> {
        let cycles = self.cpu.run_next(&mut self.bus)?;

        self.bus.tick(cycles);

        Ok(cycles)
    }

    pub fn paused(&self) -> bool {
        self.paused
    }

    pub fn set_paused(&mut self, paused: bool) {
        debug!("{}", if paused { "Paused" } else { "Resumed" });

        self.paused = paused;
    }

    /// Number of frames completed since reset
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn add_peripheral(&mut self, peripheral: Box<dyn Peripheral>) {
        self.bus.add_peripheral(peripheral);
    }

    pub fn set_gte(&mut self, gte: Box<dyn Gte>) {
        self.cpu.set_gte(gte);
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Switch to a new configuration. The engine switch takes effect on
    /// the next step, block caches are kept.
    pub fn set_config(&mut self, config: Config) -> Result<()> {
        config.validate()?;

        self.cpu.set_engine(config.cpu.engine);
        self.cpu.set_timing(&config.timing);
        self.bus.set_timing(&config.timing);
        self.config = config;

        Ok(())
    }

    /// Replace the BIOS image. Compiled BIOS code is dropped.
    pub fn set_bios(&mut self, bios: Bios) {
        self.bus.set_bios(bios);
        self.cpu.flush_block_cache();
    }

    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut Cpu {
        &mut self.cpu
    }

    pub fn bus(&self) -> &Interconnect {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut Interconnect {
        &mut self.bus
    }

    pub fn save_state(&mut self) -> SaveState {
        SaveState::new(self.cpu.snapshot(), self.bus.snapshot())
    }

    pub fn load_state(&mut self, state: &SaveState) -> Result<()> {
        state.validate()?;

        self.bus.restore(&state.memory)?;
        self.cpu.restore(&state.cpu)?;

        info!("Save state loaded");

        Ok(())
    }
}
