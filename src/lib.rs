//! PlayStation R3000A CPU core
//!
//! An interpreter and a block recompiler sharing one register file, load
//! delay pipeline and COP0 exception logic, driving a memory mapped bus.

pub mod config;
pub mod error;
pub mod psx;
pub mod save_state;

#[cfg(test)]
mod tests;

pub use config::{Config, Engine};
pub use error::{PsxError, Result};
pub use psx::bios::Bios;
pub use psx::{FrameStats, Psx};
