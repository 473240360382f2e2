use std::io;
use thiserror::Error;

pub type Result<T> = ::std::result::Result<T, PsxError>;

/// Host-side failures. Guest faults (overflow, address errors, illegal
/// opcodes...) never end up here, they are dispatched to the emulated
/// exception handler instead.
#[derive(Error, Debug)]
pub enum PsxError {
    #[error("Input output error: {0}")]
    IoError(#[from] io::Error),
    #[error("Invalid BIOS image: {0}")]
    BadBios(String),
    #[error("Invalid PS-X EXE image: {0}")]
    BadExe(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Couldn't parse configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),
    #[error("Couldn't serialize configuration: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),
    #[error("Block cache allocation failed for the {region} region ({requested} entries)")]
    BlockCacheExhausted {
        region: &'static str,
        requested: usize,
    },
    #[error("Save state error during {operation}: {reason}")]
    SaveStateError { operation: String, reason: String },
    #[error("Corrupted save state: {0}")]
    CorruptedState(String),
}

impl PsxError {
    pub fn bad_bios(details: impl Into<String>) -> PsxError {
        PsxError::BadBios(details.into())
    }

    pub fn bad_exe(details: impl Into<String>) -> PsxError {
        PsxError::BadExe(details.into())
    }

    pub fn save_state(operation: &str, reason: impl ToString) -> PsxError {
        PsxError::SaveStateError {
            operation: operation.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Returns true if the machine state is still consistent after this
    /// error and emulation can carry on.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            PsxError::BlockCacheExhausted { .. } | PsxError::CorruptedState(_)
        )
    }
}
