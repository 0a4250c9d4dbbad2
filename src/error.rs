//! Crate-level error type for boundary failures (configuration, device
//! bring-up, image loading) as opposed to the architectural faults
//! (`memory::Fault`, `interrupt::ExceptionCode`) the machine itself raises.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum EmulatorError {
    #[error("failed to read configuration file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("failed to open device backing file {path}: {source}")]
    DeviceIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("device unit {0:#06o} is already in use")]
    DuplicateUnit(u16),

    #[error("no such device unit {0:#06o}")]
    NoSuchUnit(u16),

    #[error("failed to bind TTY listener on port {port}: {source}")]
    TtyBind {
        port: u16,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, EmulatorError>;
