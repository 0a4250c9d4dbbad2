//! IST-66/RDC-700 emulator: a 36-bit minicomputer core (ALU, memory/key
//! protection, prioritized interrupts, CPU execution engine), a
//! worker-thread device framework, and an optional IOCPU satellite.

pub mod alu;
pub mod config;
pub mod cpu;
pub mod device;
pub mod error;
pub mod interrupt;
pub mod iocpu;
pub mod log_init;
pub mod memory;

pub use config::MachineConfig;
pub use cpu::Cpu;
pub use error::{EmulatorError, Result};
