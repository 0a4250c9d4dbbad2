/*!
Machine bring-up configuration: memory size and the device units to wire
up on CPU start. The original C `main()` hardcoded its device units and
backing files; spec.md's Non-goals don't exclude configurability, so this
crate takes `MachineConfig` from a small TOML file (or builds one in
code, e.g. for tests) instead of hardcoding bring-up.
*/

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cpu::Cpu;
use crate::device::tty::{Tty, TtyConfig};
use crate::device::{lpt::Lpt, pch::Pch, ppt::Ppt};
use crate::error::{EmulatorError, Result};

/// A paper-tape reader unit: device id, IRQ line, and the file it reads
/// bytes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PptConfig {
    pub unit: u16,
    pub irq: u8,
    pub tape_path: PathBuf,
}

/// A paper-tape punch unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PchConfig {
    pub unit: u16,
    pub irq: u8,
    pub output_path: PathBuf,
}

/// A line printer unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LptConfig {
    pub unit: u16,
    pub irq: u8,
    pub output_path: PathBuf,
}

/// A telnet TTY unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtyUnitConfig {
    pub unit: u16,
    pub irq: u8,
    pub port: u16,
    #[serde(default)]
    pub interrupt_on_any_byte: bool,
    #[serde(default)]
    pub interrupt_on_esc: bool,
    #[serde(default)]
    pub interrupt_on_cr: bool,
    #[serde(default)]
    pub interrupt_threshold: Option<usize>,
    #[serde(default)]
    pub local_echo: bool,
}

impl From<&TtyUnitConfig> for TtyConfig {
    fn from(cfg: &TtyUnitConfig) -> Self {
        TtyConfig {
            interrupt_on_any_byte: cfg.interrupt_on_any_byte,
            interrupt_on_esc: cfg.interrupt_on_esc,
            interrupt_on_cr: cfg.interrupt_on_cr,
            interrupt_threshold: cfg.interrupt_threshold,
            local_echo: cfg.local_echo,
        }
    }
}

/// Full machine bring-up configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MachineConfig {
    /// Main memory size, in 36-bit words.
    pub memory_words: usize,
    #[serde(default)]
    pub ppt: Vec<PptConfig>,
    #[serde(default)]
    pub pch: Vec<PchConfig>,
    #[serde(default)]
    pub lpt: Vec<LptConfig>,
    #[serde(default)]
    pub tty: Vec<TtyUnitConfig>,
}

impl MachineConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| EmulatorError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&text)?)
    }

    /// Build a `Cpu` and wire up every configured device. The CPU is
    /// constructed halted; callers decide when to `start` it.
    pub fn build(&self) -> Result<Arc<Cpu>> {
        let cpu = Cpu::new(self.memory_words.max(1));
        let mut seen = std::collections::HashSet::new();

        for unit_cfg in &self.ppt {
            self.claim(&mut seen, unit_cfg.unit)?;
            let file = File::open(&unit_cfg.tape_path).map_err(|source| EmulatorError::DeviceIo {
                path: unit_cfg.tape_path.clone(),
                source,
            })?;
            let dev = Ppt::new(unit_cfg.unit, unit_cfg.irq, cpu.control(), file);
            cpu.add_device(unit_cfg.unit, Box::new(dev));
        }

        for unit_cfg in &self.pch {
            self.claim(&mut seen, unit_cfg.unit)?;
            let file = std::fs::OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&unit_cfg.output_path)
                .map_err(|source| EmulatorError::DeviceIo {
                    path: unit_cfg.output_path.clone(),
                    source,
                })?;
            let dev = Pch::new(unit_cfg.unit, unit_cfg.irq, cpu.control(), file);
            cpu.add_device(unit_cfg.unit, Box::new(dev));
        }

        for unit_cfg in &self.lpt {
            self.claim(&mut seen, unit_cfg.unit)?;
            let file = std::fs::OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&unit_cfg.output_path)
                .map_err(|source| EmulatorError::DeviceIo {
                    path: unit_cfg.output_path.clone(),
                    source,
                })?;
            let dev = Lpt::new(unit_cfg.unit, unit_cfg.irq, cpu.control(), file);
            cpu.add_device(unit_cfg.unit, Box::new(dev));
        }

        for unit_cfg in &self.tty {
            self.claim(&mut seen, unit_cfg.unit)?;
            let dev = Tty::new(
                unit_cfg.unit,
                unit_cfg.irq,
                cpu.control(),
                unit_cfg.port,
                TtyConfig::from(unit_cfg),
            )
            .map_err(|source| EmulatorError::TtyBind {
                port: unit_cfg.port,
                source,
            })?;
            cpu.add_device(unit_cfg.unit, Box::new(dev));
        }

        Ok(cpu)
    }

    fn claim(&self, seen: &mut std::collections::HashSet<u16>, unit: u16) -> Result<()> {
        if !seen.insert(unit) {
            return Err(EmulatorError::DuplicateUnit(unit));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_toml() {
        let text = r#"
            memory_words = 65536

            [[ppt]]
            unit = 0o10
            irq = 3
            tape_path = "/dev/null"
        "#;
        let cfg: MachineConfig = toml::from_str(text).unwrap();
        assert_eq!(cfg.memory_words, 65536);
        assert_eq!(cfg.ppt.len(), 1);
        assert_eq!(cfg.ppt[0].irq, 3);
    }

    #[test]
    fn default_config_has_no_devices() {
        let cfg = MachineConfig::default();
        assert!(cfg.ppt.is_empty());
        assert!(cfg.tty.is_empty());
    }
}
