/*!
IOCPU: an optional 18-bit satellite processor modelled on the PDP-8,
sharing the host's physical memory.

`original_source/iocpu.c` confirms spec.md §4.6 is intentionally partial
upstream — only the memory-window split (`io_read_mem`/`io_write_mem`)
and a single dispatch fragment (`case 5: B`, a branch-and-link) exist in
the source this spec was distilled from. This module implements the
memory window and the documented structural pieces (construction,
attaching to a host CPU, host IRQ assertion, the API-pending flag) but
does not invent the rest of the IOCPU's opcode table; spec.md names this
explicitly as a structural placeholder, not an omission to fill in.
*/

use std::sync::Arc;

use crate::cpu::Cpu;
use crate::device::IrqLineOps;
use crate::memory::MemResult;

/// IOCPU words are 18 bits wide.
pub const WORD_BITS: u32 = 18;
pub const WORD_MASK: u64 = (1 << WORD_BITS) - 1;
/// Size of each half of the IOCPU's address space (local, then host).
pub const HALF_SPAN: u32 = 1 << WORD_BITS;

/// One IOCPU instance, bridged onto a host `Cpu`'s physical memory.
pub struct Iocpu {
    ac: u64,
    idx_lo: u64,
    idx_hi: u64,
    pc: u32,
    io_link: u64,
    ion: bool,
    api_pending: bool,
    host: Arc<Cpu>,
    /// Host word address where this IOCPU's private memory region begins;
    /// local address `a` packs into host word `private_base + a/2`, low
    /// half for even `a`, high half for odd `a`.
    private_base: u32,
    /// Host interrupt line this IOCPU asserts on a privileged IOT.
    host_irq: u8,
}

impl Iocpu {
    /// Attach a new IOCPU to `host`, backing its private memory at host
    /// word `private_base` and asserting `host_irq` on privileged IOTs.
    pub fn new(host: Arc<Cpu>, private_base: u32, host_irq: u8) -> Self {
        Self {
            ac: 0,
            idx_lo: 0,
            idx_hi: 0,
            pc: 0,
            io_link: 0,
            ion: false,
            api_pending: false,
            host,
            private_base,
            host_irq,
        }
    }

    pub fn pc(&self) -> u32 {
        self.pc
    }

    pub fn set_pc(&mut self, pc: u32) {
        self.pc = pc & (WORD_MASK as u32);
    }

    pub fn ion(&self) -> bool {
        self.ion
    }

    pub fn api_pending(&self) -> bool {
        self.api_pending
    }

    /// Read one 18-bit word from the IOCPU's own address space. Addresses
    /// below `HALF_SPAN` hit the packed private region; addresses at or
    /// above it alias host memory directly, through the host's key unit
    /// with key 0 (spec.md §4.6).
    pub fn io_read_mem(&self, addr: u32) -> MemResult<u64> {
        let local = addr & (2 * HALF_SPAN - 1);
        if local < HALF_SPAN {
            let host_word = self.private_base + local / 2;
            let packed = self.host.host_read(host_word)?;
            Ok(if local & 1 == 0 {
                packed & WORD_MASK
            } else {
                (packed >> WORD_BITS) & WORD_MASK
            })
        } else {
            let host_addr = local - HALF_SPAN;
            Ok(self.host.host_read(host_addr)? & WORD_MASK)
        }
    }

    pub fn io_write_mem(&self, addr: u32, value: u64) -> MemResult<()> {
        let local = addr & (2 * HALF_SPAN - 1);
        let value = value & WORD_MASK;
        if local < HALF_SPAN {
            let host_word = self.private_base + local / 2;
            let packed = self.host.host_read(host_word)?;
            let new_packed = if local & 1 == 0 {
                (packed & !WORD_MASK) | value
            } else {
                (packed & WORD_MASK) | (value << WORD_BITS)
            };
            self.host.host_write(host_word, new_packed)
        } else {
            let host_addr = local - HALF_SPAN;
            self.host.host_write(host_addr, value)
        }
    }

    /// Assert the host IRQ line and raise the API-pending flag, as any
    /// privileged IOT does (spec.md §4.6).
    pub fn assert_host_irq(&mut self) {
        self.api_pending = true;
        self.host.control().assert(self.host_irq);
    }

    pub fn clear_api_pending(&mut self) {
        self.api_pending = false;
    }

    /// The one documented dispatch fragment upstream implements: `case 5:
    /// B`, a branch-and-link. Saves `PC+1` to the link register, then
    /// jumps to `operand`.
    pub fn exec_branch_and_link(&mut self, operand: u32) {
        self.io_link = (self.pc.wrapping_add(1) as u64) & WORD_MASK;
        self.pc = operand & (WORD_MASK as u32);
    }

    pub fn link(&self) -> u64 {
        self.io_link
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn private_memory_packs_two_words_per_host_word() {
        let host = Cpu::new(256);
        let io = Iocpu::new(Arc::clone(&host), 128, 5);

        io.io_write_mem(0, 0o123456).unwrap();
        io.io_write_mem(1, 0o7).unwrap();

        let packed = host.host_read(128).unwrap();
        assert_eq!(packed & WORD_MASK, 0o123456);
        assert_eq!((packed >> WORD_BITS) & WORD_MASK, 0o7);
        assert_eq!(io.io_read_mem(0).unwrap(), 0o123456);
        assert_eq!(io.io_read_mem(1).unwrap(), 0o7);
    }

    #[test]
    fn upper_half_aliases_host_memory_directly() {
        let host = Cpu::new(256);
        let io = Iocpu::new(Arc::clone(&host), 0, 5);

        io.io_write_mem(HALF_SPAN, 0o42).unwrap();
        assert_eq!(host.host_read(0).unwrap(), 0o42);
        assert_eq!(io.io_read_mem(HALF_SPAN).unwrap(), 0o42);
    }

    #[test]
    fn branch_and_link_saves_return_address() {
        let host = Cpu::new(64);
        let mut io = Iocpu::new(Arc::clone(&host), 0, 5);
        io.set_pc(0o100);
        io.exec_branch_and_link(0o200);
        assert_eq!(io.pc(), 0o200);
        assert_eq!(io.link(), 0o101);
    }

    #[test]
    fn privileged_iot_sets_api_pending_and_asserts_host_irq() {
        let host = Cpu::new(64);
        let mut io = Iocpu::new(Arc::clone(&host), 0, 5);
        assert!(!io.api_pending());
        io.assert_host_irq();
        assert!(io.api_pending());
    }
}
