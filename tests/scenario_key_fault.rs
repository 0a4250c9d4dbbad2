//! End-to-end: a page key mismatch on a memory-reference read vectors
//! through level 0 as `X_PPFR` (spec.md §8, scenario 4).

use ist66::Cpu;

fn mr_word(function: u8, index: u8, disp: i32) -> u64 {
    let disp_u = (disp as i64 & 0x3FFFF) as u64;
    ((function as u64 & 0xF) << 23) | ((index as u64 & 0xF) << 18) | disp_u
}

/// Supervisor/misc word with the shared MR-style low 23 bits (only STK
/// uses them here; STCTL ignores everything but its low 3 bits).
fn smi_word(subopcode: u8, reg: u8, low23: u64) -> u64 {
    (0o06u64 << 30) | ((subopcode as u64 & 0x7) << 27) | ((reg as u64 & 0xF) << 23) | (low23 & 0x7FFFFF)
}

#[test]
fn key_mismatch_on_read_vectors_through_level_zero_as_ppfr() {
    let cpu = Cpu::new(0x2000);

    // STK at 0x100: A1 holds the key to stamp (0x42) onto the page
    // containing 0x1000. Supervisor-only; PSW key starts at 0, so this
    // succeeds.
    cpu.set_a(1, 0x42);
    cpu.poke(0x100, smi_word(4, 1, mr_word(0, 0, 0x1000) & 0x7FFFFF)).unwrap();

    // STCTL at 0x101: C0 (PSW) <- A2, where A2 packs key=0x43 (mismatched
    // against the page's 0x42) with PC=0x101; STCTL still advances PC by
    // one afterward (it returns a plain `Advance::Next`, like any other
    // non-branching instruction), landing exactly on the ISZ at 0x102.
    cpu.set_a(2, (0x43u64 << 28) | 0x101);
    cpu.poke(0x101, smi_word(6, 2, 0)).unwrap();

    // ISZ at 0x102: reads memory[0x1000] under the now-current key 0x43,
    // which the key unit rejects (ordinary page 0x42 accepts only key 0
    // or key 0x42).
    cpu.poke(0x102, mr_word(2, 0, 0x1000)).unwrap();

    cpu.set_pc(0x100);

    cpu.start(true);
    cpu.join();
    cpu.start(true);
    cpu.join();
    assert_eq!(cpu.pc(), 0x102, "STCTL should land PC at the ISZ via the packed PSW");

    cpu.start(true);
    cpu.join();

    // The key fault aborts the ISZ before it ever writes back, and the
    // level-0 vector (untouched, all zero) sends PC to 0 with key 0.
    assert_eq!(cpu.peek(0x1000).unwrap(), 0);
    assert_eq!(cpu.pc(), 0);
}
