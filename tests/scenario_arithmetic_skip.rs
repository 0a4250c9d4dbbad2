//! End-to-end: two self-XOR accumulator instructions, the second always
//! skipping, over a word a naive fetch would treat as an illegal
//! instruction (spec.md §8, scenario 1).

use ist66::Cpu;

/// AA-class word: opcode(4) rc(1) source(4) dest(4) function(3)
/// carry_init(2) skip_cond(3) no_load(1) mask(7) rotate(7), MSB first.
fn aa_word(opcode: u8, rc: bool, source: usize, dest: usize, function: u8, skip_cond: u8) -> u64 {
    ((opcode as u64 & 0xF) << 32)
        | ((rc as u64) << 31)
        | ((source as u64 & 0xF) << 27)
        | ((dest as u64 & 0xF) << 23)
        | ((function as u64 & 0x7) << 20)
        | ((skip_cond as u64 & 0x7) << 15)
}

#[test]
fn always_skip_instruction_jumps_over_the_following_word() {
    let cpu = Cpu::new(16);

    // XOR A1,A1 (opcode low bit 1, function 7 => ALU op 15 = XOR, skip
    // never): clears A1.
    cpu.poke(0, aa_word(0o17, false, 1, 1, 7, 0)).unwrap();
    // XOR A2,A2 with skip-always: always takes the skip.
    cpu.poke(1, aa_word(0o17, false, 2, 2, 7, 1)).unwrap();
    // A word that would raise X_INST if ever fetched (top9 = 0o200 is
    // outside every defined instruction class).
    cpu.poke(2, 0o200u64 << 27).unwrap();

    cpu.set_a(1, 0o777);
    cpu.set_a(2, 0o777);
    cpu.set_pc(0);

    cpu.start(true);
    cpu.join();
    assert_eq!(cpu.get_a(1), 0);
    assert_eq!(cpu.pc(), 1);

    cpu.start(true);
    cpu.join();
    assert_eq!(cpu.get_a(2), 0);
    assert_eq!(cpu.pc(), 3);
}
