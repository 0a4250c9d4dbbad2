//! End-to-end: `ISZ` on a cell holding 2^36-1 wraps to zero and takes the
//! skip (spec.md §8, scenario 3).

use ist66::Cpu;

fn mr_word(function: u8, indirect: bool, index: u8, disp: i32) -> u64 {
    let disp_u = (disp as i64 & 0x3FFFF) as u64;
    ((function as u64 & 0xF) << 23) | ((indirect as u64) << 22) | ((index as u64 & 0xF) << 18) | disp_u
}

#[test]
fn isz_wraps_to_zero_and_skips() {
    let cpu = Cpu::new(256);

    // ISZ 100 (function 2, direct, index 0, disp 0o100).
    cpu.poke(0, mr_word(2, false, 0, 0o100)).unwrap();
    cpu.poke(0o100, 0xF_FFFF_FFFF).unwrap();
    cpu.set_pc(0);

    cpu.start(true);
    cpu.join();

    assert_eq!(cpu.peek(0o100).unwrap(), 0);
    assert_eq!(cpu.pc(), 2);
}
