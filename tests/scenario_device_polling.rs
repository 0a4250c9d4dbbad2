//! End-to-end: a paper-tape-reader polling loop drives a real worker
//! thread and IRQ line through the full run loop (spec.md §8, scenario
//! 2).

use std::io::Write;
use std::time::Duration;

use ist66::device::ppt::Ppt;
use ist66::Cpu;

fn io_word(dest: u8, ctl: u8, transfer: u8, device: u16) -> u64 {
    (0o670u64 << 27)
        | ((dest as u64 & 0xF) << 23)
        | ((ctl as u64 & 0x3) << 16)
        | ((transfer as u64 & 0xF) << 12)
        | (device as u64 & 0xFFF)
}

fn mr_word(function: u8, index: u8, disp: i32) -> u64 {
    let disp_u = (disp as i64 & 0x3FFFF) as u64;
    ((function as u64 & 0xF) << 23) | ((index as u64 & 0xF) << 18) | disp_u
}

#[test]
fn polling_loop_reads_one_byte_from_the_tape() {
    let mut tape = tempfile::NamedTempFile::new().unwrap();
    tape.write_all(b"H").unwrap();
    let tape_path = tape.path().to_path_buf();

    let cpu = Cpu::new(64);
    let file = std::fs::File::open(&tape_path).unwrap();
    let ppt = Ppt::new(0o10, 5, cpu.control(), file);
    cpu.add_device(0o10, Box::new(ppt));

    // NTS 10: start the reader (ctl=Start, transfer odd so no register
    // write happens).
    cpu.poke(0, io_word(0, 1, 1, 0o10)).unwrap();
    // SKPDN 10: status transfer, ctl=2 (skip-if-done).
    cpu.poke(1, io_word(0, 2, 14, 0o10)).unwrap();
    // JMP .-1: loop back to SKPDN while not done.
    cpu.poke(2, mr_word(0, 2, -1)).unwrap();
    // INS 0,10,0: transfer==0, ctl=NoOp, load the byte into A0.
    cpu.poke(3, io_word(0, 0, 0, 0o10)).unwrap();
    // HLT: stop once the byte is in, so the free-run doesn't loop around
    // and read past EOF before we can observe A0.
    cpu.poke(4, (0o06u64 << 30) | (2u64 << 23)).unwrap();

    cpu.set_a(2, 0);
    cpu.set_pc(0);
    cpu.start(false);

    for _ in 0..200 {
        if !cpu.is_running() {
            break;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cpu.stop();

    assert_eq!(cpu.get_a(0), b'H' as u64);
}
