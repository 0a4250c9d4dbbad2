//! End-to-end: `CLM`/`RTM` over a save mask selecting A0..A3, exercising
//! the two-level push/pop through the full run loop (spec.md §8,
//! scenario 5).

use ist66::Cpu;

fn callret_word(function: u8, disp: i32) -> u64 {
    let disp_u = (disp as i64 & 0x3FFFF) as u64;
    (0o100u64 << 27) | ((function as u64 & 0xF) << 23) | disp_u
}

#[test]
fn clm_then_rtm_restores_accumulators_stack_pointer_and_return_address() {
    let cpu = Cpu::new(8192);

    for n in 0..16 {
        cpu.set_a(n, n as u64);
    }
    cpu.set_a(13, 0x1000);

    // Save mask at 0x200: bits 0..3 set, selecting A0..A3.
    cpu.poke(0x200, 0x000F).unwrap();
    // CLM 0x200 at address 0; its own PC+1 (1) becomes the return address.
    cpu.poke(0, callret_word(0, 0x200)).unwrap();
    // The call lands at ea+1 = 0x201.
    cpu.poke(0x201, callret_word(1, 0)).unwrap();
    cpu.set_pc(0);

    cpu.start(true);
    cpu.join();

    assert_eq!(cpu.pc(), 0x201);
    assert_eq!(cpu.get_a(13), 0x1000 - 6);

    // Clobber what CLM saved so RTM's restore is actually exercised.
    cpu.set_a(0, 0o777);
    cpu.set_a(1, 0o777);
    cpu.set_a(2, 0o777);
    cpu.set_a(3, 0o777);

    cpu.start(true);
    cpu.join();

    assert_eq!(cpu.pc(), 1);
    assert_eq!(cpu.get_a(13), 0x1000);
    assert_eq!(cpu.get_a(0), 0);
    assert_eq!(cpu.get_a(1), 1);
    assert_eq!(cpu.get_a(2), 2);
    assert_eq!(cpu.get_a(3), 3);
}
