/*!
Effective-address computation shared by every memory-reference instruction
class: one indirect bit, a 4-bit index selector with several
special-cased values, and an 18-bit signed displacement. See
`Cpu::comp_mr`'s caller for how the two-level indirect auto-modify
writeback is staged and later committed.
*/

use crate::cpu::state::{A_SP, State};
use crate::memory::{Fault, MemResult, Memory};

fn ext18(v: u64) -> i64 {
    if v & (1 << 17) != 0 {
        (v | 0xFFFF_FFFF_FFFC_0000) as i64
    } else {
        v as i64
    }
}

fn ext6(v: u64) -> i64 {
    if v & (1 << 5) != 0 {
        (v | 0xFFFF_FFFF_FFFF_FFC0) as i64
    } else {
        v as i64
    }
}

pub const MASK_ADDR: u64 = 0x7FF_FFFF;
const MASK_36: u64 = (1u64 << 36) - 1;

/// Compute the effective address for a memory-reference instruction word.
/// On success returns the (masked to 27 bits) address; faults propagate
/// the same way a direct memory access would. A two-level indirect
/// auto-increment/decrement stages its writeback into `state.inc_addr` /
/// `state.inc_data` / `state.do_inc`, to be committed by the run loop only
/// after the host instruction completes.
pub fn comp_mr(state: &mut State, memory: &Memory, inst: u64) -> MemResult<u32> {
    let indirect = (inst >> 22) & 1 != 0;
    let index = ((inst >> 18) & 0xF) as usize;
    let disp_u = inst & 0x3FFFF;
    let disp = ext18(disp_u);

    let ea_l: u64 = match index {
        0 => disp as u64,
        1 => (((state.cw() & 0x3FFFF) << 9) as i64 + disp) as u64,
        2 => (state.pc() as i64 + disp) as u64,
        14 => {
            let ea = state.a[A_SP];
            state.a[A_SP] = (state.a[A_SP] as i64).wrapping_add(disp) as u64 & MASK_36;
            ea
        }
        15 => {
            state.a[A_SP] = (state.a[A_SP] as i64).wrapping_sub(disp) as u64 & MASK_36;
            state.a[A_SP]
        }
        _ => (state.a[index] as i64 + disp) as u64,
    } & MASK_36;

    if !indirect {
        return Ok((ea_l & MASK_ADDR) as u32);
    }

    let new_ea = memory.read(state.key(), (ea_l & MASK_ADDR) as u32)?;
    if new_ea & (1 << 35) == 0 {
        return Ok((new_ea & MASK_ADDR) as u32);
    }

    let mode = (new_ea >> 33) & 3;
    let inc = ext6((new_ea >> 27) & 0x3F);
    let base = new_ea & MASK_ADDR;

    match mode {
        0 => {
            let new_disp = ((base as i64 + inc) as u64) & MASK_ADDR;
            state.do_inc = true;
            state.inc_addr = (ea_l & MASK_ADDR) as u32;
            state.inc_data = new_disp | (new_ea & !MASK_ADDR);
            Ok(base as u32)
        }
        1 => {
            let new_disp = ((base as i64 - inc) as u64) & MASK_ADDR;
            state.do_inc = true;
            state.inc_addr = (ea_l & MASK_ADDR) as u32;
            state.inc_data = new_disp | (new_ea & !MASK_ADDR);
            Ok(new_disp as u32)
        }
        _ => Err(Fault::MemFault),
    }
}
