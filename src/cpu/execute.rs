/*!
Instruction semantics for every class spec.md §4.4 names. `execute`
decodes one instruction word and carries out its effect against `state`
and `memory`, returning how the program counter should move next (or the
exception the instruction raised, for the run loop to vector).

Every fallible memory access goes through `read_mem`/`write_mem`, which
translate `memory::Fault` into the 4-bit exception taxonomy of spec.md §7
(`MEMX` for an out-of-range address, `PPFR`/`PPFW` for a key mismatch on
read vs. write).
*/

use crate::alu::{self, CarryInit, SkipCond, MASK_36};
use crate::cpu::address::{comp_mr, MASK_ADDR};
use crate::cpu::decode::{self, Class};
use crate::cpu::state::{A_LINK, A_SP, State};
use crate::device::{Ctl, ControlState, DeviceTable, IrqLine, IrqLineOps};
use crate::interrupt::ExceptionCode;
use crate::memory::{Fault, Memory};

/// How the program counter should move after one instruction.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Advance {
    /// Default: PC += 1.
    Next,
    /// A skip condition fired: PC += 2.
    Skip,
    /// The instruction already set PC itself (branch, call, return, HLT,
    /// RFI, or an EDT/ESK that must leave PC untouched for the run loop
    /// to stage its execute-next step).
    None,
}

fn fault_to_exc(fault: Fault, write: bool) -> ExceptionCode {
    match fault {
        Fault::MemFault => ExceptionCode::NoSuchMemory,
        Fault::KeyFault => {
            if write {
                ExceptionCode::ProblemProtectionWrite
            } else {
                ExceptionCode::ProblemProtectionRead
            }
        }
    }
}

fn read_mem(memory: &Memory, key: u8, addr: u32) -> Result<u64, ExceptionCode> {
    memory.read(key, addr).map_err(|f| fault_to_exc(f, false))
}

fn write_mem(memory: &mut Memory, key: u8, addr: u32, data: u64) -> Result<(), ExceptionCode> {
    memory.write(key, addr, data).map_err(|f| fault_to_exc(f, true))
}

fn effective_addr(state: &mut State, memory: &Memory, inst: u64) -> Result<u32, ExceptionCode> {
    comp_mr(state, memory, inst).map_err(|f| fault_to_exc(f, false))
}

/// Run the ALU op table with the carry-in taken from (and carry-out
/// written back to) `state`, returning the 36-bit value.
fn alu_op(
    state: &mut State,
    a: u64,
    b: u64,
    op: u8,
    cond: SkipCond,
) -> (u64, bool) {
    let r = alu::compute(
        a,
        b,
        state.carry(),
        op,
        CarryInit::Keep,
        cond,
        false,
        false,
        0,
        0,
    );
    state.set_carry(alu::carry_of(r));
    (alu::value_of(r), alu::skip_of(r))
}

/// Decode and execute one instruction word. `control` and `devices` are
/// only touched by the I/O and supervisor/misc classes.
pub fn execute(
    state: &mut State,
    memory: &mut Memory,
    control: &IrqLine,
    devices: &mut DeviceTable,
    inst: u64,
) -> Result<Advance, ExceptionCode> {
    match decode::classify(inst) {
        Class::MemoryReference => exec_mr(state, memory, inst),
        Class::AccumulatorMemory => exec_am(state, memory, inst),
        Class::MultiplyDivide => exec_muldiv(state, memory, inst),
        Class::CallReturn => exec_callret(state, memory, inst),
        Class::Io => exec_io(state, devices, inst),
        Class::Supervisor => exec_smi(state, memory, control, inst),
        Class::AccumulatorAccumulator => Ok(exec_aa(state, inst)),
        Class::Illegal => Err(ExceptionCode::IllegalInstruction),
    }
}

fn exec_aa(state: &mut State, inst: u64) -> Advance {
    let f = decode::aa_fields(inst);
    let op = decode::aa_op(&f);
    let a = state.get_a(f.source);
    let b = state.get_a(f.dest);

    let (mk, write_dest) = if decode::aa_is_adr(inst) {
        (-f.rotate, decode::aa_adr_dest(inst))
    } else {
        (f.mask, f.dest)
    };

    let ci = CarryInit::from_bits(f.carry_init);
    let cond = SkipCond::from_bits(f.skip_cond);
    let r = alu::compute(a, b, state.carry(), op, ci, cond, f.no_load, f.rc, mk, f.rotate);

    state.set_carry(alu::carry_of(r));
    state.set_a(write_dest, alu::value_of(r));

    if alu::skip_of(r) { Advance::Skip } else { Advance::Next }
}

fn exec_mr(state: &mut State, memory: &mut Memory, inst: u64) -> Result<Advance, ExceptionCode> {
    let key = state.key();
    match decode::mr_function(inst) {
        0 => {
            // JMP
            let ea = effective_addr(state, memory, inst)?;
            state.set_pc(ea);
            Ok(Advance::None)
        }
        1 => {
            // JSR: A12 <- PC+1, PC <- ea.
            let ea = effective_addr(state, memory, inst)?;
            state.set_a(A_LINK, (state.pc().wrapping_add(1)) as u64);
            state.set_pc(ea);
            Ok(Advance::None)
        }
        2 => {
            // ISZ: increment, skip next if zero.
            let ea = effective_addr(state, memory, inst)?;
            let val = read_mem(memory, key, ea)?;
            let (result, skip) = alu_op(state, val, 0, 3, SkipCond::ResultZero);
            write_mem(memory, key, ea, result)?;
            Ok(if skip { Advance::Skip } else { Advance::Next })
        }
        3 => {
            // DSZ: decrement, skip next if zero.
            let ea = effective_addr(state, memory, inst)?;
            let val = read_mem(memory, key, ea)?;
            let (result, skip) = alu_op(state, val, MASK_36, 6, SkipCond::ResultZero);
            write_mem(memory, key, ea, result)?;
            Ok(if skip { Advance::Skip } else { Advance::Next })
        }
        _ => Err(ExceptionCode::UnimplementedInstruction),
    }
}

fn exec_am(state: &mut State, memory: &mut Memory, inst: u64) -> Result<Advance, ExceptionCode> {
    let key = state.key();
    let reg = decode::reg_field(inst);

    match decode::am_opcode(inst) {
        0o1 | 0o2 => {
            // EDT / ESK: synthesize the next instruction as memory[ea] OR A[reg].
            let ea = effective_addr(state, memory, inst)?;
            let mval = read_mem(memory, key, ea)?;
            let (word, _) = alu_op(state, mval, state.get_a(reg), 10, SkipCond::Never);
            state.xeq_inst = word;
            state.do_edit = true;
            state.do_edsk = decode::am_opcode(inst) == 0o2;
            Ok(Advance::None)
        }
        0o3 => {
            // LAD: load the effective address itself, not its contents.
            let ea = effective_addr(state, memory, inst)?;
            state.set_a(reg, ea as u64);
            Ok(Advance::Next)
        }
        0o4 => {
            // AAD: A[reg] <- A[reg] + ea.
            let ea = effective_addr(state, memory, inst)?;
            let (result, _) = alu_op(state, ea as u64, state.get_a(reg), 6, SkipCond::Never);
            state.set_a(reg, result);
            Ok(Advance::Next)
        }
        0o5 => {
            // ISE: increment A[reg], skip if it now equals memory[ea].
            // Memory is read for the comparison only, never written.
            let ea = effective_addr(state, memory, inst)?;
            let mval = read_mem(memory, key, ea)?;
            let (result, _) = alu_op(state, 1, state.get_a(reg), 6, SkipCond::Never);
            state.set_a(reg, result);
            Ok(if result == mval { Advance::Skip } else { Advance::Next })
        }
        0o6 => {
            // DSE: decrement A[reg], skip if it now equals memory[ea].
            // Memory is read for the comparison only, never written.
            let ea = effective_addr(state, memory, inst)?;
            let mval = read_mem(memory, key, ea)?;
            let (result, _) = alu_op(state, 1, state.get_a(reg), 5, SkipCond::Never);
            state.set_a(reg, result);
            Ok(if result == mval { Advance::Skip } else { Advance::Next })
        }
        0o7 => {
            // LAS: load the effective address shifted into the upper field.
            let ea = effective_addr(state, memory, inst)?;
            state.set_a(reg, ((ea as u64) << 17) & MASK_36);
            Ok(Advance::Next)
        }
        0o10 => {
            // LCO: load one's complement of memory.
            let ea = effective_addr(state, memory, inst)?;
            let val = read_mem(memory, key, ea)?;
            let (result, _) = alu_op(state, val, 0, 0, SkipCond::Never);
            state.set_a(reg, result);
            Ok(Advance::Next)
        }
        0o11 => {
            // LNG: load the two's-complement negation of memory.
            let ea = effective_addr(state, memory, inst)?;
            let val = read_mem(memory, key, ea)?;
            let (result, _) = alu_op(state, val, 0, 1, SkipCond::Never);
            state.set_a(reg, result);
            Ok(Advance::Next)
        }
        0o12 => {
            // LAC: plain load.
            let ea = effective_addr(state, memory, inst)?;
            let val = read_mem(memory, key, ea)?;
            state.set_a(reg, val);
            Ok(Advance::Next)
        }
        0o13 => {
            // DAC: store.
            let ea = effective_addr(state, memory, inst)?;
            write_mem(memory, key, ea, state.get_a(reg))?;
            Ok(Advance::Next)
        }
        0o14 => {
            // ADC: one's-complement add, the chained-carry counterpart to SUB.
            let ea = effective_addr(state, memory, inst)?;
            let val = read_mem(memory, key, ea)?;
            let (result, _) = alu_op(state, val, state.get_a(reg), 4, SkipCond::Never);
            state.set_a(reg, result);
            Ok(Advance::Next)
        }
        0o15 => {
            // SUB: AC <- AC - mem.
            let ea = effective_addr(state, memory, inst)?;
            let val = read_mem(memory, key, ea)?;
            let (result, _) = alu_op(state, val, state.get_a(reg), 5, SkipCond::Never);
            state.set_a(reg, result);
            Ok(Advance::Next)
        }
        0o16 => {
            // ADD: AC <- AC + mem.
            let ea = effective_addr(state, memory, inst)?;
            let val = read_mem(memory, key, ea)?;
            let (result, _) = alu_op(state, val, state.get_a(reg), 6, SkipCond::Never);
            state.set_a(reg, result);
            Ok(Advance::Next)
        }
        0o17 => {
            // AND
            let ea = effective_addr(state, memory, inst)?;
            let val = read_mem(memory, key, ea)?;
            let (result, _) = alu_op(state, val, state.get_a(reg), 7, SkipCond::Never);
            state.set_a(reg, result);
            Ok(Advance::Next)
        }
        0o22 => {
            // IOR
            let ea = effective_addr(state, memory, inst)?;
            let val = read_mem(memory, key, ea)?;
            let (result, _) = alu_op(state, val, state.get_a(reg), 10, SkipCond::Never);
            state.set_a(reg, result);
            Ok(Advance::Next)
        }
        0o26 => {
            // XOR
            let ea = effective_addr(state, memory, inst)?;
            let val = read_mem(memory, key, ea)?;
            let (result, _) = alu_op(state, val, state.get_a(reg), 15, SkipCond::Never);
            state.set_a(reg, result);
            Ok(Advance::Next)
        }
        _ => Err(ExceptionCode::UnimplementedInstruction),
    }
}

fn sext36(v: u64) -> i64 {
    let v = v & MASK_36;
    if v & (1 << 35) != 0 { (v as i64) - (1i64 << 36) } else { v as i64 }
}

const MASK_72: u128 = (1u128 << 72) - 1;

/// Sign-magnitude 36x36 -> 72 signed multiply, matching the original
/// `xmul`: negate any negative operand to its magnitude, multiply
/// unsigned, then negate the 72-bit product if exactly one operand was
/// negative. Returned as a 72-bit two's-complement value.
fn xmul(a: u64, b: u64) -> u128 {
    let a_neg = a & (1 << 35) != 0;
    let b_neg = b & (1 << 35) != 0;
    let a_mag = if a_neg { (!a).wrapping_add(1) & MASK_36 } else { a };
    let b_mag = if b_neg { (!b).wrapping_add(1) & MASK_36 } else { b };
    let mag = (a_mag as u128) * (b_mag as u128);
    if a_neg != b_neg {
        (!mag).wrapping_add(1) & MASK_72
    } else {
        mag
    }
}

fn exec_muldiv(state: &mut State, memory: &mut Memory, inst: u64) -> Result<Advance, ExceptionCode> {
    let key = state.key();
    let ea = effective_addr(state, memory, inst)?;
    let mval = read_mem(memory, key, ea)?;

    match decode::muldiv_function(inst) {
        0 => {
            // MPY: signed A1 * mem -> A2:A0.
            let product = xmul(state.get_a(1), mval);
            state.set_a(0, (product & MASK_36 as u128) as u64);
            state.set_a(2, ((product >> 36) & MASK_36 as u128) as u64);
            Ok(Advance::Next)
        }
        1 => {
            // MPA: MPY then add into A2:A0, complementing carry on overflow.
            let product = xmul(state.get_a(1), mval);
            mul_add_into(state, product);
            Ok(Advance::Next)
        }
        2 => {
            // MNA: multiply by two's-complement of mem, then add.
            let neg_mval = (!mval).wrapping_add(1) & MASK_36;
            let product = xmul(state.get_a(1), neg_mval);
            mul_add_into(state, product);
            Ok(Advance::Next)
        }
        _ => {
            // DIV: signed A0 / mem -> quotient A1, remainder A2.
            if mval == 0 {
                return Err(ExceptionCode::DivideByZero);
            }
            let dividend = sext36(state.get_a(0));
            let divisor = sext36(mval);
            let quotient = dividend / divisor;
            let remainder = dividend % divisor;
            state.set_a(1, (quotient as u64) & MASK_36);
            state.set_a(2, (remainder as u64) & MASK_36);
            Ok(Advance::Next)
        }
    }
}

fn mul_add_into(state: &mut State, product: u128) {
    let existing = ((state.get_a(2) as u128) << 36) | state.get_a(0) as u128;
    let sum = product + existing;
    let overflow = sum >> 72 != 0;
    if overflow {
        state.set_carry(!state.carry());
    }
    state.set_a(0, (sum & MASK_36 as u128) as u64);
    state.set_a(2, ((sum >> 36) & MASK_36 as u128) as u64);
}

fn exec_callret(state: &mut State, memory: &mut Memory, inst: u64) -> Result<Advance, ExceptionCode> {
    let key = state.key();

    match decode::callret_function(inst) {
        0 => {
            // CLM: push A15..A0 selected by the save mask, then the mask
            // itself, then the return address. Nothing commits to A13
            // until every write has succeeded.
            let ea = effective_addr(state, memory, inst)?;
            let mask = read_mem(memory, key, ea)? & 0xFFFF;
            let mut sp = state.a[A_SP];

            for n in (0..16).rev() {
                if mask & (1 << n) != 0 {
                    sp = sp.wrapping_sub(1) & MASK_36;
                    write_mem(memory, key, (sp & MASK_ADDR) as u32, state.get_a(n))?;
                }
            }
            sp = sp.wrapping_sub(1) & MASK_36;
            write_mem(memory, key, (sp & MASK_ADDR) as u32, mask)?;
            sp = sp.wrapping_sub(1) & MASK_36;
            write_mem(memory, key, (sp & MASK_ADDR) as u32, (state.pc().wrapping_add(1)) as u64)?;

            state.a[A_SP] = sp;
            state.set_pc(ea.wrapping_add(1));
            Ok(Advance::None)
        }
        1 => {
            // RTM: pop return PC, then the mask, then the saved
            // accumulators. If the mask restores A13 itself, the popped
            // value wins over the tracked stack pointer.
            let mut sp = state.a[A_SP];
            let ret_pc = read_mem(memory, key, (sp & MASK_ADDR) as u32)?;
            sp = sp.wrapping_add(1) & MASK_36;
            let mask = read_mem(memory, key, (sp & MASK_ADDR) as u32)? & 0xFFFF;
            sp = sp.wrapping_add(1) & MASK_36;

            let restored_sp = mask & (1 << A_SP) != 0;
            for n in 0..16 {
                if mask & (1 << n) != 0 {
                    let v = read_mem(memory, key, (sp & MASK_ADDR) as u32)?;
                    sp = sp.wrapping_add(1) & MASK_36;
                    state.a[n] = v & MASK_36;
                }
            }
            if !restored_sp {
                state.a[A_SP] = sp;
            }
            state.set_pc(ret_pc as u32);
            Ok(Advance::None)
        }
        _ => Err(ExceptionCode::UnimplementedInstruction),
    }
}

fn exec_io(state: &mut State, devices: &mut DeviceTable, inst: u64) -> Result<Advance, ExceptionCode> {
    if state.key() != 0 {
        return Err(ExceptionCode::ProblemProtectionSystem);
    }
    let f = decode::io_fields(inst);
    let device = devices.get_mut(&f.device).ok_or(ExceptionCode::NoSuchDevice)?;
    let data = state.get_a(f.dest);
    let result = device.io(data, Ctl::from_bits(f.ctl as u64), f.transfer);

    if f.transfer == 14 {
        let busy = result & 1 != 0;
        let done = result & 2 != 0;
        let take = match f.ctl {
            0 => busy,
            1 => !busy,
            2 => done,
            _ => !done,
        };
        return Ok(if take { Advance::Skip } else { Advance::Next });
    }

    if f.transfer < 14 && f.transfer % 2 == 0 {
        state.set_a(f.dest, result);
    }
    Ok(Advance::Next)
}

fn exec_smi(
    state: &mut State,
    memory: &mut Memory,
    control: &IrqLine,
    inst: u64,
) -> Result<Advance, ExceptionCode> {
    if state.key() != 0 {
        return Err(ExceptionCode::ProblemProtectionSystem);
    }
    let key = state.key();

    match decode::smi_subopcode(inst) {
        0 => {
            // HLT: A[reg] becomes the stop code, PC <- ea. The halt only
            // takes effect if no higher-priority unmasked IRQ is pending.
            let reg = decode::reg_field(inst);
            let ea = effective_addr(state, memory, inst)?;
            let stop_code = state.get_a(reg);
            state.stop_code = stop_code;
            state.set_pc(ea);

            let current_irql = crate::interrupt::current_irql(state.cw());
            let mut guard = control.0.lock().unwrap();
            guard.stop_code = stop_code;
            if halt_allowed(&guard, current_irql) {
                guard.running = false;
            }
            Ok(Advance::None)
        }
        1 => {
            // INT: software interrupt at level n = reg field.
            let level = decode::reg_field(inst) as u8;
            control.assert(level);
            Ok(Advance::Next)
        }
        2 => exec_smi_group2(state, memory, control, inst),
        3 => {
            // LDK: A[reg] <- page key of ea.
            let reg = decode::reg_field(inst);
            let ea = effective_addr(state, memory, inst)?;
            if ea as usize >= memory.size() {
                return Err(ExceptionCode::NoSuchMemory);
            }
            state.set_a(reg, memory.page_key(ea) as u64);
            Ok(Advance::Next)
        }
        4 => {
            // STK: page key of ea <- low 8 bits of A[reg].
            let reg = decode::reg_field(inst);
            let ea = effective_addr(state, memory, inst)?;
            memory
                .set_key(key, ea, state.get_a(reg) as u8)
                .map_err(|f| fault_to_exc(f, true))?;
            Ok(Advance::Next)
        }
        5 => {
            // LCT: A[reg] <- C[n], n = low 3 bits of the instruction.
            let reg = decode::reg_field(inst);
            let idx = (inst & 0x7) as usize;
            state.set_a(reg, state.c[idx]);
            Ok(Advance::Next)
        }
        6 => {
            // STCTL: C[n] <- A[reg].
            let reg = decode::reg_field(inst);
            let idx = (inst & 0x7) as usize;
            state.c[idx] = state.get_a(reg);
            Ok(Advance::Next)
        }
        _ => Err(ExceptionCode::UnimplementedInstruction),
    }
}

fn exec_smi_group2(
    state: &mut State,
    memory: &mut Memory,
    control: &IrqLine,
    inst: u64,
) -> Result<Advance, ExceptionCode> {
    let key = state.key();
    match decode::smi_subcode(inst) {
        0 => {
            // RFI: restore PSW/CW from the save slot the current CW points at.
            let (psw, cw) = crate::interrupt::leave(memory, state.cw());
            state.set_psw(psw);
            state.set_cw(cw);
            Ok(Advance::None)
        }
        1 => {
            // RMSK: load the mask from memory[ea], then RFI.
            let ea = effective_addr(state, memory, inst)?;
            let mask = read_mem(memory, key, ea)? & 0xFFFF;
            control.0.lock().unwrap().interrupts.set_mask(mask as u16);
            let (psw, cw) = crate::interrupt::leave(memory, state.cw());
            state.set_psw(psw);
            state.set_cw(cw);
            Ok(Advance::None)
        }
        2 => {
            // LDMSK: load the mask from memory[ea].
            let ea = effective_addr(state, memory, inst)?;
            let mask = read_mem(memory, key, ea)? & 0xFFFF;
            control.0.lock().unwrap().interrupts.set_mask(mask as u16);
            Ok(Advance::Next)
        }
        _ => {
            // STMSK: store the current mask into memory[ea].
            let ea = effective_addr(state, memory, inst)?;
            let mask = control.0.lock().unwrap().interrupts.mask() as u64;
            write_mem(memory, key, ea, mask)?;
            Ok(Advance::Next)
        }
    }
}

pub(crate) fn halt_allowed(control: &ControlState, current_irql: u8) -> bool {
    control.interrupts.min_pending() >= current_irql
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::new_control_state;
    use std::collections::HashMap;

    fn setup() -> (State, Memory, IrqLine, DeviceTable) {
        (State::new(), Memory::new(4096), new_control_state(), HashMap::new())
    }

    #[test]
    fn xor_self_clears_accumulator() {
        let (mut st, mut mem, ctrl, mut dev) = setup();
        // XOR A1,A1 (source=1, dest=1): clears A1 and sets carry=0.
        let inst = aa_word(0o17, false, 1, 1, 7, 0, 0, false, 0, 0);
        let adv = execute(&mut st, &mut mem, &ctrl, &mut dev, inst).unwrap();
        assert_eq!(st.get_a(1), 0);
        assert_eq!(adv, Advance::Next);
    }

    #[test]
    fn always_skip_advances_by_two_worth_of_pc() {
        let (mut st, mut mem, ctrl, mut dev) = setup();
        let inst = aa_word(0o17, false, 2, 2, 6, 0, 1, false, 0, 0);
        let adv = execute(&mut st, &mut mem, &ctrl, &mut dev, inst).unwrap();
        assert_eq!(adv, Advance::Skip);
    }

    #[test]
    fn isz_wraps_and_skips() {
        let (mut st, mut mem, ctrl, mut dev) = setup();
        mem.write(0, 100, MASK_36).unwrap();
        let inst = mr_word(2, false, 0, 100);
        let adv = execute(&mut st, &mut mem, &ctrl, &mut dev, inst).unwrap();
        assert_eq!(mem.read(0, 100).unwrap(), 0);
        assert_eq!(adv, Advance::Skip);
    }

    #[test]
    fn clm_then_rtm_round_trips_and_restores_stack_pointer() {
        let (mut st, mut mem, ctrl, mut dev) = setup();
        for n in 0..16u64 {
            st.set_a(n as usize, n);
        }
        st.a[A_SP] = 0x1000;
        mem.write(0, 0x200, 0x000F).unwrap(); // save A0..A3

        let clm = callret_word(0, 0x200);
        execute(&mut st, &mut mem, &ctrl, &mut dev, clm).unwrap();
        assert_eq!(st.a[A_SP], 0x1000 - 6);

        st.set_a(0, 999);
        st.set_a(3, 999);
        let rtm = callret_word(1, 0);
        execute(&mut st, &mut mem, &ctrl, &mut dev, rtm).unwrap();
        assert_eq!(st.get_a(0), 0);
        assert_eq!(st.get_a(3), 3);
        assert_eq!(st.a[A_SP], 0x1000);
    }

    #[test]
    fn clm_with_zero_mask_pushes_only_mask_and_return() {
        let (mut st, mut mem, ctrl, mut dev) = setup();
        st.a[A_SP] = 0x1000;
        mem.write(0, 0x200, 0).unwrap();
        let clm = callret_word(0, 0x200);
        execute(&mut st, &mut mem, &ctrl, &mut dev, clm).unwrap();
        assert_eq!(st.a[A_SP], 0x1000 - 2);
    }

    #[test]
    fn key_fault_on_read_vectors_as_ppfr() {
        let (mut st, mut mem, ctrl, mut dev) = setup();
        mem.set_key(0, 0, 0x42).unwrap();
        st.set_psw(crate::interrupt::set_pc(0x43u64 << 28, 0));
        let inst = mr_word(2, false, 0, 0); // ISZ: actually touches memory[ea]
        let err = execute(&mut st, &mut mem, &ctrl, &mut dev, inst).unwrap_err();
        assert_eq!(err, ExceptionCode::ProblemProtectionRead);
    }

    #[test]
    fn divide_by_zero_raises_divz() {
        let (mut st, mut mem, ctrl, mut dev) = setup();
        mem.write(0, 50, 0).unwrap();
        let inst = muldiv_word(3, 50);
        let err = execute(&mut st, &mut mem, &ctrl, &mut dev, inst).unwrap_err();
        assert_eq!(err, ExceptionCode::DivideByZero);
    }

    // --- tiny instruction-word builders used only by these tests ---

    fn aa_word(
        opcode: u8,
        rc: bool,
        source: u8,
        dest: u8,
        function: u8,
        carry_init: u8,
        skip_cond: u8,
        no_load: bool,
        mask: i8,
        rotate: i8,
    ) -> u64 {
        ((opcode as u64 & 0xF) << 32)
            | ((rc as u64) << 31)
            | ((source as u64 & 0xF) << 27)
            | ((dest as u64 & 0xF) << 23)
            | ((function as u64 & 0x7) << 20)
            | ((carry_init as u64 & 0x3) << 18)
            | ((skip_cond as u64 & 0x7) << 15)
            | ((no_load as u64) << 14)
            | (((mask as u8 as u64) & 0x7F) << 7)
            | ((rotate as u8 as u64) & 0x7F)
    }

    fn mr_word(function: u8, indirect: bool, index: u8, disp: u32) -> u64 {
        ((function as u64 & 0xF) << 23)
            | ((indirect as u64) << 22)
            | ((index as u64 & 0xF) << 18)
            | (disp as u64 & 0x3FFFF)
    }

    fn callret_word(function: u8, disp: u32) -> u64 {
        (0o100u64 << 27) | ((function as u64 & 0xF) << 23) | (disp as u64 & 0x3FFFF)
    }

    fn muldiv_word(function: u8, disp: u32) -> u64 {
        (0o30u64 << 27) | ((function as u64 & 0x3) << 25) | (disp as u64 & 0x3FFFF)
    }
}
