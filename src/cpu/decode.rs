/*!
Instruction word field layout and the top-level instruction-class
dispatch table (spec.md §4.4.2). All instruction classes below the
memory-reference class share the same low 23 bits for effective-address
computation (`comp_mr` in `cpu::address` reads only bits 0..22 and is
blind to whatever occupies bits 23..35 for a given class), so this module
only ever needs to extract the handful of fields a given class adds on
top of that shared footprint.
*/

/// The instruction classes named in spec.md §4.4.2, plus the mask/divide
/// table and the supervisor/misc table spec.md documents separately.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Class {
    /// Top 9 bits == 0.
    MemoryReference,
    /// Top 9 bits in 0o01..=0o27.
    AccumulatorMemory,
    /// Top 9 bits == 0o30.
    MultiplyDivide,
    /// Top 9 bits == 0o100.
    CallReturn,
    /// Top 9 bits == 0o670.
    Io,
    /// Top 6 bits == 0o06 (bits 30..35).
    Supervisor,
    /// Top 3 bits == 7 (bits 33..35).
    AccumulatorAccumulator,
    /// Anything else: X_INST.
    Illegal,
}

const TOP9_MR: u64 = 0o000;
const TOP9_MULDIV: u64 = 0o030;
const TOP9_CALLRET: u64 = 0o100;
const TOP9_IO: u64 = 0o670;

pub fn top9(inst: u64) -> u64 {
    (inst >> 27) & 0x1FF
}

pub fn top6(inst: u64) -> u64 {
    (inst >> 30) & 0x3F
}

pub fn top3(inst: u64) -> u64 {
    (inst >> 33) & 0x7
}

pub fn classify(inst: u64) -> Class {
    if top3(inst) == 0o7 {
        return Class::AccumulatorAccumulator;
    }
    if top6(inst) == 0o06 {
        return Class::Supervisor;
    }
    let t9 = top9(inst);
    match t9 {
        TOP9_MR => Class::MemoryReference,
        TOP9_MULDIV => Class::MultiplyDivide,
        TOP9_CALLRET => Class::CallReturn,
        TOP9_IO => Class::Io,
        0o1..=0o27 => Class::AccumulatorMemory,
        _ => Class::Illegal,
    }
}

/// The 4-bit function subfield memory-reference instructions carry at
/// bits 23..26 (spec.md §4.4.3).
pub fn mr_function(inst: u64) -> u8 {
    ((inst >> 23) & 0xF) as u8
}

/// The accumulator/register field shared by the AM, multiply/divide-low,
/// call/return, and supervisor classes at bits 23..26. Each class gives
/// it a different name (accumulator number, save-mask function,
/// subopcode operand, ...) but the bit position is the same everywhere
/// except memory-reference itself.
pub fn reg_field(inst: u64) -> usize {
    ((inst >> 23) & 0xF) as usize
}

/// AM opcode value: the same bits as `top9`, just named for this class.
pub fn am_opcode(inst: u64) -> u64 {
    top9(inst)
}

/// Multiply/divide function subfield, bits 25..26.
pub fn muldiv_function(inst: u64) -> u8 {
    ((inst >> 25) & 0x3) as u8
}

/// Call/return function subfield, bits 23..26 (0 = CLM, 1 = RTM).
pub fn callret_function(inst: u64) -> u8 {
    reg_field(inst) as u8
}

/// I/O instruction fields (spec.md §4.4.8): destination accumulator,
/// 2-bit control, 4-bit transfer select, 12-bit device id.
pub struct IoFields {
    pub dest: usize,
    pub ctl: u8,
    pub transfer: u8,
    pub device: u16,
}

pub fn io_fields(inst: u64) -> IoFields {
    IoFields {
        dest: ((inst >> 23) & 0xF) as usize,
        ctl: ((inst >> 16) & 0x3) as u8,
        transfer: ((inst >> 12) & 0xF) as u8,
        device: (inst & 0xFFF) as u16,
    }
}

/// Supervisor/misc subopcode, bits 27..29 (spec.md §4.4.9).
pub fn smi_subopcode(inst: u64) -> u8 {
    ((inst >> 27) & 0x7) as u8
}

/// The 2-bit subcode carried by the RFI/RMSK/LDMSK/STMSK group
/// (subopcode 2), bits 25..26.
pub fn smi_subcode(inst: u64) -> u8 {
    ((inst >> 25) & 0x3) as u8
}

/// Accumulator-to-accumulator field layout (spec.md §4.4.6), read from
/// the MSB side: 4-bit opcode | 1-bit rc | 4-bit source | 4-bit
/// destination | 3-bit function | 2-bit carry-init | 3-bit skip | 1-bit
/// no-load | 7-bit signed mask | 7-bit signed rotate.
pub struct AaFields {
    pub opcode: u8,
    pub rc: bool,
    pub source: usize,
    pub dest: usize,
    pub function: u8,
    pub carry_init: u8,
    pub skip_cond: u8,
    pub no_load: bool,
    pub mask: i32,
    pub rotate: i32,
}

fn sign_extend7(v: u64) -> i32 {
    let v = (v & 0x7F) as i32;
    if v & 0x40 != 0 { v - 0x80 } else { v }
}

pub fn aa_fields(inst: u64) -> AaFields {
    AaFields {
        opcode: ((inst >> 32) & 0xF) as u8,
        rc: (inst >> 31) & 1 != 0,
        source: ((inst >> 27) & 0xF) as usize,
        dest: ((inst >> 23) & 0xF) as usize,
        function: ((inst >> 20) & 0x7) as u8,
        carry_init: ((inst >> 18) & 0x3) as u8,
        skip_cond: ((inst >> 15) & 0x7) as u8,
        no_load: (inst >> 14) & 1 != 0,
        mask: sign_extend7((inst >> 7) & 0x7F),
        rotate: sign_extend7(inst & 0x7F),
    }
}

/// `op` as consumed by `alu::compute`: opcode's low bit, shifted up by
/// the 3-bit function field (spec.md §4.4.6).
pub fn aa_op(fields: &AaFields) -> u8 {
    (((fields.opcode & 1) as u8) << 3) | fields.function
}

/// ADR encoding is active when the top three bits of the mask field equal
/// `0b100` (`(mk & 0x70) == 0x40`, spec.md §9 Open Questions); it redirects
/// the write destination to bits 7..10 of the instruction and forces the
/// mask width to equal the (negated) rotate field.
pub fn aa_is_adr(inst: u64) -> bool {
    ((inst >> 7) & 0x7F) & 0x70 == 0x40
}

pub fn aa_adr_dest(inst: u64) -> usize {
    ((inst >> 7) & 0xF) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_memory_reference() {
        assert_eq!(classify(0), Class::MemoryReference);
    }

    #[test]
    fn classifies_accumulator_accumulator() {
        // top-3 bits = 0b111, e.g. 0xF << 32.
        let inst = 0xFu64 << 32;
        assert_eq!(classify(inst), Class::AccumulatorAccumulator);
    }

    #[test]
    fn classifies_am_and_io_and_supervisor() {
        assert_eq!(classify(0o12u64 << 27), Class::AccumulatorMemory);
        assert_eq!(classify(0o670u64 << 27), Class::Io);
        assert_eq!(classify(0o60u64 << 27), Class::Supervisor);
        assert_eq!(classify(0o30u64 << 27), Class::MultiplyDivide);
        assert_eq!(classify(0o100u64 << 27), Class::CallReturn);
    }

    #[test]
    fn sign_extend_round_trips_negative() {
        assert_eq!(sign_extend7(0x7F), -1);
        assert_eq!(sign_extend7(0x40), -64);
        assert_eq!(sign_extend7(0x3F), 63);
    }
}
