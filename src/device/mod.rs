/*!
Device framework: the `Device` trait every I/O backend implements, plus
the concrete backends (`ppt`, `pch`, `lpt`, `tty`).

Each device owns its own worker thread and is driven by the CPU thread's
`io()` call, which only ever latches a command and signals a condvar —
the actual (possibly slow, blocking) transfer happens on the worker. A
device is responsible for asserting/releasing its host IRQ line itself on
Done transitions; the CPU core never touches a device's interrupt line
directly.
*/

pub mod lpt;
pub mod pch;
pub mod ppt;
pub mod tty;

use std::sync::Arc;

use crate::interrupt::InterruptController;
use std::sync::{Condvar, Mutex};

/// The state a CPU instance publishes for threads other than its own: the
/// interrupt controller (pending/mask/min_pending), and the run/halt/stop
/// bookkeeping the front panel and device workers need to observe or
/// drive. Everything else (accumulators, control registers, pending
/// writeback scratch) stays exclusively owned by the CPU's own thread.
pub struct ControlState {
    pub interrupts: InterruptController,
    pub running: bool,
    pub exit: bool,
    pub stop_code: u64,
}

impl ControlState {
    pub fn new() -> Self {
        Self {
            interrupts: InterruptController::new(),
            running: false,
            exit: true,
            stop_code: 0,
        }
    }
}

impl Default for ControlState {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared handle devices (and the IOCPU) use to assert/release an IRQ line
/// and, in doing so, wake a CPU thread that is halted and waiting on the
/// condvar. A bare `Mutex<InterruptController>` cannot do the waking half
/// of that contract by itself, so the condvar rides alongside it.
pub type IrqLine = Arc<(Mutex<ControlState>, Condvar)>;

pub fn new_control_state() -> IrqLine {
    Arc::new((Mutex::new(ControlState::new()), Condvar::new()))
}

/// Convenience calls for the common case of touching just the interrupt
/// controller through a shared `IrqLine` handle.
pub trait IrqLineOps {
    fn assert(&self, irq: u8);
    fn release(&self, irq: u8);
}

impl IrqLineOps for IrqLine {
    fn assert(&self, irq: u8) {
        self.0.lock().unwrap().interrupts.assert(irq);
        self.1.notify_all();
    }

    fn release(&self, irq: u8) {
        self.0.lock().unwrap().interrupts.release(irq);
    }
}

/// Control-field values carried by bits 16..17 of an I/O instruction.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Ctl {
    NoOp,
    Start,
    ClearDone,
    Reserved,
}

impl Ctl {
    pub fn from_bits(v: u64) -> Self {
        match v & 0x3 {
            0 => Ctl::NoOp,
            1 => Ctl::Start,
            2 => Ctl::ClearDone,
            _ => Ctl::Reserved,
        }
    }
}

/// A device backend. `io` runs on the CPU thread: it must not block.
pub trait Device: Send {
    /// Numeric unit id this device is registered under (informational,
    /// used only for status logging).
    fn unit(&self) -> u16;

    /// Service one I/O instruction. `data` is the calling accumulator's
    /// current value; `ctl` and `transfer` are the instruction's control
    /// and transfer-select fields. The low two bits of a transfer==14
    /// ("status") result are (bit1) Done, (bit0) Busy.
    fn io(&mut self, data: u64, ctl: Ctl, transfer: u8) -> u64;
}

/// Status helper devices use for transfer==14 results.
pub fn status_word(busy: bool, done: bool) -> u64 {
    ((done as u64) << 1) | (busy as u64)
}

/// Each CPU carries its own device vector (spec.md §9 "Global-ish device
/// table"), keyed by the 12-bit device id an I/O instruction names.
pub type DeviceTable = std::collections::HashMap<u16, Box<dyn Device>>;
