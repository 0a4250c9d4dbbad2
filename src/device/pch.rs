//! Paper tape punch: a single-byte writer with a worker thread that sleeps
//! to approximate punch speed (16ms/byte) before asserting Done.

use std::fs::File;
use std::io::Write;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::{Ctl, Device, IrqLine, IrqLineOps, status_word};

struct Shared {
    buf: u8,
    command: bool,
    done: bool,
    shutdown: bool,
}

pub struct Pch {
    unit: u16,
    irq: u8,
    irq_line: IrqLine,
    shared: Arc<(Mutex<Shared>, Condvar)>,
    worker: Option<JoinHandle<()>>,
}

impl Pch {
    pub fn new(unit: u16, irq: u8, irq_line: IrqLine, mut file: File) -> Self {
        let worker_irq_line = Arc::clone(&irq_line);
        let shared = Arc::new((
            Mutex::new(Shared {
                buf: 0,
                command: false,
                done: false,
                shutdown: false,
            }),
            Condvar::new(),
        ));

        let worker_shared = Arc::clone(&shared);
        let worker = thread::spawn(move || {
            let (lock, cvar) = &*worker_shared;
            loop {
                let byte = {
                    let mut guard = lock.lock().unwrap();
                    while !guard.command && !guard.shutdown {
                        guard = cvar.wait(guard).unwrap();
                    }
                    if guard.shutdown {
                        return;
                    }
                    guard.buf
                };

                let _ = file.write_all(&[byte]);
                let _ = file.flush();
                thread::sleep(Duration::from_millis(16));

                let mut guard = lock.lock().unwrap();
                if !guard.done {
                    guard.command = false;
                    guard.done = true;
                    worker_irq_line.assert(irq);
                }
            }
        });

        log::info!("/DEV-I-UNIT {unit:04o} PCH IRQ {irq:02o}");
        Self {
            unit,
            irq,
            irq_line,
            shared,
            worker: Some(worker),
        }
    }
}

impl Device for Pch {
    fn unit(&self) -> u16 {
        self.unit
    }

    fn io(&mut self, data: u64, ctl: Ctl, transfer: u8) -> u64 {
        let (lock, cvar) = &*self.shared;

        if transfer == 1 {
            lock.lock().unwrap().buf = data as u8;
        }

        if transfer != 14 {
            match ctl {
                Ctl::Start => {
                    let mut guard = lock.lock().unwrap();
                    guard.command = true;
                    if guard.done {
                        guard.done = false;
                        self.irq_line.release(self.irq);
                    }
                    cvar.notify_one();
                }
                Ctl::ClearDone => {
                    let mut guard = lock.lock().unwrap();
                    guard.command = false;
                    if guard.done {
                        guard.done = false;
                        self.irq_line.release(self.irq);
                    }
                }
                _ => {}
            }
        }

        if transfer == 14 {
            let guard = lock.lock().unwrap();
            status_word(guard.command, guard.done)
        } else {
            0
        }
    }
}

impl Drop for Pch {
    fn drop(&mut self) {
        {
            let (lock, cvar) = &*self.shared;
            let mut guard = lock.lock().unwrap();
            guard.shutdown = true;
            cvar.notify_one();
        }
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
        log::info!("/DEV-I-UNIT {:04o} PCH CLOSED", self.unit);
    }
}
