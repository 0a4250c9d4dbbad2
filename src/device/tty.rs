/*!
TTY: a one-client-at-a-time telnet server exposing a duplex byte stream to
the CPU. The original's `tty_io` was an acknowledged stub (`push_char`/
`pop_char` and the telnet framing existed, but nothing ever drove an
interrupt or wrote a byte back out); this backend keeps the listener/reader
framing and adds the write side plus configurable interrupt triggers.
*/

use std::collections::VecDeque;
use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::{Ctl, Device, IrqLine, IrqLineOps, status_word};

const RING_CAPACITY: usize = 256;
const ESC: u8 = 0o33;
const CR: u8 = 0o15;

const TELNET_SE: u8 = 0xF0;
const TELNET_SB: u8 = 0xFA;
const TELNET_IAC: u8 = 0xFF;

const WILL_ECHO: [u8; 6] = [0xFF, 0xFB, 0x01, 0xFF, 0xFB, 0x03];
const BUSY_MSG: &[u8] = b"/TTY-E-BUSY\n";

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum TelnetState {
    Normal,
    Command,
    Subneg,
}

/// Interrupt-trigger and echo policy for one TTY unit. The original stub
/// never decided any of this; a real bring-up needs to.
#[derive(Copy, Clone, Debug)]
pub struct TtyConfig {
    pub interrupt_on_any_byte: bool,
    pub interrupt_on_esc: bool,
    pub interrupt_on_cr: bool,
    pub interrupt_threshold: Option<usize>,
    pub local_echo: bool,
}

impl Default for TtyConfig {
    fn default() -> Self {
        Self {
            interrupt_on_any_byte: true,
            interrupt_on_esc: false,
            interrupt_on_cr: false,
            interrupt_threshold: None,
            local_echo: false,
        }
    }
}

struct Ring {
    buf: VecDeque<u8>,
    done: bool,
}

struct Outbound {
    queue: VecDeque<u8>,
    pending: u8,
    command: bool,
    done: bool,
    shutdown: bool,
}

pub struct Tty {
    unit: u16,
    irq: u8,
    irq_line: IrqLine,
    config: TtyConfig,
    ring: Arc<(Mutex<Ring>, Condvar)>,
    outbound: Arc<(Mutex<Outbound>, Condvar)>,
    console: Arc<Mutex<Option<TcpStream>>>,
    shutdown: Arc<Mutex<bool>>,
    listener: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
}

fn ring_recompute(ring: &mut Ring, config: &TtyConfig, irq_line: &IrqLine, irq: u8, byte: Option<u8>) {
    let interesting = match byte {
        Some(b) => {
            config.interrupt_on_any_byte
                || (config.interrupt_on_esc && b == ESC)
                || (config.interrupt_on_cr && b == CR)
        }
        None => false,
    };
    let threshold_hit = matches!(config.interrupt_threshold, Some(t) if ring.buf.len() >= t);

    if ring.buf.is_empty() {
        if ring.done {
            ring.done = false;
            irq_line.release(irq);
        }
        return;
    }

    if (interesting || threshold_hit) && !ring.done {
        ring.done = true;
        irq_line.assert(irq);
    }
}

impl Tty {
    pub fn new(
        unit: u16,
        irq: u8,
        irq_line: IrqLine,
        port: u16,
        config: TtyConfig,
    ) -> std::io::Result<Self> {
        let tcp_listener = TcpListener::bind(("0.0.0.0", port))?;
        tcp_listener.set_nonblocking(true)?;

        let ring = Arc::new((
            Mutex::new(Ring {
                buf: VecDeque::with_capacity(RING_CAPACITY),
                done: false,
            }),
            Condvar::new(),
        ));
        let outbound = Arc::new((
            Mutex::new(Outbound {
                queue: VecDeque::new(),
                pending: 0,
                command: false,
                done: false,
                shutdown: false,
            }),
            Condvar::new(),
        ));
        let console: Arc<Mutex<Option<TcpStream>>> = Arc::new(Mutex::new(None));
        let shutdown = Arc::new(Mutex::new(false));

        let listener_irq_line = Arc::clone(&irq_line);
        let listener_ring = Arc::clone(&ring);
        let listener_outbound = Arc::clone(&outbound);
        let listener_console = Arc::clone(&console);
        let listener_shutdown = Arc::clone(&shutdown);
        let listener_config = config;
        let listener_unit = unit;

        let listener = thread::spawn(move || {
            loop {
                match tcp_listener.accept() {
                    Ok((stream, _addr)) => {
                        let mut console_guard = listener_console.lock().unwrap();
                        if console_guard.is_some() {
                            let _ = (&stream).write_all(BUSY_MSG);
                            let _ = stream.shutdown(Shutdown::Both);
                            continue;
                        }

                        let _ = (&stream).write_all(&WILL_ECHO);
                        let reader_stream = stream.try_clone().expect("clone tcp stream");
                        *console_guard = Some(stream);
                        drop(console_guard);

                        log::info!("/DEV-I-UNIT {listener_unit:04o} TTY CONNECT");

                        let reader_irq_line = Arc::clone(&listener_irq_line);
                        let reader_ring = Arc::clone(&listener_ring);
                        let reader_outbound = Arc::clone(&listener_outbound);
                        let reader_console = Arc::clone(&listener_console);
                        thread::spawn(move || {
                            run_reader(
                                reader_stream,
                                reader_ring,
                                reader_outbound,
                                reader_irq_line,
                                irq,
                                listener_config,
                                reader_console,
                            );
                        });
                    }
                    Err(e) if e.kind() == ErrorKind::WouldBlock => {
                        if *listener_shutdown.lock().unwrap() {
                            return;
                        }
                        thread::sleep(Duration::from_millis(50));
                    }
                    Err(_) => return,
                }
            }
        });

        let writer_outbound = Arc::clone(&outbound);
        let writer_console = Arc::clone(&console);
        let writer_irq_line = Arc::clone(&irq_line);
        let writer = thread::spawn(move || {
            let (lock, cvar) = &*writer_outbound;
            loop {
                let bytes: Vec<u8> = {
                    let mut guard = lock.lock().unwrap();
                    while guard.queue.is_empty() && !guard.shutdown {
                        guard = cvar.wait(guard).unwrap();
                    }
                    if guard.shutdown && guard.queue.is_empty() {
                        return;
                    }
                    guard.queue.drain(..).collect()
                };

                if let Some(stream) = writer_console.lock().unwrap().as_ref() {
                    let _ = (&*stream).write_all(&bytes);
                    let _ = (&*stream).flush();
                }

                let mut guard = lock.lock().unwrap();
                guard.command = false;
                if !guard.done {
                    guard.done = true;
                    writer_irq_line.assert(irq);
                }
            }
        });

        log::info!("/DEV-I-UNIT {unit:04o} TTY IRQ {irq:02o} {port}");
        Ok(Self {
            unit,
            irq,
            irq_line,
            config,
            ring,
            outbound,
            console,
            shutdown,
            listener: Some(listener),
            writer: Some(writer),
        })
    }
}

#[allow(clippy::too_many_arguments)]
fn run_reader(
    mut stream: TcpStream,
    ring: Arc<(Mutex<Ring>, Condvar)>,
    outbound: Arc<(Mutex<Outbound>, Condvar)>,
    irq_line: IrqLine,
    irq: u8,
    config: TtyConfig,
    console: Arc<Mutex<Option<TcpStream>>>,
) {
    let mut telnet_state = TelnetState::Normal;
    let mut buf = [0u8; 256];

    loop {
        let n = match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(_) => break,
        };

        for &byte in &buf[..n] {
            match telnet_state {
                TelnetState::Normal => {
                    if byte == TELNET_IAC {
                        telnet_state = TelnetState::Command;
                    } else {
                        push_byte(&ring, &config, &irq_line, irq, byte);
                        if config.local_echo {
                            enqueue_outbound(&outbound, byte);
                        }
                    }
                }
                TelnetState::Command => {
                    if byte == TELNET_IAC {
                        push_byte(&ring, &config, &irq_line, irq, byte);
                        telnet_state = TelnetState::Normal;
                    } else if byte == TELNET_SB {
                        telnet_state = TelnetState::Subneg;
                    } else if byte < 250 {
                        telnet_state = TelnetState::Normal;
                    }
                }
                TelnetState::Subneg => {
                    if byte == TELNET_SE {
                        telnet_state = TelnetState::Normal;
                    }
                }
            }
        }
    }

    *console.lock().unwrap() = None;
    log::info!("/DEV-I-UNIT TTY DISCONNECT");
}

fn push_byte(
    ring: &Arc<(Mutex<Ring>, Condvar)>,
    config: &TtyConfig,
    irq_line: &IrqLine,
    irq: u8,
    byte: u8,
) {
    let (lock, cvar) = &**ring;
    let mut guard = lock.lock().unwrap();
    if guard.buf.len() == RING_CAPACITY {
        guard.buf.pop_front();
    }
    guard.buf.push_back(byte);
    ring_recompute(&mut guard, config, irq_line, irq, Some(byte));
    cvar.notify_one();
}

fn enqueue_outbound(outbound: &Arc<(Mutex<Outbound>, Condvar)>, byte: u8) {
    let (lock, cvar) = &**outbound;
    let mut guard = lock.lock().unwrap();
    guard.queue.push_back(byte);
    cvar.notify_one();
}

impl Device for Tty {
    fn unit(&self) -> u16 {
        self.unit
    }

    fn io(&mut self, data: u64, ctl: Ctl, transfer: u8) -> u64 {
        if transfer == 1 {
            let (lock, _) = &*self.outbound;
            lock.lock().unwrap().pending = data as u8;
        }

        if transfer == 0 {
            let (lock, _) = &*self.ring;
            match ctl {
                Ctl::Start => {
                    let mut guard = lock.lock().unwrap();
                    let byte = guard.buf.pop_front().unwrap_or(0);
                    ring_recompute(&mut guard, &self.config, &self.irq_line, self.irq, None);
                    return byte as u64;
                }
                Ctl::ClearDone => {
                    let mut guard = lock.lock().unwrap();
                    if guard.done {
                        guard.done = false;
                        self.irq_line.release(self.irq);
                    }
                }
                _ => {}
            }
        } else if transfer == 1 {
            let (lock, cvar) = &*self.outbound;
            match ctl {
                Ctl::Start => {
                    let mut guard = lock.lock().unwrap();
                    let byte = guard.pending;
                    guard.queue.push_back(byte);
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
            let ring_done = self.ring.0.lock().unwrap().done;
            let (busy, out_done) = {
                let guard = self.outbound.0.lock().unwrap();
                (guard.command, guard.done)
            };
            status_word(busy, ring_done || out_done)
        } else {
            0
        }
    }
}

impl Drop for Tty {
    fn drop(&mut self) {
        *self.shutdown.lock().unwrap() = true;

        if let Some(stream) = self.console.lock().unwrap().as_ref() {
            let _ = stream.shutdown(Shutdown::Both);
        }

        {
            let (lock, cvar) = &*self.outbound;
            let mut guard = lock.lock().unwrap();
            guard.shutdown = true;
            cvar.notify_one();
        }

        if let Some(handle) = self.listener.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.writer.take() {
            let _ = handle.join();
        }

        log::info!("/DEV-I-UNIT {:04o} TTY CLOSED", self.unit);
    }
}
