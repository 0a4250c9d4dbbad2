//! Front-panel / debugger REPL (spec.md §6). A line-oriented stdin loop
//! that deposits/examines memory and starts/stops the CPU, the same shape
//! as the original's operator console, minus its own toggle-switch
//! hardware.

use std::io::{self, BufRead, Write};

use ist66::{log_init, Cpu, MachineConfig};

fn main() {
    log_init::init();

    let config_path = std::env::args().nth(1);
    let cfg = match config_path {
        Some(path) => match MachineConfig::from_file(&path) {
            Ok(cfg) => cfg,
            Err(err) => {
                log::error!("{}", log_init::status("CPU", 'E', &err.to_string()));
                return;
            }
        },
        None => MachineConfig {
            memory_words: 1 << 16,
            ..Default::default()
        },
    };

    let cpu = match cfg.build() {
        Ok(cpu) => cpu,
        Err(err) => {
            log::error!("{}", log_init::status("CPU", 'E', &err.to_string()));
            return;
        }
    };

    log::info!("{}", log_init::status("CPU", 'I', "STARTING"));
    run_repl(&cpu);
}

fn run_repl(cpu: &std::sync::Arc<Cpu>) {
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut pointer: u32 = 0;
    let mut out = io::stdout();

    loop {
        let mut line = String::new();
        let n = match input.read_line(&mut line) {
            Ok(n) => n,
            Err(_) => break,
        };
        if n == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let mut words = line.split_whitespace();
        let cmd = words.next().unwrap_or("");
        let rest: Vec<&str> = words.collect();

        if let Some(addr_text) = cmd.strip_prefix('/') {
            match parse_octal(addr_text) {
                Some(addr) => pointer = addr,
                None => print_err(&mut out, "Bad address"),
            }
            continue;
        }

        match cmd {
            "?" => {
                writeln!(out, "{:o}", pointer).ok();
            }
            "." => match dump_count(&rest) {
                Ok(count) => dump(&mut out, cpu, pointer, count),
                Err(_) => print_err(&mut out, "Bad count"),
            },
            "=" => {
                if rest.is_empty() {
                    print_err(&mut out, "Bad data");
                    continue;
                }
                let mut words_out = Vec::with_capacity(rest.len());
                let mut bad = false;
                for tok in &rest {
                    match parse_octal(tok) {
                        Some(w) => words_out.push(w as u64),
                        None => {
                            bad = true;
                            break;
                        }
                    }
                }
                if bad {
                    print_err(&mut out, "Bad data");
                    continue;
                }
                for w in words_out {
                    if cpu.poke(pointer, w).is_err() {
                        print_err(&mut out, "Bad address");
                        break;
                    }
                    pointer = pointer.wrapping_add(1);
                }
            }
            "W" => {
                cpu.start(false);
                cpu.join();
                // Consume (and discard) one more line, as the original's
                // blocking run-then-resume-console handshake does.
                let mut discard = String::new();
                let _ = input.read_line(&mut discard);
            }
            "S" => {
                cpu.start(false);
            }
            "P" => {
                cpu.stop();
                pointer = cpu.pc();
            }
            "GW" => {
                cpu.set_pc(pointer);
                cpu.start(false);
                cpu.join();
            }
            "GS" => {
                cpu.set_pc(pointer);
                cpu.start(false);
            }
            "X" => break,
            _ => print_err(&mut out, "Bad address"),
        }
    }
}

/// The REPL's own parse-error shape, `? <message>` — distinct from the
/// `/SUBSYS-severity-...` status-log format used for informational and
/// error logging (spec.md §7).
fn print_err(out: &mut impl Write, message: &str) {
    writeln!(out, "? {message}").ok();
}

fn parse_octal(text: &str) -> Option<u32> {
    u32::from_str_radix(text, 8).ok()
}

fn dump_count(rest: &[&str]) -> Result<u32, ()> {
    match rest.first() {
        None => Ok(1),
        Some(tok) => parse_octal(tok).ok_or(()),
    }
}

fn dump(out: &mut impl Write, cpu: &std::sync::Arc<Cpu>, start: u32, count: u32) {
    const PER_LINE: u32 = 4;
    let mut addr = start;
    let mut remaining = count.max(1);
    while remaining > 0 {
        write!(out, "{:06o}:", addr).ok();
        let this_line = remaining.min(PER_LINE);
        for _ in 0..this_line {
            match cpu.peek(addr) {
                Ok(word) => {
                    write!(out, " {:012o}", word).ok();
                }
                Err(_) => {
                    write!(out, " ????????????").ok();
                }
            }
            addr = addr.wrapping_add(1);
        }
        writeln!(out).ok();
        remaining -= this_line;
    }
}
