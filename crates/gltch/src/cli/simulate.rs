//! `simulate` subcommand: the controller core driven by stdin.
//!
//! Each stdin line is one event: `up` / `down` (link), `press` / `release`
//! (mute button), or a hex frame such as `00 FE 02` written to the command
//! characteristic. The indicator ring is printed on every bank write and
//! frames the controller would transmit are printed as `[tx]` lines.

use std::io::BufRead;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use gltch_lib::controller::{CONTROL_QUANTUM, ControlLoop, Controller, StatusLight, TriggerInput};
use gltch_lib::led::{Color, DriverError, IndicatorDriver};
use gltch_lib::transport::{FrameSink, TransportError};

use super::{RUNNING, Result, protocol};

/// Prints each bank write instead of driving LEDs.
struct ConsoleDriver;

impl IndicatorDriver for ConsoleDriver {
    fn write_bank(&mut self, colors: &[Color]) -> std::result::Result<(), DriverError> {
        let first = colors.first().copied().unwrap_or_default();
        let uniform = colors.iter().all(|c| *c == first);
        match (uniform, first.name()) {
            (true, Some(name)) => println!("[ring] {first} ({name}) x{}", colors.len()),
            (true, None) => println!("[ring] {first} x{}", colors.len()),
            (false, _) => {
                let cells: Vec<String> = colors.iter().map(|c| c.to_string()).collect();
                println!("[ring] {}", cells.join(" "));
            }
        }
        Ok(())
    }
}

/// Mute button level shared with the stdin reader.
struct HeldButton(Arc<AtomicBool>);

impl TriggerInput for HeldButton {
    fn poll(&mut self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Status LED; only transitions are logged.
struct QuietLight(bool);

impl StatusLight for QuietLight {
    fn set(&mut self, on: bool) {
        if on != self.0 {
            log::debug!("[status] {}", if on { "on" } else { "off" });
            self.0 = on;
        }
    }
}

/// Prints frames the controller would notify to the companion.
struct ConsoleSink;

impl FrameSink for ConsoleSink {
    fn send(&self, frame: [u8; protocol::FRAME_LEN]) -> std::result::Result<(), TransportError> {
        match protocol::decode(&frame) {
            Ok(f) => println!("[tx] {f}"),
            Err(_) => println!("[tx] {frame:02X?}"),
        }
        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Line {
    Up,
    Down,
    Press,
    Release,
    Quit,
    Frame(Vec<u8>),
    Blank,
}

fn parse_line(line: &str) -> std::result::Result<Line, String> {
    let line = line.trim();
    Ok(match line.to_ascii_lowercase().as_str() {
        "" => Line::Blank,
        "up" | "connect" => Line::Up,
        "down" | "disconnect" => Line::Down,
        "press" => Line::Press,
        "release" => Line::Release,
        "quit" | "exit" => Line::Quit,
        _ => Line::Frame(protocol::parse_hex_bytes(line)?),
    })
}

pub(super) fn cmd_simulate() -> Result<()> {
    let mut ctl = Controller::start(ConsoleDriver)?;
    let pressed = Arc::new(AtomicBool::new(false));
    let active = Arc::new(AtomicBool::new(true));

    let control = {
        let mut lp = ControlLoop::new(
            HeldButton(Arc::clone(&pressed)),
            QuietLight(false),
            ConsoleSink,
            ctl.link(),
        );
        let active = Arc::clone(&active);
        std::thread::Builder::new()
            .name("control".into())
            .spawn(move || lp.run(&active, CONTROL_QUANTUM))?
    };

    println!("Controller simulator. Commands: up, down, press, release, quit, or a hex frame.");
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        if !RUNNING.load(Ordering::SeqCst) {
            break;
        }
        let line = line?;
        match parse_line(&line) {
            Ok(Line::Up) => ctl.watcher_mut().link_up(),
            Ok(Line::Down) => {
                ctl.watcher_mut().link_down();
            }
            Ok(Line::Press) => pressed.store(true, Ordering::SeqCst),
            Ok(Line::Release) => pressed.store(false, Ordering::SeqCst),
            Ok(Line::Frame(bytes)) => match ctl.dispatcher().handle_write(0, &bytes) {
                Ok(color) => println!("[rx] {bytes:02X?} -> {}", color.name().unwrap_or("?")),
                Err(e) => println!("[rx] {bytes:02X?} rejected: {e}"),
            },
            Ok(Line::Quit) => break,
            Ok(Line::Blank) => {}
            Err(e) => println!("{e}"),
        }
    }

    active.store(false, Ordering::SeqCst);
    let _ = control.join();
    if let Some(bank) = ctl.shutdown() {
        let last = bank.cells().first().copied().unwrap_or_default();
        println!("Final ring: {last}");
    }
    Ok(())
}
