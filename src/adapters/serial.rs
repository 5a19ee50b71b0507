//! Serial link adapter.
//!
//! A dedicated thread owns the rover's serial port.  It hands received
//! bytes to the control loop and writes queued commands, reconnecting
//! with exponential backoff whenever the port closes or errors.
//!
//! ```text
//! ┌──────────────┐  SERIAL_RX / LINK_EVENTS  ┌──────────────┐
//! │ Serial thread│──────────────────────────▶│ Control loop │
//! │  (blocking)  │◀──────────────────────────│  (service)   │
//! └──────────────┘         SERIAL_TX         └──────────────┘
//! ```
//!
//! Commands issued while the link is down are dropped, never queued
//! for replay.

use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;
use std::io::{self, Read, Write};
use std::thread::JoinHandle;

use anyhow::{Context, Result};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::{debug, info, warn};
use serialport::SerialPort;

use crate::app::ports::HardwarePort;
use crate::config::SerialConfig;
use crate::error::LinkError;
use crate::oi::Command;
use crate::timer::Backoff;

const CHUNK_SIZE: usize = 256;

/// Short read timeout so queued commands are written promptly.
const READ_TIMEOUT: Duration = Duration::from_millis(10);

pub type SerialChunk = heapless::Vec<u8, CHUNK_SIZE>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    Up,
    Down,
}

// ── Channels ─────────────────────────────────────────────────

/// Received bytes: serial thread → control loop.
pub static SERIAL_RX: Channel<CriticalSectionRawMutex, SerialChunk, 64> = Channel::new();

/// Outgoing commands: control loop → serial thread.
pub static SERIAL_TX: Channel<CriticalSectionRawMutex, Command, 32> = Channel::new();

/// Link transitions: serial thread → control loop.
pub static LINK_EVENTS: Channel<CriticalSectionRawMutex, LinkEvent, 8> = Channel::new();

static LINK_UP: AtomicBool = AtomicBool::new(false);

pub fn link_up() -> bool {
    LINK_UP.load(Ordering::Acquire)
}

// ── HardwarePort ─────────────────────────────────────────────

/// [`HardwarePort`] backed by the serial thread's command queue.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialHardware;

impl HardwarePort for SerialHardware {
    fn send(&mut self, command: &[u8]) -> Result<(), LinkError> {
        if !link_up() {
            return Err(LinkError::Down);
        }
        let cmd = Command::from_slice(command).map_err(|()| LinkError::Io)?;
        SERIAL_TX.try_send(cmd).map_err(|_| LinkError::Full)
    }
}

// ── Thread ───────────────────────────────────────────────────

pub fn spawn(config: SerialConfig) -> Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("serial-io".into())
        .spawn(move || run(&config))
        .context("spawning serial thread")
}

/// Paces reopen attempts.  Every lost session waits before the port is
/// reopened; the delay drops back to its floor only after a session
/// that actually delivered data.
struct Reconnect {
    backoff: Backoff,
}

impl Reconnect {
    fn new(config: &SerialConfig) -> Self {
        Self {
            backoff: Backoff::new(
                Duration::from_millis(config.reconnect_initial_ms),
                Duration::from_millis(config.reconnect_max_ms),
            ),
        }
    }

    fn after_session(&mut self, received: bool) -> Duration {
        if received {
            self.backoff.reset();
        }
        self.backoff.next_delay()
    }

    fn after_open_failure(&mut self) -> Duration {
        self.backoff.next_delay()
    }
}

fn run(config: &SerialConfig) {
    let mut reconnect = Reconnect::new(config);
    loop {
        let opened = serialport::new(&config.port, config.baud_rate)
            .timeout(READ_TIMEOUT)
            .open();
        let delay = match opened {
            Ok(port) => {
                info!("serial: opened {} @ {}", config.port, config.baud_rate);
                discard_stale_commands();
                set_link(true);
                let end = pump(port);
                set_link(false);
                let delay = reconnect.after_session(end.received);
                warn!(
                    "serial: link lost: {}, reopening in {} ms",
                    end.error,
                    delay.as_millis()
                );
                delay
            }
            Err(e) => {
                let delay = reconnect.after_open_failure();
                warn!(
                    "serial: cannot open {} ({e}), retrying in {} ms",
                    config.port,
                    delay.as_millis()
                );
                delay
            }
        };
        std::thread::sleep(delay);
    }
}

fn set_link(up: bool) {
    LINK_UP.store(up, Ordering::Release);
    let event = if up { LinkEvent::Up } else { LinkEvent::Down };
    if LINK_EVENTS.try_send(event).is_err() {
        warn!("serial: link event queue full");
    }
}

fn discard_stale_commands() {
    let mut dropped = 0usize;
    while SERIAL_TX.try_receive().is_ok() {
        dropped += 1;
    }
    if dropped > 0 {
        debug!("serial: dropped {dropped} stale commands");
    }
}

/// How a session ended.
struct SessionEnd {
    error: io::Error,
    /// At least one read returned data.
    received: bool,
}

/// Shuttle bytes until the port fails.
fn pump(mut port: Box<dyn SerialPort>) -> SessionEnd {
    let mut buf = [0u8; CHUNK_SIZE];
    let mut received = false;
    let error = loop {
        while let Ok(cmd) = SERIAL_TX.try_receive() {
            if let Err(e) = port.write_all(&cmd) {
                return SessionEnd { error: e, received };
            }
        }
        match port.read(&mut buf) {
            Ok(0) => {}
            Ok(n) => {
                received = true;
                let Ok(chunk) = SerialChunk::from_slice(&buf[..n]) else {
                    continue;
                };
                if SERIAL_RX.try_send(chunk).is_err() {
                    warn!("serial: rx queue full, dropping {n} bytes");
                }
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {}
            Err(e) => break e,
        }
    };
    SessionEnd { error, received }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reconnect() -> Reconnect {
        Reconnect::new(&SerialConfig {
            reconnect_initial_ms: 100,
            reconnect_max_ms: 800,
            ..SerialConfig::default()
        })
    }

    #[test]
    fn silent_sessions_back_off() {
        let mut r = reconnect();
        assert_eq!(r.after_session(false), Duration::from_millis(100));
        assert_eq!(r.after_session(false), Duration::from_millis(200));
        assert_eq!(r.after_open_failure(), Duration::from_millis(400));
        assert_eq!(r.after_session(false), Duration::from_millis(800));
        assert_eq!(r.after_session(false), Duration::from_millis(800));
    }

    #[test]
    fn session_with_data_resets_delay() {
        let mut r = reconnect();
        r.after_open_failure();
        r.after_open_failure();
        r.after_session(false);
        assert_eq!(r.after_session(true), Duration::from_millis(100));
        assert_eq!(r.after_session(false), Duration::from_millis(200));
    }

    #[test]
    fn commands_dropped_while_down() {
        let mut hw = SerialHardware;
        assert_eq!(hw.send(&[128]), Err(LinkError::Down));
        assert!(SERIAL_TX.try_receive().is_err());
    }
}
