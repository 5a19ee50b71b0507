//! Roverhub main entry point.
//!
//! Hexagonal architecture with a synchronous control loop fed by two
//! I/O threads.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  serial-io thread     net-io thread        LogHooks            │
//! │  (SerialHardware)     (ChannelHub)         (Announce + Alert)  │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │            RoverService (pure logic, virtual time)     │    │
//! │  │  Decoder · Battery · Turns · Access · Idle watch       │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  Control loop: drain channels → tick(now) → sleep              │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

// ── Imports ───────────────────────────────────────────────────
use std::time::Duration;

use anyhow::{Context, Result};
use env_logger::Env;
use log::{debug, info, warn};

use roverhub::adapters::log_sink::LogHooks;
use roverhub::adapters::serial::{self, LINK_EVENTS, LinkEvent, SERIAL_RX, SerialHardware};
use roverhub::adapters::time::SystemClock;
use roverhub::app::ports::Clock;
use roverhub::app::service::{PortSet, RoverService};
use roverhub::config::RoverConfig;
use roverhub::net::channels::{Inbound, try_recv_inbound};
use roverhub::net::hub::ChannelHub;
use roverhub::net::io_task;

/// Environment variable naming the config file when no argument is given.
const CONFIG_ENV: &str = "ROVERHUB_CONFIG";

// ── Config ────────────────────────────────────────────────────

fn load_config() -> Result<RoverConfig> {
    let path = std::env::args().nth(1).or_else(|| std::env::var(CONFIG_ENV).ok());
    let config = match path {
        Some(path) => match std::fs::read_to_string(&path) {
            Ok(text) => {
                info!("Config loaded from {path}");
                RoverConfig::from_json(&text).with_context(|| format!("parsing {path}"))?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Config {path} not found, using defaults");
                RoverConfig::default()
            }
            Err(e) => return Err(e).with_context(|| format!("reading {path}")),
        },
        None => {
            warn!("No config file given (argument or {CONFIG_ENV}), using defaults");
            RoverConfig::default()
        }
    };
    config.validate().context("invalid configuration")
}

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    // ── 1. Logging ────────────────────────────────────────────
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    info!("roverhub v{}", env!("CARGO_PKG_VERSION"));

    // ── 2. Config ─────────────────────────────────────────────
    let config = load_config()?;
    let tick = Duration::from_millis(config.server.tick_interval_ms);

    // ── 3. I/O threads ────────────────────────────────────────
    let _serial = serial::spawn(config.serial.clone())?;
    let _net = io_task::spawn(&config.server)?;

    // ── 4. Service + ports ────────────────────────────────────
    let clock = SystemClock::new();
    let mut service = RoverService::new(config, clock.now_ms());

    let mut hardware = SerialHardware;
    let mut clients = ChannelHub;
    let mut announcements = LogHooks::new();
    let mut alerts = LogHooks::new();
    let mut ports = PortSet {
        hardware: &mut hardware,
        clients: &mut clients,
        announcements: &mut announcements,
        alerts: &mut alerts,
    };

    service.start(clock.now_ms(), &mut ports);
    info!("System ready. Entering control loop.");

    // ── 5. Control loop ───────────────────────────────────────
    loop {
        let now = clock.now_ms();

        while let Ok(event) = LINK_EVENTS.try_receive() {
            match event {
                LinkEvent::Up => service.on_link_restored(&mut ports),
                LinkEvent::Down => debug!("serial: link down"),
            }
        }

        while let Ok(chunk) = SERIAL_RX.try_receive() {
            service.feed_serial(&chunk, now, &mut ports);
        }

        while let Some(msg) = try_recv_inbound() {
            match msg {
                Inbound::Hello { id, request } => {
                    if let Err(reason) = service.connect(id, request, now, &mut ports) {
                        warn!("net: client {id} refused: {}", reason.as_str());
                    }
                }
                Inbound::Intent { id, intent } => {
                    service.handle_intent(id, intent, now, &mut ports);
                }
                Inbound::Closed { id } => service.disconnect(id, now, &mut ports),
            }
        }

        service.tick(now, &mut ports);
        std::thread::sleep(tick);
    }
}
