//! Application service: the hexagonal core.
//!
//! [`RoverService`] owns the decoder, battery machine, turn scheduler,
//! access gate and idle watch.  It is the one context object the
//! process keeps; every adapter callback lands here with the current
//! time and a [`PortSet`] to reach the outside world.
//!
//! ```text
//!  serial bytes ──▶ ┌──────────────────────────────┐ ──▶ HardwarePort
//!                   │         RoverService         │
//!  client intents ─▶│ decoder · battery · turns ·  │ ──▶ ClientHub
//!                   │ gate · idle watch            │
//!  tick(now) ─────▶ └──────────────────────────────┘ ──▶ hooks
//! ```
//!
//! Side effects are best-effort: a failed hardware write or hook call
//! is logged where it happens and never rolls back a state change.

use log::{debug, info, warn};

use crate::access::{AccessGate, AccessMode, ConnectRequest, ConnectionId, DenyReason};
use crate::battery::{
    AutochargeAction, BatteryEffect, BatteryEnv, BatteryMachine, apply_pause_effects,
};
use crate::config::RoverConfig;
use crate::error::LinkError;
use crate::idle::IdleWatch;
use crate::oi;
use crate::scheduler::{PauseReason, TurnEvent, TurnScheduler};
use crate::sensor::SensorReading;
use crate::sensor::codec::{DecoderStats, StreamDecoder};
use crate::sensor::health::{EmitThrottle, ParseRate};
use crate::timer::{Cooldown, Millis};

use super::commands::ClientIntent;
use super::events::{Announcement, ClientEvent, SensorUpdate, TurnsView};
use super::ports::{
    AlertHook, AnnouncementHook, ChargingPause, ClientHub, HardwarePort, TurnDelegate,
};

pub const RESYNC_WARNING: &str = "Invalid packet detected, attempting resync...";
pub const ADMIN_REQUIRED: &str = "Admin privileges required.";
pub const NOT_DRIVING: &str = "You are not currently driving.";
pub const TURNS_WAIT: &str = "Turns mode is active. Please wait for your turn to drive.";
const ALERT_PREFIX: &str = "[Rover] ";

// ───────────────────────────────────────────────────────────────
// Ports bundle
// ───────────────────────────────────────────────────────────────

/// Everything the service may reach during one call.
pub struct PortSet<'a> {
    pub hardware: &'a mut dyn HardwarePort,
    pub clients: &'a mut dyn ClientHub,
    pub announcements: &'a mut dyn AnnouncementHook,
    pub alerts: &'a mut dyn AlertHook,
}

impl PortSet<'_> {
    fn send(&mut self, command: &[u8]) {
        match self.hardware.send(command) {
            Ok(()) => {}
            Err(LinkError::Down) => debug!("serial: link down, dropped {:?}", command.first()),
            Err(e) => warn!("serial: write failed: {e}"),
        }
    }

    fn halt_motors(&mut self) {
        for cmd in oi::halt() {
            self.send(&cmd);
        }
    }

    fn announce(&mut self, announcement: &Announcement) {
        if let Err(e) = self.announcements.announce(announcement) {
            warn!("hooks: announcement failed: {e}");
        }
    }

    fn alert(&mut self, message: &str) {
        if let Err(e) = self.alerts.alert(message) {
            warn!("hooks: alert failed: {e}");
        }
    }
}

/// Collects scheduler events; liveness comes from the gate.
struct TurnSink<'g> {
    gate: &'g AccessGate,
    events: Vec<TurnEvent>,
}

impl<'g> TurnSink<'g> {
    fn new(gate: &'g AccessGate) -> Self {
        Self {
            gate,
            events: Vec::new(),
        }
    }
}

impl TurnDelegate for TurnSink<'_> {
    fn on_turn_event(&mut self, event: TurnEvent) {
        self.events.push(event);
    }

    fn is_live(&self, id: ConnectionId) -> bool {
        self.gate.is_live(id)
    }
}

// ───────────────────────────────────────────────────────────────
// RoverService
// ───────────────────────────────────────────────────────────────

pub struct RoverService {
    decoder: StreamDecoder,
    parse_rate: ParseRate,
    emitter: EmitThrottle<SensorUpdate>,
    resync_warning: Cooldown,
    battery: BatteryMachine,
    turns: TurnScheduler,
    gate: AccessGate,
    idle: IdleWatch,
    latest: Option<SensorUpdate>,
}

impl RoverService {
    /// Build from a validated config.  Call [`start`](Self::start) next.
    pub fn new(config: RoverConfig, now: Millis) -> Self {
        Self {
            decoder: StreamDecoder::new(),
            parse_rate: ParseRate::new(config.sensors.stats_report_interval_ms, now),
            emitter: EmitThrottle::new(config.sensors.emit_interval_ms),
            resync_warning: Cooldown::new(config.sensors.warning_cooldown_ms),
            battery: BatteryMachine::new(config.battery),
            turns: TurnScheduler::new(&config.turns),
            gate: AccessGate::new(&config.access),
            idle: IdleWatch::new(config.idle_watch, now),
            latest: None,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Put the rover in safe mode, request the sensor stream and start
    /// arbitration if the default mode is turns.
    pub fn start(&mut self, now: Millis, ports: &mut PortSet<'_>) {
        info!("service: starting in {} mode", self.gate.mode());
        self.request_stream(ports);
        if self.gate.mode() == AccessMode::Turns {
            let mut sink = TurnSink::new(&self.gate);
            self.turns.set_enabled(true, self.gate.queue_candidates(), now, &mut sink);
            let events = sink.events;
            self.apply_turn_events(events, ports);
        }
    }

    /// The serial link came back: drop partial input and re-request
    /// the stream.
    pub fn on_link_restored(&mut self, ports: &mut PortSet<'_>) {
        info!("service: serial link restored");
        self.decoder.reset();
        self.request_stream(ports);
    }

    fn request_stream(&mut self, ports: &mut PortSet<'_>) {
        ports.send(&oi::start());
        ports.send(&oi::safe());
        ports.send(&oi::pause_stream());
        ports.send(&oi::stream_sensors());
    }

    // ── Connections ───────────────────────────────────────────

    /// Admit connection `id` (allocated by the transport).  A refused
    /// connection is closed with the reason before returning.
    pub fn connect(
        &mut self,
        id: ConnectionId,
        request: ConnectRequest,
        now: Millis,
        ports: &mut PortSet<'_>,
    ) -> Result<(), DenyReason> {
        let displaced = match self.gate.admit(id, request) {
            Ok(displaced) => displaced,
            Err(reason) => {
                info!("service: refused {id} ({})", reason.as_str());
                ports.clients.disconnect(id, reason.as_str());
                return Err(reason);
            }
        };
        if let Some(prev) = displaced {
            ports
                .clients
                .disconnect(prev, DenyReason::SessionReplaced.as_str());
        }

        let Some(record) = self.gate.get(id) else {
            return Ok(());
        };
        let welcome = ClientEvent::Welcome {
            id,
            is_admin: record.is_admin(),
            nickname: record.nickname.clone(),
            mode: self.gate.mode(),
        };
        let queue = self.gate.mode() == AccessMode::Turns && record.wants_turns();
        ports.clients.send_to(id, &welcome);
        if queue {
            ports
                .clients
                .send_to(id, &ClientEvent::Message(TURNS_WAIT.into()));
        }
        if let Some(latest) = &self.latest {
            ports
                .clients
                .send_to(id, &ClientEvent::SensorData(latest.clone()));
        }

        let mut sink = TurnSink::new(&self.gate);
        if let Some(prev) = displaced {
            self.turns.remove(prev, now, &mut sink);
        }
        if queue {
            self.turns.admit(id, now, &mut sink);
        }
        let events = sink.events;
        self.apply_turn_events(events, ports);

        if self.gate.get(id).is_some_and(|r| !r.can_drive) {
            ports
                .clients
                .send_to(id, &ClientEvent::DrivingAccess { can_drive: false });
        }
        Ok(())
    }

    /// The transport saw connection `id` close.
    pub fn disconnect(&mut self, id: ConnectionId, now: Millis, ports: &mut PortSet<'_>) {
        let Some(record) = self.gate.remove(id) else {
            return;
        };
        info!("service: {id} ({}) left", record.nickname);
        let mut sink = TurnSink::new(&self.gate);
        self.turns.remove(id, now, &mut sink);
        let events = sink.events;
        self.apply_turn_events(events, ports);
    }

    // ── Intents ───────────────────────────────────────────────

    pub fn handle_intent(
        &mut self,
        id: ConnectionId,
        intent: ClientIntent,
        now: Millis,
        ports: &mut PortSet<'_>,
    ) {
        let Some(record) = self.gate.get(id) else {
            return;
        };
        if intent.requires_admin() && !record.is_admin() {
            ports
                .clients
                .send_to(id, &ClientEvent::Error(ADMIN_REQUIRED.into()));
            return;
        }
        if intent.requires_drive() && !record.can_drive {
            ports
                .clients
                .send_to(id, &ClientEvent::Error(NOT_DRIVING.into()));
            return;
        }

        match intent {
            ClientIntent::ChangeMode { mode } => self.change_mode(mode, now, ports),
            ClientIntent::SetNickname { nickname } => {
                if let Some(name) = self.gate.set_nickname(id, &nickname) {
                    let event = ClientEvent::Nickname {
                        nickname: name.to_owned(),
                    };
                    ports.clients.send_to(id, &event);
                }
            }
            ClientIntent::SetSpectating { spectating } => {
                self.set_spectating(id, spectating, now, ports);
            }
            ClientIntent::Drive { left, right } => {
                ports.send(&oi::drive_direct(right, left));
                self.gate.record_drive(id, now);
                self.turns.record_drive(id);
                self.idle.record_activity(now);
            }
            ClientIntent::AuxMotors { main, side, vacuum } => {
                ports.send(&oi::aux_motors(main, side, vacuum));
            }
            ClientIntent::Dock => {
                info!("service: {id} sent the rover to dock");
                ports.send(&oi::dock());
            }
            ClientIntent::RequestSensors => {
                if let Some(latest) = &self.latest {
                    ports
                        .clients
                        .send_to(id, &ClientEvent::SensorData(latest.clone()));
                }
            }
            ClientIntent::PauseTurns => {
                if self.turns.is_enabled() {
                    let mut sink = TurnSink::new(&self.gate);
                    self.turns
                        .set_charging_pause(PauseReason::Manual, now, &mut sink);
                    let events = sink.events;
                    self.apply_turn_events(events, ports);
                }
            }
            ClientIntent::ResumeTurns => {
                let mut sink = TurnSink::new(&self.gate);
                self.turns.clear_charging_pause(now, &mut sink);
                let events = sink.events;
                self.apply_turn_events(events, ports);
            }
        }
    }

    fn change_mode(&mut self, mode: AccessMode, now: Millis, ports: &mut PortSet<'_>) {
        let previous = self.gate.mode();
        if previous == mode {
            return;
        }
        let evicted = self.gate.set_mode(mode);
        for (cid, reason) in &evicted {
            ports.clients.disconnect(*cid, reason.as_str());
        }
        ports.clients.broadcast(&ClientEvent::ModeChanged { mode });
        ports.announce(&Announcement::ModeChanged(mode));

        let mut sink = TurnSink::new(&self.gate);
        for (cid, _) in &evicted {
            self.turns.remove(*cid, now, &mut sink);
        }
        if mode == AccessMode::Turns {
            self.turns
                .set_enabled(true, self.gate.queue_candidates(), now, &mut sink);
        } else if previous == AccessMode::Turns {
            self.turns
                .set_enabled(false, core::iter::empty(), now, &mut sink);
        }
        let events = sink.events;
        self.apply_turn_events(events, ports);
    }

    fn set_spectating(
        &mut self,
        id: ConnectionId,
        spectating: bool,
        now: Millis,
        ports: &mut PortSet<'_>,
    ) {
        if !self.gate.set_spectating(id, spectating) {
            return;
        }
        debug!("service: {id} spectating={spectating}");
        let wants_turns = self.gate.get(id).is_some_and(|r| r.wants_turns());
        let mut sink = TurnSink::new(&self.gate);
        if spectating {
            self.turns.remove(id, now, &mut sink);
        } else if wants_turns {
            self.turns.admit(id, now, &mut sink);
        }
        let events = sink.events;
        self.apply_turn_events(events, ports);
    }

    // ── Serial input ──────────────────────────────────────────

    /// Feed a chunk of serial bytes and process every complete frame.
    pub fn feed_serial(&mut self, bytes: &[u8], now: Millis, ports: &mut PortSet<'_>) {
        self.decoder.feed(bytes);
        while let Some(result) = self.decoder.poll() {
            match result {
                Ok(reading) => self.on_reading(&reading, now, ports),
                Err(e) => {
                    debug!("decoder: dropped frame: {e}");
                    self.parse_rate.record();
                    if self.resync_warning.try_fire(now) {
                        ports
                            .clients
                            .broadcast(&ClientEvent::Warning(RESYNC_WARNING.into()));
                    }
                }
            }
        }
    }

    fn on_reading(&mut self, reading: &SensorReading, now: Millis, ports: &mut PortSet<'_>) {
        let env = BatteryEnv {
            turns_mode: self.gate.mode() == AccessMode::Turns,
            pause_reason: self.turns.pause_reason(),
        };
        let outcome = self.battery.evaluate(reading, env, now);

        for effect in &outcome.effects {
            let Some(text) = effect.notice() else {
                continue;
            };
            ports.clients.broadcast(&ClientEvent::Alert(text.clone()));
            ports.clients.broadcast(&ClientEvent::Message(text.clone()));
            if effect.is_alert() {
                ports.alert(&format!("{ALERT_PREFIX}{text}"));
            }
            if let BatteryEffect::Recovered { summary, .. } = effect {
                ports.announce(&Announcement::DoneCharging {
                    summary: summary.clone(),
                });
            }
        }

        let mut sink = TurnSink::new(&self.gate);
        apply_pause_effects(&outcome.effects, &mut self.turns, now, &mut sink);
        let events = sink.events;
        self.apply_turn_events(events, ports);

        if let Some(text) = outcome.autocharge.message() {
            info!("battery: {text}");
            ports.clients.broadcast(&ClientEvent::Message(text.into()));
        }
        if outcome.autocharge == AutochargeAction::Fire {
            ports.send(&oi::dock());
        }

        let update = SensorUpdate {
            reading: *reading,
            battery: outcome.report,
        };
        self.latest = Some(update.clone());
        if let Some(update) = self.emitter.offer(update, now) {
            ports.clients.broadcast(&ClientEvent::SensorData(update));
        }
    }

    // ── Timers ────────────────────────────────────────────────

    /// Drive every timer.  Called on a short fixed period.
    pub fn tick(&mut self, now: Millis, ports: &mut PortSet<'_>) {
        let mut sink = TurnSink::new(&self.gate);
        self.turns.tick(now, &mut sink);
        let events = sink.events;
        self.apply_turn_events(events, ports);

        if let Some(update) = self.emitter.flush(now) {
            ports.clients.broadcast(&ClientEvent::SensorData(update));
        }
        self.parse_rate.report(now);

        if self.battery.alarm_tick(now) {
            debug!("battery: alarm tone");
            for cmd in oi::alarm_tone() {
                ports.send(&cmd);
            }
        }
        if let Some(text) = self.idle.poll(now, self.battery.docked()) {
            ports.alert(text);
        }
    }

    // ── Turn events → drive flags ─────────────────────────────

    fn apply_turn_events(&mut self, events: Vec<TurnEvent>, ports: &mut PortSet<'_>) {
        let mut halted = false;
        for event in events {
            match event {
                TurnEvent::Granted(id) => debug!("service: {id} granted"),
                TurnEvent::Revoked(id) => debug!("service: {id} revoked"),
                TurnEvent::IdleSkipped { driver, grace_secs } => {
                    let text = TurnEvent::idle_skip_notice(grace_secs);
                    ports.clients.send_to(driver, &ClientEvent::Message(text));
                }
                TurnEvent::HaltMotors => {
                    ports.halt_motors();
                    halted = true;
                }
                TurnEvent::Snapshot(snapshot) => {
                    let view = TurnsView::new(&snapshot, &self.gate);
                    ports.clients.broadcast(&ClientEvent::TurnsUpdate(view));
                }
            }
        }
        if self.refresh_drive_flags(ports) && !halted {
            ports.halt_motors();
        }
    }

    /// Recompute every connection's drive flag and push the changes.
    /// Returns `true` if anyone lost the right to drive.
    fn refresh_drive_flags(&mut self, ports: &mut PortSet<'_>) -> bool {
        let holder = self.turns.holder();
        let mut lost = false;
        for id in self.gate.ids() {
            let can_drive = self.gate.base_drive(id, holder);
            if self.gate.set_can_drive(id, can_drive) {
                lost |= !can_drive;
                ports
                    .clients
                    .send_to(id, &ClientEvent::DrivingAccess { can_drive });
            }
        }
        lost
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn mode(&self) -> AccessMode {
        self.gate.mode()
    }

    pub fn gate(&self) -> &AccessGate {
        &self.gate
    }

    pub fn turns(&self) -> &TurnScheduler {
        &self.turns
    }

    pub fn battery(&self) -> &BatteryMachine {
        &self.battery
    }

    pub fn decoder_stats(&self) -> DecoderStats {
        self.decoder.stats()
    }

    pub fn latest(&self) -> Option<&SensorUpdate> {
        self.latest.as_ref()
    }
}
