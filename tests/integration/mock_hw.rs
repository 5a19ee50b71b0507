//! Mock adapters for integration tests.
//!
//! Records every hardware write, client event and hook call so tests can
//! assert on the full history without a serial port or sockets.

use roverhub::access::{ConnectRequest, ConnectionId, DenyReason};
use roverhub::app::commands::ClientIntent;
use roverhub::app::events::{Announcement, ClientEvent};
use roverhub::app::ports::{AlertHook, AnnouncementHook, ClientHub, HardwarePort};
use roverhub::app::service::{PortSet, RoverService};
use roverhub::config::{AdminEntry, RoverConfig};
use roverhub::error::{HookError, LinkError};
use roverhub::sensor::SensorReading;
use roverhub::sensor::codec::encode_reading;
use roverhub::timer::Millis;

pub const TICK_MS: Millis = 20;
pub const ADMIN_PASSWORD: &str = "correct horse";

// ── Rover ─────────────────────────────────────────────────────

pub struct MockRover {
    pub writes: Vec<Vec<u8>>,
    pub link_up: bool,
}

#[allow(dead_code)]
impl MockRover {
    pub fn new() -> Self {
        Self {
            writes: Vec::new(),
            link_up: true,
        }
    }

    /// Writes starting with opcode `op`.
    pub fn count(&self, op: u8) -> usize {
        self.writes.iter().filter(|w| w.first() == Some(&op)).count()
    }

    pub fn last(&self) -> Option<&[u8]> {
        self.writes.last().map(Vec::as_slice)
    }
}

impl HardwarePort for MockRover {
    fn send(&mut self, command: &[u8]) -> Result<(), LinkError> {
        if !self.link_up {
            return Err(LinkError::Down);
        }
        self.writes.push(command.to_vec());
        Ok(())
    }
}

// ── Clients ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    All,
    One(ConnectionId),
}

#[derive(Default)]
pub struct MockClients {
    pub sent: Vec<(Recipient, ClientEvent)>,
    pub closed: Vec<(ConnectionId, &'static str)>,
}

#[allow(dead_code)]
impl MockClients {
    /// Everything `id` would have received, broadcasts included.
    pub fn events_for(&self, id: ConnectionId) -> Vec<&ClientEvent> {
        self.sent
            .iter()
            .filter(|(to, _)| *to == Recipient::All || *to == Recipient::One(id))
            .map(|(_, e)| e)
            .collect()
    }

    pub fn messages_for(&self, id: ConnectionId) -> Vec<String> {
        self.events_for(id)
            .into_iter()
            .filter_map(|e| match e {
                ClientEvent::Message(m) => Some(m.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn errors_for(&self, id: ConnectionId) -> Vec<String> {
        self.events_for(id)
            .into_iter()
            .filter_map(|e| match e {
                ClientEvent::Error(m) => Some(m.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn broadcasts(&self) -> impl Iterator<Item = &ClientEvent> {
        self.sent
            .iter()
            .filter(|(to, _)| *to == Recipient::All)
            .map(|(_, e)| e)
    }

    pub fn alerts(&self) -> Vec<String> {
        self.broadcasts()
            .filter_map(|e| match e {
                ClientEvent::Alert(m) => Some(m.clone()),
                _ => None,
            })
            .collect()
    }

    /// Latest drive flag pushed to `id`.
    pub fn can_drive(&self, id: ConnectionId) -> Option<bool> {
        self.sent.iter().rev().find_map(|(to, e)| match e {
            ClientEvent::DrivingAccess { can_drive } if *to == Recipient::One(id) => {
                Some(*can_drive)
            }
            _ => None,
        })
    }

    pub fn clear(&mut self) {
        self.sent.clear();
        self.closed.clear();
    }
}

impl ClientHub for MockClients {
    fn broadcast(&mut self, event: &ClientEvent) {
        self.sent.push((Recipient::All, event.clone()));
    }

    fn send_to(&mut self, id: ConnectionId, event: &ClientEvent) {
        self.sent.push((Recipient::One(id), event.clone()));
    }

    fn disconnect(&mut self, id: ConnectionId, reason: &'static str) {
        self.closed.push((id, reason));
    }
}

// ── Hooks ─────────────────────────────────────────────────────

#[derive(Default)]
pub struct MockAnnouncements {
    pub seen: Vec<Announcement>,
    pub fail: bool,
}

impl AnnouncementHook for MockAnnouncements {
    fn announce(&mut self, announcement: &Announcement) -> Result<(), HookError> {
        self.seen.push(announcement.clone());
        if self.fail {
            Err(HookError::Delivery)
        } else {
            Ok(())
        }
    }
}

#[derive(Default)]
pub struct MockAlerts {
    pub seen: Vec<String>,
    pub fail: bool,
}

impl AlertHook for MockAlerts {
    fn alert(&mut self, message: &str) -> Result<(), HookError> {
        self.seen.push(message.to_owned());
        if self.fail {
            Err(HookError::Unavailable)
        } else {
            Ok(())
        }
    }
}

// ── Harness ───────────────────────────────────────────────────

pub struct Harness {
    pub service: RoverService,
    pub rover: MockRover,
    pub clients: MockClients,
    pub announcements: MockAnnouncements,
    pub alerts: MockAlerts,
    pub now: Millis,
}

#[allow(dead_code)]
impl Harness {
    /// Default config plus one admin credential.
    pub fn config() -> RoverConfig {
        let mut config = RoverConfig::default();
        config.access.admins.push(AdminEntry {
            name: "ops".into(),
            password: ADMIN_PASSWORD.into(),
            lockdown_bypass: true,
        });
        config.validate().unwrap()
    }

    pub fn new() -> Self {
        Self::with_config(Self::config())
    }

    pub fn with_config(config: RoverConfig) -> Self {
        let mut h = Self {
            service: RoverService::new(config, 0),
            rover: MockRover::new(),
            clients: MockClients::default(),
            announcements: MockAnnouncements::default(),
            alerts: MockAlerts::default(),
            now: 0,
        };
        h.with_ports(|svc, ports, now| svc.start(now, ports));
        h
    }

    pub fn with_ports<R>(
        &mut self,
        f: impl FnOnce(&mut RoverService, &mut PortSet<'_>, Millis) -> R,
    ) -> R {
        let mut ports = PortSet {
            hardware: &mut self.rover,
            clients: &mut self.clients,
            announcements: &mut self.announcements,
            alerts: &mut self.alerts,
        };
        f(&mut self.service, &mut ports, self.now)
    }

    pub fn connect(&mut self, id: ConnectionId, request: ConnectRequest) -> Result<(), DenyReason> {
        self.with_ports(|svc, ports, now| svc.connect(id, request, now, ports))
    }

    pub fn guest(&mut self, id: ConnectionId, key: &str) -> Result<(), DenyReason> {
        self.connect(
            id,
            ConnectRequest {
                identity_key: Some(key.into()),
                ..ConnectRequest::default()
            },
        )
    }

    pub fn admin(&mut self, id: ConnectionId) -> Result<(), DenyReason> {
        self.connect(
            id,
            ConnectRequest {
                credential: Some(ADMIN_PASSWORD.into()),
                ..ConnectRequest::default()
            },
        )
    }

    pub fn disconnect(&mut self, id: ConnectionId) {
        self.with_ports(|svc, ports, now| svc.disconnect(id, now, ports));
    }

    pub fn intent(&mut self, id: ConnectionId, intent: ClientIntent) {
        self.with_ports(|svc, ports, now| svc.handle_intent(id, intent, now, ports));
    }

    pub fn drive(&mut self, id: ConnectionId) {
        self.intent(id, ClientIntent::Drive { left: 100, right: 100 });
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        self.with_ports(|svc, ports, now| svc.feed_serial(bytes, now, ports));
    }

    pub fn reading(&mut self, reading: &SensorReading) {
        self.feed(&encode_reading(reading));
    }

    /// Step virtual time in service ticks.
    pub fn advance(&mut self, ms: Millis) {
        let end = self.now + ms;
        while self.now < end {
            self.now = (self.now + TICK_MS).min(end);
            self.with_ports(|svc, ports, now| svc.tick(now, ports));
        }
    }

    /// Feed `reading` every `period` ms for `duration` ms, ticking between.
    pub fn stream(&mut self, reading: &SensorReading, period: Millis, duration: Millis) {
        let end = self.now + duration;
        while self.now < end {
            self.reading(reading);
            self.advance(period);
        }
    }
}

// ── Readings ──────────────────────────────────────────────────

/// Charging state code for "full charging".
pub const CHARGING: u8 = 2;
/// Charging source bit for the home base.
pub const HOME_BASE: u8 = 0b10;

pub fn reading(voltage_mv: u16, charge_mah: u16) -> SensorReading {
    SensorReading {
        voltage_mv,
        charge_mah,
        capacity_mah: 3000,
        oi_mode: 2,
        ..SensorReading::default()
    }
}

#[allow(dead_code)]
pub fn docked_charging(voltage_mv: u16, charge_mah: u16) -> SensorReading {
    SensorReading {
        charging_state: CHARGING,
        charging_sources: HOME_BASE,
        ..reading(voltage_mv, charge_mah)
    }
}
