//! Outbound application events.
//!
//! The [`RoverService`](super::service::RoverService) emits these through
//! the [`ClientHub`](super::ports::ClientHub) and hook ports.  On the
//! wire every client event is one JSON object `{ "event": ..., "data": ... }`.

use serde::Serialize;

use crate::access::{AccessGate, AccessMode, ConnectionId};
use crate::battery::BatteryReport;
use crate::scheduler::{PauseReason, TurnSnapshot};
use crate::sensor::SensorReading;
use crate::timer::Millis;

/// Events pushed to connected clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ClientEvent {
    /// First event after a successful connect.
    Welcome {
        id: ConnectionId,
        is_admin: bool,
        nickname: String,
        mode: AccessMode,
    },
    /// Throttled sensor snapshot with the battery view.
    SensorData(SensorUpdate),
    Alert(String),
    Message(String),
    /// Parse-health warning.
    Warning(String),
    /// Intent refused.
    Error(String),
    TurnsUpdate(TurnsView),
    ModeChanged { mode: AccessMode },
    DrivingAccess { can_drive: bool },
    Nickname { nickname: String },
    /// Sent just before the server closes the connection.
    Disconnected { reason: &'static str },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorUpdate {
    #[serde(flatten)]
    pub reading: SensorReading,
    pub battery: BatteryReport,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    pub id: ConnectionId,
    pub nickname: String,
    pub is_current: bool,
}

/// Turn snapshot with nicknames filled in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnsView {
    pub enabled: bool,
    pub queue: Vec<QueueEntry>,
    pub current_driver_id: Option<ConnectionId>,
    pub turn_duration_ms: Millis,
    pub turn_expires_at: Option<Millis>,
    pub time_remaining_ms: Option<Millis>,
    pub idle_skip_expires_at: Option<Millis>,
    pub idle_grace_period_ms: Millis,
    pub server_timestamp: Millis,
    pub charging_pause: bool,
    pub charging_pause_reason: Option<PauseReason>,
}

impl TurnsView {
    pub fn new(snapshot: &TurnSnapshot, gate: &AccessGate) -> Self {
        let queue = snapshot
            .queue
            .iter()
            .map(|&id| QueueEntry {
                id,
                nickname: gate.nickname(id).unwrap_or_default().to_owned(),
                is_current: snapshot.current_driver == Some(id),
            })
            .collect();
        Self {
            enabled: snapshot.enabled,
            queue,
            current_driver_id: snapshot.current_driver,
            turn_duration_ms: snapshot.turn_duration_ms,
            turn_expires_at: snapshot.turn_expires_at,
            time_remaining_ms: snapshot.time_remaining_ms,
            idle_skip_expires_at: snapshot.idle_skip_expires_at,
            idle_grace_period_ms: snapshot.idle_grace_period_ms,
            server_timestamp: snapshot.server_timestamp,
            charging_pause: snapshot.pause_reason.is_some(),
            charging_pause_reason: snapshot.pause_reason,
        }
    }
}

/// Payloads for the announcement hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Announcement {
    ModeChanged(AccessMode),
    DoneCharging { summary: String },
}

impl core::fmt::Display for Announcement {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::ModeChanged(mode) => write!(f, "Rover access mode is now {mode}."),
            Self::DoneCharging { summary } => {
                write!(f, "The rover has finished charging ({summary}) and is ready to drive.")
            }
        }
    }
}
