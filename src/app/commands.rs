//! Inbound intents from clients.
//!
//! Each line a client sends after its hello frame is one of these,
//! tagged by `"type"`.  The [`RoverService`](super::service::RoverService)
//! checks privileges before acting on any of them.

use serde::Deserialize;

use crate::access::AccessMode;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientIntent {
    /// Admin only.
    ChangeMode { mode: AccessMode },
    SetNickname { nickname: String },
    SetSpectating { spectating: bool },
    /// Wheel velocities in mm/s.
    Drive { left: i16, right: i16 },
    AuxMotors { main: i8, side: i8, vacuum: u8 },
    Dock,
    RequestSensors,
    /// Admin only: halt turns without a battery reason.
    PauseTurns,
    /// Admin only.
    ResumeTurns,
}

impl ClientIntent {
    pub fn requires_admin(&self) -> bool {
        matches!(self, Self::ChangeMode { .. } | Self::PauseTurns | Self::ResumeTurns)
    }

    pub fn requires_drive(&self) -> bool {
        matches!(self, Self::Drive { .. } | Self::AuxMotors { .. } | Self::Dock)
    }
}
