//! Channels between the network I/O thread and the control loop.
//!
//! ```text
//! ┌──────────────┐   Inbound    ┌──────────────┐
//! │   I/O task   │─────────────▶│ Control loop │
//! │   (async)    │◀─────────────│    (sync)    │
//! └──────────────┘   Outbound   └──────────────┘
//! ```

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;

use crate::access::{ConnectRequest, ConnectionId};
use crate::app::commands::ClientIntent;

/// Client activity, delivered to the control loop.
#[derive(Debug)]
pub enum Inbound {
    Hello {
        id: ConnectionId,
        request: ConnectRequest,
    },
    Intent {
        id: ConnectionId,
        intent: ClientIntent,
    },
    Closed {
        id: ConnectionId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Every client that has been answered at least once.
    All,
    One(ConnectionId),
}

/// An encoded event line on its way to one or all clients.
#[derive(Debug)]
pub struct Outbound {
    pub target: Target,
    pub line: String,
    /// Close the connection after writing.
    pub close: bool,
}

const INBOUND_DEPTH: usize = 64;
const OUTBOUND_DEPTH: usize = 256;

pub static INBOUND: Channel<CriticalSectionRawMutex, Inbound, INBOUND_DEPTH> = Channel::new();

pub static OUTBOUND: Channel<CriticalSectionRawMutex, Outbound, OUTBOUND_DEPTH> = Channel::new();

/// Try to receive client activity without blocking.
pub fn try_recv_inbound() -> Option<Inbound> {
    INBOUND.try_receive().ok()
}
