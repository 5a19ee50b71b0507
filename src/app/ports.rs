//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ RoverService (domain)
//! ```
//!
//! Driven adapters (serial link, client transport, hooks, clock)
//! implement these traits.  The [`RoverService`](super::service::RoverService)
//! reaches them through a [`PortSet`](super::service::PortSet), so the
//! core never touches a socket or a tty directly.
//!
//! Two traits are internal seams rather than adapter ports:
//! [`ChargingPause`] is what the battery machine may ask of the turn
//! scheduler, and [`TurnDelegate`] is where the scheduler reports to.

use crate::access::ConnectionId;
use crate::error::{HookError, LinkError};
use crate::scheduler::{PauseReason, TurnEvent};
use crate::timer::Millis;

use super::events::{Announcement, ClientEvent};

// ───────────────────────────────────────────────────────────────
// Clock
// ───────────────────────────────────────────────────────────────

/// Monotonic milliseconds.  Only adapters read a real clock.
pub trait Clock {
    fn now_ms(&self) -> Millis;
}

// ───────────────────────────────────────────────────────────────
// Hardware port (domain → rover)
// ───────────────────────────────────────────────────────────────

/// Fire-and-forget command writes to the rover.
///
/// Implementations drop the command while the link is down and report
/// [`LinkError::Down`]; nothing is queued for replay.
pub trait HardwarePort {
    fn send(&mut self, command: &[u8]) -> Result<(), LinkError>;
}

// ───────────────────────────────────────────────────────────────
// Client hub (domain → connected clients)
// ───────────────────────────────────────────────────────────────

pub trait ClientHub {
    fn broadcast(&mut self, event: &ClientEvent);

    fn send_to(&mut self, id: ConnectionId, event: &ClientEvent);

    /// Close a connection.  `reason` is sent to the client first.
    fn disconnect(&mut self, id: ConnectionId, reason: &'static str);
}

// ───────────────────────────────────────────────────────────────
// Side-channel hooks
// ───────────────────────────────────────────────────────────────

/// Announcement bot: mode changes and charge completion.
pub trait AnnouncementHook {
    fn announce(&mut self, announcement: &Announcement) -> Result<(), HookError>;
}

/// Alert bot: low battery and rover-idle notices.
pub trait AlertHook {
    fn alert(&mut self, message: &str) -> Result<(), HookError>;
}

// ───────────────────────────────────────────────────────────────
// Turn scheduler seams
// ───────────────────────────────────────────────────────────────

/// Receives everything the turn scheduler decides.
pub trait TurnDelegate {
    fn on_turn_event(&mut self, event: TurnEvent);

    /// Whether a queued connection is still connected.  Heads that are
    /// not get dropped during promotion.
    fn is_live(&self, id: ConnectionId) -> bool;
}

/// What the battery machine may ask of the turn scheduler.
///
/// Both calls must be idempotent: setting the active reason again only
/// rebroadcasts, clearing with no pause is a no-op.
pub trait ChargingPause {
    fn pause_reason(&self) -> Option<PauseReason>;

    fn set_charging_pause(
        &mut self,
        reason: PauseReason,
        now: Millis,
        out: &mut dyn TurnDelegate,
    );

    fn clear_charging_pause(&mut self, now: Millis, out: &mut dyn TurnDelegate);
}
