//! [`ClientHub`] adapter over the outbound channel.

use log::warn;

use crate::access::ConnectionId;
use crate::app::events::ClientEvent;
use crate::app::ports::ClientHub;

use super::channels::{OUTBOUND, Outbound, Target};
use super::protocol::encode_event;

/// Encodes events and queues them for the I/O thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChannelHub;

impl ChannelHub {
    fn push(&self, target: Target, event: &ClientEvent, close: bool) {
        let line = match encode_event(event) {
            Ok(line) => line,
            Err(e) => {
                warn!("net: cannot encode event: {e}");
                return;
            }
        };
        if OUTBOUND.try_send(Outbound { target, line, close }).is_err() {
            warn!("net: outbound queue full, dropping event for {target:?}");
        }
    }
}

impl ClientHub for ChannelHub {
    fn broadcast(&mut self, event: &ClientEvent) {
        self.push(Target::All, event, false);
    }

    fn send_to(&mut self, id: ConnectionId, event: &ClientEvent) {
        self.push(Target::One(id), event, false);
    }

    fn disconnect(&mut self, id: ConnectionId, reason: &'static str) {
        self.push(Target::One(id), &ClientEvent::Disconnected { reason }, true);
    }
}
