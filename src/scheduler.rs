//! Turn scheduler: time-sliced drive authority for queued guests.
//!
//! The scheduler owns the queue and the turn timers but nothing else.
//! Everything it decides goes out through a [`TurnDelegate`]; the
//! service turns those events into drive flags, motor halts and client
//! broadcasts.
//!
//! ```text
//!            admit / set_enabled(true)
//!   ┌──────┐ ─────────────────────────▶ ┌────────┐
//!   │ Idle │                            │ Active │ ◀─┐ expiry / idle-skip:
//!   └──────┘ ◀───────────────────────── └────────┘ ──┘ rotate head, promote
//!      ▲       queue empty / disabled     │    ▲
//!      │                        set_pause │    │ clear_pause (fresh turn)
//!      │                                  ▼    │
//!      └──────────── disabled ──────── ┌────────┐
//!                                      │ Paused │
//!                                      └────────┘
//! ```
//!
//! Every armed timer carries a [`TurnToken`].  Promotion bumps the
//! epoch, so a deadline captured for an earlier turn is ignored when it
//! comes due.

use std::collections::VecDeque;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::access::ConnectionId;
use crate::app::ports::{ChargingPause, TurnDelegate};
use crate::config::TurnConfig;
use crate::timer::{take_expired, Deadline, Millis};

// ═══════════════════════════════════════════════════════════════
//  Types
// ═══════════════════════════════════════════════════════════════

/// Why turns are halted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PauseReason {
    BatteryCharging,
    Manual,
}

/// Identity a timer was armed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnToken {
    pub driver: ConnectionId,
    pub epoch: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Idle,
    Active,
    Paused,
}

/// Periodic view of the queue for clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnSnapshot {
    pub enabled: bool,
    pub queue: Vec<ConnectionId>,
    pub current_driver: Option<ConnectionId>,
    pub turn_duration_ms: Millis,
    pub turn_expires_at: Option<Millis>,
    pub time_remaining_ms: Option<Millis>,
    pub idle_skip_expires_at: Option<Millis>,
    pub idle_grace_period_ms: Millis,
    pub server_timestamp: Millis,
    pub pause_reason: Option<PauseReason>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnEvent {
    /// `driver` now holds the turn.
    Granted(ConnectionId),
    /// `driver` lost the turn.
    Revoked(ConnectionId),
    /// `driver` forfeited for not moving within the grace window.
    IdleSkipped { driver: ConnectionId, grace_secs: u64 },
    /// Zero every motor output.
    HaltMotors,
    Snapshot(TurnSnapshot),
}

impl TurnEvent {
    /// Notice for the skipped driver.
    pub fn idle_skip_notice(grace_secs: u64) -> String {
        format!("Your turn was skipped because you did not move within {grace_secs} seconds.")
    }
}

// ═══════════════════════════════════════════════════════════════
//  Scheduler
// ═══════════════════════════════════════════════════════════════

pub struct TurnScheduler {
    turn_duration_ms: Millis,
    idle_grace_ms: Millis,
    broadcast_interval_ms: Millis,
    enabled: bool,
    /// Head is the current or next driver.  No duplicates.
    queue: VecDeque<ConnectionId>,
    current: Option<ConnectionId>,
    turn: Option<Deadline<TurnToken>>,
    idle_skip: Option<Deadline<TurnToken>>,
    next_broadcast: Option<Millis>,
    pause: Option<PauseReason>,
    epoch: u64,
}

impl TurnScheduler {
    pub fn new(config: &TurnConfig) -> Self {
        Self {
            turn_duration_ms: config.turn_duration_ms,
            idle_grace_ms: config.idle_grace_ms,
            broadcast_interval_ms: config.broadcast_interval_ms,
            enabled: false,
            queue: VecDeque::new(),
            current: None,
            turn: None,
            idle_skip: None,
            next_broadcast: None,
            pause: None,
            epoch: 0,
        }
    }

    // ───────────────────────────────────────────────────────────
    //  Mode
    // ───────────────────────────────────────────────────────────

    /// Switch arbitration on or off.  Turning it on rehydrates the
    /// queue from `guests` in the given order.
    pub fn set_enabled(
        &mut self,
        enabled: bool,
        guests: impl IntoIterator<Item = ConnectionId>,
        now: Millis,
        out: &mut dyn TurnDelegate,
    ) {
        if enabled {
            self.enabled = true;
            for id in guests {
                if !self.queue.contains(&id) {
                    self.queue.push_back(id);
                }
            }
            info!("turns: enabled with {} queued", self.queue.len());
            if self.current.is_none() && self.pause.is_none() {
                self.promote_head(now, out);
            }
            self.broadcast(now, out);
            return;
        }

        if !self.enabled {
            return;
        }
        info!("turns: disabled");
        self.revoke_current(out);
        self.queue.clear();
        self.pause = None;
        self.next_broadcast = None;
        self.enabled = false;
        out.on_turn_event(TurnEvent::Snapshot(self.snapshot(now)));
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    // ───────────────────────────────────────────────────────────
    //  Queue
    // ───────────────────────────────────────────────────────────

    /// Append a guest to the tail.  Re-admitting a queued guest is a
    /// no-op; admins never reach here.
    pub fn admit(&mut self, id: ConnectionId, now: Millis, out: &mut dyn TurnDelegate) {
        if !self.enabled || self.queue.contains(&id) {
            return;
        }
        self.queue.push_back(id);
        debug!("turns: queued {id} at position {}", self.queue.len());
        if self.current.is_none() && self.pause.is_none() {
            self.promote_head(now, out);
        }
        self.broadcast(now, out);
    }

    /// Drop a guest from the queue (disconnect or spectate).
    pub fn remove(&mut self, id: ConnectionId, now: Millis, out: &mut dyn TurnDelegate) {
        let Some(pos) = self.queue.iter().position(|&q| q == id) else {
            return;
        };
        self.queue.remove(pos);
        debug!("turns: removed {id}");
        if self.current == Some(id) {
            self.current = None;
            self.turn = None;
            self.idle_skip = None;
            out.on_turn_event(TurnEvent::HaltMotors);
            if self.pause.is_none() {
                self.promote_head(now, out);
            }
        }
        self.broadcast(now, out);
    }

    /// A drive command from the holder cancels idle-skip for the rest
    /// of the turn.
    pub fn record_drive(&mut self, id: ConnectionId) {
        if self.current == Some(id) && self.idle_skip.take().is_some() {
            debug!("turns: {id} moved, idle-skip cancelled");
        }
    }

    // ───────────────────────────────────────────────────────────
    //  Timers
    // ───────────────────────────────────────────────────────────

    /// Fire due timers and the periodic snapshot.
    pub fn tick(&mut self, now: Millis, out: &mut dyn TurnDelegate) {
        if let Some(token) = take_expired(&mut self.idle_skip, now) {
            if self.is_current(token) {
                let grace_secs = self.idle_grace_ms / 1000;
                info!("turns: {} idle for {grace_secs}s, skipping", token.driver);
                self.turn = None;
                self.current = None;
                out.on_turn_event(TurnEvent::Revoked(token.driver));
                out.on_turn_event(TurnEvent::IdleSkipped {
                    driver: token.driver,
                    grace_secs,
                });
                self.rotate_head(token.driver, out);
                self.promote_head(now, out);
                self.broadcast(now, out);
            }
        }

        if let Some(token) = take_expired(&mut self.turn, now) {
            if self.is_current(token) {
                info!("turns: turn of {} ended", token.driver);
                self.idle_skip = None;
                self.current = None;
                out.on_turn_event(TurnEvent::Revoked(token.driver));
                self.rotate_head(token.driver, out);
                self.promote_head(now, out);
                self.broadcast(now, out);
            }
        }

        if self.next_broadcast.is_some_and(|t| now >= t) {
            self.broadcast(now, out);
        }
    }

    // ───────────────────────────────────────────────────────────
    //  Queries
    // ───────────────────────────────────────────────────────────

    /// Connection currently allowed to drive under turns.
    pub fn holder(&self) -> Option<ConnectionId> {
        self.current
    }

    pub fn phase(&self) -> TurnPhase {
        if !self.enabled {
            TurnPhase::Idle
        } else if self.pause.is_some() && !self.queue.is_empty() {
            TurnPhase::Paused
        } else if self.current.is_some() {
            TurnPhase::Active
        } else {
            TurnPhase::Idle
        }
    }

    pub fn queue(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.queue.iter().copied()
    }

    pub fn snapshot(&self, now: Millis) -> TurnSnapshot {
        TurnSnapshot {
            enabled: self.enabled,
            queue: self.queue.iter().copied().collect(),
            current_driver: self.current,
            turn_duration_ms: self.turn_duration_ms,
            turn_expires_at: self.turn.as_ref().map(Deadline::at),
            time_remaining_ms: self.turn.as_ref().map(|d| d.remaining(now)),
            idle_skip_expires_at: self.idle_skip.as_ref().map(Deadline::at),
            idle_grace_period_ms: self.idle_grace_ms,
            server_timestamp: now,
            pause_reason: self.pause,
        }
    }

    // ───────────────────────────────────────────────────────────
    //  Internal
    // ───────────────────────────────────────────────────────────

    fn is_current(&self, token: TurnToken) -> bool {
        self.current == Some(token.driver) && self.epoch == token.epoch
    }

    /// Move `driver` from the head to the tail, or drop it if gone.
    fn rotate_head(&mut self, driver: ConnectionId, out: &dyn TurnDelegate) {
        if self.queue.front() != Some(&driver) {
            return;
        }
        self.queue.pop_front();
        if out.is_live(driver) {
            self.queue.push_back(driver);
        } else {
            debug!("turns: {driver} gone, dropped instead of rotated");
        }
    }

    /// Grant the head a fresh turn, skipping entries that went away.
    fn promote_head(&mut self, now: Millis, out: &mut dyn TurnDelegate) {
        self.turn = None;
        self.idle_skip = None;
        self.current = None;
        if !self.enabled || self.pause.is_some() {
            return;
        }
        while let Some(&head) = self.queue.front() {
            if !out.is_live(head) {
                warn!("turns: head {head} no longer connected, skipping");
                self.queue.pop_front();
                continue;
            }
            out.on_turn_event(TurnEvent::HaltMotors);
            self.epoch += 1;
            let token = TurnToken {
                driver: head,
                epoch: self.epoch,
            };
            self.current = Some(head);
            self.turn = Some(Deadline::new(now + self.turn_duration_ms, token));
            self.idle_skip = Some(Deadline::new(now + self.idle_grace_ms, token));
            info!("turns: {head} promoted (epoch {})", self.epoch);
            out.on_turn_event(TurnEvent::Granted(head));
            return;
        }
        debug!("turns: queue empty");
    }

    fn revoke_current(&mut self, out: &mut dyn TurnDelegate) {
        self.turn = None;
        self.idle_skip = None;
        if let Some(id) = self.current.take() {
            out.on_turn_event(TurnEvent::Revoked(id));
            out.on_turn_event(TurnEvent::HaltMotors);
        }
    }

    /// Emit a snapshot now and schedule the next; stop when idle.
    fn broadcast(&mut self, now: Millis, out: &mut dyn TurnDelegate) {
        if self.phase() == TurnPhase::Idle {
            self.next_broadcast = None;
            return;
        }
        out.on_turn_event(TurnEvent::Snapshot(self.snapshot(now)));
        self.next_broadcast = Some(now + self.broadcast_interval_ms);
    }
}

impl ChargingPause for TurnScheduler {
    fn pause_reason(&self) -> Option<PauseReason> {
        self.pause
    }

    fn set_charging_pause(&mut self, reason: PauseReason, now: Millis, out: &mut dyn TurnDelegate) {
        if self.pause == Some(reason) {
            self.broadcast(now, out);
            return;
        }
        info!("turns: paused ({reason:?})");
        self.pause = Some(reason);
        self.revoke_current(out);
        self.broadcast(now, out);
    }

    fn clear_charging_pause(&mut self, now: Millis, out: &mut dyn TurnDelegate) {
        let Some(reason) = self.pause.take() else {
            return;
        };
        info!("turns: resumed after {reason:?} pause");
        if self.current.is_none() {
            self.promote_head(now, out);
        }
        self.broadcast(now, out);
    }
}
