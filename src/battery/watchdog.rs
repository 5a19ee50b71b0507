//! Autocharge watchdog and the low-battery alarm cadence.

use crate::timer::Millis;

// ───────────────────────────────────────────────────────────────
// Autocharge
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutochargeAction {
    Idle,
    /// Docked without charging; the timer just started.
    Started,
    /// Timer ran out; send the dock command to kick charging.
    Fire,
    /// Charging resumed or the rover left the dock.
    Reset,
}

impl AutochargeAction {
    /// Text relayed to clients, if any.
    pub fn message(self) -> Option<&'static str> {
        match self {
            Self::Idle => None,
            Self::Started => Some("Autocharge timer started"),
            Self::Fire => Some("Autocharge command sent"),
            Self::Reset => Some("Autocharge timer reset"),
        }
    }
}

/// Re-sends the dock command when the rover sits on the base without
/// charging for longer than `timeout_ms`.
#[derive(Debug, Clone)]
pub struct AutochargeWatchdog {
    enabled: bool,
    timeout_ms: Millis,
    started_at: Option<Millis>,
}

impl AutochargeWatchdog {
    pub fn new(enabled: bool, timeout_ms: Millis) -> Self {
        Self {
            enabled,
            timeout_ms,
            started_at: None,
        }
    }

    pub fn observe(&mut self, docked: bool, charging: bool, now: Millis) -> AutochargeAction {
        if !self.enabled {
            return AutochargeAction::Idle;
        }
        if docked && !charging {
            return match self.started_at {
                None => {
                    self.started_at = Some(now);
                    AutochargeAction::Started
                }
                Some(t) if now.saturating_sub(t) >= self.timeout_ms => {
                    self.started_at = None;
                    AutochargeAction::Fire
                }
                Some(_) => AutochargeAction::Idle,
            };
        }
        if self.started_at.take().is_some() {
            AutochargeAction::Reset
        } else {
            AutochargeAction::Idle
        }
    }

    pub fn is_armed(&self) -> bool {
        self.started_at.is_some()
    }
}

// ───────────────────────────────────────────────────────────────
// Alarm cadence
// ───────────────────────────────────────────────────────────────

/// Plays the alarm tone on alternate intervals while the rover needs
/// charge and is off the dock.
#[derive(Debug, Clone)]
pub struct LowBatteryAlarm {
    interval_ms: Millis,
    next_at: Option<Millis>,
    active: bool,
}

impl LowBatteryAlarm {
    pub fn new(interval_ms: Millis) -> Self {
        Self {
            interval_ms,
            next_at: None,
            active: false,
        }
    }

    /// Returns `true` when the tone should play now.
    pub fn tick(&mut self, now: Millis, needs_charge: bool, docked: bool) -> bool {
        if self.next_at.is_some_and(|t| now < t) {
            return false;
        }
        self.next_at = Some(now + self.interval_ms);
        if needs_charge && !docked {
            self.active = !self.active;
            self.active
        } else {
            self.active = false;
            false
        }
    }
}
