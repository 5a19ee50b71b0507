//! Rover idle watch.
//!
//! Nags the alert hook when the rover sits off the dock with nobody
//! driving it, so it does not drain its battery in the middle of a room.

use log::info;

use crate::config::IdleWatchConfig;
use crate::timer::Millis;

pub const IDLE_ALERT: &str = "[Alert] The rover appears undocked and nobody is currently driving. \
Please dock it or hand it off as soon as you can.";

#[derive(Debug, Clone)]
pub struct IdleWatch {
    config: IdleWatchConfig,
    next_check: Millis,
    last_activity: Millis,
    last_alert: Option<Millis>,
}

impl IdleWatch {
    pub fn new(config: IdleWatchConfig, now: Millis) -> Self {
        Self {
            next_check: now + config.check_interval_ms,
            last_activity: now,
            last_alert: None,
            config,
        }
    }

    /// An accepted drive command.
    pub fn record_activity(&mut self, now: Millis) {
        self.last_activity = now;
    }

    /// Run a check if one is due.  Returns the alert text to send.
    /// `docked` is `None` until the first reading arrives.
    pub fn poll(&mut self, now: Millis, docked: Option<bool>) -> Option<&'static str> {
        if !self.config.enabled || now < self.next_check {
            return None;
        }
        self.next_check = now + self.config.check_interval_ms;

        match docked {
            None => None,
            Some(true) => {
                self.last_alert = None;
                None
            }
            Some(false) => {
                let idle_for = now.saturating_sub(self.last_activity);
                if idle_for < self.config.idle_threshold_ms {
                    return None;
                }
                let due = self.last_alert.is_none_or(|t| {
                    now.saturating_sub(t) >= self.config.reminder_interval_ms
                });
                if !due {
                    return None;
                }
                info!("idle: rover undocked and idle for {} s", idle_for / 1000);
                self.last_alert = Some(now);
                Some(IDLE_ALERT)
            }
        }
    }
}
