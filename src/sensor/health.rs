//! Parse-health accounting and emission throttling.
//!
//! Decode cadence (every serial chunk) is decoupled from what the rest
//! of the system sees:
//!
//! ```text
//!  decoder ──faults──▶ ParseRate ──every 10 s──▶ warn!("… errors/s")
//!     │
//!     └──readings──▶ EmitThrottle ──≥ min interval, latest wins──▶ clients
//! ```

use log::warn;

use crate::timer::Millis;

// ───────────────────────────────────────────────────────────────
// Parse error rate
// ───────────────────────────────────────────────────────────────

/// Counts protocol faults and reports their rate once per window.
#[derive(Debug, Clone)]
pub struct ParseRate {
    window_ms: Millis,
    window_start: Millis,
    errors: u64,
}

impl ParseRate {
    pub fn new(window_ms: Millis, now: Millis) -> Self {
        Self {
            window_ms,
            window_start: now,
            errors: 0,
        }
    }

    pub fn record(&mut self) {
        self.errors += 1;
    }

    /// Close the window if it has elapsed.  Returns the error rate per
    /// second when any errors were seen, and logs it.
    pub fn report(&mut self, now: Millis) -> Option<f32> {
        let elapsed = now.saturating_sub(self.window_start);
        if elapsed < self.window_ms {
            return None;
        }
        let errors = core::mem::take(&mut self.errors);
        self.window_start = now;
        if errors == 0 {
            return None;
        }
        let rate = errors as f32 / (elapsed as f32 / 1000.0);
        warn!("decoder: sensor parse errors per second: {:.2}", rate);
        Some(rate)
    }
}

// ───────────────────────────────────────────────────────────────
// Emission throttle
// ───────────────────────────────────────────────────────────────

/// Lets at most one value through per `min_interval`, always the newest.
///
/// A value arriving inside the window is parked and released by
/// [`flush`](Self::flush) once the window has passed, so the final
/// reading of a burst is never lost.
#[derive(Debug, Clone)]
pub struct EmitThrottle<T> {
    min_interval: Millis,
    last_emit: Option<Millis>,
    pending: Option<T>,
}

impl<T> EmitThrottle<T> {
    pub fn new(min_interval: Millis) -> Self {
        Self {
            min_interval,
            last_emit: None,
            pending: None,
        }
    }

    /// Offer a fresh value.  Returns it straight away when due.
    pub fn offer(&mut self, value: T, now: Millis) -> Option<T> {
        self.pending = Some(value);
        self.flush(now)
    }

    /// Release the parked value if the interval has elapsed.
    pub fn flush(&mut self, now: Millis) -> Option<T> {
        if !self.is_due(now) {
            return None;
        }
        let value = self.pending.take()?;
        self.last_emit = Some(now);
        Some(value)
    }

    fn is_due(&self, now: Millis) -> bool {
        self.last_emit
            .is_none_or(|last| now.saturating_sub(last) >= self.min_interval)
    }
}
