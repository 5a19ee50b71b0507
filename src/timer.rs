//! Virtual-time primitives shared by every state machine.
//!
//! Nothing in the core sleeps.  Timers are plain values holding an
//! absolute deadline in [`Millis`] and are checked by whoever owns them
//! when the reactor calls `tick(now)`.
//!
//! ```text
//!   arm(now + d, token) ──▶ Deadline ──[tick: now ≥ at]──▶ Some(token)
//!                              │
//!                        cancel / re-arm (old token discarded)
//! ```

use core::time::Duration;

/// Milliseconds on a monotonic clock.
pub type Millis = u64;

// ═══════════════════════════════════════════════════════════════
//  Deadline
// ═══════════════════════════════════════════════════════════════

/// A one-shot timer carrying the token captured when it was armed.
///
/// The token is handed back on expiry so the owner can re-validate it
/// against current state before acting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline<T> {
    at: Millis,
    token: T,
}

impl<T: Copy> Deadline<T> {
    pub fn new(at: Millis, token: T) -> Self {
        Self { at, token }
    }

    pub fn at(&self) -> Millis {
        self.at
    }

    pub fn token(&self) -> T {
        self.token
    }

    /// Milliseconds left before expiry (zero once due).
    pub fn remaining(&self, now: Millis) -> Millis {
        self.at.saturating_sub(now)
    }

    pub fn is_due(&self, now: Millis) -> bool {
        now >= self.at
    }
}

/// Take the token out of `slot` if its deadline has passed.
pub fn take_expired<T: Copy>(slot: &mut Option<Deadline<T>>, now: Millis) -> Option<T> {
    match slot {
        Some(d) if d.is_due(now) => slot.take().map(|d| d.token),
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════
//  Cooldown
// ═══════════════════════════════════════════════════════════════

/// Allows an action at most once per `period`.
#[derive(Debug, Clone)]
pub struct Cooldown {
    period: Millis,
    last: Option<Millis>,
}

impl Cooldown {
    pub fn new(period: Millis) -> Self {
        Self { period, last: None }
    }

    /// Returns `true` (and records `now`) when the window has elapsed.
    pub fn try_fire(&mut self, now: Millis) -> bool {
        let ready = self
            .last
            .is_none_or(|last| now.saturating_sub(last) >= self.period);
        if ready {
            self.last = Some(now);
        }
        ready
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

// ═══════════════════════════════════════════════════════════════
//  Backoff
// ═══════════════════════════════════════════════════════════════

/// Bounded exponential backoff for reconnect attempts.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Delay to wait before the next attempt; doubles up to `max`.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    /// Call after a successful connection.
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadline_expires_once() {
        let mut slot = Some(Deadline::new(100, 7u32));
        assert_eq!(take_expired(&mut slot, 99), None);
        assert_eq!(take_expired(&mut slot, 100), Some(7));
        assert_eq!(take_expired(&mut slot, 200), None);
    }

    #[test]
    fn deadline_remaining_saturates() {
        let d = Deadline::new(50, ());
        assert_eq!(d.remaining(20), 30);
        assert_eq!(d.remaining(80), 0);
    }

    #[test]
    fn cooldown_limits_rate() {
        let mut c = Cooldown::new(1000);
        assert!(c.try_fire(0));
        assert!(!c.try_fire(999));
        assert!(c.try_fire(1000));
        c.reset();
        assert!(c.try_fire(1001));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let mut b = Backoff::new(Duration::from_millis(500), Duration::from_secs(3));
        assert_eq!(b.next_delay(), Duration::from_millis(500));
        assert_eq!(b.next_delay(), Duration::from_secs(1));
        assert_eq!(b.next_delay(), Duration::from_secs(2));
        assert_eq!(b.next_delay(), Duration::from_secs(3));
        assert_eq!(b.next_delay(), Duration::from_secs(3));
        b.reset();
        assert_eq!(b.next_delay(), Duration::from_millis(500));
    }
}
