//! Monotonic clock adapter.
//!
//! Milliseconds since the adapter was created, read from
//! `std::time::Instant`.  The core only ever sees the resulting
//! [`Millis`].

use std::time::Instant;

use crate::app::ports::Clock;
use crate::timer::Millis;

pub struct SystemClock {
    start: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> Millis {
        self.start.elapsed().as_millis() as Millis
    }
}
