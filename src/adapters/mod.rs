//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter    | Implements                    | Connects to          |
//! |------------|-------------------------------|----------------------|
//! | `log_sink` | AnnouncementHook, AlertHook   | Process log          |
//! | `serial`   | HardwarePort                  | Rover serial port    |
//! | `time`     | Clock                         | `std::time::Instant` |
//!
//! The client side ([`ClientHub`](crate::app::ports::ClientHub)) lives
//! in [`net`](crate::net).

pub mod log_sink;
pub mod serial;
pub mod time;
