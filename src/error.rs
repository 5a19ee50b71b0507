//! Unified error types for the rover coordination core.
//!
//! A single `Error` enum that every subsystem can convert into, keeping
//! the reactor's error handling uniform.  All variants are `Copy` so they
//! can be logged and passed around without allocation.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible operation in the core funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The serial link to the rover is unavailable or failed.
    Link(LinkError),
    /// A sensor frame failed validation.
    Protocol(FrameError),
    /// A side-channel hook (announcements, alerts) failed.
    Hook(HookError),
    /// Configuration is invalid or could not be loaded.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Link(e) => write!(f, "link: {e}"),
            Self::Protocol(e) => write!(f, "protocol: {e}"),
            Self::Hook(e) => write!(f, "hook: {e}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Serial link errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    /// The port is closed; the command was dropped, not queued.
    Down,
    /// The outbound queue to the serial thread is full.
    Full,
    /// The OS reported a write failure.
    Io,
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Down => write!(f, "serial link down"),
            Self::Full => write!(f, "serial queue full"),
            Self::Io => write!(f, "serial write failed"),
        }
    }
}

impl From<LinkError> for Error {
    fn from(e: LinkError) -> Self {
        Self::Link(e)
    }
}

// ---------------------------------------------------------------------------
// Sensor frame errors
// ---------------------------------------------------------------------------

/// Why a candidate sensor frame was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Length byte is zero or longer than the full packet layout.
    BadLength(u8),
    /// Frame bytes do not sum to zero mod 256.
    Checksum,
    /// A packet id appeared out of the agreed order.
    UnexpectedId { expected: u8, found: u8 },
    /// The payload ended inside a packet value.
    Truncated { id: u8 },
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadLength(n) => write!(f, "bad payload length {n}"),
            Self::Checksum => write!(f, "checksum mismatch"),
            Self::UnexpectedId { expected, found } => {
                write!(f, "unexpected packet id {found} (expected {expected})")
            }
            Self::Truncated { id } => write!(f, "packet {id} truncated"),
        }
    }
}

impl From<FrameError> for Error {
    fn from(e: FrameError) -> Self {
        Self::Protocol(e)
    }
}

// ---------------------------------------------------------------------------
// Hook errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookError {
    /// The collaborator is not configured or not reachable.
    Unavailable,
    /// The collaborator rejected or failed to deliver the notice.
    Delivery,
}

impl fmt::Display for HookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable => write!(f, "hook unavailable"),
            Self::Delivery => write!(f, "hook delivery failed"),
        }
    }
}

impl From<HookError> for Error {
    fn from(e: HookError) -> Self {
        Self::Hook(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
