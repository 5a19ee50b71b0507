//! Log-backed hook adapter.
//!
//! Implements both side-channel hooks by writing to the log.  A chat
//! bot or webhook adapter would implement the same traits.

use log::{info, warn};

use crate::app::events::Announcement;
use crate::app::ports::{AlertHook, AnnouncementHook};
use crate::error::HookError;

/// Writes announcements at `info` and alerts at `warn`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogHooks;

impl LogHooks {
    pub fn new() -> Self {
        Self
    }
}

impl AnnouncementHook for LogHooks {
    fn announce(&mut self, announcement: &Announcement) -> Result<(), HookError> {
        info!("ANNOUNCE | {announcement}");
        Ok(())
    }
}

impl AlertHook for LogHooks {
    fn alert(&mut self, message: &str) -> Result<(), HookError> {
        warn!("ALERT | {message}");
        Ok(())
    }
}
