//! Single-session enforcement per identity key.
//!
//! A guest presents an opaque identity key.  The first connection to
//! claim a key holds it; a later claim takes it over and hands back the
//! displaced holder so the caller can disconnect it.  Release is
//! conditional on still being the holder, so a connection closed after
//! a takeover cannot free the key out from under its successor.

use std::collections::HashMap;

use log::debug;

/// Process-unique connection handle.
pub type ConnectionId = u32;

/// Longest accepted identity key, in bytes.
pub const MAX_IDENTITY_KEY_LEN: usize = 64;

/// Trim and bound-check a client-supplied key.
pub fn normalize_identity_key(raw: &str) -> Option<String> {
    let key = raw.trim();
    (!key.is_empty() && key.len() <= MAX_IDENTITY_KEY_LEN).then(|| key.to_owned())
}

#[derive(Debug, Default)]
pub struct SessionClaims {
    holders: HashMap<String, ConnectionId>,
}

impl SessionClaims {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `id` as the holder of `key`.  Returns the previous
    /// holder if it was a different connection.
    pub fn claim(&mut self, key: &str, id: ConnectionId) -> Option<ConnectionId> {
        let previous = self.holders.insert(key.to_owned(), id);
        match previous {
            Some(prev) if prev != id => {
                debug!("access: identity key taken over by {id} from {prev}");
                Some(prev)
            }
            _ => None,
        }
    }

    /// Free `key` if `id` still holds it.
    pub fn release(&mut self, key: &str, id: ConnectionId) -> bool {
        if self.holders.get(key) == Some(&id) {
            self.holders.remove(key);
            true
        } else {
            false
        }
    }

    pub fn holder(&self, key: &str) -> Option<ConnectionId> {
        self.holders.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.holders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.holders.is_empty()
    }
}
