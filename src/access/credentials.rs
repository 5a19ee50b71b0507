//! Administrator credential directory.
//!
//! Passwords never stay in memory in the clear: each entry keeps only
//! an HMAC-SHA256 tag of the password keyed by the admin's name.
//! Verification goes through `hmac_sha256::HMAC::verify`, which compares
//! in constant time, and every entry is checked on each attempt.

use log::{info, warn};

use crate::config::AdminEntry;

#[derive(Debug, Clone)]
pub struct AdminCredential {
    pub name: String,
    pub lockdown_bypass: bool,
    tag: [u8; 32],
}

impl AdminCredential {
    fn new(name: String, password: &str, lockdown_bypass: bool) -> Self {
        let tag = hmac_sha256::HMAC::mac(password.as_bytes(), name.as_bytes());
        Self {
            name,
            lockdown_bypass,
            tag,
        }
    }

    fn matches(&self, presented: &str) -> bool {
        hmac_sha256::HMAC::verify(presented.as_bytes(), self.name.as_bytes(), &self.tag)
    }
}

#[derive(Debug, Clone, Default)]
pub struct CredentialDirectory {
    entries: Vec<AdminCredential>,
}

impl CredentialDirectory {
    /// Build from config.  Entries without a password are skipped;
    /// unnamed ones become `Admin {n}`.
    pub fn from_entries(entries: &[AdminEntry]) -> Self {
        let mut out = Vec::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            if entry.password.is_empty() {
                warn!("access: admin entry {} has no password, ignored", i + 1);
                continue;
            }
            let name = match entry.name.trim() {
                "" => format!("Admin {}", i + 1),
                n => n.to_owned(),
            };
            out.push(AdminCredential::new(name, &entry.password, entry.lockdown_bypass));
        }
        info!("access: {} admin credential(s) loaded", out.len());
        Self { entries: out }
    }

    /// Find the admin whose password is `presented`.
    pub fn authenticate(&self, presented: &str) -> Option<&AdminCredential> {
        if presented.is_empty() {
            return None;
        }
        let mut found = None;
        for entry in &self.entries {
            if entry.matches(presented) && found.is_none() {
                found = Some(entry);
            }
        }
        found
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
