//! Access gate: connection classification, mode enforcement and
//! single-session-per-identity.
//!
//! ```text
//!                 ┌────────── mode ──────────┐
//!   role / kind   │ admin   open   turns  lockdown
//!   ──────────────┼──────────────────────────────
//!   admin driver  │  ✓       ✓      ✓       ✓
//!   admin viewer  │  ✓       ✓      ✓      bypass
//!   guest driver  │  ✗       ✓      ✓       ✗
//!   guest viewer  │  ✗       ✓      ✓       ✗
//! ```
//!
//! The gate owns the connection registry.  It decides who is admitted
//! and who may drive in principle; whether a guest may drive *now*
//! under turns mode is the scheduler's call, passed in as `holder`.

pub mod credentials;
pub mod session;

use std::collections::BTreeMap;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::config::AccessConfig;
use crate::timer::Millis;

pub use credentials::CredentialDirectory;
pub use session::{normalize_identity_key, ConnectionId, SessionClaims};

const MAX_NICKNAME_CHARS: usize = 24;

// ═══════════════════════════════════════════════════════════════
//  Types
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessMode {
    /// Admins only.
    Admin,
    /// Every guest may drive at once.
    Open,
    /// Guests take timed turns.
    #[default]
    Turns,
    /// Nobody but bypass-privileged admins.
    Lockdown,
}

impl AccessMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Open => "open",
            Self::Turns => "turns",
            Self::Lockdown => "lockdown",
        }
    }
}

impl core::fmt::Display for AccessMode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionKind {
    /// Interactive client.
    #[default]
    Driver,
    /// Read-only spectator link.
    Viewer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    Admin { name: String, lockdown_bypass: bool },
    Guest,
}

/// Why a connection was refused or closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    AdminModeEnabled,
    LockdownEnabled,
    SessionReplaced,
}

impl DenyReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AdminModeEnabled => "ADMIN_MODE_ENABLED",
            Self::LockdownEnabled => "LOCKDOWN_ENABLED",
            Self::SessionReplaced => "SESSION_REPLACED",
        }
    }
}

/// What a client presents when it connects.
#[derive(Debug, Clone, Default)]
pub struct ConnectRequest {
    pub credential: Option<String>,
    pub identity_key: Option<String>,
    pub kind: ConnectionKind,
    pub spectating: bool,
    pub nickname: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ConnectionRecord {
    pub id: ConnectionId,
    pub role: Role,
    pub kind: ConnectionKind,
    pub identity_key: Option<String>,
    pub nickname: String,
    pub spectating: bool,
    /// Effective drive flag last pushed to the client.
    pub can_drive: bool,
    pub last_drive_at: Option<Millis>,
}

impl ConnectionRecord {
    pub fn is_admin(&self) -> bool {
        matches!(self.role, Role::Admin { .. })
    }

    fn lockdown_bypass(&self) -> bool {
        matches!(
            self.role,
            Role::Admin {
                lockdown_bypass: true,
                ..
            }
        )
    }

    /// Guests that belong in the turn queue.
    pub fn wants_turns(&self) -> bool {
        !self.is_admin() && self.kind == ConnectionKind::Driver && !self.spectating
    }
}

// ═══════════════════════════════════════════════════════════════
//  Gate
// ═══════════════════════════════════════════════════════════════

pub struct AccessGate {
    mode: AccessMode,
    credentials: CredentialDirectory,
    connections: BTreeMap<ConnectionId, ConnectionRecord>,
    claims: SessionClaims,
}

impl AccessGate {
    pub fn new(config: &AccessConfig) -> Self {
        Self {
            mode: config.default_mode,
            credentials: CredentialDirectory::from_entries(&config.admins),
            connections: BTreeMap::new(),
            claims: SessionClaims::new(),
        }
    }

    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    /// Classify and register connection `id`.  On success returns the
    /// prior holder of the same identity key, already unregistered.
    pub fn admit(
        &mut self,
        id: ConnectionId,
        request: ConnectRequest,
    ) -> Result<Option<ConnectionId>, DenyReason> {
        let role = match request
            .credential
            .as_deref()
            .and_then(|c| self.credentials.authenticate(c))
        {
            Some(admin) => Role::Admin {
                name: admin.name.clone(),
                lockdown_bypass: admin.lockdown_bypass,
            },
            None => Role::Guest,
        };
        let bypass = matches!(
            role,
            Role::Admin {
                lockdown_bypass: true,
                ..
            }
        );
        permitted(self.mode, &role, request.kind, bypass)?;

        debug_assert!(!self.connections.contains_key(&id), "connection id {id} reused");
        let identity_key = request.identity_key.as_deref().and_then(normalize_identity_key);
        let mut displaced = None;
        if role == Role::Guest && request.kind == ConnectionKind::Driver {
            if let Some(key) = &identity_key {
                displaced = self.claims.claim(key, id);
            }
        }
        if let Some(prev) = displaced {
            info!("access: {prev} replaced by {id}");
            self.connections.remove(&prev);
        }

        let nickname = request
            .nickname
            .as_deref()
            .and_then(sanitize_nickname)
            .unwrap_or_else(|| fallback_nickname(identity_key.as_deref(), id));

        match &role {
            Role::Admin { name, .. } => info!("access: {id} joined as admin {name}"),
            Role::Guest => info!("access: {id} joined as guest"),
        }
        self.connections.insert(
            id,
            ConnectionRecord {
                id,
                role,
                kind: request.kind,
                identity_key,
                nickname,
                spectating: request.spectating,
                can_drive: false,
                last_drive_at: None,
            },
        );
        Ok(displaced)
    }

    /// Unregister a connection.  Its identity key is freed only if it
    /// still holds it.
    pub fn remove(&mut self, id: ConnectionId) -> Option<ConnectionRecord> {
        let record = self.connections.remove(&id)?;
        if let Some(key) = &record.identity_key {
            self.claims.release(key, id);
        }
        Some(record)
    }

    /// Switch modes and unregister everyone the new mode refuses.
    /// Returns the evicted connections with the reason to send.
    pub fn set_mode(&mut self, mode: AccessMode) -> Vec<(ConnectionId, DenyReason)> {
        if mode == self.mode {
            return Vec::new();
        }
        info!("access: mode {} -> {}", self.mode, mode);
        self.mode = mode;
        let evicted: Vec<_> = self
            .connections
            .values()
            .filter_map(|c| {
                permitted(mode, &c.role, c.kind, c.lockdown_bypass())
                    .err()
                    .map(|reason| (c.id, reason))
            })
            .collect();
        for (id, reason) in &evicted {
            warn!("access: evicting {id} ({})", reason.as_str());
            self.remove(*id);
        }
        evicted
    }

    /// Whether `id` may drive under the current mode, given the turn
    /// holder.
    pub fn base_drive(&self, id: ConnectionId, holder: Option<ConnectionId>) -> bool {
        let Some(c) = self.connections.get(&id) else {
            return false;
        };
        if c.kind == ConnectionKind::Viewer {
            return false;
        }
        if c.is_admin() {
            return true;
        }
        if c.spectating {
            return false;
        }
        match self.mode {
            AccessMode::Open => true,
            AccessMode::Turns => holder == Some(id),
            AccessMode::Admin | AccessMode::Lockdown => false,
        }
    }

    /// Record the flag last pushed to the client.  Returns `true` if it
    /// changed.
    pub fn set_can_drive(&mut self, id: ConnectionId, can_drive: bool) -> bool {
        match self.connections.get_mut(&id) {
            Some(c) if c.can_drive != can_drive => {
                c.can_drive = can_drive;
                true
            }
            _ => false,
        }
    }

    /// Returns the stored nickname, or `None` for an unknown id or an
    /// unusable name.
    pub fn set_nickname(&mut self, id: ConnectionId, raw: &str) -> Option<&str> {
        let nickname = sanitize_nickname(raw)?;
        let c = self.connections.get_mut(&id)?;
        c.nickname = nickname;
        Some(&c.nickname)
    }

    /// Returns `true` if the flag changed.
    pub fn set_spectating(&mut self, id: ConnectionId, spectating: bool) -> bool {
        match self.connections.get_mut(&id) {
            Some(c) if c.spectating != spectating => {
                c.spectating = spectating;
                true
            }
            _ => false,
        }
    }

    pub fn record_drive(&mut self, id: ConnectionId, now: Millis) {
        if let Some(c) = self.connections.get_mut(&id) {
            c.last_drive_at = Some(now);
        }
    }

    pub fn get(&self, id: ConnectionId) -> Option<&ConnectionRecord> {
        self.connections.get(&id)
    }

    pub fn is_live(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    pub fn nickname(&self, id: ConnectionId) -> Option<&str> {
        self.connections.get(&id).map(|c| c.nickname.as_str())
    }

    pub fn connections(&self) -> impl Iterator<Item = &ConnectionRecord> {
        self.connections.values()
    }

    /// Connection ids in join order.
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.connections.keys().copied().collect()
    }

    /// Guests eligible for the turn queue, in join order.
    pub fn queue_candidates(&self) -> Vec<ConnectionId> {
        self.connections
            .values()
            .filter(|c| c.wants_turns())
            .map(|c| c.id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

/// Admission matrix.
fn permitted(
    mode: AccessMode,
    role: &Role,
    kind: ConnectionKind,
    bypass: bool,
) -> Result<(), DenyReason> {
    match (role, mode) {
        (Role::Admin { .. }, AccessMode::Lockdown)
            if kind == ConnectionKind::Viewer && !bypass =>
        {
            Err(DenyReason::LockdownEnabled)
        }
        (Role::Admin { .. }, _) => Ok(()),
        (Role::Guest, AccessMode::Admin) => Err(DenyReason::AdminModeEnabled),
        (Role::Guest, AccessMode::Lockdown) => Err(DenyReason::LockdownEnabled),
        (Role::Guest, AccessMode::Open | AccessMode::Turns) => Ok(()),
    }
}

/// Keep letters, digits, space, `_` and `-`; trim; cap at 24 chars.
pub fn sanitize_nickname(raw: &str) -> Option<String> {
    let kept: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '_' | '-'))
        .collect();
    let name: String = kept.trim().chars().take(MAX_NICKNAME_CHARS).collect();
    let name = name.trim_end().to_owned();
    (!name.is_empty()).then_some(name)
}

fn fallback_nickname(identity_key: Option<&str>, id: ConnectionId) -> String {
    match identity_key {
        Some(key) => {
            let skip = key.chars().count().saturating_sub(4);
            let tail: String = key.chars().skip(skip).collect();
            format!("User {tail}")
        }
        None => format!("User {id}"),
    }
}
