//! JSON-lines client protocol.
//!
//! The first line a client sends is a `hello` frame describing itself;
//! every later line is a [`ClientIntent`].  Outbound lines are
//! serialized [`ClientEvent`]s.
//!
//! ```text
//!   → {"type":"hello","credential":"…","identityKey":"…","kind":"driver"}
//!   ← {"event":"welcome","data":{"id":7,"isAdmin":false,…}}
//!   → {"type":"drive","left":120,"right":120}
//! ```

use serde::Deserialize;

use crate::access::{ConnectRequest, ConnectionKind};
use crate::app::commands::ClientIntent;
use crate::app::events::ClientEvent;

pub const MALFORMED: &str = "Malformed message.";
pub const HELLO_EXPECTED: &str = "Expected a hello frame.";
pub const RATE_LIMITED: &str = "Too many messages, slow down.";

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
enum Handshake {
    Hello {
        #[serde(default)]
        credential: Option<String>,
        #[serde(default)]
        identity_key: Option<String>,
        #[serde(default)]
        kind: ConnectionKind,
        #[serde(default)]
        spectating: bool,
        #[serde(default)]
        nickname: Option<String>,
    },
}

pub fn parse_hello(line: &str) -> Result<ConnectRequest, serde_json::Error> {
    let Handshake::Hello {
        credential,
        identity_key,
        kind,
        spectating,
        nickname,
    } = serde_json::from_str(line)?;
    Ok(ConnectRequest {
        credential: credential.filter(|c| !c.is_empty()),
        identity_key,
        kind,
        spectating,
        nickname,
    })
}

pub fn parse_intent(line: &str) -> Result<ClientIntent, serde_json::Error> {
    serde_json::from_str(line)
}

/// One newline-terminated line.
pub fn encode_event(event: &ClientEvent) -> Result<String, serde_json::Error> {
    let mut line = serde_json::to_string(event)?;
    line.push('\n');
    Ok(line)
}
