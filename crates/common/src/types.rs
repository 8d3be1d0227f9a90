//! Common identifier types for Orion components.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique internal identifier for a session.
///
/// Distinct from the session token: the id is never sent to clients
/// and carries no secrecy requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Create a new random session ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Character set for lobby identifiers.
const LOBBY_ID_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Length of a lobby identifier.
pub const LOBBY_ID_LEN: usize = 5;

/// Public identifier for a lobby: exactly 5 characters from `[A-Z0-9]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LobbyId(String);

impl LobbyId {
    /// Draw a fresh random lobby ID.
    ///
    /// Collision handling (re-draw while taken) is the caller's job;
    /// this only produces a well-formed candidate.
    #[must_use]
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let id = (0..LOBBY_ID_LEN)
            .map(|_| {
                let idx = rng.gen_range(0..LOBBY_ID_CHARSET.len());
                LOBBY_ID_CHARSET[idx] as char
            })
            .collect();
        Self(id)
    }

    /// Interpret an externally supplied string as a lobby ID.
    ///
    /// No validation happens here: a malformed id simply never matches
    /// a live lobby, which callers report as "lobby doesn't exist".
    #[must_use]
    pub fn from_external(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LobbyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
