//! The session token type.
//!
//! A session token is the single cross-channel identity of a client:
//! issued once over the reliable stream, then presented in every
//! request-response body and every datagram. It is a secret, so the
//! type redacts itself in `Debug` output; any struct that derives
//! `Debug` around it is safe to log via `{:?}` or tracing fields.
//!
//! The raw value still has to cross the wire (the `client_registered`
//! frame delivers it to its owner), so unlike a pure in-memory secret
//! it serializes transparently. Code that needs the string for
//! anything else must go through [`SessionToken::expose`], which keeps
//! those sites easy to audit.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque secret identifying a session across all channels.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    /// Mint a fresh UUID-grade token.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Access the raw token value.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken([REDACTED])")
    }
}

impl From<String> for SessionToken {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl From<&str> for SessionToken {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}
