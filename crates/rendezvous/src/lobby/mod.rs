//! Lobby state: the in-memory coordination context for one host and
//! its peers.
//!
//! A lobby is pure data plus invariant checks; all mutation happens
//! under the lobby registry's lock. The host is always the member at
//! index 0, and member order is join order.

pub mod registry;

pub use registry::LobbyRegistry;

use crate::mediation::MediatorHandle;
use crate::session::SessionHandle;
use common::{LobbyId, SessionToken};
use serde::Serialize;

/// Maximum lobby capacity.
pub const MAX_CAPACITY: u32 = 64;

/// Maximum chat message length in characters.
pub const MAX_MESSAGE_LEN: usize = 250;

/// A session joined to a lobby under a display name.
///
/// The display name is the member's externally visible identifier
/// within the lobby; the token never leaves the server.
#[derive(Debug, Clone)]
pub struct LobbyMember {
    pub name: String,
    pub session: SessionHandle,
}

impl LobbyMember {
    #[must_use]
    pub fn token(&self) -> &SessionToken {
        self.session.token()
    }
}

/// One lobby: name, capacity, flags, ordered members (host first).
#[derive(Debug)]
pub struct Lobby {
    pub id: LobbyId,
    pub name: String,
    pub capacity: u32,
    pub is_public: bool,
    /// Set while a mediation is active; a locked lobby refuses new
    /// members and a second mediation start.
    pub locked: bool,
    pub members: Vec<LobbyMember>,
    pub mediator: Option<MediatorHandle>,
}

impl Lobby {
    #[must_use]
    pub fn new(id: LobbyId, name: String, capacity: u32, is_public: bool, host: LobbyMember) -> Self {
        Self {
            id,
            name,
            capacity,
            is_public,
            locked: false,
            members: vec![host],
            mediator: None,
        }
    }

    /// The host: always the first member.
    #[must_use]
    pub fn host(&self) -> &LobbyMember {
        &self.members[0]
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.members.len() as u32 >= self.capacity
    }

    #[must_use]
    pub fn name_taken(&self, name: &str) -> bool {
        self.members.iter().any(|m| m.name == name)
    }

    #[must_use]
    pub fn contains_token(&self, token: &SessionToken) -> bool {
        self.members.iter().any(|m| m.token() == token)
    }

    /// Member display names in join order.
    #[must_use]
    pub fn member_names(&self) -> Vec<String> {
        self.members.iter().map(|m| m.name.clone()).collect()
    }

    /// Remove the member owning `token`, returning it.
    pub fn remove_member(&mut self, token: &SessionToken) -> Option<LobbyMember> {
        let idx = self.members.iter().position(|m| m.token() == token)?;
        Some(self.members.remove(idx))
    }

    #[must_use]
    pub fn summary(&self) -> LobbySummary {
        LobbySummary {
            name: self.name.clone(),
            id: self.id.clone(),
            current_members: self.members.len(),
            max_members: self.capacity,
        }
    }
}

/// Public listing entry for a lobby.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbySummary {
    pub name: String,
    pub id: LobbyId,
    pub current_members: usize,
    pub max_members: u32,
}

/// The joiner's view of a lobby, returned from a successful join.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinView {
    pub lobby_id: LobbyId,
    pub lobby_name: String,
    /// Display names in join order.
    pub lobby_members: Vec<String>,
    /// The host's display name.
    pub host: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use common::SessionId;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    fn member(name: &str) -> LobbyMember {
        let (tx, rx) = mpsc::unbounded_channel();
        // Leak the receiver deliberately: these tests only inspect
        // lobby data, never delivery.
        std::mem::forget(rx);
        LobbyMember {
            name: name.to_string(),
            session: SessionHandle::new(
                SessionId::new(),
                common::SessionToken::generate(),
                tx,
                CancellationToken::new(),
            ),
        }
    }

    fn lobby(capacity: u32) -> Lobby {
        Lobby::new(
            LobbyId::generate(),
            "My lobby".to_string(),
            capacity,
            true,
            member("jt"),
        )
    }

    #[test]
    fn test_host_is_first_member() {
        let l = lobby(3);
        assert_eq!(l.host().name, "jt");
        assert_eq!(l.member_names(), vec!["jt"]);
    }

    #[test]
    fn test_full_at_capacity() {
        let mut l = lobby(2);
        assert!(!l.is_full());
        l.members.push(member("peer0"));
        assert!(l.is_full());
    }

    #[test]
    fn test_name_taken_within_lobby() {
        let mut l = lobby(4);
        l.members.push(member("peer0"));
        assert!(l.name_taken("peer0"));
        assert!(l.name_taken("jt"));
        assert!(!l.name_taken("peer1"));
    }

    #[test]
    fn test_remove_member_preserves_order() {
        let mut l = lobby(4);
        l.members.push(member("peer0"));
        l.members.push(member("peer1"));

        let token = l.members[1].token().clone();
        let removed = l.remove_member(&token).unwrap();
        assert_eq!(removed.name, "peer0");
        assert_eq!(l.member_names(), vec!["jt", "peer1"]);

        assert!(l.remove_member(&token).is_none());
    }

    #[test]
    fn test_summary_shape() {
        let mut l = lobby(3);
        l.members.push(member("peer0"));

        let summary = l.summary();
        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["name"], "My lobby");
        assert_eq!(value["currentMembers"], 2);
        assert_eq!(value["maxMembers"], 3);
    }
}
