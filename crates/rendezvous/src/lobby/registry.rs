//! The lobby registry: catalogue of lobbies, token→lobby index, and
//! the closure cascades.
//!
//! All mutations happen under one mutex, never held across an
//! `.await`. Fan-out notifications snapshot the recipient set under
//! the lock and enqueue after release, so a slow or closing recipient
//! can neither block nor abort delivery to the others.

use super::{JoinView, Lobby, LobbyMember, LobbySummary};
use crate::errors::{ConflictKind, RvError};
use crate::mediation::{Mediator, MediatorConfig, MediatorHandle, MediatorMember};
use crate::session::SessionHandle;
use common::{LobbyId, SessionToken};
use lobby_protocol::frame::{
    self, ChatMessage, LobbyClosed, LobbyMessagingReceived, LobbyPeerConnect, LobbyPeerDisconnect,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Parameters for creating a lobby, validated by the HTTP surface.
#[derive(Debug, Clone)]
pub struct CreateLobby {
    pub host_name: String,
    pub lobby_name: String,
    pub is_public: bool,
    pub capacity: u32,
}

#[derive(Default)]
struct Inner {
    lobbies: HashMap<LobbyId, Lobby>,
    by_token: HashMap<SessionToken, LobbyId>,
}

/// Registry of live lobbies.
#[derive(Default)]
pub struct LobbyRegistry {
    inner: Mutex<Inner>,
}

impl LobbyRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Summaries of all public lobbies.
    #[must_use]
    pub fn list_public(&self) -> Vec<LobbySummary> {
        let inner = self.inner.lock().expect("lobby registry lock poisoned");
        inner
            .lobbies
            .values()
            .filter(|l| l.is_public)
            .map(Lobby::summary)
            .collect()
    }

    /// Create a lobby with `host` as its first member.
    ///
    /// # Errors
    ///
    /// `AlreadyInLobby` if the host session belongs to another lobby.
    pub fn create(&self, host: &SessionHandle, req: CreateLobby) -> Result<LobbyId, RvError> {
        let mut inner = self.inner.lock().expect("lobby registry lock poisoned");

        if inner.by_token.contains_key(host.token()) {
            return Err(ConflictKind::AlreadyInLobby.into());
        }

        let mut id = LobbyId::generate();
        while inner.lobbies.contains_key(&id) {
            id = LobbyId::generate();
        }

        let member = LobbyMember {
            name: req.host_name,
            session: host.clone(),
        };
        let lobby = Lobby::new(
            id.clone(),
            req.lobby_name,
            req.capacity,
            req.is_public,
            member,
        );

        inner.by_token.insert(host.token().clone(), id.clone());
        inner.lobbies.insert(id.clone(), lobby);
        drop(inner);

        info!(target: "rv.lobby", lobby_id = %id, "lobby created");
        Ok(id)
    }

    /// Summary of one lobby, public or not.
    #[must_use]
    pub fn get(&self, lobby_id: &LobbyId) -> Option<LobbySummary> {
        let inner = self.inner.lock().expect("lobby registry lock poisoned");
        inner.lobbies.get(lobby_id).map(Lobby::summary)
    }

    /// Join `session` to the lobby under `peer_name`.
    ///
    /// On success the new member is committed before anyone is told,
    /// then every *other* member receives `lobby_peerConnect`.
    ///
    /// # Errors
    ///
    /// `AlreadyInLobby`, `LobbyNotFound`, `LobbyLocked`, `LobbyFull`,
    /// or `NameTaken`.
    pub fn join(
        &self,
        lobby_id: &LobbyId,
        session: &SessionHandle,
        peer_name: String,
    ) -> Result<JoinView, RvError> {
        let mut inner = self.inner.lock().expect("lobby registry lock poisoned");

        if inner.by_token.contains_key(session.token()) {
            return Err(ConflictKind::AlreadyInLobby.into());
        }

        let lobby = inner
            .lobbies
            .get_mut(lobby_id)
            .ok_or(ConflictKind::LobbyNotFound)?;
        if lobby.locked {
            return Err(ConflictKind::LobbyLocked.into());
        }
        if lobby.is_full() {
            return Err(ConflictKind::LobbyFull.into());
        }
        if lobby.name_taken(&peer_name) {
            return Err(ConflictKind::NameTaken.into());
        }

        // Commit the membership, then snapshot the peers to notify.
        let peers: Vec<SessionHandle> = lobby.members.iter().map(|m| m.session.clone()).collect();
        lobby.members.push(LobbyMember {
            name: peer_name.clone(),
            session: session.clone(),
        });

        let view = JoinView {
            lobby_id: lobby.id.clone(),
            lobby_name: lobby.name.clone(),
            lobby_members: lobby.member_names(),
            host: lobby.host().name.clone(),
        };
        inner
            .by_token
            .insert(session.token().clone(), lobby_id.clone());
        drop(inner);

        let notice = LobbyPeerConnect {
            lobby_id: lobby_id.clone(),
            peer_name: peer_name.clone(),
        };
        for peer in &peers {
            enqueue(peer, frame::LOBBY_PEER_CONNECT, &notice);
        }

        info!(target: "rv.lobby", lobby_id = %lobby_id, members = view.lobby_members.len(), "member joined");
        Ok(view)
    }

    /// Start a mediation attempt for `lobby_id`, requested by the
    /// session owning `token`.
    ///
    /// Locks the lobby and spawns the mediator. Precondition order:
    /// lobby exists, requester is host, no mediation running, at least
    /// two members.
    ///
    /// # Errors
    ///
    /// `LobbyNotFound`, `NotHost`, `AlreadyMediating`, or
    /// `InsufficientMembers`.
    pub fn start_mediation(
        self: &Arc<Self>,
        token: &SessionToken,
        lobby_id: &LobbyId,
        config: MediatorConfig,
    ) -> Result<(), RvError> {
        let mut inner = self.inner.lock().expect("lobby registry lock poisoned");

        let lobby = inner
            .lobbies
            .get_mut(lobby_id)
            .ok_or(ConflictKind::LobbyNotFound)?;
        if lobby.host().token() != token {
            return Err(ConflictKind::NotHost.into());
        }
        if lobby.mediator.is_some() {
            return Err(ConflictKind::AlreadyMediating.into());
        }
        if lobby.members.len() < 2 {
            return Err(ConflictKind::InsufficientMembers.into());
        }

        let members: Vec<MediatorMember> = lobby
            .members
            .iter()
            .enumerate()
            .map(|(i, m)| MediatorMember {
                name: m.name.clone(),
                is_host: i == 0,
                session: m.session.clone(),
            })
            .collect();

        lobby.locked = true;
        let handle = Mediator::spawn(
            lobby_id.clone(),
            members,
            config,
            Arc::clone(self),
            CancellationToken::new(),
        );
        lobby.mediator = Some(handle);
        drop(inner);

        info!(target: "rv.lobby", lobby_id = %lobby_id, "mediation started, lobby locked");
        Ok(())
    }

    /// Destroy a lobby: tear down any mediator, tell every member,
    /// clear the token index, delete the lobby.
    ///
    /// Each member that was in the lobby at destruction time receives
    /// `lobby_closed` exactly once; a member whose stream is already
    /// closing simply drops the frame.
    pub fn close(&self, lobby_id: &LobbyId) {
        let mut inner = self.inner.lock().expect("lobby registry lock poisoned");

        let Some(lobby) = inner.lobbies.remove(lobby_id) else {
            debug!(target: "rv.lobby", lobby_id = %lobby_id, "close for unknown lobby");
            return;
        };
        for member in &lobby.members {
            inner.by_token.remove(member.token());
        }
        drop(inner);

        if let Some(mediator) = &lobby.mediator {
            mediator.cancel();
        }

        let notice = LobbyClosed {
            lobby_id: lobby.id.clone(),
            lobby_name: lobby.name.clone(),
        };
        for member in &lobby.members {
            enqueue(&member.session, frame::LOBBY_CLOSED, &notice);
        }

        info!(target: "rv.lobby", lobby_id = %lobby_id, members = lobby.members.len(), "lobby closed");
    }

    /// Session-close cascade.
    ///
    /// No-op for sessions outside any lobby. A host disconnect
    /// destroys the lobby; a non-host disconnect removes the member,
    /// notifies the remaining members, and tells any live mediator the
    /// membership changed.
    pub fn on_session_close(&self, token: &SessionToken) {
        let mut inner = self.inner.lock().expect("lobby registry lock poisoned");

        let Some(lobby_id) = inner.by_token.get(token).cloned() else {
            return;
        };
        let Some(lobby) = inner.lobbies.get_mut(&lobby_id) else {
            // Index out of step with the catalogue; repair quietly.
            inner.by_token.remove(token);
            return;
        };

        if lobby.host().token() == token {
            drop(inner);
            info!(target: "rv.lobby", lobby_id = %lobby_id, "host disconnected, closing lobby");
            self.close(&lobby_id);
            return;
        }

        let Some(departed) = lobby.remove_member(token) else {
            inner.by_token.remove(token);
            return;
        };
        inner.by_token.remove(token);

        let lobby = &inner.lobbies[&lobby_id];
        let remaining: Vec<SessionHandle> =
            lobby.members.iter().map(|m| m.session.clone()).collect();
        let mediator = lobby.mediator.clone();
        drop(inner);

        let notice = LobbyPeerDisconnect {
            lobby_id: lobby_id.clone(),
            peer_name: departed.name.clone(),
        };
        for peer in &remaining {
            enqueue(peer, frame::LOBBY_PEER_DISCONNECT, &notice);
        }
        if let Some(mediator) = mediator {
            mediator.notify_members_changed();
        }

        info!(
            target: "rv.lobby",
            lobby_id = %lobby_id,
            peer_name = %departed.name,
            remaining = remaining.len(),
            "member disconnected"
        );
    }

    /// Mediation aborted (timeout or membership change): drop the
    /// mediator and unlock the lobby so the host may start again.
    pub fn on_mediation_aborted(&self, lobby_id: &LobbyId) {
        let mut inner = self.inner.lock().expect("lobby registry lock poisoned");
        if let Some(lobby) = inner.lobbies.get_mut(lobby_id) {
            lobby.mediator = None;
            lobby.locked = false;
            drop(inner);
            info!(target: "rv.lobby", lobby_id = %lobby_id, "lobby unlocked after abort");
        }
    }

    /// Relay a chat message to every member of the lobby, including
    /// the sender.
    ///
    /// # Errors
    ///
    /// `LobbyNotFound` for an unknown lobby; `TokenUnknown` when the
    /// sender is not a member of it. Callers on the stream surface
    /// drop the error silently.
    pub fn dispatch_chat(
        &self,
        token: &SessionToken,
        lobby_id: &LobbyId,
        message: String,
    ) -> Result<(), RvError> {
        let inner = self.inner.lock().expect("lobby registry lock poisoned");

        let lobby = inner
            .lobbies
            .get(lobby_id)
            .ok_or(ConflictKind::LobbyNotFound)?;
        let sender = lobby
            .members
            .iter()
            .find(|m| m.token() == token)
            .ok_or(RvError::TokenUnknown)?;

        let received = LobbyMessagingReceived {
            lobby_id: lobby.id.clone(),
            message: ChatMessage {
                timestamp: chrono::Utc::now().timestamp_millis(),
                sender_name: sender.name.clone(),
                message,
            },
        };
        let recipients: Vec<SessionHandle> =
            lobby.members.iter().map(|m| m.session.clone()).collect();
        drop(inner);

        for recipient in &recipients {
            enqueue(recipient, frame::LOBBY_MESSAGING_RECEIVED, &received);
        }
        Ok(())
    }

    /// The live mediator for the lobby the token belongs to, if any.
    #[must_use]
    pub fn mediator_for_token(&self, token: &SessionToken) -> Option<MediatorHandle> {
        let inner = self.inner.lock().expect("lobby registry lock poisoned");
        let lobby_id = inner.by_token.get(token)?;
        inner.lobbies.get(lobby_id)?.mediator.clone()
    }

    /// Number of live lobbies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .expect("lobby registry lock poisoned")
            .lobbies
            .len()
    }

    /// Whether no lobbies are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tear down every mediator and clear all state without
    /// dispatching closure notifications (the sessions are being torn
    /// down anyway).
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock().expect("lobby registry lock poisoned");
        let mediators: Vec<MediatorHandle> = inner
            .lobbies
            .values()
            .filter_map(|l| l.mediator.clone())
            .collect();
        let count = inner.lobbies.len();
        inner.lobbies.clear();
        inner.by_token.clear();
        drop(inner);

        for mediator in &mediators {
            mediator.cancel();
        }

        info!(target: "rv.lobby", lobbies = count, "lobby registry shut down");
    }
}

/// Best-effort frame delivery; a closing session drops the frame.
fn enqueue<T: Serialize>(session: &SessionHandle, method: &str, payload: &T) {
    match lobby_protocol::encode(method, payload) {
        Ok(encoded) => session.enqueue(encoded),
        Err(e) => warn!(target: "rv.lobby", error = %e, method, "frame encoding failed"),
    }
}
