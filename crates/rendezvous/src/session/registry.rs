//! The session registry: every live reliable stream, indexed twice.
//!
//! The registry keeps an id-index and a token-index in lockstep under
//! one mutex. The lock is never held across an `.await`; all frame
//! deliveries are non-suspending enqueues.

use super::SessionHandle;
use common::{SessionId, SessionToken};
use lobby_protocol::frame::{self, ClientRegistered};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Default)]
struct Inner {
    by_id: HashMap<SessionId, SessionHandle>,
    by_token: HashMap<SessionToken, SessionId>,
}

/// Registry of live sessions.
///
/// Token ↔ session is a bijection over all live sessions; tokens are
/// invalidated on close and never reissued.
#[derive(Default)]
pub struct SessionRegistry {
    inner: Mutex<Inner>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly opened stream.
    ///
    /// Mints the session's token (re-rolling on the astronomically
    /// unlikely collision), inserts into both indices atomically, and
    /// enqueues the `client_registered` frame (the first frame the
    /// new session will ever receive) before returning.
    pub fn open(
        &self,
        outbound: mpsc::UnboundedSender<String>,
        cancel_token: CancellationToken,
    ) -> SessionHandle {
        let id = SessionId::new();

        let mut inner = self.inner.lock().expect("session registry lock poisoned");

        let mut token = SessionToken::generate();
        while inner.by_token.contains_key(&token) {
            token = SessionToken::generate();
        }

        let handle = SessionHandle::new(id, token.clone(), outbound, cancel_token);
        inner.by_id.insert(id, handle.clone());
        inner.by_token.insert(token.clone(), id);

        // Enqueued under the lock so nothing can be ordered ahead of it.
        if let Ok(registered) = lobby_protocol::encode(
            frame::CLIENT_REGISTERED,
            &ClientRegistered { token },
        ) {
            handle.enqueue(registered);
        }

        drop(inner);

        info!(target: "rv.session", session_id = %id, "session registered");
        handle
    }

    /// Resolve a token to its session, if live.
    #[must_use]
    pub fn lookup_by_token(&self, token: &SessionToken) -> Option<SessionHandle> {
        let inner = self.inner.lock().expect("session registry lock poisoned");
        let id = inner.by_token.get(token)?;
        inner.by_id.get(id).cloned()
    }

    /// Resolve an internal id to its session, if live.
    #[must_use]
    pub fn lookup(&self, id: SessionId) -> Option<SessionHandle> {
        let inner = self.inner.lock().expect("session registry lock poisoned");
        inner.by_id.get(&id).cloned()
    }

    /// Remove a session from both indices.
    ///
    /// The caller drives the lobby-side cascade; this only forgets the
    /// session and invalidates its token.
    pub fn close(&self, id: SessionId) {
        let mut inner = self.inner.lock().expect("session registry lock poisoned");
        match inner.by_id.remove(&id) {
            Some(handle) => {
                inner.by_token.remove(handle.token());
                drop(inner);
                info!(target: "rv.session", session_id = %id, "session closed");
            }
            None => {
                drop(inner);
                warn!(target: "rv.session", session_id = %id, "close for unknown session");
            }
        }
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .expect("session registry lock poisoned")
            .by_id
            .len()
    }

    /// Whether no sessions are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cancel every live session and clear all state.
    ///
    /// Used at process shutdown; no per-session cascade runs because
    /// every peer is being disconnected anyway.
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock().expect("session registry lock poisoned");
        let handles: Vec<SessionHandle> = inner.by_id.values().cloned().collect();
        inner.by_id.clear();
        inner.by_token.clear();
        drop(inner);

        for handle in &handles {
            if !handle.is_cancelled() {
                handle.cancel();
            }
        }

        info!(target: "rv.session", sessions = handles.len(), "session registry shut down");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use lobby_protocol::codec;

    fn open_session(registry: &SessionRegistry) -> (SessionHandle, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = registry.open(tx, CancellationToken::new());
        (handle, rx)
    }

    #[tokio::test]
    async fn test_open_emits_client_registered_first() {
        let registry = SessionRegistry::new();
        let (handle, mut rx) = open_session(&registry);

        handle.enqueue("other:e30=".to_string());

        let first = rx.recv().await.unwrap();
        let (method, value) = codec::decode(&first).unwrap();
        assert_eq!(method, frame::CLIENT_REGISTERED);

        let registered: ClientRegistered = codec::payload(value).unwrap();
        assert_eq!(&registered.token, handle.token());

        let second = rx.recv().await.unwrap();
        assert_eq!(second, "other:e30=");
    }

    #[tokio::test]
    async fn test_token_lookup_roundtrip() {
        let registry = SessionRegistry::new();
        let (handle, _rx) = open_session(&registry);

        let found = registry.lookup_by_token(handle.token()).unwrap();
        assert_eq!(found.id(), handle.id());

        let found = registry.lookup(handle.id()).unwrap();
        assert_eq!(found.token(), handle.token());
    }

    #[tokio::test]
    async fn test_close_invalidates_both_indices() {
        let registry = SessionRegistry::new();
        let (handle, _rx) = open_session(&registry);

        registry.close(handle.id());

        assert!(registry.lookup(handle.id()).is_none());
        assert!(registry.lookup_by_token(handle.token()).is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_close_unknown_session_is_harmless() {
        let registry = SessionRegistry::new();
        registry.close(SessionId::new());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_tokens_are_unique_across_sessions() {
        let registry = SessionRegistry::new();
        let (a, _rx_a) = open_session(&registry);
        let (b, _rx_b) = open_session(&registry);

        assert_ne!(a.token(), b.token());
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_and_clears() {
        let registry = SessionRegistry::new();
        let (a, _rx_a) = open_session(&registry);
        let (b, _rx_b) = open_session(&registry);

        registry.shutdown();

        assert!(a.is_cancelled());
        assert!(b.is_cancelled());
        assert!(registry.is_empty());
        assert!(registry.lookup_by_token(a.token()).is_none());
    }

    #[tokio::test]
    async fn test_enqueue_after_receiver_drop_is_silent() {
        let registry = SessionRegistry::new();
        let (handle, rx) = open_session(&registry);

        drop(rx);
        handle.enqueue("anything:e30=".to_string());
    }
}
