//! Session tracking for reliable-stream clients.
//!
//! A session is one live WebSocket. The socket I/O itself is owned by
//! the per-connection handler in `server::ws`; what the rest of the
//! server sees is a [`SessionHandle`]: the session's internal id, its
//! secret token, an outbound frame queue, and a cancellation token.
//!
//! Outbound frames are enqueued without suspending (the queue is
//! unbounded) so cascade fan-outs and mediator timer fires never block
//! on a slow socket. A dedicated writer task drains the queue onto the
//! wire. Enqueueing onto a closed queue is a silent no-op: cascade
//! notifications racing a disconnect are normal.

mod registry;

pub use registry::SessionRegistry;

use common::{SessionId, SessionToken};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Shared view of one live session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    token: SessionToken,
    outbound: mpsc::UnboundedSender<String>,
    cancel_token: CancellationToken,
}

impl SessionHandle {
    pub(crate) fn new(
        id: SessionId,
        token: SessionToken,
        outbound: mpsc::UnboundedSender<String>,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            id,
            token,
            outbound,
            cancel_token,
        }
    }

    /// The session's internal id.
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// The session's secret token.
    #[must_use]
    pub fn token(&self) -> &SessionToken {
        &self.token
    }

    /// Enqueue an encoded frame for delivery to this session.
    ///
    /// Never suspends. A session that is closing has dropped its
    /// receiver, in which case the frame is silently discarded.
    pub fn enqueue(&self, frame: String) {
        if self.outbound.send(frame).is_err() {
            debug!(
                target: "rv.session",
                session_id = %self.id,
                "dropping frame for closing session"
            );
        }
    }

    /// Signal the session's connection handler to shut down.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check whether the session has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}
