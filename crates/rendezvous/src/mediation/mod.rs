//! Peer-to-peer mediation: the two-phase hole-punch protocol.
//!
//! A mediator exists per lobby for the duration of one mediation
//! attempt. It asks every member to emit a UDP datagram, records each
//! member's observed source address, disseminates the addresses, and
//! waits for every member to report peer connectivity.
//!
//! Each mediator runs as its own task consuming a command channel;
//! commands and timer fires are therefore linearly ordered per lobby,
//! and a membership-change observation is always handled before the
//! next timer fire that could act on stale membership.

mod mediator;

pub use mediator::{Mediator, ABORT_CAPTURE_TIMEOUT, ABORT_CONNECT_TIMEOUT, ABORT_MEMBERS_CHANGED};

use crate::session::SessionHandle;
use common::SessionToken;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Timer settings and the UDP port advertised to members.
#[derive(Debug, Clone)]
pub struct MediatorConfig {
    /// UDP port the members should send their datagram to.
    pub udp_port: u16,
    /// Reminder interval `R`.
    pub reminder_interval: Duration,
    /// Capture deadline `T_capture`.
    pub capture_timeout: Duration,
    /// Peer-connect deadline `T_connect`.
    pub connect_timeout: Duration,
}

/// One lobby member as seen by the mediator: a snapshot taken when
/// mediation starts. Any later membership change aborts the attempt,
/// so the snapshot never goes stale while it matters.
#[derive(Debug, Clone)]
pub struct MediatorMember {
    pub name: String,
    pub is_host: bool,
    pub session: SessionHandle,
}

impl MediatorMember {
    #[must_use]
    pub fn token(&self) -> &SessionToken {
        self.session.token()
    }
}

/// Commands consumed by the mediator task.
#[derive(Debug)]
pub enum MediatorCommand {
    /// A `ptpMediation_connect` datagram arrived from a member; the
    /// address is the datagram's source as reported by the OS.
    Observe {
        token: SessionToken,
        addr: SocketAddr,
    },

    /// A member reported successful connectivity to its peers.
    PeerSuccess { token: SessionToken },

    /// The lobby's membership changed (join or leave); the attempt
    /// must abort.
    MembersChanged,
}

/// Handle to a running mediator.
#[derive(Debug, Clone)]
pub struct MediatorHandle {
    sender: mpsc::UnboundedSender<MediatorCommand>,
    cancel_token: CancellationToken,
}

impl MediatorHandle {
    pub(crate) fn new(
        sender: mpsc::UnboundedSender<MediatorCommand>,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            sender,
            cancel_token,
        }
    }

    /// Report a datagram observation. Never suspends.
    pub fn observe(&self, token: SessionToken, addr: SocketAddr) {
        let _ = self.sender.send(MediatorCommand::Observe { token, addr });
    }

    /// Report a member's connectivity ack. Never suspends.
    pub fn peer_success(&self, token: SessionToken) {
        let _ = self.sender.send(MediatorCommand::PeerSuccess { token });
    }

    /// Report a membership change. Never suspends.
    pub fn notify_members_changed(&self) {
        let _ = self.sender.send(MediatorCommand::MembersChanged);
    }

    /// Tear the mediator down silently (lobby closed or shutdown): no
    /// abort frame is dispatched because the closure cascade subsumes
    /// the notification.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check whether the mediator has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}
