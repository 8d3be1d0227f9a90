//! The mediator task: capture every member's UDP source address, hand
//! the addresses out, wait for connectivity reports.
//!
//! Phase diagram:
//!
//! ```text
//!   [Capturing] --all captured--> [Connecting] --all reported--> success
//!        \                              \
//!         \----- timeout / membership change / lobby closed ----> abort
//! ```
//!
//! The task exits on the first terminal transition; dropping it drops
//! all three timers, so cleanup cannot leak a timer on any exit path.

use super::{MediatorCommand, MediatorConfig, MediatorHandle, MediatorMember};
use crate::lobby::LobbyRegistry;
use common::{LobbyId, SessionToken};
use lobby_protocol::frame::{
    self, PeerEndpoint, PtpMediationAborted, PtpMediationPeersConnectionStart, PtpMediationSend,
    PtpMediationSuccess,
};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{interval_at, sleep, Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Abort reason: capture deadline expired before every member's
/// datagram was observed.
pub const ABORT_CAPTURE_TIMEOUT: &str = "timed out waiting for peers to send UDP packets";

/// Abort reason: peer-connect deadline expired before every member
/// reported connectivity.
pub const ABORT_CONNECT_TIMEOUT: &str = "timed out waiting for peers to connect to one another";

/// Abort reason: the lobby's membership changed mid-attempt.
pub const ABORT_MEMBERS_CHANGED: &str = "Lobby members changed.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Capturing,
    Connecting,
}

/// The mediator implementation.
pub struct Mediator {
    lobby_id: LobbyId,
    members: Vec<MediatorMember>,
    config: MediatorConfig,
    registry: Arc<LobbyRegistry>,
    receiver: mpsc::UnboundedReceiver<MediatorCommand>,
    cancel_token: CancellationToken,
    phase: Phase,
    /// Observed source address per member token; re-observation
    /// overwrites with the latest address.
    observed: HashMap<SessionToken, SocketAddr>,
    /// Members that reported peer connectivity.
    acked: HashSet<SessionToken>,
}

impl Mediator {
    /// Spawn a mediator for one lobby.
    ///
    /// `members` is the membership snapshot at start time; the caller
    /// guarantees it has at least two entries and exactly one host.
    pub fn spawn(
        lobby_id: LobbyId,
        members: Vec<MediatorMember>,
        config: MediatorConfig,
        registry: Arc<LobbyRegistry>,
        cancel_token: CancellationToken,
    ) -> MediatorHandle {
        let (sender, receiver) = mpsc::unbounded_channel();

        let mediator = Self {
            lobby_id,
            members,
            config,
            registry,
            receiver,
            cancel_token: cancel_token.clone(),
            phase: Phase::Capturing,
            observed: HashMap::new(),
            acked: HashSet::new(),
        };

        tokio::spawn(mediator.run());

        MediatorHandle::new(sender, cancel_token)
    }

    /// Run the mediation loop until a terminal transition.
    #[instrument(skip_all, name = "rv.mediation", fields(lobby_id = %self.lobby_id))]
    async fn run(mut self) {
        info!(
            target: "rv.mediation",
            lobby_id = %self.lobby_id,
            members = self.members.len(),
            udp_port = self.config.udp_port,
            "mediation started"
        );

        // Entry: ask every member for a datagram.
        let request = PtpMediationSend {
            port: self.config.udp_port,
        };
        for member in &self.members {
            enqueue(&member.session, frame::PTP_MEDIATION_SEND, &request);
        }

        // The entry broadcast counts as the first request, so the
        // reminder interval starts one period out.
        let mut reminder = interval_at(
            Instant::now() + self.config.reminder_interval,
            self.config.reminder_interval,
        );
        let capture_deadline = sleep(self.config.capture_timeout);
        let connect_deadline = sleep(Duration::ZERO);
        tokio::pin!(capture_deadline, connect_deadline);

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    // Lobby closed externally or process shutdown; the
                    // closure cascade subsumes any notification.
                    debug!(
                        target: "rv.mediation",
                        lobby_id = %self.lobby_id,
                        "mediator cancelled"
                    );
                    return;
                }

                cmd = self.receiver.recv() => {
                    let Some(cmd) = cmd else { return };
                    match cmd {
                        MediatorCommand::Observe { token, addr } => {
                            if self.handle_observe(&token, addr) {
                                connect_deadline
                                    .as_mut()
                                    .reset(Instant::now() + self.config.connect_timeout);
                            }
                        }
                        MediatorCommand::PeerSuccess { token } => {
                            if self.handle_peer_success(&token) {
                                self.finish_success();
                                return;
                            }
                        }
                        MediatorCommand::MembersChanged => {
                            self.abort(ABORT_MEMBERS_CHANGED);
                            return;
                        }
                    }
                }

                _ = reminder.tick(), if self.phase == Phase::Capturing => {
                    self.send_reminders();
                }

                () = &mut capture_deadline, if self.phase == Phase::Capturing => {
                    self.abort(ABORT_CAPTURE_TIMEOUT);
                    return;
                }

                () = &mut connect_deadline, if self.phase == Phase::Connecting => {
                    self.abort(ABORT_CONNECT_TIMEOUT);
                    return;
                }
            }
        }
    }

    /// Record a datagram observation. Returns true when the last
    /// outstanding member was captured and the mediator moved to the
    /// connecting phase.
    fn handle_observe(&mut self, token: &SessionToken, addr: SocketAddr) -> bool {
        if self.phase != Phase::Capturing {
            debug!(
                target: "rv.mediation",
                lobby_id = %self.lobby_id,
                "datagram observed outside capture phase, ignoring"
            );
            return false;
        }

        let Some(member) = self.members.iter().find(|m| m.token() == token) else {
            warn!(
                target: "rv.mediation",
                lobby_id = %self.lobby_id,
                "datagram token does not belong to this lobby, ignoring"
            );
            return false;
        };

        // Latest observation wins; a member behind a flapping NAT may
        // legitimately show up from a new source port.
        let previous = self.observed.insert(token.clone(), addr);
        debug!(
            target: "rv.mediation",
            lobby_id = %self.lobby_id,
            member = %member.name,
            source = %addr,
            replaced = previous.is_some(),
            "member captured"
        );

        if self.observed.len() == self.members.len() {
            self.enter_connecting();
            return true;
        }
        false
    }

    /// All members captured: hand out the connect lists.
    ///
    /// The host receives every non-host endpoint; each non-host
    /// receives only the host's. Entering the connecting phase stops
    /// the reminder interval and the capture deadline (both are gated
    /// on the capturing phase).
    fn enter_connecting(&mut self) {
        self.phase = Phase::Connecting;

        info!(
            target: "rv.mediation",
            lobby_id = %self.lobby_id,
            members = self.members.len(),
            "all members captured, starting peer connections"
        );

        let endpoint = |m: &MediatorMember| {
            self.observed.get(m.token()).map(|addr| PeerEndpoint {
                ip: addr.ip(),
                port: addr.port(),
            })
        };

        let non_host_peers: Vec<PeerEndpoint> = self
            .members
            .iter()
            .filter(|m| !m.is_host)
            .filter_map(endpoint)
            .collect();
        let host_peer: Vec<PeerEndpoint> = self
            .members
            .iter()
            .filter(|m| m.is_host)
            .filter_map(endpoint)
            .collect();

        for member in &self.members {
            let peers = if member.is_host {
                non_host_peers.clone()
            } else {
                host_peer.clone()
            };
            enqueue(
                &member.session,
                frame::PTP_MEDIATION_PEERS_CONNECTION_START,
                &PtpMediationPeersConnectionStart { peers },
            );
        }
    }

    /// Record a connectivity ack. Returns true when every member has
    /// acked. Duplicate acks are a no-op.
    fn handle_peer_success(&mut self, token: &SessionToken) -> bool {
        if self.phase != Phase::Connecting {
            debug!(
                target: "rv.mediation",
                lobby_id = %self.lobby_id,
                "connectivity report outside connecting phase, ignoring"
            );
            return false;
        }

        let Some(member) = self.members.iter().find(|m| m.token() == token) else {
            warn!(
                target: "rv.mediation",
                lobby_id = %self.lobby_id,
                "connectivity report token does not belong to this lobby, ignoring"
            );
            return false;
        };

        if self.acked.insert(token.clone()) {
            debug!(
                target: "rv.mediation",
                lobby_id = %self.lobby_id,
                member = %member.name,
                acked = self.acked.len(),
                "member reported peer connectivity"
            );
        }

        self.acked.len() == self.members.len()
    }

    /// Terminal success: tell everyone, then close the lobby (which
    /// emits `lobby_closed` to every member).
    fn finish_success(&self) {
        info!(
            target: "rv.mediation",
            lobby_id = %self.lobby_id,
            members = self.members.len(),
            "mediation succeeded"
        );

        for member in &self.members {
            enqueue(
                &member.session,
                frame::PTP_MEDIATION_SUCCESS,
                &PtpMediationSuccess {},
            );
        }

        self.registry.close(&self.lobby_id);
    }

    /// Terminal abort: tell every member why, then unlock the lobby so
    /// the host may try again.
    fn abort(&self, reason: &str) {
        warn!(
            target: "rv.mediation",
            lobby_id = %self.lobby_id,
            reason = %reason,
            observed = self.observed.len(),
            acked = self.acked.len(),
            "mediation aborted"
        );

        let aborted = PtpMediationAborted {
            abort_reason: reason.to_string(),
        };
        for member in &self.members {
            enqueue(&member.session, frame::PTP_MEDIATION_ABORTED, &aborted);
        }

        self.registry.on_mediation_aborted(&self.lobby_id);
    }

    /// Re-send the datagram request to members not yet observed.
    fn send_reminders(&self) {
        let request = PtpMediationSend {
            port: self.config.udp_port,
        };
        let mut reminded = 0usize;
        for member in &self.members {
            if !self.observed.contains_key(member.token()) {
                enqueue(&member.session, frame::PTP_MEDIATION_SEND, &request);
                reminded += 1;
            }
        }
        debug!(
            target: "rv.mediation",
            lobby_id = %self.lobby_id,
            reminded,
            "reminder tick"
        );
    }
}

/// Best-effort frame delivery; a closing session drops the frame.
fn enqueue<T: Serialize>(session: &crate::session::SessionHandle, method: &str, payload: &T) {
    if let Ok(encoded) = lobby_protocol::encode(method, payload) {
        session.enqueue(encoded);
    }
}
