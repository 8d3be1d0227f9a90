//! UDP datagram handler: the capture side of the mediation protocol.
//!
//! The socket is receive-only; the server never sends a datagram. The
//! only accepted method is `ptpMediation_connect`, whose token is
//! resolved through session → lobby → live mediator. What matters is
//! the datagram's *source* address as reported by the OS at receive
//! time; the whole point of the capture is that it differs from any
//! address the server could otherwise know.

use crate::routes::AppState;
use lobby_protocol::frame::{self, PtpMediationConnect};
use lobby_protocol::codec;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Largest datagram worth reading; anything bigger than a token frame
/// is garbage anyway.
const MAX_DATAGRAM_LEN: usize = 2048;

/// Receive datagrams until cancelled.
pub async fn run(socket: UdpSocket, state: Arc<AppState>, cancel: CancellationToken) {
    info!(
        target: "rv.udp",
        port = state.udp_port,
        "udp listener started"
    );

    let mut buf = vec![0u8; MAX_DATAGRAM_LEN];
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,

            received = socket.recv_from(&mut buf) => {
                match received {
                    Ok((len, addr)) => handle_datagram(&state, &buf[..len], addr),
                    Err(e) => {
                        warn!(target: "rv.udp", error = %e, "datagram receive failed");
                    }
                }
            }
        }
    }

    info!(target: "rv.udp", "udp listener stopped");
}

/// Decode and route one datagram. Every failure path is a silent drop;
/// the datagram channel never sends a negative acknowledgement.
pub(crate) fn handle_datagram(state: &AppState, bytes: &[u8], source: SocketAddr) {
    let Ok(text) = std::str::from_utf8(bytes) else {
        debug!(target: "rv.udp", source = %source, "non-UTF-8 datagram dropped");
        return;
    };

    let (method, payload) = match codec::decode(text) {
        Ok(decoded) => decoded,
        Err(e) => {
            debug!(target: "rv.udp", source = %source, error = %e, "undecodable datagram dropped");
            return;
        }
    };
    if method != frame::PTP_MEDIATION_CONNECT {
        debug!(target: "rv.udp", source = %source, method, "unexpected datagram method dropped");
        return;
    }

    let connect: PtpMediationConnect = match codec::payload(payload) {
        Ok(connect) => connect,
        Err(e) => {
            debug!(target: "rv.udp", source = %source, error = %e, "malformed datagram payload dropped");
            return;
        }
    };

    if state.sessions.lookup_by_token(&connect.token).is_none() {
        warn!(target: "rv.udp", source = %source, "datagram with unknown token dropped");
        return;
    }

    match state.lobbies.mediator_for_token(&connect.token) {
        Some(mediator) => mediator.observe(connect.token, source),
        None => {
            debug!(
                target: "rv.udp",
                source = %source,
                "datagram without live mediation dropped"
            );
        }
    }
}
