//! WebSocket handler: the reliable-stream side of every session.
//!
//! One connection equals one session. On upgrade the session is
//! registered (which puts `client_registered` at the head of its
//! outbound queue), a writer task starts draining that queue onto the
//! socket, and the read loop routes inbound frames until the stream
//! closes. The close, orderly or not, fires the session-close
//! cascade: lobby first, then the session registry.
//!
//! Inbound frames that fail to decode, carry an unknown method, or
//! fail validation are dropped without a reply; that is the documented
//! ignore policy for the stream.

use crate::lobby::MAX_MESSAGE_LEN;
use crate::routes::AppState;
use crate::session::SessionHandle;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use lobby_protocol::frame::{self, LobbyMessagingSend, PtpMediationPeersConnectionSuccess};
use lobby_protocol::{codec, CodecError};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Handler for the stream upgrade at `/`.
pub async fn upgrade(State(state): State<Arc<AppState>>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Drive one session from registration to the close cascade.
#[instrument(skip_all, name = "rv.ws")]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (ws_tx, ws_rx) = socket.split();
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let cancel = state.shutdown.child_token();

    // Registration enqueues `client_registered` ahead of anything else.
    let session = state.sessions.open(out_tx, cancel.clone());
    let session_id = session.id();

    let writer = tokio::spawn(write_loop(ws_tx, out_rx, cancel.clone()));

    read_loop(ws_rx, &state, &session, &cancel).await;

    // Cascade order: lobby side first (it may need the session's
    // queue for nothing, but it must see a consistent token index),
    // then the registry, then the writer.
    state.lobbies.on_session_close(session.token());
    state.sessions.close(session_id);
    session.cancel();
    let _ = writer.await;

    info!(target: "rv.ws", session_id = %session_id, "connection finished");
}

/// Drain the outbound queue onto the socket.
///
/// Exits when the queue closes, the session is cancelled, or a write
/// fails; a failed write means the peer is gone and the read loop will
/// notice momentarily.
async fn write_loop(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut out_rx: mpsc::UnboundedReceiver<String>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,

            frame = out_rx.recv() => {
                match frame {
                    Some(text) => {
                        if ws_tx.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }
    let _ = ws_tx.close().await;
}

/// Read frames until the stream closes.
async fn read_loop(
    mut ws_rx: SplitStream<WebSocket>,
    state: &AppState,
    session: &SessionHandle,
    cancel: &CancellationToken,
) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,

            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        route_frame(state, session, &text);
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    // Binary, ping and pong frames carry nothing in
                    // this protocol.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(
                            target: "rv.ws",
                            session_id = %session.id(),
                            error = %e,
                            "stream read failed"
                        );
                        break;
                    }
                }
            }
        }
    }
}

/// Dispatch one inbound stream frame.
fn route_frame(state: &AppState, session: &SessionHandle, text: &str) {
    let (method, payload) = match codec::decode(text) {
        Ok(decoded) => decoded,
        Err(e) => {
            debug!(
                target: "rv.ws",
                session_id = %session.id(),
                error = %e,
                "undecodable frame dropped"
            );
            return;
        }
    };

    match method {
        frame::LOBBY_MESSAGING_SEND => match codec::payload::<LobbyMessagingSend>(payload) {
            Ok(send) => handle_chat(state, send),
            Err(e) => drop_invalid(session, method, &e),
        },
        frame::PTP_MEDIATION_PEERS_CONNECTION_SUCCESS => {
            match codec::payload::<PtpMediationPeersConnectionSuccess>(payload) {
                Ok(ack) => handle_peer_success(state, ack),
                Err(e) => drop_invalid(session, method, &e),
            }
        }
        other => {
            debug!(
                target: "rv.ws",
                session_id = %session.id(),
                method = other,
                "unknown method dropped"
            );
        }
    }
}

fn handle_chat(state: &AppState, send: LobbyMessagingSend) {
    let length = send.message.chars().count();
    if length == 0 || length > MAX_MESSAGE_LEN {
        warn!(target: "rv.ws", length, "chat message length out of range, dropped");
        return;
    }
    if state.sessions.lookup_by_token(&send.token).is_none() {
        warn!(target: "rv.ws", "chat from unknown token, dropped");
        return;
    }
    if let Err(e) = state
        .lobbies
        .dispatch_chat(&send.token, &send.lobby_id, send.message)
    {
        warn!(target: "rv.ws", error = %e, "chat rejected");
    }
}

fn handle_peer_success(state: &AppState, ack: PtpMediationPeersConnectionSuccess) {
    if state.sessions.lookup_by_token(&ack.token).is_none() {
        warn!(target: "rv.ws", "connectivity report from unknown token, dropped");
        return;
    }
    match state.lobbies.mediator_for_token(&ack.token) {
        Some(mediator) => mediator.peer_success(ack.token),
        None => {
            debug!(target: "rv.ws", "connectivity report without live mediation, dropped");
        }
    }
}

fn drop_invalid(session: &SessionHandle, method: &str, error: &CodecError) {
    debug!(
        target: "rv.ws",
        session_id = %session.id(),
        method,
        error = %error,
        "schema-invalid payload dropped"
    );
}
