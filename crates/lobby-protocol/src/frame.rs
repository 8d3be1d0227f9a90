//! Frame method names and typed payloads.
//!
//! Method strings are part of the wire contract and never change
//! casing; payload fields serialize as camelCase.

use common::{LobbyId, SessionToken};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

// ---------------------------------------------------------------------------
// Method names
// ---------------------------------------------------------------------------

// Server → client, reliable stream.
pub const CLIENT_REGISTERED: &str = "client_registered";
pub const LOBBY_CLOSED: &str = "lobby_closed";
pub const LOBBY_PEER_CONNECT: &str = "lobby_peerConnect";
pub const LOBBY_PEER_DISCONNECT: &str = "lobby_peerDisconnect";
pub const LOBBY_MESSAGING_RECEIVED: &str = "lobby_messaging_received";
pub const PTP_MEDIATION_SEND: &str = "ptpMediation_send";
pub const PTP_MEDIATION_ABORTED: &str = "ptpMediation_aborted";
pub const PTP_MEDIATION_PEERS_CONNECTION_START: &str = "ptpMediation_peersConnection_start";
pub const PTP_MEDIATION_SUCCESS: &str = "ptpMediation_success";

// Client → server, reliable stream.
pub const LOBBY_MESSAGING_SEND: &str = "lobby_messaging_send";
pub const PTP_MEDIATION_PEERS_CONNECTION_SUCCESS: &str = "ptpMediation_peersConnection_success";

// Client → server, datagram channel. There are no server-originated
// datagrams in this protocol.
pub const PTP_MEDIATION_CONNECT: &str = "ptpMediation_connect";

// ---------------------------------------------------------------------------
// Server → client payloads
// ---------------------------------------------------------------------------

/// Delivered once, as the first frame on a freshly opened stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientRegistered {
    pub token: SessionToken,
}

/// The lobby the recipient belonged to no longer exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyClosed {
    pub lobby_id: LobbyId,
    pub lobby_name: String,
}

/// A new member joined the recipient's lobby.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyPeerConnect {
    pub lobby_id: LobbyId,
    pub peer_name: String,
}

/// A member left the recipient's lobby.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyPeerDisconnect {
    pub lobby_id: LobbyId,
    pub peer_name: String,
}

/// A chat message relayed to every member of a lobby.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyMessagingReceived {
    pub lobby_id: LobbyId,
    pub message: ChatMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Milliseconds since the Unix epoch, UTC.
    pub timestamp: i64,
    pub sender_name: String,
    pub message: String,
}

/// Ask the recipient to emit a `ptpMediation_connect` datagram to the
/// server's UDP port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PtpMediationSend {
    pub port: u16,
}

/// The mediation attempt failed; the lobby stays open.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PtpMediationAborted {
    pub abort_reason: String,
}

/// The observed public endpoint of one peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerEndpoint {
    pub ip: IpAddr,
    pub port: u16,
}

/// Every member has been observed; start connecting to these peers.
///
/// The host receives every non-host endpoint; each non-host receives
/// only the host's.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PtpMediationPeersConnectionStart {
    pub peers: Vec<PeerEndpoint>,
}

/// Every member reported connectivity; the mediation is complete.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PtpMediationSuccess {}

// ---------------------------------------------------------------------------
// Client → server payloads
// ---------------------------------------------------------------------------

/// Submit a chat message to a lobby.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyMessagingSend {
    pub token: SessionToken,
    pub lobby_id: LobbyId,
    pub message: String,
}

/// The sender has connected to every peer it was given.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PtpMediationPeersConnectionSuccess {
    pub token: SessionToken,
}

/// Datagram payload carrying the sender's token; the server records
/// the datagram's source address, never anything in the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PtpMediationConnect {
    pub token: SessionToken,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::codec;
    use serde_json::json;

    #[test]
    fn test_payload_fields_are_camel_case() {
        let frame = LobbyPeerConnect {
            lobby_id: LobbyId::from_external("AB123"),
            peer_name: "peer0".to_string(),
        };
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value, json!({"lobbyId": "AB123", "peerName": "peer0"}));
    }

    #[test]
    fn test_chat_message_shape() {
        let frame = LobbyMessagingReceived {
            lobby_id: LobbyId::from_external("AB123"),
            message: ChatMessage {
                timestamp: 1_700_000_000_000,
                sender_name: "jt".to_string(),
                message: "hello".to_string(),
            },
        };
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(
            value,
            json!({
                "lobbyId": "AB123",
                "message": {
                    "timestamp": 1_700_000_000_000_i64,
                    "senderName": "jt",
                    "message": "hello",
                }
            })
        );
    }

    #[test]
    fn test_success_payload_is_empty_object() {
        let value = serde_json::to_value(PtpMediationSuccess {}).unwrap();
        assert_eq!(value, json!({}));
    }

    #[test]
    fn test_peer_endpoint_roundtrip() {
        let start = PtpMediationPeersConnectionStart {
            peers: vec![PeerEndpoint {
                ip: "203.0.113.7".parse().unwrap(),
                port: 61234,
            }],
        };
        let encoded = codec::encode(PTP_MEDIATION_PEERS_CONNECTION_START, &start).unwrap();
        let (method, value) = codec::decode(&encoded).unwrap();
        assert_eq!(method, PTP_MEDIATION_PEERS_CONNECTION_START);

        let decoded: PtpMediationPeersConnectionStart = codec::payload(value).unwrap();
        assert_eq!(decoded.peers, start.peers);
    }

    #[test]
    fn test_connect_datagram_parses() {
        let encoded = codec::encode(
            PTP_MEDIATION_CONNECT,
            &json!({"token": "11111111-2222-3333-4444-555555555555"}),
        )
        .unwrap();
        let (method, value) = codec::decode(&encoded).unwrap();
        assert_eq!(method, PTP_MEDIATION_CONNECT);

        let decoded: PtpMediationConnect = codec::payload(value).unwrap();
        assert_eq!(
            decoded.token.expose(),
            "11111111-2222-3333-4444-555555555555"
        );
    }
}
