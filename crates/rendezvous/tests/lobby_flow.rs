//! E2E tests for session registration, lobby lifecycle, and chat.
//!
//! Every test talks to a real server instance over HTTP and WebSocket,
//! exactly as a client would.

use anyhow::Result;
use lobby_protocol::frame;
use rv_test_utils::TestServer;
use serde_json::{json, Value};
use std::time::Duration;

async fn post(url: String, body: Value) -> Result<reqwest::Response> {
    Ok(reqwest::Client::new().post(url).json(&body).send().await?)
}

fn create_body(token: &str, host_name: &str, lobby_name: &str, max_members: i64) -> Value {
    json!({
        "token": token,
        "hostName": host_name,
        "lobbyName": lobby_name,
        "isPublic": true,
        "maxMembers": max_members,
    })
}

#[tokio::test]
async fn test_ping() -> Result<()> {
    let server = TestServer::spawn().await?;

    let response = reqwest::get(format!("{}/ping", server.url())).await?;
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await?, "pong");
    Ok(())
}

#[tokio::test]
async fn test_register_then_create_then_list() -> Result<()> {
    let server = TestServer::spawn().await?;
    let (_stream, token) = server.connect().await?;

    let response = post(
        format!("{}/lobbies", server.url()),
        create_body(&token, "jt", "My lobby", 3),
    )
    .await?;
    assert_eq!(response.status(), 201);

    let body: Value = response.json().await?;
    assert_eq!(body["lobbyName"], "My lobby");
    let lobby_id = body["lobbyId"].as_str().unwrap().to_string();
    assert_eq!(lobby_id.len(), 5);
    assert!(lobby_id
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));

    let listed: Value = reqwest::get(format!("{}/lobbies", server.url()))
        .await?
        .json()
        .await?;
    let lobbies = listed["lobbies"].as_array().unwrap();
    assert_eq!(lobbies.len(), 1);
    assert_eq!(lobbies[0]["name"], "My lobby");
    assert_eq!(lobbies[0]["id"], lobby_id.as_str());
    assert_eq!(lobbies[0]["currentMembers"], 1);
    assert_eq!(lobbies[0]["maxMembers"], 3);
    Ok(())
}

#[tokio::test]
async fn test_private_lobby_is_not_listed() -> Result<()> {
    let server = TestServer::spawn().await?;
    let (_stream, token) = server.connect().await?;

    let mut body = create_body(&token, "jt", "Secret lobby", 3);
    body["isPublic"] = json!(false);
    let response = post(format!("{}/lobbies", server.url()), body).await?;
    assert_eq!(response.status(), 201);

    let listed: Value = reqwest::get(format!("{}/lobbies", server.url()))
        .await?
        .json()
        .await?;
    assert!(listed["lobbies"].as_array().unwrap().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_create_with_unknown_token_rejected() -> Result<()> {
    let server = TestServer::spawn().await?;

    let response = post(
        format!("{}/lobbies", server.url()),
        create_body("never-issued", "jt", "My lobby", 3),
    )
    .await?;
    assert_eq!(response.status(), 400);
    Ok(())
}

#[tokio::test]
async fn test_name_length_boundaries() -> Result<()> {
    let server = TestServer::spawn().await?;

    let (_s1, token) = server.connect().await?;
    let fifty = "a".repeat(50);
    let response = post(
        format!("{}/lobbies", server.url()),
        create_body(&token, "jt", &fifty, 3),
    )
    .await?;
    assert_eq!(response.status(), 201);

    let (_s2, token) = server.connect().await?;
    let fifty_one = "a".repeat(51);
    let response = post(
        format!("{}/lobbies", server.url()),
        create_body(&token, "jt", &fifty_one, 3),
    )
    .await?;
    assert_eq!(response.status(), 400);
    Ok(())
}

#[tokio::test]
async fn test_capacity_boundaries() -> Result<()> {
    let server = TestServer::spawn().await?;

    for (max_members, expected) in [(1i64, 201u16), (64, 201), (0, 400), (-1, 400), (65, 400)] {
        let (_stream, token) = server.connect().await?;
        let response = post(
            format!("{}/lobbies", server.url()),
            create_body(&token, "jt", "My lobby", max_members),
        )
        .await?;
        assert_eq!(
            response.status(),
            expected,
            "maxMembers = {max_members}"
        );
    }
    Ok(())
}

#[tokio::test]
async fn test_create_twice_conflicts() -> Result<()> {
    let server = TestServer::spawn().await?;
    let (_stream, token) = server.connect().await?;

    let response = post(
        format!("{}/lobbies", server.url()),
        create_body(&token, "jt", "My lobby", 3),
    )
    .await?;
    assert_eq!(response.status(), 201);

    let response = post(
        format!("{}/lobbies", server.url()),
        create_body(&token, "jt", "Another", 3),
    )
    .await?;
    assert_eq!(response.status(), 409);
    let body: Value = response.json().await?;
    assert_eq!(body["errors"][0], "already in a lobby");
    Ok(())
}

#[tokio::test]
async fn test_join_notifies_host() -> Result<()> {
    let server = TestServer::spawn().await?;
    let (mut host, host_token) = server.connect().await?;
    let (_joiner, joiner_token) = server.connect().await?;

    let created: Value = post(
        format!("{}/lobbies", server.url()),
        create_body(&host_token, "jt", "My lobby", 3),
    )
    .await?
    .json()
    .await?;
    let lobby_id = created["lobbyId"].as_str().unwrap().to_string();

    let response = post(
        format!("{}/lobbies/{lobby_id}/join", server.url()),
        json!({"token": joiner_token, "peerName": "peer0"}),
    )
    .await?;
    assert_eq!(response.status(), 200);

    let view: Value = response.json().await?;
    assert_eq!(view["lobbyId"], lobby_id.as_str());
    assert_eq!(view["lobbyName"], "My lobby");
    assert_eq!(view["lobbyMembers"], json!(["jt", "peer0"]));
    assert_eq!(view["host"], "jt");

    let notice = host.expect_method(frame::LOBBY_PEER_CONNECT).await?;
    assert_eq!(notice["lobbyId"], lobby_id.as_str());
    assert_eq!(notice["peerName"], "peer0");
    Ok(())
}

#[tokio::test]
async fn test_join_conflict_paths() -> Result<()> {
    let server = TestServer::spawn().await?;
    let (_host, host_token) = server.connect().await?;

    let created: Value = post(
        format!("{}/lobbies", server.url()),
        create_body(&host_token, "jt", "My lobby", 2),
    )
    .await?
    .json()
    .await?;
    let lobby_id = created["lobbyId"].as_str().unwrap().to_string();

    // Unknown lobby.
    let (_s, token) = server.connect().await?;
    let response = post(
        format!("{}/lobbies/ZZZZZ/join", server.url()),
        json!({"token": token, "peerName": "peer0"}),
    )
    .await?;
    assert_eq!(response.status(), 409);
    let body: Value = response.json().await?;
    assert_eq!(body["errors"][0], "lobby doesn't exist");

    // Duplicate display name.
    let response = post(
        format!("{}/lobbies/{lobby_id}/join", server.url()),
        json!({"token": token, "peerName": "jt"}),
    )
    .await?;
    assert_eq!(response.status(), 409);
    let body: Value = response.json().await?;
    assert_eq!(body["errors"][0], "name is taken");

    // Fill the lobby, then the next join bounces.
    let response = post(
        format!("{}/lobbies/{lobby_id}/join", server.url()),
        json!({"token": token, "peerName": "peer0"}),
    )
    .await?;
    assert_eq!(response.status(), 200);

    let (_s2, late_token) = server.connect().await?;
    let response = post(
        format!("{}/lobbies/{lobby_id}/join", server.url()),
        json!({"token": late_token, "peerName": "peer1"}),
    )
    .await?;
    assert_eq!(response.status(), 409);
    let body: Value = response.json().await?;
    assert_eq!(body["errors"][0], "lobby is full");
    Ok(())
}

#[tokio::test]
async fn test_host_disconnect_closes_lobby() -> Result<()> {
    let server = TestServer::spawn().await?;
    let (host, host_token) = server.connect().await?;
    let (mut joiner, joiner_token) = server.connect().await?;

    let created: Value = post(
        format!("{}/lobbies", server.url()),
        create_body(&host_token, "jt", "My lobby", 3),
    )
    .await?
    .json()
    .await?;
    let lobby_id = created["lobbyId"].as_str().unwrap().to_string();

    post(
        format!("{}/lobbies/{lobby_id}/join", server.url()),
        json!({"token": joiner_token, "peerName": "peer0"}),
    )
    .await?;

    host.close().await?;

    // The sole remaining member sees lobby_closed, not a
    // peer-disconnect notice.
    let (method, value) = joiner.recv_frame().await?;
    assert_eq!(method, frame::LOBBY_CLOSED);
    assert_eq!(value["lobbyId"], lobby_id.as_str());
    assert_eq!(value["lobbyName"], "My lobby");

    let listed: Value = reqwest::get(format!("{}/lobbies", server.url()))
        .await?
        .json()
        .await?;
    assert!(listed["lobbies"].as_array().unwrap().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_non_host_disconnect_keeps_lobby() -> Result<()> {
    let server = TestServer::spawn().await?;
    let (mut host, host_token) = server.connect().await?;
    let (joiner, joiner_token) = server.connect().await?;

    let created: Value = post(
        format!("{}/lobbies", server.url()),
        create_body(&host_token, "jt", "My lobby", 3),
    )
    .await?
    .json()
    .await?;
    let lobby_id = created["lobbyId"].as_str().unwrap().to_string();

    post(
        format!("{}/lobbies/{lobby_id}/join", server.url()),
        json!({"token": joiner_token, "peerName": "peer0"}),
    )
    .await?;
    host.expect_method(frame::LOBBY_PEER_CONNECT).await?;

    joiner.close().await?;

    let notice = host.expect_method(frame::LOBBY_PEER_DISCONNECT).await?;
    assert_eq!(notice["lobbyId"], lobby_id.as_str());
    assert_eq!(notice["peerName"], "peer0");

    let listed: Value = reqwest::get(format!("{}/lobbies", server.url()))
        .await?
        .json()
        .await?;
    assert_eq!(listed["lobbies"][0]["currentMembers"], 1);
    Ok(())
}

#[tokio::test]
async fn test_chat_fan_out_includes_sender() -> Result<()> {
    let server = TestServer::spawn().await?;
    let (mut host, host_token) = server.connect().await?;
    let (mut joiner, joiner_token) = server.connect().await?;

    let created: Value = post(
        format!("{}/lobbies", server.url()),
        create_body(&host_token, "jt", "My lobby", 3),
    )
    .await?
    .json()
    .await?;
    let lobby_id = created["lobbyId"].as_str().unwrap().to_string();

    post(
        format!("{}/lobbies/{lobby_id}/join", server.url()),
        json!({"token": joiner_token, "peerName": "peer0"}),
    )
    .await?;
    host.expect_method(frame::LOBBY_PEER_CONNECT).await?;

    joiner
        .send_frame(
            frame::LOBBY_MESSAGING_SEND,
            &json!({"token": joiner_token, "lobbyId": lobby_id, "message": "hello"}),
        )
        .await?;

    for stream in [&mut host, &mut joiner] {
        let value = stream.expect_method(frame::LOBBY_MESSAGING_RECEIVED).await?;
        assert_eq!(value["lobbyId"], lobby_id.as_str());
        assert_eq!(value["message"]["senderName"], "peer0");
        assert_eq!(value["message"]["message"], "hello");
        assert!(value["message"]["timestamp"].as_i64().unwrap() > 0);
    }
    Ok(())
}

#[tokio::test]
async fn test_chat_preserves_sender_order() -> Result<()> {
    let server = TestServer::spawn().await?;
    let (mut host, host_token) = server.connect().await?;
    let (mut joiner, joiner_token) = server.connect().await?;

    let created: Value = post(
        format!("{}/lobbies", server.url()),
        create_body(&host_token, "jt", "My lobby", 3),
    )
    .await?
    .json()
    .await?;
    let lobby_id = created["lobbyId"].as_str().unwrap().to_string();

    post(
        format!("{}/lobbies/{lobby_id}/join", server.url()),
        json!({"token": joiner_token, "peerName": "peer0"}),
    )
    .await?;
    host.expect_method(frame::LOBBY_PEER_CONNECT).await?;

    for i in 0..5 {
        joiner
            .send_frame(
                frame::LOBBY_MESSAGING_SEND,
                &json!({"token": joiner_token, "lobbyId": lobby_id, "message": format!("msg {i}")}),
            )
            .await?;
    }

    for i in 0..5 {
        let value = host.expect_method(frame::LOBBY_MESSAGING_RECEIVED).await?;
        assert_eq!(value["message"]["message"], format!("msg {i}"));
    }
    Ok(())
}

#[tokio::test]
async fn test_chat_length_boundaries() -> Result<()> {
    let server = TestServer::spawn().await?;
    let (mut host, host_token) = server.connect().await?;
    let (mut joiner, joiner_token) = server.connect().await?;

    let created: Value = post(
        format!("{}/lobbies", server.url()),
        create_body(&host_token, "jt", "My lobby", 3),
    )
    .await?
    .json()
    .await?;
    let lobby_id = created["lobbyId"].as_str().unwrap().to_string();

    post(
        format!("{}/lobbies/{lobby_id}/join", server.url()),
        json!({"token": joiner_token, "peerName": "peer0"}),
    )
    .await?;
    host.expect_method(frame::LOBBY_PEER_CONNECT).await?;

    // Out-of-range messages are silently dropped.
    for message in ["", &"x".repeat(251)] {
        joiner
            .send_frame(
                frame::LOBBY_MESSAGING_SEND,
                &json!({"token": joiner_token, "lobbyId": lobby_id, "message": message}),
            )
            .await?;
    }
    host.expect_silence(Duration::from_millis(300)).await?;

    // In-range messages go through.
    for message in ["y", &"z".repeat(250)] {
        joiner
            .send_frame(
                frame::LOBBY_MESSAGING_SEND,
                &json!({"token": joiner_token, "lobbyId": lobby_id, "message": message}),
            )
            .await?;
        let value = host.expect_method(frame::LOBBY_MESSAGING_RECEIVED).await?;
        assert_eq!(value["message"]["message"], *message);
    }
    Ok(())
}

#[tokio::test]
async fn test_malformed_stream_input_is_ignored() -> Result<()> {
    let server = TestServer::spawn().await?;
    let (mut host, host_token) = server.connect().await?;
    let (mut joiner, joiner_token) = server.connect().await?;

    let created: Value = post(
        format!("{}/lobbies", server.url()),
        create_body(&host_token, "jt", "My lobby", 3),
    )
    .await?
    .json()
    .await?;
    let lobby_id = created["lobbyId"].as_str().unwrap().to_string();

    post(
        format!("{}/lobbies/{lobby_id}/join", server.url()),
        json!({"token": joiner_token, "peerName": "peer0"}),
    )
    .await?;
    host.expect_method(frame::LOBBY_PEER_CONNECT).await?;

    // None of these elicit a response or kill the stream.
    joiner.send_raw("no separator").await?;
    joiner.send_raw("unknown_method:e30=").await?;
    joiner.send_raw("lobby_messaging_send:!!!").await?;

    // The stream still works afterwards.
    joiner
        .send_frame(
            frame::LOBBY_MESSAGING_SEND,
            &json!({"token": joiner_token, "lobbyId": lobby_id, "message": "still here"}),
        )
        .await?;
    let value = host.expect_method(frame::LOBBY_MESSAGING_RECEIVED).await?;
    assert_eq!(value["message"]["message"], "still here");
    Ok(())
}
