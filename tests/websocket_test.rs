// Integration tests for the relay routes
// These drive the accept handler, the pumps and the hub through warp's test client

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use warp::http::StatusCode;
use warp::test::WsClient;
use warp::ws::Message;

use rusty_relay::auth::provider::JwtAuthProvider;
use rusty_relay::auth::token::{Claims, TokenManager};
use rusty_relay::config::ConnectionSettings;
use rusty_relay::core::hub::{create_hub, SharedHub};
use rusty_relay::core::message::{ChatMessage, ChatPayload, Envelope};
use rusty_relay::handlers::{routes, AppState};
use rusty_relay::storage::MemoryMessageStore;

const SECRET: &str = "websocket-test-secret-0123456789";

fn state_with(settings: ConnectionSettings) -> AppState {
    AppState {
        hub: create_hub(),
        auth: Arc::new(JwtAuthProvider::new(SECRET)),
        messages: Arc::new(MemoryMessageStore::new()),
        settings,
    }
}

fn test_state(announce_presence: bool) -> AppState {
    state_with(ConnectionSettings {
        announce_presence,
        ..ConnectionSettings::default()
    })
}

fn token_for(user_id: &str) -> String {
    TokenManager::new(SECRET)
        .generate_token(&Claims::new(
            user_id.to_string(),
            format!("{}@example.com", user_id),
            "user".to_string(),
        ))
        .expect("token generation")
}

async fn connect(state: &AppState, room: &str, user: &str) -> WsClient {
    warp::test::ws()
        .path(&format!("/api/v1/rooms/{}/chat/ws?token={}", room, token_for(user)))
        .handshake(routes(state.clone()))
        .await
        .expect("handshake")
}

// Registration happens on the server side after the handshake completes
async fn wait_for_members(hub: &SharedHub, room: &str, expected: usize) {
    for _ in 0..200 {
        if hub.member_count(room) == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "room {} has {} members, expected {}",
        room,
        hub.member_count(room),
        expected
    );
}

// Next JSON text frame, skipping control frames
async fn recv_json(client: &mut WsClient) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), client.recv())
            .await
            .expect("timed out waiting for a frame")
            .expect("websocket receive");
        if let Ok(text) = msg.to_str() {
            return serde_json::from_str(text).expect("valid JSON envelope");
        }
    }
}

// Wait for the server to end the socket, either with a close frame or by dropping it
async fn expect_close(client: &mut WsClient) {
    loop {
        let next = tokio::time::timeout(Duration::from_secs(2), client.recv())
            .await
            .expect("timed out waiting for close");
        match next {
            Ok(msg) if msg.is_close() => return,
            Ok(_) => continue,
            Err(_) => return,
        }
    }
}

async fn assert_silent(client: &mut WsClient) {
    let next = tokio::time::timeout(Duration::from_millis(200), client.recv()).await;
    assert!(next.is_err(), "expected no frame, got {:?}", next);
}

#[tokio::test]
async fn test_upgrade_without_token_rejected() {
    let state = test_state(false);

    let res = warp::test::request()
        .path("/api/v1/rooms/r1/chat/ws")
        .reply(&routes(state.clone()))
        .await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = serde_json::from_slice(res.body()).unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Token required");

    let handshake = warp::test::ws()
        .path("/api/v1/rooms/r1/chat/ws")
        .handshake(routes(state.clone()))
        .await;
    assert!(handshake.is_err());
    assert_eq!(state.hub.room_count(), 0);
}

#[tokio::test]
async fn test_upgrade_with_invalid_token_rejected() {
    let state = test_state(false);
    let forged = TokenManager::new("a-completely-different-secret-42")
        .generate_token(&Claims::new(
            "mallory".to_string(),
            String::new(),
            String::new(),
        ))
        .unwrap();

    let res = warp::test::request()
        .path(&format!("/api/v1/rooms/r1/chat/ws?token={}", forged))
        .reply(&routes(state.clone()))
        .await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let handshake = warp::test::ws()
        .path(&format!("/api/v1/rooms/r1/chat/ws?token={}", forged))
        .handshake(routes(state.clone()))
        .await;
    assert!(handshake.is_err());
    assert_eq!(state.hub.room_count(), 0);
}

#[tokio::test]
async fn test_bearer_header_fallback() {
    let state = test_state(false);
    let _client = warp::test::ws()
        .path("/api/v1/rooms/r1/chat/ws")
        .header("authorization", format!("Bearer {}", token_for("alice")))
        .handshake(routes(state.clone()))
        .await
        .expect("handshake with bearer header");

    wait_for_members(&state.hub, "r1", 1).await;
}

#[tokio::test]
async fn test_fan_out_stamps_trusted_identity() {
    let state = test_state(false);
    let mut alice = connect(&state, "r1", "alice").await;
    let mut bob = connect(&state, "r1", "bob").await;
    wait_for_members(&state.hub, "r1", 2).await;

    alice
        .send_text(r#"{"room_id":"elsewhere","user_id":"mallory","type":"message","payload":"hi"}"#)
        .await;

    for client in [&mut bob, &mut alice] {
        let envelope = recv_json(client).await;
        assert_eq!(
            envelope,
            json!({"room_id": "r1", "user_id": "alice", "type": "message", "payload": "hi"})
        );
    }
    assert!(!state.hub.has_room("elsewhere"));
}

#[tokio::test]
async fn test_malformed_frames_are_dropped() {
    let state = test_state(false);
    let mut alice = connect(&state, "r1", "alice").await;
    let mut bob = connect(&state, "r1", "bob").await;
    wait_for_members(&state.hub, "r1", 2).await;

    alice.send_text("definitely not json").await;
    alice.send_text(r#"{"type":"unknown_kind","payload":1}"#).await;
    alice.send_text(r#"{"type":"message","payload":"still here"}"#).await;

    let envelope = recv_json(&mut bob).await;
    assert_eq!(envelope["payload"], "still here");
    assert_eq!(envelope["user_id"], "alice");
    assert_eq!(state.hub.member_count("r1"), 2);
}

#[tokio::test]
async fn test_rooms_are_isolated() {
    let state = test_state(false);
    let mut alice = connect(&state, "r1", "alice").await;
    let mut carol = connect(&state, "r2", "carol").await;
    wait_for_members(&state.hub, "r1", 1).await;
    wait_for_members(&state.hub, "r2", 1).await;

    alice.send_text(r#"{"type":"message","payload":"r1 only"}"#).await;
    assert_eq!(recv_json(&mut alice).await["payload"], "r1 only");
    assert_silent(&mut carol).await;
}

#[tokio::test]
async fn test_presence_announcements() {
    let state = test_state(true);
    let mut alice = connect(&state, "lobby", "alice").await;

    let joined = recv_json(&mut alice).await;
    assert_eq!(joined["type"], "user_joined");
    assert_eq!(joined["payload"], json!({"user_id": "alice", "online": 1}));

    let mut bob = connect(&state, "lobby", "bob").await;
    let joined = recv_json(&mut alice).await;
    assert_eq!(joined["type"], "user_joined");
    assert_eq!(joined["user_id"], "bob");
    assert_eq!(joined["payload"]["online"], 2);
    assert_eq!(recv_json(&mut bob).await["type"], "user_joined");

    bob.send(Message::close()).await;
    let left = recv_json(&mut alice).await;
    assert_eq!(left["type"], "user_left");
    assert_eq!(left["payload"], json!({"user_id": "bob", "online": 1}));
    assert_eq!(state.hub.member_count("lobby"), 1);
}

#[tokio::test]
async fn test_close_unregisters_and_drops_room() {
    let state = test_state(false);
    let mut alice = connect(&state, "r1", "alice").await;
    wait_for_members(&state.hub, "r1", 1).await;

    alice.send(Message::close()).await;
    wait_for_members(&state.hub, "r1", 0).await;
    assert!(!state.hub.has_room("r1"));
    assert_eq!(state.hub.connection_count(), 0);
}

#[tokio::test]
async fn test_rest_message_is_broadcast() {
    let state = test_state(false);
    let mut alice = connect(&state, "r1", "alice").await;
    wait_for_members(&state.hub, "r1", 1).await;

    let res = warp::test::request()
        .method("POST")
        .path("/api/v1/rooms/r1/messages")
        .header("authorization", format!("Bearer {}", token_for("bob")))
        .json(&json!({"message": "hello from rest"}))
        .reply(&routes(state.clone()))
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: Value = serde_json::from_slice(res.body()).unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Message created successfully");
    assert_eq!(body["data"]["message"], "hello from rest");

    let envelope = recv_json(&mut alice).await;
    assert_eq!(envelope["type"], "message");
    assert_eq!(envelope["room_id"], "r1");
    assert_eq!(envelope["user_id"], "bob");
    assert_eq!(envelope["payload"]["message"], "hello from rest");
    assert_eq!(envelope["payload"]["id"], body["data"]["id"]);
}

#[tokio::test]
async fn test_rest_message_validation() {
    let state = test_state(false);

    let res = warp::test::request()
        .method("POST")
        .path("/api/v1/rooms/r1/messages")
        .json(&json!({"message": "no token"}))
        .reply(&routes(state.clone()))
        .await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = warp::test::request()
        .method("POST")
        .path("/api/v1/rooms/r1/messages")
        .header("authorization", format!("Bearer {}", token_for("bob")))
        .json(&json!({"message": "  "}))
        .reply(&routes(state.clone()))
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = warp::test::request()
        .method("POST")
        .path("/api/v1/rooms/r1/messages")
        .header("authorization", format!("Bearer {}", token_for("bob")))
        .json(&json!({"text": "wrong field"}))
        .reply(&routes(state.clone()))
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_online_count() {
    let state = test_state(false);
    let _alice = connect(&state, "r1", "alice").await;
    let _bob = connect(&state, "r1", "bob").await;
    wait_for_members(&state.hub, "r1", 2).await;

    let res = warp::test::request()
        .path("/api/v1/rooms/r1/online")
        .reply(&routes(state.clone()))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(res.body()).unwrap();
    assert_eq!(body["data"], json!({"room_id": "r1", "online": 2}));

    let res = warp::test::request()
        .path("/api/v1/rooms/empty/online")
        .reply(&routes(state.clone()))
        .await;
    let body: Value = serde_json::from_slice(res.body()).unwrap();
    assert_eq!(body["data"]["online"], 0);
}

#[tokio::test]
async fn test_health() {
    let res = warp::test::request()
        .path("/health")
        .reply(&routes(test_state(false)))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.body(), "OK");
}

#[tokio::test]
async fn test_payload_identity_is_not_trusted() {
    let state = test_state(false);
    let mut alice = connect(&state, "r1", "alice").await;
    let mut bob = connect(&state, "r1", "bob").await;
    wait_for_members(&state.hub, "r1", 2).await;

    alice
        .send_text(r#"{"type":"user_left","payload":{"user_id":"bob","online":0}}"#)
        .await;
    let forged = ChatMessage::new("admin-room".to_string(), "admin".to_string(), "hi".to_string());
    let stored = Envelope::message("admin-room", "admin", ChatPayload::Stored(forged))
        .encode()
        .unwrap();
    alice.send_text(stored).await;
    alice.send_text(r#"{"type":"message","payload":"after"}"#).await;

    let left = recv_json(&mut bob).await;
    assert_eq!(left["type"], "user_left");
    assert_eq!(left["user_id"], "alice");
    assert_eq!(left["payload"]["user_id"], "alice");

    // the stored record is refused, the next frame still goes through
    let next = recv_json(&mut bob).await;
    assert_eq!(next["payload"], "after");
    assert_eq!(state.hub.member_count("r1"), 2);
}

#[tokio::test]
async fn test_binary_frames_are_ignored() {
    let state = test_state(false);
    let mut alice = connect(&state, "r1", "alice").await;
    let mut bob = connect(&state, "r1", "bob").await;
    wait_for_members(&state.hub, "r1", 2).await;

    alice
        .send(Message::binary(br#"{"type":"message","payload":"binary"}"#.to_vec()))
        .await;
    alice.send_text(r#"{"type":"message","payload":"text"}"#).await;

    assert_eq!(recv_json(&mut bob).await["payload"], "text");
    assert_eq!(state.hub.member_count("r1"), 2);
}

#[tokio::test]
async fn test_evicted_peer_receives_close() {
    let state = state_with(ConnectionSettings {
        outbound_queue_capacity: 1,
        announce_presence: false,
        ..ConnectionSettings::default()
    });
    let mut alice = connect(&state, "r1", "alice").await;
    wait_for_members(&state.hub, "r1", 1).await;

    // No await between sends, so the outbound task cannot drain the queue
    for i in 0..4 {
        state.hub.broadcast(
            "r1",
            Envelope::message("r1", "sys", ChatPayload::Text(i.to_string())),
        );
    }
    assert_eq!(state.hub.member_count("r1"), 0);
    assert!(!state.hub.has_room("r1"));

    assert_eq!(recv_json(&mut alice).await["payload"], "0");
    expect_close(&mut alice).await;
}

#[tokio::test]
async fn test_oversized_frame_ends_connection() {
    let state = state_with(ConnectionSettings {
        max_frame_size: 64,
        announce_presence: false,
        ..ConnectionSettings::default()
    });
    let mut alice = connect(&state, "r1", "alice").await;
    wait_for_members(&state.hub, "r1", 1).await;

    let oversized = format!(r#"{{"type":"message","payload":"{}"}}"#, "x".repeat(200));
    alice.send_text(oversized).await;

    wait_for_members(&state.hub, "r1", 0).await;
    assert!(!state.hub.has_room("r1"));
}
