//! Integration tests exercising the WebSocket endpoints in-process.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{
        client::IntoClientRequest, protocol::Message, protocol::frame::coding::CloseCode,
    },
};

use goban_server::{auth::StaticAuthClient, runner::router, state::AppState};

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Serves the real router on an ephemeral port with a fixed account table.
struct TestServer {
    addr: std::net::SocketAddr,
}

impl TestServer {
    async fn start() -> Self {
        let auth = StaticAuthClient::new()
            .with_user("tok-alice", "alice", 3)
            .with_user("tok-bob", "bob", 7)
            .with_user("tok-charlie", "charlie", 5);
        let state = AppState::new(Arc::new(auth));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let addr = listener.local_addr().expect("Failed to read local addr");
        tokio::spawn(async move {
            axum::serve(listener, router(state))
                .await
                .expect("Test server crashed");
        });

        TestServer { addr }
    }

    fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }

    fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Open a WebSocket connection, optionally with a bearer token.
    async fn connect(&self, path: &str, token: Option<&str>) -> WsClient {
        let mut request = self
            .ws_url(path)
            .into_client_request()
            .expect("Failed to build request");
        if let Some(token) = token {
            request.headers_mut().insert(
                "Authorization",
                format!("Bearer {}", token)
                    .parse()
                    .expect("Failed to build header"),
            );
        }
        let (client, _) = connect_async(request)
            .await
            .expect("Failed to connect");
        client
    }

    /// Connect to the lobby and complete the hello for `username`.
    async fn connect_lobby(&self, token: &str, username: &str) -> WsClient {
        let mut client = self.connect("/ws/lobby", Some(token)).await;
        let welcome = hello(&mut client, username).await;
        assert_eq!(welcome["type"], "lobby.welcome");
        client
    }
}

async fn send_json(client: &mut WsClient, value: Value) {
    client
        .send(Message::Text(value.to_string().into()))
        .await
        .expect("Failed to send frame");
}

/// Receive the next text frame as JSON, skipping protocol-level frames.
async fn recv_json(client: &mut WsClient) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), client.next())
            .await
            .expect("Timed out waiting for a frame")
            .expect("Connection closed unexpectedly")
            .expect("WebSocket error");
        match msg {
            Message::Text(text) => return serde_json::from_str(&text).expect("Frame is not JSON"),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("Expected a text frame, got {:?}", other),
        }
    }
}

async fn hello(client: &mut WsClient, username: &str) -> Value {
    send_json(
        client,
        json!({"type": "client.hello", "payload": {"username": username}}),
    )
    .await;
    recv_json(client).await
}

/// Queue both users and return (room_id, alice's event, bob's event).
async fn match_via_queue(alice: &mut WsClient, bob: &mut WsClient) -> (String, Value, Value) {
    send_json(alice, json!({"type": "queue.join", "payload": {"level": 3}})).await;
    // make sure alice's entry lands first
    tokio::time::sleep(Duration::from_millis(50)).await;
    send_json(bob, json!({"type": "queue.join", "payload": {"level": 7}})).await;

    let alice_event = recv_json(alice).await;
    let bob_event = recv_json(bob).await;
    assert_eq!(alice_event["type"], "queue.match_found");
    assert_eq!(bob_event["type"], "queue.match_found");

    let room_id = alice_event["payload"]["room_id"]
        .as_str()
        .expect("room_id missing")
        .to_string();
    (room_id, alice_event, bob_event)
}

#[tokio::test]
async fn test_http_health_endpoint() {
    // given:
    let server = TestServer::start().await;

    // when:
    let response = reqwest::get(server.http_url("/api/health"))
        .await
        .expect("Health request failed");

    // then:
    assert!(response.status().is_success());
    let body: Value = response.json().await.expect("Health body is not JSON");
    assert_eq!(body, json!({"status": "ok"}));
}

#[tokio::test]
async fn test_health_echo_requires_no_auth() {
    // given:
    let server = TestServer::start().await;
    let mut client = server.connect("/ws/health", None).await;

    // when:
    send_json(&mut client, json!({"message": "ping"})).await;

    // then: the received body comes back under health.echo
    let reply = recv_json(&mut client).await;
    assert_eq!(
        reply,
        json!({"type": "health.echo", "payload": {"message": "ping"}})
    );

    // when: the frame is not JSON
    client
        .send(Message::Text("{nope".into()))
        .await
        .expect("Failed to send frame");

    // then:
    let reply = recv_json(&mut client).await;
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["payload"]["message"], "invalid-json");
}

#[tokio::test]
async fn test_lobby_without_token_is_closed_with_policy_violation() {
    // given:
    let server = TestServer::start().await;

    // when: the upgrade succeeds but no token was presented
    let mut client = server.connect("/ws/lobby", None).await;

    // then: the server closes immediately with a policy violation
    let msg = tokio::time::timeout(Duration::from_secs(2), client.next())
        .await
        .expect("Timed out waiting for close")
        .expect("Stream ended without a frame")
        .expect("WebSocket error");
    match msg {
        Message::Close(Some(frame)) => {
            assert_eq!(frame.code, CloseCode::Policy);
            assert_eq!(frame.reason.as_str(), "unauthorized");
        }
        other => panic!("Expected a close frame, got {:?}", other),
    }
}

#[tokio::test]
async fn test_lobby_with_invalid_token_is_closed_with_policy_violation() {
    // given:
    let server = TestServer::start().await;

    // when:
    let mut client = server.connect("/ws/lobby", Some("tok-forged")).await;

    // then:
    let msg = tokio::time::timeout(Duration::from_secs(2), client.next())
        .await
        .expect("Timed out waiting for close")
        .expect("Stream ended without a frame")
        .expect("WebSocket error");
    assert!(matches!(
        msg,
        Message::Close(Some(frame)) if frame.code == CloseCode::Policy
    ));
}

#[tokio::test]
async fn test_hello_is_welcomed() {
    // given:
    let server = TestServer::start().await;
    let mut client = server.connect("/ws/lobby", Some("tok-alice")).await;

    // when:
    let welcome = hello(&mut client, "alice").await;

    // then:
    assert_eq!(
        welcome,
        json!({"type": "lobby.welcome", "payload": {"username": "alice"}})
    );
}

#[tokio::test]
async fn test_requests_before_hello_are_rejected() {
    // given:
    let server = TestServer::start().await;
    let mut client = server.connect("/ws/lobby", Some("tok-alice")).await;

    // when:
    send_json(&mut client, json!({"type": "queue.join", "payload": {"level": 3}})).await;

    // then:
    let reply = recv_json(&mut client).await;
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["payload"]["message"], "hello-first");
}

#[tokio::test]
async fn test_hello_must_match_token_identity() {
    // given: a socket authenticated as alice
    let server = TestServer::start().await;
    let mut client = server.connect("/ws/lobby", Some("tok-alice")).await;

    // when: the hello claims to be bob
    let reply = hello(&mut client, "bob").await;

    // then:
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["payload"]["message"], "username-mismatch");

    // the session is still usable with the right identity
    let welcome = hello(&mut client, "alice").await;
    assert_eq!(welcome["type"], "lobby.welcome");
}

#[tokio::test]
async fn test_second_session_for_same_username_is_rejected() {
    // given:
    let server = TestServer::start().await;
    let _first = server.connect_lobby("tok-alice", "alice").await;

    // when:
    let mut second = server.connect("/ws/lobby", Some("tok-alice")).await;
    let reply = hello(&mut second, "alice").await;

    // then: the new session is turned away, the first is untouched
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["payload"]["message"], "already-connected");
}

#[tokio::test]
async fn test_unknown_message_type_is_reported() {
    // given:
    let server = TestServer::start().await;
    let mut client = server.connect_lobby("tok-alice", "alice").await;

    // when:
    send_json(&mut client, json!({"type": "queue.teleport", "payload": {}})).await;

    // then:
    let reply = recv_json(&mut client).await;
    assert_eq!(reply["payload"]["message"], "unknown-message");
}

#[tokio::test]
async fn test_queue_join_matches_first_two_users() {
    // given:
    let server = TestServer::start().await;
    let mut alice = server.connect_lobby("tok-alice", "alice").await;
    let mut bob = server.connect_lobby("tok-bob", "bob").await;

    // when:
    let (room_id, alice_event, bob_event) = match_via_queue(&mut alice, &mut bob).await;

    // then: both see the same room and each other's declared level
    assert_eq!(bob_event["payload"]["room_id"], Value::from(room_id));
    assert_eq!(alice_event["payload"]["opponent"]["username"], "bob");
    assert_eq!(alice_event["payload"]["opponent"]["level"], 7);
    assert_eq!(bob_event["payload"]["opponent"]["username"], "alice");
    assert_eq!(bob_event["payload"]["opponent"]["level"], 3);
}

#[tokio::test]
async fn test_queue_leave_is_acknowledged_once() {
    // given:
    let server = TestServer::start().await;
    let mut client = server.connect_lobby("tok-alice", "alice").await;
    send_json(&mut client, json!({"type": "queue.join", "payload": {"level": 3}})).await;

    // when:
    send_json(&mut client, json!({"type": "queue.leave", "payload": {}})).await;

    // then:
    let reply = recv_json(&mut client).await;
    assert_eq!(reply, json!({"type": "queue.left", "payload": {}}));

    // a second leave is an error
    send_json(&mut client, json!({"type": "queue.leave", "payload": {}})).await;
    let reply = recv_json(&mut client).await;
    assert_eq!(reply["payload"]["message"], "not-queued");
}

#[tokio::test]
async fn test_invite_accept_creates_match_for_both() {
    // given:
    let server = TestServer::start().await;
    let mut alice = server.connect_lobby("tok-alice", "alice").await;
    let mut bob = server.connect_lobby("tok-bob", "bob").await;

    // when: alice invites bob
    send_json(&mut alice, json!({"type": "invite.send", "payload": {"to": "bob"}})).await;

    // then: both sides see the same invite id
    let sent = recv_json(&mut alice).await;
    let received = recv_json(&mut bob).await;
    assert_eq!(sent["type"], "invite.sent");
    assert_eq!(received["type"], "invite.received");
    assert_eq!(received["payload"]["from"], "alice");
    let invite_id = received["payload"]["invite_id"].clone();
    assert_eq!(sent["payload"]["invite_id"], invite_id);

    // when: bob accepts
    send_json(
        &mut bob,
        json!({"type": "invite.accept", "payload": {"invite_id": invite_id}}),
    )
    .await;

    // then: both get a match with no level metadata
    let alice_event = recv_json(&mut alice).await;
    let bob_event = recv_json(&mut bob).await;
    assert_eq!(alice_event["type"], "queue.match_found");
    assert_eq!(bob_event["type"], "queue.match_found");
    assert_eq!(alice_event["payload"]["opponent"]["username"], "bob");
    assert_eq!(bob_event["payload"]["opponent"]["username"], "alice");
    assert!(alice_event["payload"]["opponent"]["level"].is_null());
    assert_eq!(
        alice_event["payload"]["room_id"],
        bob_event["payload"]["room_id"]
    );
}

#[tokio::test]
async fn test_invite_decline_notifies_sender() {
    // given: alice invited bob
    let server = TestServer::start().await;
    let mut alice = server.connect_lobby("tok-alice", "alice").await;
    let mut bob = server.connect_lobby("tok-bob", "bob").await;
    send_json(&mut alice, json!({"type": "invite.send", "payload": {"to": "bob"}})).await;
    let _sent = recv_json(&mut alice).await;
    let received = recv_json(&mut bob).await;
    let invite_id = received["payload"]["invite_id"].clone();

    // when:
    send_json(
        &mut bob,
        json!({"type": "invite.decline", "payload": {"invite_id": invite_id}}),
    )
    .await;

    // then: alice learns who declined, bob gets a bare acknowledgement
    let alice_event = recv_json(&mut alice).await;
    let bob_event = recv_json(&mut bob).await;
    assert_eq!(alice_event["type"], "invite.declined");
    assert_eq!(alice_event["payload"]["to"], "bob");
    assert_eq!(bob_event["type"], "invite.declined");
    assert!(bob_event["payload"]["to"].is_null());
}

#[tokio::test]
async fn test_invite_validation_errors() {
    // given:
    let server = TestServer::start().await;
    let mut alice = server.connect_lobby("tok-alice", "alice").await;

    // when / then: self-invite
    send_json(&mut alice, json!({"type": "invite.send", "payload": {"to": "alice"}})).await;
    let reply = recv_json(&mut alice).await;
    assert_eq!(reply["payload"]["message"], "self-invite");

    // when / then: unregistered account
    send_json(&mut alice, json!({"type": "invite.send", "payload": {"to": "zoe"}})).await;
    let reply = recv_json(&mut alice).await;
    assert_eq!(reply["payload"]["message"], "unknown-user");

    // when / then: registered but not connected
    send_json(
        &mut alice,
        json!({"type": "invite.send", "payload": {"to": "charlie"}}),
    )
    .await;
    let reply = recv_json(&mut alice).await;
    assert_eq!(reply["payload"]["message"], "user-offline");
}

#[tokio::test]
async fn test_disconnect_cancels_pending_invite() {
    // given: alice invited bob, then her connection drops
    let server = TestServer::start().await;
    let mut alice = server.connect_lobby("tok-alice", "alice").await;
    let mut bob = server.connect_lobby("tok-bob", "bob").await;
    send_json(&mut alice, json!({"type": "invite.send", "payload": {"to": "bob"}})).await;
    let _sent = recv_json(&mut alice).await;
    let received = recv_json(&mut bob).await;
    let invite_id = received["payload"]["invite_id"].as_str().unwrap().to_string();

    // when:
    alice.close(None).await.expect("Failed to close");

    // then: bob is told the proposal is gone
    let reply = recv_json(&mut bob).await;
    assert_eq!(reply["type"], "error");
    assert_eq!(
        reply["payload"]["message"],
        format!("invite-cancelled:{}", invite_id)
    );
}

#[tokio::test]
async fn test_room_flow_moves_chat_and_leave() {
    // given: a room formed through the queue
    let server = TestServer::start().await;
    let mut alice_lobby = server.connect_lobby("tok-alice", "alice").await;
    let mut bob_lobby = server.connect_lobby("tok-bob", "bob").await;
    let (room_id, _, _) = match_via_queue(&mut alice_lobby, &mut bob_lobby).await;

    // both leave the lobby before attaching to the room
    alice_lobby.close(None).await.expect("Failed to close");
    bob_lobby.close(None).await.expect("Failed to close");
    tokio::time::sleep(Duration::from_millis(100)).await;

    let path = format!("/ws/room/{}", room_id);
    let mut alice = server.connect(&path, Some("tok-alice")).await;
    let mut bob = server.connect(&path, Some("tok-bob")).await;

    // when: both attach
    let alice_joined = hello(&mut alice, "alice").await;
    let bob_joined = hello(&mut bob, "bob").await;

    // then: join acks, and alice sees bob arrive
    assert_eq!(
        alice_joined,
        json!({"type": "room.joined", "payload": {"room_id": room_id}})
    );
    assert_eq!(bob_joined["type"], "room.joined");
    let user_joined = recv_json(&mut alice).await;
    assert_eq!(
        user_joined,
        json!({"type": "room.user_joined", "payload": {"username": "bob"}})
    );

    // when: alice plays a move
    send_json(&mut alice, json!({"type": "move.play", "payload": {"x": 3, "y": 4}})).await;

    // then: only bob receives it, with alice's stone color
    let played = recv_json(&mut bob).await;
    assert_eq!(
        played,
        json!({"type": "move.played", "payload": {"x": 3, "y": 4, "from": "alice", "color": 1}})
    );

    // when: bob chats
    send_json(
        &mut bob,
        json!({"type": "chat.send", "payload": {"message": "nice opening"}}),
    )
    .await;

    // then: alice receives it, bob gets no echo
    let chat = recv_json(&mut alice).await;
    assert_eq!(
        chat,
        json!({"type": "chat.message", "payload": {"from": "bob", "message": "nice opening"}})
    );

    // when: bob leaves
    send_json(&mut bob, json!({"type": "room.leave", "payload": {}})).await;

    // then: bob is acked, alice is notified
    let left = recv_json(&mut bob).await;
    assert_eq!(
        left,
        json!({"type": "room.left", "payload": {"room_id": room_id}})
    );
    let user_left = recv_json(&mut alice).await;
    assert_eq!(
        user_left,
        json!({"type": "room.user_left", "payload": {"username": "bob"}})
    );
}

#[tokio::test]
async fn test_room_disconnect_notifies_peer() {
    // given: both participants present in a room
    let server = TestServer::start().await;
    let mut alice_lobby = server.connect_lobby("tok-alice", "alice").await;
    let mut bob_lobby = server.connect_lobby("tok-bob", "bob").await;
    let (room_id, _, _) = match_via_queue(&mut alice_lobby, &mut bob_lobby).await;
    alice_lobby.close(None).await.expect("Failed to close");
    bob_lobby.close(None).await.expect("Failed to close");
    tokio::time::sleep(Duration::from_millis(100)).await;

    let path = format!("/ws/room/{}", room_id);
    let mut alice = server.connect(&path, Some("tok-alice")).await;
    let mut bob = server.connect(&path, Some("tok-bob")).await;
    hello(&mut alice, "alice").await;
    hello(&mut bob, "bob").await;
    let _user_joined = recv_json(&mut alice).await;

    // when: bob's connection drops without a leave
    bob.close(None).await.expect("Failed to close");

    // then:
    let user_left = recv_json(&mut alice).await;
    assert_eq!(
        user_left,
        json!({"type": "room.user_left", "payload": {"username": "bob"}})
    );
}

#[tokio::test]
async fn test_joining_unknown_room_is_rejected() {
    // given:
    let server = TestServer::start().await;
    let mut client = server.connect("/ws/room/no-such-room", Some("tok-alice")).await;

    // when:
    let reply = hello(&mut client, "alice").await;

    // then:
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["payload"]["message"], "room-not-found");
}
