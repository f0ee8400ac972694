//! Lobby channel dispatch: hello, matchmaking queue, and invites.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::StreamExt;
use tokio::sync::mpsc;

use goban_shared::protocol::{LobbyEvent, LobbyRequest};

use crate::registry::{Channel, OutboundSender, RegistryError};
use crate::state::AppState;

use super::{decode_frame, pusher_loop};

pub(super) async fn run(socket: WebSocket, state: AppState, username: String) {
    let (sender, mut receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel();

    // Set once the hello completes and the registry accepts the session.
    // The cleanup below must not run the disconnect cascade for a username
    // this socket never owned.
    let registered = Arc::new(AtomicBool::new(false));

    let mut session = LobbySession {
        state: state.clone(),
        username: username.clone(),
        tx,
        registered: registered.clone(),
    };
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            let msg = match msg {
                Ok(msg) => msg,
                Err(e) => {
                    tracing::debug!("WebSocket error for '{}': {}", session.username, e);
                    break;
                }
            };
            match msg {
                Message::Text(text) => {
                    if session.handle_text(&text).await.is_break() {
                        break;
                    }
                }
                Message::Close(_) => {
                    tracing::info!("'{}' closed the lobby connection", session.username);
                    break;
                }
                _ => {}
            }
        }
    });

    let mut send_task = pusher_loop(rx, sender);

    tokio::select! {
        _ = &mut recv_task => {
            // the cleanup below drops the remaining outbound senders, so the
            // pusher drains queued frames and exits on its own
        }
        _ = &mut send_task => recv_task.abort(),
    }

    if registered.load(Ordering::SeqCst) {
        state.disconnect(&username).await;
    }
}

struct LobbySession {
    state: AppState,
    username: String,
    tx: OutboundSender,
    registered: Arc<AtomicBool>,
}

impl LobbySession {
    /// Push an event onto this connection's own outbound channel. Works
    /// before registration, unlike a registry send.
    fn push(&self, event: &LobbyEvent) {
        if let Ok(frame) = serde_json::to_string(event) {
            let _ = self.tx.send(frame);
        }
    }

    fn push_error(&self, message: &str) {
        self.push(&LobbyEvent::Error {
            message: message.to_string(),
        });
    }

    async fn handle_text(&mut self, text: &str) -> ControlFlow<()> {
        let request = match decode_frame::<LobbyRequest>(text) {
            Ok(request) => request,
            Err(message) => {
                self.push_error(message);
                return ControlFlow::Continue(());
            }
        };

        if !self.registered.load(Ordering::SeqCst) {
            return match request {
                LobbyRequest::Hello { username } => self.handle_hello(&username).await,
                _ => {
                    self.push_error("hello-first");
                    ControlFlow::Continue(())
                }
            };
        }

        match request {
            // A repeated hello is acknowledged, not re-registered.
            LobbyRequest::Hello { .. } => {
                self.push(&LobbyEvent::Welcome {
                    username: self.username.clone(),
                });
                ControlFlow::Continue(())
            }
            LobbyRequest::QueueJoin { level } => self.handle_queue_join(level).await,
            LobbyRequest::QueueLeave {} => self.handle_queue_leave().await,
            LobbyRequest::InviteSend { to } => self.handle_invite_send(&to).await,
            LobbyRequest::InviteAccept { invite_id } => {
                self.handle_invite_accept(&invite_id).await
            }
            LobbyRequest::InviteDecline { invite_id } => {
                self.handle_invite_decline(&invite_id).await
            }
        }
    }

    /// The hello must claim the username the bearer token was issued for;
    /// the token decides identity, the hello only confirms it.
    async fn handle_hello(&mut self, claimed: &str) -> ControlFlow<()> {
        if claimed != self.username {
            tracing::warn!(
                "'{}' sent hello for '{}', rejecting",
                self.username,
                claimed
            );
            self.push_error("username-mismatch");
            return ControlFlow::Continue(());
        }
        match self
            .state
            .registry
            .register(&self.username, self.tx.clone(), Channel::Lobby)
            .await
        {
            Ok(()) => {
                self.registered.store(true, Ordering::SeqCst);
                tracing::info!("'{}' entered the lobby", self.username);
                self.push(&LobbyEvent::Welcome {
                    username: self.username.clone(),
                });
                ControlFlow::Continue(())
            }
            Err(RegistryError::AlreadyConnected) => {
                tracing::warn!(
                    "'{}' already has a live session, rejecting this one",
                    self.username
                );
                self.push_error("already-connected");
                ControlFlow::Break(())
            }
        }
    }

    async fn handle_queue_join(&self, level: i32) -> ControlFlow<()> {
        if self.state.auth.user_info(&self.username).await.is_none() {
            self.push_error("unknown-user");
            return ControlFlow::Continue(());
        }
        match self.state.lobby.join_queue(&self.username, level).await {
            Ok(events) => {
                for (target, event) in &events {
                    self.state.send_lobby_event(target, event).await;
                }
            }
            Err(e) => self.push_error(&e.to_string()),
        }
        ControlFlow::Continue(())
    }

    async fn handle_queue_leave(&self) -> ControlFlow<()> {
        match self.state.lobby.leave_queue(&self.username).await {
            Ok(()) => self.push(&LobbyEvent::QueueLeft {}),
            Err(e) => self.push_error(&e.to_string()),
        }
        ControlFlow::Continue(())
    }

    async fn handle_invite_send(&self, to: &str) -> ControlFlow<()> {
        if to.is_empty() {
            self.push_error("to-required");
            return ControlFlow::Continue(());
        }
        if to == self.username {
            self.push_error("self-invite");
            return ControlFlow::Continue(());
        }
        if self.state.auth.user_info(to).await.is_none() {
            self.push_error("unknown-user");
            return ControlFlow::Continue(());
        }
        if !self.state.registry.is_connected(to).await {
            self.push_error("user-offline");
            return ControlFlow::Continue(());
        }
        match self.state.lobby.create_invite(&self.username, to).await {
            Ok(invite) => {
                let delivered = self
                    .state
                    .send_lobby_event(
                        to,
                        &LobbyEvent::InviteReceived {
                            invite_id: invite.id.clone(),
                            from: self.username.clone(),
                        },
                    )
                    .await;
                // The recipient can disconnect between the liveness check
                // and delivery; back the invite out rather than leaving it
                // pending until the sender disconnects.
                if !delivered {
                    self.state.lobby.cancel_invite(&invite.id).await;
                    self.push_error("user-offline");
                    return ControlFlow::Continue(());
                }
                self.push(&LobbyEvent::InviteSent {
                    invite_id: invite.id,
                });
            }
            Err(e) => self.push_error(&e.to_string()),
        }
        ControlFlow::Continue(())
    }

    async fn handle_invite_accept(&self, invite_id: &str) -> ControlFlow<()> {
        match self
            .state
            .lobby
            .accept_invite(invite_id, &self.username)
            .await
        {
            Ok(events) => {
                for (target, event) in &events {
                    self.state.send_lobby_event(target, event).await;
                }
            }
            Err(e) => self.push_error(&e.to_string()),
        }
        ControlFlow::Continue(())
    }

    async fn handle_invite_decline(&self, invite_id: &str) -> ControlFlow<()> {
        match self
            .state
            .lobby
            .decline_invite(invite_id, &self.username)
            .await
        {
            Ok(events) => {
                for (target, event) in &events {
                    self.state.send_lobby_event(target, event).await;
                }
            }
            Err(e) => self.push_error(&e.to_string()),
        }
        ControlFlow::Continue(())
    }
}
