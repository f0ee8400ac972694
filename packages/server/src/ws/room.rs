//! Room channel dispatch: attach, move and chat relay, leave.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::StreamExt;
use tokio::sync::mpsc;

use goban_shared::protocol::{RoomEvent, RoomRequest};

use crate::registry::{Channel, OutboundSender, RegistryError};
use crate::state::AppState;

use super::{decode_frame, pusher_loop};

pub(super) async fn run(socket: WebSocket, state: AppState, username: String, room_id: String) {
    let (sender, mut receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel();

    let registered = Arc::new(AtomicBool::new(false));

    let mut session = RoomSession {
        state: state.clone(),
        username: username.clone(),
        room_id,
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
                    tracing::info!("'{}' closed the room connection", session.username);
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

struct RoomSession {
    state: AppState,
    username: String,
    room_id: String,
    tx: OutboundSender,
    registered: Arc<AtomicBool>,
}

impl RoomSession {
    fn push(&self, event: &RoomEvent) {
        if let Ok(frame) = serde_json::to_string(event) {
            let _ = self.tx.send(frame);
        }
    }

    fn push_error(&self, message: &str) {
        self.push(&RoomEvent::Error {
            message: message.to_string(),
        });
    }

    async fn handle_text(&mut self, text: &str) -> ControlFlow<()> {
        let request = match decode_frame::<RoomRequest>(text) {
            Ok(request) => request,
            Err(message) => {
                self.push_error(message);
                return ControlFlow::Continue(());
            }
        };

        if !self.registered.load(Ordering::SeqCst) {
            return match request {
                RoomRequest::Hello { username } => self.handle_hello(&username).await,
                _ => {
                    self.push_error("hello-first");
                    ControlFlow::Continue(())
                }
            };
        }

        match request {
            // A repeated hello is acknowledged, not re-attached.
            RoomRequest::Hello { .. } => {
                self.push(&RoomEvent::Joined {
                    room_id: self.room_id.clone(),
                });
                ControlFlow::Continue(())
            }
            RoomRequest::MovePlay { x, y } => self.handle_move(x, y).await,
            RoomRequest::ChatSend { message } => self.handle_chat(&message).await,
            RoomRequest::RoomLeave {} => self.handle_leave().await,
        }
    }

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
            .register(
                &self.username,
                self.tx.clone(),
                Channel::Room(self.room_id.clone()),
            )
            .await
        {
            Ok(()) => self.registered.store(true, Ordering::SeqCst),
            Err(RegistryError::AlreadyConnected) => {
                tracing::warn!(
                    "'{}' already has a live session, rejecting this one",
                    self.username
                );
                self.push_error("already-connected");
                return ControlFlow::Break(());
            }
        }

        // Attach to the room. Failure closes the session; the cleanup
        // cascade will drop the registry entry.
        match self.state.rooms.join(&self.room_id, &self.username).await {
            Ok(already_present) => {
                tracing::info!("'{}' joined room {}", self.username, self.room_id);
                self.push(&RoomEvent::Joined {
                    room_id: self.room_id.clone(),
                });
                self.state
                    .send_room_event_many(
                        &already_present,
                        &RoomEvent::UserJoined {
                            username: self.username.clone(),
                        },
                    )
                    .await;
                ControlFlow::Continue(())
            }
            Err(e) => {
                self.push_error(&e.to_string());
                ControlFlow::Break(())
            }
        }
    }

    async fn handle_move(&self, x: i32, y: i32) -> ControlFlow<()> {
        match self.state.rooms.relay_move(&self.room_id, &self.username).await {
            Ok((targets, color)) => {
                self.state
                    .send_room_event_many(
                        &targets,
                        &RoomEvent::MovePlayed {
                            x,
                            y,
                            from: self.username.clone(),
                            color,
                        },
                    )
                    .await;
            }
            Err(e) => self.push_error(&e.to_string()),
        }
        ControlFlow::Continue(())
    }

    async fn handle_chat(&self, message: &str) -> ControlFlow<()> {
        match self.state.rooms.relay_chat(&self.room_id, &self.username).await {
            Ok(targets) => {
                self.state
                    .send_room_event_many(
                        &targets,
                        &RoomEvent::ChatMessage {
                            from: self.username.clone(),
                            message: message.to_string(),
                        },
                    )
                    .await;
            }
            Err(e) => self.push_error(&e.to_string()),
        }
        ControlFlow::Continue(())
    }

    async fn handle_leave(&self) -> ControlFlow<()> {
        let remaining = self.state.rooms.leave(&self.room_id, &self.username).await;
        self.state
            .send_room_event_many(
                &remaining,
                &RoomEvent::UserLeft {
                    username: self.username.clone(),
                },
            )
            .await;
        self.push(&RoomEvent::Left {
            room_id: self.room_id.clone(),
        });
        tracing::info!("'{}' left room {}", self.username, self.room_id);
        ControlFlow::Break(())
    }
}
