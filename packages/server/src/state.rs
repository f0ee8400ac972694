//! Shared application state and the disconnect cascade.

use std::sync::Arc;

use goban_shared::protocol::{LobbyEvent, RoomEvent};

use crate::auth::AuthClient;
use crate::lobby::LobbyCoordinator;
use crate::registry::ConnectionRegistry;
use crate::room::RoomManager;

/// Everything a request handler needs, cheap to clone per connection.
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<dyn AuthClient>,
    pub registry: Arc<ConnectionRegistry>,
    pub lobby: Arc<LobbyCoordinator>,
    pub rooms: Arc<RoomManager>,
}

impl AppState {
    pub fn new(auth: Arc<dyn AuthClient>) -> Self {
        let rooms = Arc::new(RoomManager::new());
        Self {
            auth,
            registry: Arc::new(ConnectionRegistry::new()),
            lobby: Arc::new(LobbyCoordinator::new(rooms.clone())),
            rooms,
        }
    }

    /// Full disconnect cascade for one user, run when their socket closes
    /// for any reason: unregister the connection, drop their queue entry,
    /// expire their pending invites, and pull them out of any room they
    /// occupy, notifying the affected counterparties. Safe to call for a
    /// username that never completed its hello, and idempotent.
    pub async fn disconnect(&self, username: &str) {
        if self.registry.unregister(username).await {
            tracing::info!("'{}' disconnected", username);
        }

        for (counterparty, event) in self.lobby.handle_disconnect(username).await {
            self.send_lobby_event(&counterparty, &event).await;
        }

        for (room_id, remaining) in self.rooms.handle_disconnect(username).await {
            let event = RoomEvent::UserLeft {
                username: username.to_string(),
            };
            self.send_room_event_many(&remaining, &event).await;
            tracing::debug!("'{}' removed from room {} on disconnect", username, room_id);
        }
    }

    pub async fn send_lobby_event(&self, username: &str, event: &LobbyEvent) -> bool {
        match serde_json::to_string(event) {
            Ok(frame) => self.registry.send_to(username, &frame).await,
            Err(e) => {
                tracing::error!("Failed to serialize lobby event: {}", e);
                false
            }
        }
    }

    pub async fn send_room_event(&self, username: &str, event: &RoomEvent) -> bool {
        match serde_json::to_string(event) {
            Ok(frame) => self.registry.send_to(username, &frame).await,
            Err(e) => {
                tracing::error!("Failed to serialize room event: {}", e);
                false
            }
        }
    }

    pub async fn send_room_event_many(&self, usernames: &[String], event: &RoomEvent) {
        match serde_json::to_string(event) {
            Ok(frame) => self.registry.send_many(usernames, &frame).await,
            Err(e) => tracing::error!("Failed to serialize room event: {}", e),
        }
    }
}
