//! Connection registry: every live WebSocket session, keyed by username.
//!
//! The registry owns the outbound half of each connection. Socket writes
//! themselves happen in the per-connection pusher task; everything here
//! only pushes onto an unbounded channel, so no registry operation ever
//! blocks on a slow client.

use std::collections::HashMap;

use thiserror::Error;
use tokio::sync::{Mutex, mpsc};

/// Sender half of a connection's outbound channel. Cloning this lets any
/// part of the system push serialized frames to a specific client.
pub type OutboundSender = mpsc::UnboundedSender<String>;

/// Logical channel a connection is currently bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Channel {
    Lobby,
    Room(String),
}

/// A registered connection.
pub struct Connection {
    pub sender: OutboundSender,
    pub channel: Channel,
    pub connected_at: i64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A live connection already exists for this username. The new
    /// connection is rejected; the existing session is untouched.
    #[error("already-connected")]
    AlreadyConnected,
}

/// Tracks all live connections. One live connection per username.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<String, Connection>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection for `username` on the given channel.
    pub async fn register(
        &self,
        username: &str,
        sender: OutboundSender,
        channel: Channel,
    ) -> Result<(), RegistryError> {
        let mut connections = self.connections.lock().await;
        if connections.contains_key(username) {
            return Err(RegistryError::AlreadyConnected);
        }
        connections.insert(
            username.to_string(),
            Connection {
                sender,
                channel,
                connected_at: goban_shared::time::now_millis(),
            },
        );
        tracing::debug!("Connection for '{}' registered", username);
        Ok(())
    }

    /// Remove the connection for `username`. Idempotent: unregistering an
    /// unknown username is a no-op. Returns whether a connection was removed.
    pub async fn unregister(&self, username: &str) -> bool {
        let mut connections = self.connections.lock().await;
        let removed = connections.remove(username).is_some();
        if removed {
            tracing::debug!("Connection for '{}' unregistered", username);
        }
        removed
    }

    /// Rebind the connection to a different logical channel.
    pub async fn set_channel(&self, username: &str, channel: Channel) -> bool {
        let mut connections = self.connections.lock().await;
        match connections.get_mut(username) {
            Some(connection) => {
                connection.channel = channel;
                true
            }
            None => false,
        }
    }

    pub async fn is_connected(&self, username: &str) -> bool {
        let connections = self.connections.lock().await;
        connections.contains_key(username)
    }

    /// Channel the given user's connection is bound to, if connected.
    pub async fn channel_of(&self, username: &str) -> Option<Channel> {
        let connections = self.connections.lock().await;
        connections.get(username).map(|c| c.channel.clone())
    }

    /// Push a serialized frame to one user. Returns `false` if the user is
    /// offline or their outbound channel is closed; a failed send is treated
    /// by callers as an implicit disconnect, never as a reason to block.
    pub async fn send_to(&self, username: &str, message: &str) -> bool {
        let connections = self.connections.lock().await;
        match connections.get(username) {
            Some(connection) => match connection.sender.send(message.to_string()) {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!("Failed to push message to '{}': {}", username, e);
                    false
                }
            },
            None => false,
        }
    }

    /// Push the same serialized frame to several users, tolerating
    /// per-target failures.
    pub async fn send_many(&self, usernames: &[String], message: &str) {
        let connections = self.connections.lock().await;
        for username in usernames {
            match connections.get(username) {
                Some(connection) => {
                    if let Err(e) = connection.sender.send(message.to_string()) {
                        tracing::warn!("Failed to push message to '{}': {}", username, e);
                    }
                }
                None => {
                    tracing::debug!("'{}' not connected during broadcast, skipping", username);
                }
            }
        }
    }

    pub async fn count(&self) -> usize {
        let connections = self.connections.lock().await;
        connections.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_sender() -> (OutboundSender, mpsc::UnboundedReceiver<String>) {
        mpsc::unbounded_channel()
    }

    #[tokio::test]
    async fn test_register_and_lookup() {
        // given:
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = test_sender();

        // when:
        let result = registry.register("alice", tx, Channel::Lobby).await;

        // then:
        assert!(result.is_ok());
        assert!(registry.is_connected("alice").await);
        assert_eq!(registry.channel_of("alice").await, Some(Channel::Lobby));
        assert_eq!(registry.count().await, 1);
    }

    #[tokio::test]
    async fn test_second_registration_for_same_username_is_rejected() {
        // given:
        let registry = ConnectionRegistry::new();
        let (tx1, _rx1) = test_sender();
        registry.register("alice", tx1, Channel::Lobby).await.unwrap();

        // when:
        let (tx2, _rx2) = test_sender();
        let result = registry.register("alice", tx2, Channel::Lobby).await;

        // then:
        assert_eq!(result, Err(RegistryError::AlreadyConnected));
        assert_eq!(registry.count().await, 1);
    }

    #[tokio::test]
    async fn test_unregister_is_idempotent() {
        // given:
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = test_sender();
        registry.register("alice", tx, Channel::Lobby).await.unwrap();

        // when:
        let first = registry.unregister("alice").await;
        let second = registry.unregister("alice").await;

        // then:
        assert!(first);
        assert!(!second);
        assert!(!registry.is_connected("alice").await);
    }

    #[tokio::test]
    async fn test_set_channel_rebinds_connection() {
        // given:
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = test_sender();
        registry.register("alice", tx, Channel::Lobby).await.unwrap();

        // when:
        let rebound = registry
            .set_channel("alice", Channel::Room("r1".to_string()))
            .await;

        // then:
        assert!(rebound);
        assert_eq!(
            registry.channel_of("alice").await,
            Some(Channel::Room("r1".to_string()))
        );
    }

    #[tokio::test]
    async fn test_send_to_delivers_to_target_only() {
        // given:
        let registry = ConnectionRegistry::new();
        let (tx_a, mut rx_a) = test_sender();
        let (tx_b, mut rx_b) = test_sender();
        registry.register("alice", tx_a, Channel::Lobby).await.unwrap();
        registry.register("bob", tx_b, Channel::Lobby).await.unwrap();

        // when:
        let delivered = registry.send_to("alice", "hello").await;

        // then:
        assert!(delivered);
        assert_eq!(rx_a.recv().await, Some("hello".to_string()));
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_to_offline_user_returns_false() {
        // given:
        let registry = ConnectionRegistry::new();

        // when:
        let delivered = registry.send_to("ghost", "hello").await;

        // then:
        assert!(!delivered);
    }

    #[tokio::test]
    async fn test_send_many_tolerates_missing_targets() {
        // given:
        let registry = ConnectionRegistry::new();
        let (tx, mut rx) = test_sender();
        registry.register("alice", tx, Channel::Lobby).await.unwrap();

        // when:
        registry
            .send_many(&["alice".to_string(), "ghost".to_string()], "broadcast")
            .await;

        // then:
        assert_eq!(rx.recv().await, Some("broadcast".to_string()));
    }
}
