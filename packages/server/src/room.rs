//! Room manager: creation, membership, and relay target selection for
//! per-match rooms.
//!
//! A room is created by the lobby when a match resolves, with both
//! designated participants already known. Participants then attach through
//! the room WebSocket endpoint; moves and chat are relayed to the other
//! member only. The room is destroyed once the last participant leaves.

use std::collections::HashMap;

use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Stone colors, assigned deterministically at creation.
pub const BLACK: i32 = 1;
pub const WHITE: i32 = 2;

/// Designated participants per room; the move/chat protocol is two-player.
const ROOM_CAPACITY: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomState {
    /// Accepting the designated participants.
    Open,
    /// Both participants present.
    Active,
    /// One participant has left an active room.
    Closing,
    /// Empty; the room is removed from the table and never reused.
    Closed,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoomError {
    #[error("room-not-found")]
    RoomNotFound,
    #[error("room-full")]
    RoomFull,
    #[error("not-in-room")]
    NotInRoom,
}

struct Room {
    participants: Vec<String>,
    colors: HashMap<String, i32>,
    present: Vec<String>,
    state: RoomState,
    created_at: i64,
}

/// Owns the room table. All mutation goes through these operations.
#[derive(Default)]
pub struct RoomManager {
    rooms: Mutex<HashMap<String, Room>>,
}

impl RoomManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a room for the two matched participants and return its id.
    /// The first participant plays black, the second white.
    pub async fn create(&self, first: &str, second: &str) -> String {
        let room_id = Uuid::new_v4().simple().to_string();
        let room = Room {
            participants: vec![first.to_string(), second.to_string()],
            colors: HashMap::from([
                (first.to_string(), BLACK),
                (second.to_string(), WHITE),
            ]),
            present: Vec::new(),
            state: RoomState::Open,
            created_at: goban_shared::time::now_millis(),
        };
        let mut rooms = self.rooms.lock().await;
        rooms.insert(room_id.clone(), room);
        tracing::info!("Room {} created for '{}' vs '{}'", room_id, first, second);
        room_id
    }

    /// Attach `username` to the room. Returns the members already present,
    /// so the caller can broadcast the join to them.
    pub async fn join(&self, room_id: &str, username: &str) -> Result<Vec<String>, RoomError> {
        let mut rooms = self.rooms.lock().await;
        let room = rooms.get_mut(room_id).ok_or(RoomError::RoomNotFound)?;

        // Membership is fixed at creation; anyone else is turned away.
        if !room.participants.iter().any(|p| p == username) {
            return Err(RoomError::RoomFull);
        }

        let already_present: Vec<String> = room
            .present
            .iter()
            .filter(|p| p.as_str() != username)
            .cloned()
            .collect();
        if !room.present.iter().any(|p| p == username) {
            room.present.push(username.to_string());
        }
        if room.present.len() == ROOM_CAPACITY {
            room.state = RoomState::Active;
        }
        Ok(already_present)
    }

    /// Detach `username` from the room. Idempotent; returns the remaining
    /// present members. Removes the room once nobody is left.
    pub async fn leave(&self, room_id: &str, username: &str) -> Vec<String> {
        let mut rooms = self.rooms.lock().await;
        let Some(room) = rooms.get_mut(room_id) else {
            return Vec::new();
        };
        let was_present = room.present.iter().any(|p| p == username);
        room.present.retain(|p| p != username);

        let remaining = room.present.clone();
        if room.present.is_empty() {
            room.state = RoomState::Closed;
            rooms.remove(room_id);
            tracing::info!("Room {} closed", room_id);
        } else if was_present {
            room.state = RoomState::Closing;
        }
        remaining
    }

    /// Relay targets and stone color for a move played by `from`.
    pub async fn relay_move(
        &self,
        room_id: &str,
        from: &str,
    ) -> Result<(Vec<String>, i32), RoomError> {
        let rooms = self.rooms.lock().await;
        let room = rooms.get(room_id).ok_or(RoomError::RoomNotFound)?;
        let targets = Self::targets_excluding(room, from)?;
        let color = room.colors.get(from).copied().unwrap_or(BLACK);
        Ok((targets, color))
    }

    /// Relay targets for a chat message sent by `from`.
    pub async fn relay_chat(&self, room_id: &str, from: &str) -> Result<Vec<String>, RoomError> {
        let rooms = self.rooms.lock().await;
        let room = rooms.get(room_id).ok_or(RoomError::RoomNotFound)?;
        Self::targets_excluding(room, from)
    }

    fn targets_excluding(room: &Room, from: &str) -> Result<Vec<String>, RoomError> {
        if !room.present.iter().any(|p| p == from) {
            return Err(RoomError::NotInRoom);
        }
        Ok(room
            .present
            .iter()
            .filter(|p| p.as_str() != from)
            .cloned()
            .collect())
    }

    /// Detach `username` from every room they are present in (disconnect
    /// cascade). Returns `(room_id, remaining_members)` per affected room.
    pub async fn handle_disconnect(&self, username: &str) -> Vec<(String, Vec<String>)> {
        let mut rooms = self.rooms.lock().await;
        let affected: Vec<String> = rooms
            .iter()
            .filter(|(_, room)| room.present.iter().any(|p| p == username))
            .map(|(id, _)| id.clone())
            .collect();

        let mut results = Vec::with_capacity(affected.len());
        for room_id in affected {
            let room = rooms.get_mut(&room_id).expect("room present");
            room.present.retain(|p| p != username);
            let remaining = room.present.clone();
            if room.present.is_empty() {
                rooms.remove(&room_id);
                tracing::info!("Room {} closed after disconnect of '{}'", room_id, username);
            } else {
                room.state = RoomState::Closing;
            }
            results.push((room_id, remaining));
        }
        results
    }

    pub async fn state_of(&self, room_id: &str) -> Option<RoomState> {
        let rooms = self.rooms.lock().await;
        rooms.get(room_id).map(|r| r.state)
    }

    pub async fn color_of(&self, room_id: &str, username: &str) -> Option<i32> {
        let rooms = self.rooms.lock().await;
        rooms.get(room_id).and_then(|r| r.colors.get(username).copied())
    }

    pub async fn participants_of(&self, room_id: &str) -> Option<Vec<String>> {
        let rooms = self.rooms.lock().await;
        rooms.get(room_id).map(|r| r.participants.clone())
    }

    pub async fn created_at(&self, room_id: &str) -> Option<i64> {
        let rooms = self.rooms.lock().await;
        rooms.get(room_id).map(|r| r.created_at)
    }

    pub async fn count(&self) -> usize {
        let rooms = self.rooms.lock().await;
        rooms.len()
    }
}
