//! Matchmaking queue: an ordered waiting list of users seeking an opponent.
//!
//! Pairing is FIFO: a new joiner is matched with the earliest-enqueued
//! other waiter. The declared level travels along as opponent metadata and
//! does not constrain pairing; a level-banding policy would slot into
//! [`MatchQueue::try_match`] if one is ever wanted.

use thiserror::Error;

/// A user's standing request for an opponent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub username: String,
    pub level: i32,
    pub enqueued_at: i64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("already-queued")]
    AlreadyQueued,
    #[error("not-queued")]
    NotQueued,
}

/// Ordered matchmaking queue. At most one entry per username.
///
/// Not synchronized on its own; the lobby coordinator mutates it under the
/// lobby lock, so a join and its match scan are atomic with respect to
/// other connections.
#[derive(Default)]
pub struct MatchQueue {
    entries: Vec<QueueEntry>,
}

impl MatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `username` to the back of the queue.
    pub fn join(&mut self, username: &str, level: i32, now: i64) -> Result<(), QueueError> {
        if self.contains(username) {
            return Err(QueueError::AlreadyQueued);
        }
        self.entries.push(QueueEntry {
            username: username.to_string(),
            level,
            enqueued_at: now,
        });
        Ok(())
    }

    /// Explicit leave; rejected when the user is not queued.
    pub fn leave(&mut self, username: &str) -> Result<(), QueueError> {
        if !self.contains(username) {
            return Err(QueueError::NotQueued);
        }
        self.entries.retain(|e| e.username != username);
        Ok(())
    }

    /// Silent removal for the disconnect cascade. Returns whether an entry
    /// was removed.
    pub fn remove(&mut self, username: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.username != username);
        self.entries.len() != before
    }

    /// Pair `username` with the earliest-enqueued other waiter, removing
    /// both entries. Returns `(joiner, opponent)` on success, `None` when
    /// no opponent is waiting or `username` is not queued.
    pub fn try_match(&mut self, username: &str) -> Option<(QueueEntry, QueueEntry)> {
        self.entries.iter().position(|e| e.username == username)?;
        let opponent_pos = self.entries.iter().position(|e| e.username != username)?;

        let opponent = self.entries.remove(opponent_pos);
        let joiner_pos = self
            .entries
            .iter()
            .position(|e| e.username == username)
            .expect("joiner entry present");
        let joiner = self.entries.remove(joiner_pos);
        Some((joiner, opponent))
    }

    pub fn contains(&self, username: &str) -> bool {
        self.entries.iter().any(|e| e.username == username)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
