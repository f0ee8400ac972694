//! Lobby coordinator: owns the matchmaking queue and the invite directory.
//!
//! All lobby state sits behind one mutex, so a queue join and its match
//! scan (or an invite accept and its queue removals) execute atomically
//! with respect to every other connection. Operations mutate state and
//! hand back `(target, event)` pairs; the dispatch layer pushes those to
//! the registry after the lock is released, so the lock is never held
//! across a send.

pub mod invites;
pub mod queue;

use std::sync::Arc;

use tokio::sync::Mutex;

use goban_shared::protocol::{LobbyEvent, Opponent};
use goban_shared::time::{Clock, SystemClock};

use crate::room::RoomManager;
use invites::{Invite, InviteDirectory, InviteError};
use queue::{MatchQueue, QueueError};

/// An event addressed to one connected user.
pub type Outbound = (String, LobbyEvent);

struct LobbyState {
    queue: MatchQueue,
    invites: InviteDirectory,
}

pub struct LobbyCoordinator {
    state: Mutex<LobbyState>,
    rooms: Arc<RoomManager>,
    clock: Arc<dyn Clock>,
}

impl LobbyCoordinator {
    pub fn new(rooms: Arc<RoomManager>) -> Self {
        Self::with_clock(rooms, Arc::new(SystemClock))
    }

    pub fn with_clock(rooms: Arc<RoomManager>, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(LobbyState {
                queue: MatchQueue::new(),
                invites: InviteDirectory::new(),
            }),
            rooms,
            clock,
        }
    }

    /// Enqueue `username` and scan for an opponent. On a match, both queue
    /// entries are removed and the room is created before any event is
    /// emitted; each party's notification carries the *other* side's
    /// identity and declared level.
    pub async fn join_queue(
        &self,
        username: &str,
        level: i32,
    ) -> Result<Vec<Outbound>, QueueError> {
        let mut state = self.state.lock().await;
        state.queue.join(username, level, self.clock.now_millis())?;

        let Some((joiner, opponent)) = state.queue.try_match(username) else {
            tracing::debug!("'{}' queued at level {}, no opponent yet", username, level);
            return Ok(Vec::new());
        };

        // Earliest-enqueued participant plays black.
        let room_id = self
            .rooms
            .create(&opponent.username, &joiner.username)
            .await;
        tracing::info!(
            "Matched '{}' with '{}' in room {}",
            joiner.username,
            opponent.username,
            room_id
        );

        Ok(vec![
            (
                joiner.username.clone(),
                LobbyEvent::MatchFound {
                    room_id: room_id.clone(),
                    opponent: Opponent {
                        username: opponent.username.clone(),
                        level: Some(opponent.level),
                    },
                },
            ),
            (
                opponent.username,
                LobbyEvent::MatchFound {
                    room_id,
                    opponent: Opponent {
                        username: joiner.username,
                        level: Some(joiner.level),
                    },
                },
            ),
        ])
    }

    pub async fn leave_queue(&self, username: &str) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        state.queue.leave(username)
    }

    /// Create a pending invite. Recipient existence and liveness are
    /// validated by the dispatch layer; the self-invite check is pure and
    /// lives here.
    pub async fn create_invite(&self, from: &str, to: &str) -> Result<Invite, InviteError> {
        if from == to {
            return Err(InviteError::SelfInvite);
        }
        let mut state = self.state.lock().await;
        let invite = state.invites.create(from, to, self.clock.now_millis());
        tracing::info!("Invite {} created: '{}' -> '{}'", invite.id, from, to);
        Ok(invite)
    }

    /// Expire a single invite whose recipient could not be notified. The
    /// recipient liveness check at send time and the invite creation run
    /// under different locks, so the recipient can vanish in between; the
    /// dispatch layer detects the failed delivery and backs the record out
    /// here.
    pub async fn cancel_invite(&self, invite_id: &str) -> Option<Invite> {
        let mut state = self.state.lock().await;
        let invite = state.invites.expire(invite_id);
        if let Some(invite) = &invite {
            tracing::debug!("Invite {} cancelled, recipient unreachable", invite.id);
        }
        invite
    }

    /// Accept an invite: only the recipient may accept. Both parties are
    /// pulled out of the matchmaking queue (an accepted invite takes
    /// precedence over an active search) and the room is created before
    /// the match events are emitted. The inviter plays black.
    pub async fn accept_invite(
        &self,
        invite_id: &str,
        by: &str,
    ) -> Result<Vec<Outbound>, InviteError> {
        let mut state = self.state.lock().await;
        let invite = state.invites.accept(invite_id, by)?;

        state.queue.remove(&invite.from);
        state.queue.remove(&invite.to);

        let room_id = self.rooms.create(&invite.from, &invite.to).await;
        tracing::info!(
            "Invite {} accepted, room {} created for '{}' vs '{}'",
            invite.id,
            room_id,
            invite.from,
            invite.to
        );

        Ok(vec![
            (
                invite.to.clone(),
                LobbyEvent::MatchFound {
                    room_id: room_id.clone(),
                    opponent: Opponent {
                        username: invite.from.clone(),
                        level: None,
                    },
                },
            ),
            (
                invite.from,
                LobbyEvent::MatchFound {
                    room_id,
                    opponent: Opponent {
                        username: invite.to,
                        level: None,
                    },
                },
            ),
        ])
    }

    /// Decline an invite: only the recipient may decline. The original
    /// sender learns who declined; the decliner gets a bare acknowledgement.
    pub async fn decline_invite(
        &self,
        invite_id: &str,
        by: &str,
    ) -> Result<Vec<Outbound>, InviteError> {
        let mut state = self.state.lock().await;
        let invite = state.invites.decline(invite_id, by)?;
        tracing::info!("Invite {} declined by '{}'", invite.id, by);

        Ok(vec![
            (
                invite.from,
                LobbyEvent::InviteDeclined {
                    invite_id: invite.id.clone(),
                    to: Some(by.to_string()),
                },
            ),
            (
                by.to_string(),
                LobbyEvent::InviteDeclined {
                    invite_id: invite.id,
                    to: None,
                },
            ),
        ])
    }

    /// Disconnect cascade for the lobby: drop the queue entry and expire
    /// every pending invite the user is a party to, notifying each
    /// counterparty that the proposal is gone.
    pub async fn handle_disconnect(&self, username: &str) -> Vec<Outbound> {
        let mut state = self.state.lock().await;
        if state.queue.remove(username) {
            tracing::debug!("Removed '{}' from the matchmaking queue", username);
        }

        state
            .invites
            .expire_for(username)
            .into_iter()
            .map(|invite| {
                let counterparty = if invite.from == username {
                    invite.to.clone()
                } else {
                    invite.from.clone()
                };
                (
                    counterparty,
                    LobbyEvent::Error {
                        message: format!("invite-cancelled:{}", invite.id),
                    },
                )
            })
            .collect()
    }

    pub async fn is_queued(&self, username: &str) -> bool {
        let state = self.state.lock().await;
        state.queue.contains(username)
    }

    pub async fn queue_len(&self) -> usize {
        let state = self.state.lock().await;
        state.queue.len()
    }

    pub async fn pending_invites(&self) -> usize {
        let state = self.state.lock().await;
        state.invites.pending_count()
    }
}
