//! Invite directory: pending peer-to-peer match proposals.
//!
//! An invite is pending from creation until the recipient accepts or
//! declines it, or until either party disconnects (expiry). Terminal
//! invites are immutable; the directory drops them as soon as the terminal
//! transition record has been handed back to the caller.

use std::collections::HashMap;

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InviteStatus {
    Pending,
    Accepted,
    Declined,
    Expired,
}

/// A direct, bypass-the-queue match proposal between two users.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invite {
    pub id: String,
    pub from: String,
    pub to: String,
    pub status: InviteStatus,
    pub created_at: i64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InviteError {
    #[error("invalid-invite")]
    NotFound,
    /// Only the designated recipient may resolve an invite.
    #[error("not-invite-recipient")]
    NotRecipient,
    #[error("self-invite")]
    SelfInvite,
    #[error("user-offline")]
    RecipientOffline,
    #[error("unknown-user")]
    UnknownRecipient,
}

/// Pending invites keyed by id. Owned by the lobby coordinator and mutated
/// under the lobby lock.
#[derive(Default)]
pub struct InviteDirectory {
    invites: HashMap<String, Invite>,
}

impl InviteDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a pending invite from `from` to `to`. Recipient validation
    /// (existence, liveness, self-invite) happens in the caller, which has
    /// access to the registry and the account directory.
    pub fn create(&mut self, from: &str, to: &str, now: i64) -> Invite {
        let invite = Invite {
            id: Uuid::new_v4().simple().to_string(),
            from: from.to_string(),
            to: to.to_string(),
            status: InviteStatus::Pending,
            created_at: now,
        };
        self.invites.insert(invite.id.clone(), invite.clone());
        invite
    }

    /// Accept a pending invite. Only the designated recipient may accept;
    /// anyone else leaves the invite pending.
    pub fn accept(&mut self, invite_id: &str, by: &str) -> Result<Invite, InviteError> {
        self.resolve(invite_id, by, InviteStatus::Accepted)
    }

    /// Decline a pending invite. Only the designated recipient may decline.
    pub fn decline(&mut self, invite_id: &str, by: &str) -> Result<Invite, InviteError> {
        self.resolve(invite_id, by, InviteStatus::Declined)
    }

    fn resolve(
        &mut self,
        invite_id: &str,
        by: &str,
        terminal: InviteStatus,
    ) -> Result<Invite, InviteError> {
        let invite = self.invites.get(invite_id).ok_or(InviteError::NotFound)?;
        if invite.to != by {
            return Err(InviteError::NotRecipient);
        }
        let mut invite = self
            .invites
            .remove(invite_id)
            .expect("invite present after lookup");
        invite.status = terminal;
        Ok(invite)
    }

    /// Expire a single pending invite by id. Used when the recipient's
    /// notification turns out to be undeliverable.
    pub fn expire(&mut self, invite_id: &str) -> Option<Invite> {
        self.invites.remove(invite_id).map(|mut invite| {
            invite.status = InviteStatus::Expired;
            invite
        })
    }

    /// Expire every pending invite `username` is a party to (either side).
    /// Returns the expired records so the caller can notify counterparties.
    pub fn expire_for(&mut self, username: &str) -> Vec<Invite> {
        let ids: Vec<String> = self
            .invites
            .values()
            .filter(|i| i.from == username || i.to == username)
            .map(|i| i.id.clone())
            .collect();

        ids.iter()
            .filter_map(|id| self.invites.remove(id))
            .map(|mut invite| {
                invite.status = InviteStatus::Expired;
                invite
            })
            .collect()
    }

    pub fn get(&self, invite_id: &str) -> Option<&Invite> {
        self.invites.get(invite_id)
    }

    pub fn pending_count(&self) -> usize {
        self.invites.len()
    }
}
