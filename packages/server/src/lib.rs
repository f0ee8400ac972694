//! Realtime coordinator for two-player matches.
//!
//! Clients authenticate with a bearer token, meet in the lobby to find an
//! opponent (matchmaking queue or direct invite), and are then moved into
//! a per-match room where moves and chat are relayed between the two
//! participants.

pub mod auth;
pub mod lobby;
pub mod registry;
pub mod room;
pub mod runner;
pub mod signal;
pub mod state;
pub mod ws;
