//! Wire protocol for the lobby and room WebSocket channels.
//!
//! Every frame on the wire is a JSON object `{ "type": string, "payload":
//! object }`. Inbound and outbound messages are modelled as closed,
//! adjacently-tagged enums per channel so that dispatch is a single decode
//! at the socket boundary followed by an exhaustive `match`. The one
//! open-ended endpoint (`/ws/health`) uses the raw [`Envelope`] instead.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Raw `{type, payload}` wrapper for channels that are not a closed set,
/// i.e. the unauthenticated health echo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub r#type: String,
    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    /// Build the `health.echo` reply for an arbitrary received body.
    pub fn health_echo(payload: Value) -> Self {
        Self {
            r#type: "health.echo".to_string(),
            payload,
        }
    }
}

/// Opponent metadata attached to a match notification.
///
/// `level` is informational only: it is whatever the opponent declared when
/// queueing, and is absent for matches formed through invitations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opponent {
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<i32>,
}

/// Messages a client may send on `/ws/lobby`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum LobbyRequest {
    #[serde(rename = "client.hello")]
    Hello { username: String },
    #[serde(rename = "queue.join")]
    QueueJoin { level: i32 },
    #[serde(rename = "queue.leave")]
    QueueLeave {},
    #[serde(rename = "invite.send")]
    InviteSend { to: String },
    #[serde(rename = "invite.accept")]
    InviteAccept { invite_id: String },
    #[serde(rename = "invite.decline")]
    InviteDecline { invite_id: String },
}

/// Messages the server may send on `/ws/lobby`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum LobbyEvent {
    #[serde(rename = "lobby.welcome")]
    Welcome { username: String },
    #[serde(rename = "queue.match_found")]
    MatchFound { room_id: String, opponent: Opponent },
    #[serde(rename = "queue.left")]
    QueueLeft {},
    #[serde(rename = "invite.sent")]
    InviteSent { invite_id: String },
    #[serde(rename = "invite.received")]
    InviteReceived { invite_id: String, from: String },
    #[serde(rename = "invite.declined")]
    InviteDeclined {
        invite_id: String,
        /// Who declined; present on the copy delivered to the original
        /// sender, absent on the acknowledgement to the decliner.
        #[serde(skip_serializing_if = "Option::is_none")]
        to: Option<String>,
    },
    #[serde(rename = "error")]
    Error { message: String },
}

/// Messages a client may send on `/ws/room/{room_id}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum RoomRequest {
    #[serde(rename = "client.hello")]
    Hello { username: String },
    #[serde(rename = "move.play")]
    MovePlay { x: i32, y: i32 },
    #[serde(rename = "chat.send")]
    ChatSend { message: String },
    #[serde(rename = "room.leave")]
    RoomLeave {},
}

/// Messages the server may send on `/ws/room/{room_id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum RoomEvent {
    #[serde(rename = "room.joined")]
    Joined { room_id: String },
    #[serde(rename = "room.user_joined")]
    UserJoined { username: String },
    #[serde(rename = "room.user_left")]
    UserLeft { username: String },
    #[serde(rename = "room.left")]
    Left { room_id: String },
    #[serde(rename = "move.played")]
    MovePlayed {
        x: i32,
        y: i32,
        from: String,
        color: i32,
    },
    #[serde(rename = "chat.message")]
    ChatMessage { from: String, message: String },
    #[serde(rename = "error")]
    Error { message: String },
}
