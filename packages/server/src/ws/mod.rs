//! WebSocket endpoints and the per-channel dispatch loops.
//!
//! Each connection gets a pusher task that drains the connection's
//! outbound channel into the socket, and a recv task that decodes inbound
//! frames and dispatches them. If either side ends, the session is torn
//! down and the disconnect cascade runs.

pub mod handler;
mod lobby;
mod room;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, stream::SplitSink};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::mpsc;

/// Spawns a task that forwards frames from the connection's outbound
/// channel to the WebSocket sink. Ends when the channel closes (all
/// senders dropped) or the socket write fails.
fn pusher_loop(
    mut rx: mpsc::UnboundedReceiver<String>,
    mut sender: SplitSink<WebSocket, Message>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    })
}

/// Two-phase frame decode. Ill-formed JSON and well-formed JSON that is
/// not a recognized message produce distinct error strings on the wire.
fn decode_frame<T: DeserializeOwned>(text: &str) -> Result<T, &'static str> {
    let value: Value = serde_json::from_str(text).map_err(|_| "invalid-json")?;
    serde_json::from_value(value).map_err(|_| "unknown-message")
}
