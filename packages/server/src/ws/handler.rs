//! WebSocket upgrade handlers and the HTTP health endpoint.
//!
//! The lobby and room endpoints authenticate the bearer token before the
//! upgrade completes. A missing or invalid token still accepts the upgrade
//! (browser clients cannot read HTTP-level rejections) and then closes
//! immediately with a policy violation frame.

use axum::{
    Json,
    extract::{
        Path, State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    },
    http::HeaderMap,
    response::IntoResponse,
};
use serde_json::Value;

use goban_shared::protocol::Envelope;

use crate::auth::bearer_token;
use crate::state::AppState;

/// WebSocket close code for policy violations (RFC 6455 section 7.4.1).
const CLOSE_UNAUTHORIZED: u16 = 1008;

pub async fn lobby_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let username = authenticate(&state, &headers).await;
    ws.on_upgrade(move |socket| async move {
        match username {
            Some(username) => super::lobby::run(socket, state, username).await,
            None => reject_unauthorized(socket).await,
        }
    })
}

pub async fn room_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let username = authenticate(&state, &headers).await;
    ws.on_upgrade(move |socket| async move {
        match username {
            Some(username) => super::room::run(socket, state, username, room_id).await,
            None => reject_unauthorized(socket).await,
        }
    })
}

/// Unauthenticated echo endpoint for connectivity checks.
pub async fn health_handler(ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(handle_health_socket)
}

/// HTTP liveness probe.
pub async fn api_health() -> Json<Value> {
    Json(serde_json::json!({"status": "ok"}))
}

async fn authenticate(state: &AppState, headers: &HeaderMap) -> Option<String> {
    let Some(token) = bearer_token(headers) else {
        tracing::warn!("Rejected connection without a bearer token");
        return None;
    };
    let username = state.auth.authenticate(token).await;
    if username.is_none() {
        tracing::warn!("Rejected connection with an invalid bearer token");
    }
    username
}

async fn reject_unauthorized(mut socket: WebSocket) {
    let frame = CloseFrame {
        code: CLOSE_UNAUTHORIZED,
        reason: "unauthorized".into(),
    };
    if let Err(e) = socket.send(Message::Close(Some(frame))).await {
        tracing::debug!("Failed to deliver unauthorized close frame: {}", e);
    }
}

async fn handle_health_socket(mut socket: WebSocket) {
    while let Some(Ok(msg)) = socket.recv().await {
        match msg {
            Message::Text(text) => {
                let reply = match serde_json::from_str::<Value>(&text) {
                    Ok(body) => Envelope::health_echo(body),
                    Err(_) => Envelope {
                        r#type: "error".to_string(),
                        payload: serde_json::json!({"message": "invalid-json"}),
                    },
                };
                let Ok(frame) = serde_json::to_string(&reply) else {
                    continue;
                };
                if socket.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
}
