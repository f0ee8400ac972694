//! Server execution logic.

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::signal::shutdown_signal;
use crate::state::AppState;
use crate::ws::handler::{api_health, health_handler, lobby_handler, room_handler};

/// Build the application router. Split out of [`run_server`] so the
/// integration tests can serve it on an ephemeral port.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(api_health))
        .route("/ws/health", get(health_handler))
        .route("/ws/lobby", get(lobby_handler))
        .route("/ws/room/{room_id}", get(room_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the match coordinator server.
///
/// # Arguments
///
/// * `host` - The host address to bind to (e.g., "127.0.0.1")
/// * `port` - The port number to bind to (e.g., 8080)
pub async fn run_server(
    state: AppState,
    host: String,
    port: u16,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = router(state);

    let bind_addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    tracing::info!(
        "Match coordinator server listening on {}",
        listener.local_addr()?
    );
    tracing::info!("Lobby endpoint: ws://{}/ws/lobby", bind_addr);
    tracing::info!("Press Ctrl+C to shutdown gracefully");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");

    Ok(())
}
