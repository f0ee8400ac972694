//! Realtime match coordinator server.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin goban-server
//! cargo run --bin goban-server -- --host 0.0.0.0 --port 3000
//! ```

use std::sync::Arc;

use clap::Parser;

use goban_server::{auth::HttpAuthClient, runner::run_server, state::AppState};
use goban_shared::logger::setup_logger;

#[derive(Parser, Debug)]
#[command(name = "goban-server")]
#[command(about = "Realtime coordinator for two-player matches", long_about = None)]
struct Args {
    /// Host address to bind the server to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, default_value = "8080")]
    port: u16,

    /// Base URL of the account service used to verify bearer tokens
    #[arg(long, default_value = "http://127.0.0.1:8000")]
    auth_url: String,
}

#[tokio::main]
async fn main() {
    setup_logger(env!("CARGO_BIN_NAME"), "debug");

    let args = Args::parse();

    let auth = Arc::new(HttpAuthClient::new(args.auth_url));
    let state = AppState::new(auth);

    if let Err(e) = run_server(state, args.host, args.port).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
