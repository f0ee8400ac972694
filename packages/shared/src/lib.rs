//! Shared library for the goban realtime service.
//!
//! Holds the WebSocket wire protocol plus the time and logging utilities
//! used by the server and by integration test clients.

pub mod logger;
pub mod protocol;
pub mod time;
