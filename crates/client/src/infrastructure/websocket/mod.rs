//! WebSocket client for the real-time room channel
//!
//! - `core`: runtime-agnostic reconnection backoff math
//! - `shared`: inbound frame parsing
//! - `client`: tokio-tungstenite transport implementing `RealtimePort`

mod client;
mod core;
mod shared;

pub use client::{RealtimeClient, TransportEvent};
pub use self::core::BackoffState;
pub use shared::{parse_server_frame, ParsedServerFrame};
