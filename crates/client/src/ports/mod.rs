//! Outbound ports - Interfaces for external services
//!
//! These ports define the contracts that infrastructure adapters must implement,
//! allowing the session sync core to talk to the backend without depending on
//! concrete transports.

pub mod realtime_port;
pub mod room_api_port;

pub use realtime_port::{ConnectionState, RealtimePort};
pub use room_api_port::{CreatedRoom, RoomApiPort};

#[cfg(test)]
pub use room_api_port::MockRoomApiPort;
