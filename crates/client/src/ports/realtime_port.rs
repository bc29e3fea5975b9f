//! Real-time Port - the push channel shared by every member of a room
//!
//! Emission is fire-and-forget: events are queued for the transport and the
//! caller never waits for delivery.

use agileflow_protocol::ClientEvent;

use crate::error::SyncError;

/// Connection state of the real-time channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Not connected to the server
    #[default]
    Disconnected,
    /// Attempting to establish connection
    Connecting,
    /// Successfully connected
    Connected,
    /// Connection lost, attempting to reconnect
    Reconnecting,
    /// Connection failed (max retries exceeded)
    Failed,
}

impl ConnectionState {
    /// Convert to u8 for atomic storage.
    pub fn to_u8(self) -> u8 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Connected => 2,
            ConnectionState::Reconnecting => 3,
            ConnectionState::Failed => 4,
        }
    }

    /// Convert from u8 (atomic storage).
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            3 => ConnectionState::Reconnecting,
            4 => ConnectionState::Failed,
            _ => ConnectionState::Disconnected,
        }
    }
}

pub trait RealtimePort: Send + Sync {
    fn state(&self) -> ConnectionState;

    /// Queue an event for the server. Fails with [`SyncError::NotConnected`]
    /// when there is no live connection to queue it on.
    fn emit(&self, event: ClientEvent) -> Result<(), SyncError>;

    /// Close the channel for good; no reconnection follows.
    fn disconnect(&self);
}
