//! Test-only infrastructure fakes.
//!
//! These implement outbound ports so session logic can be exercised without a
//! real WebSocket. Room API doubles come from `mockall` (`MockRoomApiPort`).

pub mod recording_realtime;

pub use recording_realtime::RecordingRealtime;
