//! AgileFlow session sync client
//!
//! Keeps a local, read-only projection of a Retro or Refinement room in sync
//! with the backend over its HTTP room API and real-time channel.
//!
//! ```no_run
//! # async fn demo() -> anyhow::Result<()> {
//! use std::sync::Arc;
//! use agileflow_client::{
//!     HttpRoomApi, Identity, RealtimeClient, RoomKind, SessionSync, StaticToken, SyncConfig,
//! };
//!
//! let config = SyncConfig::from_env()?;
//! let api = HttpRoomApi::new(&config, Arc::new(StaticToken::new(None)));
//! let (realtime, events) = RealtimeClient::new(config.ws_url.clone(), config.reconnect);
//!
//! let sync = SessionSync::new(
//!     Identity::new("Ada", "ada@example.com"),
//!     Arc::new(api),
//!     Arc::new(realtime.clone()),
//! );
//! sync.spawn_event_pump(events);
//! realtime.connect();
//!
//! sync.create_room(RoomKind::Retro).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod identity;
pub mod infrastructure;
pub mod ports;
pub mod session;

pub use agileflow_protocol::{
    ActionItem, Comment, CommentCategory, Participant, ParticipantRole, Prediction, RoomKind,
    ServerEventKind,
};
pub use config::{ReconnectPolicy, SyncConfig};
pub use error::{ApiError, SyncError};
pub use identity::{Identity, StaticToken, TokenProvider};
pub use infrastructure::http_client::HttpRoomApi;
pub use infrastructure::websocket::{RealtimeClient, TransportEvent};
pub use ports::{ConnectionState, RealtimePort, RoomApiPort};
pub use session::{EventKind, SessionSnapshot, SessionSync, Subscription, SyncEvent};
