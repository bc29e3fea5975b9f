//! AgileFlow Protocol - Shared types for the board client and the backend
//!
//! This crate contains every type that crosses the wire:
//! - Vocabulary enums and value objects (rooms, roles, comments, actions)
//! - Real-time channel events (`ClientEvent`, `ServerEvent`)
//! - HTTP request bodies and response envelopes for the room API
//!
//! # Design Principles
//!
//! 1. **Minimal dependencies** - Only serde and serde_json
//! 2. **No business logic** - Pure data types and serialization
//! 3. **Forward compatible** - Unknown server events deserialize to `Unknown`

pub mod messages;
pub mod requests;
pub mod responses;
pub mod types;

// =============================================================================
// Real-time Message Types
// =============================================================================
pub use messages::{ClientEvent, ServerEvent, ServerEventKind};

// =============================================================================
// HTTP Types
// =============================================================================
pub use requests::{
    AddCommentRequest, CreateActionRequest, JoinRoomRequest, SubmitPredictionRequest,
};
pub use responses::{
    AckResponse, CreateRoomResponse, JoinRoomResponse, PredictionRecord, PredictionsResponse,
};

// =============================================================================
// Vocabulary Types
// =============================================================================
pub use types::{
    ActionItem, Comment, CommentCategory, Identity, Participant, ParticipantRole, Prediction,
    RoomKind, UnknownVariant,
};
