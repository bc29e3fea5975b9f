//! Real-time message types for board client/backend communication
//!
//! Frames are JSON text messages shaped like Socket.io events:
//!
//! ```json
//! {"event": "join_room", "data": {"invite_code": "K3X9QZ", "name": "Ada", "email": "ada@example.com"}}
//! ```
//!
//! ## Versioning Policy
//!
//! - New events can be added at any time (forward compatible)
//! - Renaming an event is a breaking change
//! - Unknown server events are reported as `None` by [`ServerEvent::from_parts`]
//!   so older clients keep running against newer servers

use serde::{Deserialize, Serialize};

use crate::types::{ActionItem, Comment, Participant, ParticipantRole, Prediction};

// =============================================================================
// Client Events (Board client → Backend)
// =============================================================================

/// Events emitted by the client on the real-time channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Add this connection to a room's broadcast group. Idempotent server-side.
    JoinRoom {
        invite_code: String,
        name: String,
        email: String,
    },
    LeaveRoom { room_id: String, email: String },
    SubmitPrediction {
        room_id: String,
        role: ParticipantRole,
        prediction: f64,
    },
    NewComment { room_id: String, comment: Comment },
    CreateAction {
        room_id: String,
        description: String,
        assignee_name: String,
    },
    ResetSession { room_id: String },
    RevealResults { room_id: String },
}

impl ClientEvent {
    /// Wire name of the event
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::JoinRoom { .. } => "join_room",
            ClientEvent::LeaveRoom { .. } => "leave_room",
            ClientEvent::SubmitPrediction { .. } => "submit_prediction",
            ClientEvent::NewComment { .. } => "new_comment",
            ClientEvent::CreateAction { .. } => "create_action",
            ClientEvent::ResetSession { .. } => "reset_session",
            ClientEvent::RevealResults { .. } => "reveal_results",
        }
    }
}

// =============================================================================
// Server Events (Backend → Board client)
// =============================================================================

/// Events pushed by the server to every member of a room
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Complete membership of the room; always a full replacement
    UserList { users: Vec<Participant> },
    PredictionSubmitted(Prediction),
    /// Authoritative prediction set for the current round
    ResultsRevealed { predictions: Vec<Prediction> },
    SessionReset,
    NewComment(Comment),
    ActionAdded(ActionItem),
    Error { message: String },
}

/// Discriminant of [`ServerEvent`], usable as a map key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerEventKind {
    UserList,
    PredictionSubmitted,
    ResultsRevealed,
    SessionReset,
    NewComment,
    ActionAdded,
    Error,
}

impl ServerEventKind {
    pub const ALL: [ServerEventKind; 7] = [
        ServerEventKind::UserList,
        ServerEventKind::PredictionSubmitted,
        ServerEventKind::ResultsRevealed,
        ServerEventKind::SessionReset,
        ServerEventKind::NewComment,
        ServerEventKind::ActionAdded,
        ServerEventKind::Error,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ServerEventKind::UserList => "user_list",
            ServerEventKind::PredictionSubmitted => "prediction_submitted",
            ServerEventKind::ResultsRevealed => "results_revealed",
            ServerEventKind::SessionReset => "session_reset",
            ServerEventKind::NewComment => "new_comment",
            ServerEventKind::ActionAdded => "action_added",
            ServerEventKind::Error => "error",
        }
    }

    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

impl ServerEvent {
    pub fn kind(&self) -> ServerEventKind {
        match self {
            ServerEvent::UserList { .. } => ServerEventKind::UserList,
            ServerEvent::PredictionSubmitted(_) => ServerEventKind::PredictionSubmitted,
            ServerEvent::ResultsRevealed { .. } => ServerEventKind::ResultsRevealed,
            ServerEvent::SessionReset => ServerEventKind::SessionReset,
            ServerEvent::NewComment(_) => ServerEventKind::NewComment,
            ServerEvent::ActionAdded(_) => ServerEventKind::ActionAdded,
            ServerEvent::Error { .. } => ServerEventKind::Error,
        }
    }

    /// Build an event from its wire name and payload.
    ///
    /// Returns `Ok(None)` for event names this client does not know about.
    /// The payload of `session_reset` is ignored, whatever it contains.
    pub fn from_parts(name: &str, data: serde_json::Value) -> Result<Option<Self>, serde_json::Error> {
        let Some(kind) = ServerEventKind::from_wire(name) else {
            return Ok(None);
        };

        let event = match kind {
            ServerEventKind::UserList => {
                let payload: UserListPayload = serde_json::from_value(data)?;
                ServerEvent::UserList {
                    users: payload.users,
                }
            }
            ServerEventKind::PredictionSubmitted => {
                ServerEvent::PredictionSubmitted(serde_json::from_value(data)?)
            }
            ServerEventKind::ResultsRevealed => {
                let payload: ResultsPayload = serde_json::from_value(data)?;
                ServerEvent::ResultsRevealed {
                    predictions: payload.predictions,
                }
            }
            ServerEventKind::SessionReset => ServerEvent::SessionReset,
            ServerEventKind::NewComment => ServerEvent::NewComment(serde_json::from_value(data)?),
            ServerEventKind::ActionAdded => ServerEvent::ActionAdded(serde_json::from_value(data)?),
            ServerEventKind::Error => {
                let payload: ErrorPayload = serde_json::from_value(data)?;
                ServerEvent::Error {
                    message: payload.message,
                }
            }
        };

        Ok(Some(event))
    }
}

#[derive(Deserialize)]
struct UserListPayload {
    users: Vec<Participant>,
}

#[derive(Deserialize)]
struct ResultsPayload {
    predictions: Vec<Prediction>,
}

#[derive(Deserialize)]
struct ErrorPayload {
    message: String,
}
