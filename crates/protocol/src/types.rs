//! Shared vocabulary types
//!
//! Rooms, roles and the board items every projection is built from.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Error returned when parsing a vocabulary enum from an unknown string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

// =============================================================================
// Rooms
// =============================================================================

/// Which board a room belongs to. Also the first segment of the room API paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomKind {
    Retro,
    Refinement,
}

impl RoomKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RoomKind::Retro => "retro",
            RoomKind::Refinement => "refinement",
        }
    }
}

impl fmt::Display for RoomKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoomKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "retro" => Ok(RoomKind::Retro),
            "refinement" => Ok(RoomKind::Refinement),
            _ => Err(UnknownVariant {
                kind: "room kind",
                value: s.to_string(),
            }),
        }
    }
}

// =============================================================================
// Participants
// =============================================================================

/// Role a participant estimates for on the refinement board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParticipantRole {
    Developer,
    #[serde(rename = "QA")]
    Qa,
    #[serde(rename = "UI")]
    Ui,
    #[serde(rename = "UX")]
    Ux,
    Architect,
    Product,
}

impl ParticipantRole {
    pub const ALL: [ParticipantRole; 6] = [
        ParticipantRole::Developer,
        ParticipantRole::Qa,
        ParticipantRole::Ui,
        ParticipantRole::Ux,
        ParticipantRole::Architect,
        ParticipantRole::Product,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ParticipantRole::Developer => "Developer",
            ParticipantRole::Qa => "QA",
            ParticipantRole::Ui => "UI",
            ParticipantRole::Ux => "UX",
            ParticipantRole::Architect => "Architect",
            ParticipantRole::Product => "Product",
        }
    }
}

impl fmt::Display for ParticipantRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParticipantRole {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        ParticipantRole::ALL
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownVariant {
                kind: "participant role",
                value: s.to_string(),
            })
    }
}

/// Authenticated user as supplied by the identity provider.
///
/// The email doubles as the participant identifier inside a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    pub email: String,
}

impl Identity {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

/// A room member as pushed by the server in `user_list`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub role: Option<ParticipantRole>,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub has_submitted: bool,
}

// =============================================================================
// Board items
// =============================================================================

/// A time estimate (in days) for one role. At most one per role in a room.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub role: ParticipantRole,
    #[serde(rename = "prediction")]
    pub value: f64,
}

/// Retro board column a comment is filed under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommentCategory {
    #[serde(rename = "wentWell")]
    WentWell,
    #[serde(rename = "didntGoWell")]
    DidntGoWell,
    #[serde(rename = "improvements")]
    Improvement,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub category: CommentCategory,
    pub text: String,
}

/// Follow-up task captured during a retro
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionItem {
    pub description: String,
    pub assignee_name: String,
}
