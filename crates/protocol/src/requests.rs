//! Request bodies for the room HTTP API

use serde::{Deserialize, Serialize};

use crate::types::{Comment, ParticipantRole};

/// `POST /{kind}/join/room`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRoomRequest {
    pub name: String,
    pub email: String,
    pub invite_code: String,
}

/// `POST /refinement/prediction/submit`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitPredictionRequest {
    pub room_id: String,
    pub role: ParticipantRole,
    pub prediction: f64,
}

/// `POST /retro/new/comment`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddCommentRequest {
    pub room_id: String,
    pub comment: Comment,
}

/// `POST /retro/create/action`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateActionRequest {
    pub room_id: String,
    /// Name of the admin creating the action
    pub user_name: String,
    pub description: String,
    pub assignee_name: String,
}
