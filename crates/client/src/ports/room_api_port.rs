//! Room API Port - HTTP boundary to the backend
//!
//! Every call is a single request/response; failures carry the server's
//! message as [`ApiError::Rejected`] so it can be shown verbatim.

use async_trait::async_trait;

use agileflow_protocol::{
    AddCommentRequest, CreateActionRequest, JoinRoomRequest, Prediction, RoomKind,
    SubmitPredictionRequest,
};

use crate::error::ApiError;

/// Identifiers handed out by the server for a freshly created room
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedRoom {
    pub room_id: String,
    pub invite_code: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RoomApiPort: Send + Sync {
    /// `POST /{kind}/create/room`
    async fn create_room(&self, kind: RoomKind) -> Result<CreatedRoom, ApiError>;

    /// `POST /{kind}/join/room`; returns the room id
    async fn join_room(&self, kind: RoomKind, request: &JoinRoomRequest)
        -> Result<String, ApiError>;

    async fn submit_prediction(&self, request: &SubmitPredictionRequest) -> Result<(), ApiError>;

    /// Authoritative per-role estimates for a refinement room
    async fn get_predictions(&self, room_id: &str) -> Result<Vec<Prediction>, ApiError>;

    async fn add_comment(&self, request: &AddCommentRequest) -> Result<(), ApiError>;

    async fn create_action(&self, request: &CreateActionRequest) -> Result<(), ApiError>;
}
