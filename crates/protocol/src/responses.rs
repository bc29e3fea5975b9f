//! Response envelopes for the room HTTP API
//!
//! Every response carries `success`; failures carry a human-readable `message`
//! that the client surfaces verbatim.

use serde::{Deserialize, Serialize};

use crate::types::{ParticipantRole, Prediction};

/// Minimal envelope for endpoints that return no payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRoomResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invite_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRoomResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// One role's aggregated estimate as computed by the server
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub role: ParticipantRole,
    pub final_prediction: f64,
}

impl From<PredictionRecord> for Prediction {
    fn from(record: PredictionRecord) -> Self {
        Prediction {
            role: record.role,
            value: record.final_prediction,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionsResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub predictions: Vec<PredictionRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
