//! HTTP adapter for the room API (reqwest)

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;

use agileflow_protocol::{
    AckResponse, AddCommentRequest, CreateActionRequest, CreateRoomResponse, JoinRoomRequest,
    JoinRoomResponse, Prediction, PredictionsResponse, RoomKind, SubmitPredictionRequest,
};

use crate::config::SyncConfig;
use crate::error::ApiError;
use crate::identity::TokenProvider;
use crate::ports::{CreatedRoom, RoomApiPort};

/// Fallback when a failed response carries no message of its own.
const DEFAULT_REJECTION: &str = "The server rejected the request.";

/// Client for the backend's room endpoints
#[derive(Clone)]
pub struct HttpRoomApi {
    client: Client,
    base_url: String,
    tokens: Arc<dyn TokenProvider>,
}

impl HttpRoomApi {
    pub fn new(config: &SyncConfig, tokens: Arc<dyn TokenProvider>) -> Self {
        let client = Client::builder()
            .timeout(config.http_timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            tokens,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Attach auth, send, and decode the body.
    ///
    /// Non-2xx statuses become [`ApiError::Rejected`] carrying the body's
    /// `message` when there is one.
    async fn send<R: DeserializeOwned>(&self, request: RequestBuilder) -> Result<R, ApiError> {
        let request = match self.tokens.access_token().await? {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_slice::<AckResponse>(&body)
                .ok()
                .and_then(|ack| ack.message)
                .unwrap_or_else(|| format!("Request failed with status {status}"));
            return Err(ApiError::Rejected(message));
        }

        serde_json::from_slice(&body).map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }
}

fn ensure_success(success: bool, message: Option<String>) -> Result<(), ApiError> {
    if success {
        Ok(())
    } else {
        Err(ApiError::Rejected(
            message.unwrap_or_else(|| DEFAULT_REJECTION.to_string()),
        ))
    }
}

fn required(field: &str, value: Option<String>) -> Result<String, ApiError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::InvalidResponse(format!("missing {field}")))
}

#[async_trait]
impl RoomApiPort for HttpRoomApi {
    async fn create_room(&self, kind: RoomKind) -> Result<CreatedRoom, ApiError> {
        let resp: CreateRoomResponse = self
            .send(self.client.post(self.url(&format!("{kind}/create/room"))))
            .await?;
        ensure_success(resp.success, resp.message)?;

        Ok(CreatedRoom {
            room_id: required("room_id", resp.room_id)?,
            invite_code: required("invite_code", resp.invite_code)?,
        })
    }

    async fn join_room(
        &self,
        kind: RoomKind,
        request: &JoinRoomRequest,
    ) -> Result<String, ApiError> {
        let resp: JoinRoomResponse = self
            .send(
                self.client
                    .post(self.url(&format!("{kind}/join/room")))
                    .json(request),
            )
            .await?;
        ensure_success(resp.success, resp.message)?;
        required("room_id", resp.room_id)
    }

    async fn submit_prediction(&self, request: &SubmitPredictionRequest) -> Result<(), ApiError> {
        let resp: AckResponse = self
            .send(
                self.client
                    .post(self.url("refinement/prediction/submit"))
                    .json(request),
            )
            .await?;
        ensure_success(resp.success, resp.message)
    }

    async fn get_predictions(&self, room_id: &str) -> Result<Vec<Prediction>, ApiError> {
        let resp: PredictionsResponse = self
            .send(
                self.client
                    .get(self.url("refinement/get/predictions"))
                    .query(&[("room_id", room_id)]),
            )
            .await?;
        ensure_success(resp.success, resp.message)?;
        Ok(resp.predictions.into_iter().map(Prediction::from).collect())
    }

    async fn add_comment(&self, request: &AddCommentRequest) -> Result<(), ApiError> {
        let resp: AckResponse = self
            .send(self.client.post(self.url("retro/new/comment")).json(request))
            .await?;
        ensure_success(resp.success, resp.message)
    }

    async fn create_action(&self, request: &CreateActionRequest) -> Result<(), ApiError> {
        let resp: AckResponse = self
            .send(
                self.client
                    .post(self.url("retro/create/action"))
                    .json(request),
            )
            .await?;
        ensure_success(resp.success, resp.message)
    }
}
