//! Identity provider boundary.
//!
//! Login itself happens elsewhere (an OAuth2/OIDC provider). This crate only
//! needs the resulting profile and a way to obtain a bearer token for HTTP calls.

use async_trait::async_trait;

use crate::error::ApiError;

pub use agileflow_protocol::Identity;

/// Source of bearer tokens for authenticated room API calls.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Current access token, or `None` to send the request unauthenticated.
    async fn access_token(&self) -> Result<Option<String>, ApiError>;
}

/// Token fixed at construction time (e.g. read from `AGILEFLOW_ACCESS_TOKEN`).
#[derive(Clone, Default)]
pub struct StaticToken {
    token: Option<String>,
}

impl StaticToken {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: token.filter(|t| !t.trim().is_empty()),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn access_token(&self) -> Result<Option<String>, ApiError> {
        Ok(self.token.clone())
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticToken")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
