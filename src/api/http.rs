//! HTTP implementation of the viewing-time API.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;

use super::models::{
    HeartbeatReply, HeartbeatRequest, PlaybackEligibility, SessionEndReply, ViewingTimeBalance,
};
use super::{ApiError, TokenProvider, ViewingTimeApi};

/// Client for the backend's viewing-time endpoints.
///
/// Holds a connection pool and the bearer-token source; cheap to clone.
#[derive(Clone)]
pub struct HttpViewingTimeApi {
    client: Client,
    base_url: String,
    tokens: Arc<dyn TokenProvider>,
}

impl HttpViewingTimeApi {
    /// Create a new client.
    ///
    /// # Arguments
    /// * `base_url` - Base URL of the backend (e.g., "http://localhost:8000")
    /// * `timeout_secs` - Request timeout in seconds
    /// * `tokens` - Source of the bearer token attached to each request
    pub fn new(
        base_url: String,
        timeout_secs: u64,
        tokens: Arc<dyn TokenProvider>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens,
        })
    }

    /// Get the base URL of the backend.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.tokens.bearer_token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(
        &self,
        endpoint: &'static str,
        builder: RequestBuilder,
    ) -> Result<Response, ApiError> {
        let response = self
            .authorize(builder)
            .send()
            .await
            .map_err(|source| ApiError::Transport { endpoint, source })?;

        if !response.status().is_success() {
            return Err(ApiError::Status {
                endpoint,
                status: response.status(),
            });
        }
        Ok(response)
    }

    async fn decode<T: DeserializeOwned>(
        endpoint: &'static str,
        response: Response,
    ) -> Result<T, ApiError> {
        response
            .json()
            .await
            .map_err(|source| ApiError::Malformed { endpoint, source })
    }
}

#[async_trait]
impl ViewingTimeApi for HttpViewingTimeApi {
    async fn get_balance(&self, profile_id: &str) -> Result<ViewingTimeBalance, ApiError> {
        let url = format!("{}/viewing-time/balance/{}", self.base_url, profile_id);
        let response = self.send("balance", self.client.get(&url)).await?;
        Self::decode("balance", response).await
    }

    async fn send_heartbeat(
        &self,
        request: &HeartbeatRequest,
    ) -> Result<HeartbeatReply, ApiError> {
        let url = format!("{}/viewing-time/heartbeat", self.base_url);
        let response = self
            .send("heartbeat", self.client.post(&url).json(request))
            .await?;
        Self::decode("heartbeat", response).await
    }

    async fn end_session(&self, session_id: &str) -> Result<SessionEndReply, ApiError> {
        let url = format!("{}/viewing-time/session/{}/end", self.base_url, session_id);
        let response = self.send("end_session", self.client.post(&url)).await?;
        Self::decode("end_session", response).await
    }

    async fn playback_eligibility(
        &self,
        profile_id: &str,
    ) -> Result<PlaybackEligibility, ApiError> {
        let url = format!(
            "{}/viewing-time/playback-eligible/{}",
            self.base_url, profile_id
        );
        let response = self.send("playback_eligibility", self.client.get(&url)).await?;
        Self::decode("playback_eligibility", response).await
    }
}
