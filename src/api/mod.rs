//! Backend viewing-time API surface.
//!
//! The backend is authoritative for all balance and session accounting;
//! this module only defines the client-side view of it: the endpoint
//! trait, the wire models, and the error taxonomy.

mod http;
pub mod models;

pub use http::HttpViewingTimeApi;

use async_trait::async_trait;

use models::{
    HeartbeatReply, HeartbeatRequest, PlaybackEligibility, SessionEndReply, ViewingTimeBalance,
};

/// Errors from a single backend call.
///
/// Malformed bodies are their own variant for logging, but every variant
/// means the same thing to callers: that call produced no usable data.
/// Retry policy lives with the loops, never here.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// No response at all (DNS, connect, timeout, broken pipe).
    #[error("transport error calling {endpoint}: {source}")]
    Transport {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },
    /// The server was reachable but rejected or failed the request.
    #[error("{endpoint} failed with status {status}")]
    Status {
        endpoint: &'static str,
        status: reqwest::StatusCode,
    },
    /// A 2xx response whose body did not decode.
    #[error("malformed response from {endpoint}: {source}")]
    Malformed {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },
}

/// Supplies the bearer token attached to every request.
///
/// Token acquisition and refresh belong to the embedding application's
/// authentication layer; the client only asks for the current value at
/// the moment each request is built.
pub trait TokenProvider: Send + Sync {
    fn bearer_token(&self) -> Option<String>;
}

/// Token provider for a fixed, pre-issued token.
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl TokenProvider for StaticTokenProvider {
    fn bearer_token(&self) -> Option<String> {
        Some(self.token.clone())
    }
}

/// The four viewing-time endpoints the enforcement engine relies on.
#[cfg_attr(feature = "mock", mockall::automock)]
#[async_trait]
pub trait ViewingTimeApi: Send + Sync {
    /// Fetch the authoritative remaining-time snapshot for a profile.
    /// Performs exactly one network read; no internal retries.
    async fn get_balance(&self, profile_id: &str) -> Result<ViewingTimeBalance, ApiError>;

    /// Report playback liveness and receive the enforcement decision for
    /// the current accounting session.
    async fn send_heartbeat(&self, request: &HeartbeatRequest)
        -> Result<HeartbeatReply, ApiError>;

    /// Close an accounting session. Best-effort at the call sites: the
    /// server also times sessions out on its own.
    async fn end_session(&self, session_id: &str) -> Result<SessionEndReply, ApiError>;

    /// Pre-flight check consulted before starting playback.
    async fn playback_eligibility(
        &self,
        profile_id: &str,
    ) -> Result<PlaybackEligibility, ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_token_provider_returns_token() {
        let provider = StaticTokenProvider::new("abc123");
        assert_eq!(provider.bearer_token(), Some("abc123".to_string()));
    }

    #[test]
    fn api_error_display_names_the_endpoint() {
        let err = ApiError::Status {
            endpoint: "balance",
            status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
        };
        let msg = err.to_string();
        assert!(msg.contains("balance"));
        assert!(msg.contains("500"));
    }
}
