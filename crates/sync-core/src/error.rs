use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::ConnectionState;

/// Coarse class of a sync failure. Only `Network` and `RateLimited` are
/// reported as retryable to clients.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SyncErrorCategory {
    /// Bad client setup or a request the API refused with a 4xx.
    Config,
    /// Token rejected during the handshake or by the chat API.
    Auth,
    /// Lost socket or a 5xx from the chat API.
    Network,
    /// Server asked to back off; `retry_after_ms` carries its hint.
    RateLimited,
    /// Peer violated the wire protocol or a data-model invariant.
    Protocol,
    /// A frame or response body did not decode.
    Serialization,
    /// A history fetch or chat mutation for the same chat is outstanding.
    Conflict,
    /// Command arrived in a session state that cannot serve it, or the API
    /// answered with a status outside the HTTP ranges.
    Internal,
}

/// Failure carried inside `RequestFailed`, `SendAck` and `FatalError` events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[error("{category:?}:{code}: {message}")]
pub struct SyncError {
    pub category: SyncErrorCategory,
    /// Machine-readable code such as `fetch_in_flight` or `http_timeout`.
    /// Clients match on it, so existing codes never change meaning.
    pub code: String,
    pub message: String,
    /// `Retry-After` from a chat API reply, in milliseconds.
    pub retry_after_ms: Option<u64>,
}

impl SyncError {
    pub fn new(
        category: SyncErrorCategory,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            code: code.into(),
            message: message.into(),
            retry_after_ms: None,
        }
    }

    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after_ms = Some(retry_after.as_millis() as u64);
        self
    }

    /// A command the session cannot serve right now, e.g. `join_chat` while
    /// disconnected.
    pub fn invalid_state(current: ConnectionState, action: impl Into<String>) -> Self {
        let action = action.into();
        Self::new(
            SyncErrorCategory::Internal,
            "invalid_state_transition",
            format!("cannot run '{action}' while session is in state {current:?}"),
        )
    }

    /// Second history fetch or mutation for a chat whose first one has not
    /// returned. `code` is `fetch_in_flight` or `mutation_in_flight`.
    pub fn in_flight(code: &str, chat_id: &str) -> Self {
        Self::new(
            SyncErrorCategory::Conflict,
            code,
            format!("a request for chat '{chat_id}' is already in flight"),
        )
    }

    /// Whether the runtime may repeat the call after a backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category,
            SyncErrorCategory::Network | SyncErrorCategory::RateLimited
        )
    }
}

/// Chat API status to category. 408 is treated like 429 since both mean
/// "try again later"; any other 4xx is a client mistake.
pub fn classify_http_status(status: u16) -> SyncErrorCategory {
    match status {
        401 | 403 => SyncErrorCategory::Auth,
        408 | 429 => SyncErrorCategory::RateLimited,
        409 => SyncErrorCategory::Conflict,
        400..=499 => SyncErrorCategory::Config,
        500..=599 => SyncErrorCategory::Network,
        _ => SyncErrorCategory::Internal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_http_status_categories() {
        assert_eq!(classify_http_status(401), SyncErrorCategory::Auth);
        assert_eq!(classify_http_status(429), SyncErrorCategory::RateLimited);
        assert_eq!(classify_http_status(409), SyncErrorCategory::Conflict);
        assert_eq!(classify_http_status(404), SyncErrorCategory::Config);
        assert_eq!(classify_http_status(503), SyncErrorCategory::Network);
        assert_eq!(classify_http_status(700), SyncErrorCategory::Internal);
    }

    #[test]
    fn keeps_invalid_state_error_code_stable() {
        let err = SyncError::invalid_state(ConnectionState::Disconnected, "join_chat");
        assert_eq!(err.code, "invalid_state_transition");
        assert_eq!(err.category, SyncErrorCategory::Internal);
    }

    #[test]
    fn persists_retry_after_in_millis() {
        let err = SyncError::new(SyncErrorCategory::RateLimited, "rate_limited", "wait")
            .with_retry_after(Duration::from_secs(3));
        assert_eq!(err.retry_after_ms, Some(3000));
    }

    #[test]
    fn only_network_and_rate_limit_are_retryable() {
        let network = SyncError::new(SyncErrorCategory::Network, "n", "network");
        let rate = SyncError::new(SyncErrorCategory::RateLimited, "r", "rate");
        let auth = SyncError::new(SyncErrorCategory::Auth, "a", "auth");
        let conflict = SyncError::in_flight("fetch_in_flight", "c1");

        assert!(network.is_retryable());
        assert!(rate.is_retryable());
        assert!(!auth.is_retryable());
        assert!(!conflict.is_retryable());
        assert_eq!(conflict.code, "fetch_in_flight");
    }
}
