//! Environment-backed configuration for the sync runtime.

use std::{env, time::Duration};

use sync_core::{MessageStore, RetryPolicy, SERVER_PAGINATION_LIMIT_CAP};
use thiserror::Error;

const DEFAULT_HISTORY_PAGE_LIMIT: u16 = 30;
const DEFAULT_TYPING_IDLE_MS: u64 = 2_000;
const DEFAULT_TYPING_LIFETIME_MS: u64 = 5_000;
const DEFAULT_RECONNECT_BASE_MS: u64 = 1_000;
const DEFAULT_RECONNECT_MAX_MS: u64 = 30_000;
const DEFAULT_RECONNECT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_AUTH_TIMEOUT_MS: u64 = 10_000;

/// Client configuration: endpoints, identity, and runtime tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Websocket endpoint of the push transport.
    pub ws_url: String,
    /// Base URL of the request/response chat API.
    pub api_url: String,
    pub user_id: String,
    pub user_token: String,
    /// Page size for history fetches, clamped to `1..=100`.
    pub history_page_limit: u16,
    pub typing_idle_ms: u64,
    pub typing_lifetime_ms: u64,
    pub reconnect_base_ms: u64,
    pub reconnect_max_ms: u64,
    pub reconnect_max_attempts: u32,
    pub auth_timeout_ms: u64,
}

impl ClientConfig {
    /// Parse configuration from `CHATSYNC_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(mut lookup: F) -> Result<Self, ConfigError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let ws_url = required_trimmed_env("CHATSYNC_WS_URL", &mut lookup)?;
        let api_url = required_trimmed_env("CHATSYNC_API_URL", &mut lookup)?;
        let user_id = required_trimmed_env("CHATSYNC_USER_ID", &mut lookup)?;
        let user_token = required_trimmed_env("CHATSYNC_USER_TOKEN", &mut lookup)?;

        let history_page_limit = parse_with_default(
            "CHATSYNC_HISTORY_PAGE_LIMIT",
            DEFAULT_HISTORY_PAGE_LIMIT,
            &mut lookup,
        )?;
        if !(1..=SERVER_PAGINATION_LIMIT_CAP).contains(&history_page_limit) {
            return Err(ConfigError::InvalidValue {
                key: "CHATSYNC_HISTORY_PAGE_LIMIT",
                value: history_page_limit.to_string(),
                reason: format!("must be between 1 and {SERVER_PAGINATION_LIMIT_CAP}"),
            });
        }

        let typing_idle_ms =
            parse_with_default("CHATSYNC_TYPING_IDLE_MS", DEFAULT_TYPING_IDLE_MS, &mut lookup)?;
        let typing_lifetime_ms = parse_with_default(
            "CHATSYNC_TYPING_LIFETIME_MS",
            DEFAULT_TYPING_LIFETIME_MS,
            &mut lookup,
        )?;
        let reconnect_base_ms = parse_with_default(
            "CHATSYNC_RECONNECT_BASE_MS",
            DEFAULT_RECONNECT_BASE_MS,
            &mut lookup,
        )?;
        let reconnect_max_ms = parse_with_default(
            "CHATSYNC_RECONNECT_MAX_MS",
            DEFAULT_RECONNECT_MAX_MS,
            &mut lookup,
        )?;
        let reconnect_max_attempts = parse_with_default(
            "CHATSYNC_RECONNECT_MAX_ATTEMPTS",
            DEFAULT_RECONNECT_MAX_ATTEMPTS,
            &mut lookup,
        )?;
        let auth_timeout_ms = parse_with_default(
            "CHATSYNC_AUTH_TIMEOUT_MS",
            DEFAULT_AUTH_TIMEOUT_MS,
            &mut lookup,
        )?;

        for (key, value) in [
            ("CHATSYNC_TYPING_IDLE_MS", typing_idle_ms),
            ("CHATSYNC_TYPING_LIFETIME_MS", typing_lifetime_ms),
            ("CHATSYNC_AUTH_TIMEOUT_MS", auth_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    key,
                    value: "0".to_owned(),
                    reason: "must be greater than 0".to_owned(),
                });
            }
        }
        if reconnect_max_ms < reconnect_base_ms {
            return Err(ConfigError::InvalidValue {
                key: "CHATSYNC_RECONNECT_MAX_MS",
                value: reconnect_max_ms.to_string(),
                reason: format!("must be at least CHATSYNC_RECONNECT_BASE_MS ({reconnect_base_ms})"),
            });
        }

        Ok(Self {
            ws_url,
            api_url,
            user_id,
            user_token,
            history_page_limit,
            typing_idle_ms,
            typing_lifetime_ms,
            reconnect_base_ms,
            reconnect_max_ms,
            reconnect_max_attempts,
            auth_timeout_ms,
        })
    }

    /// Identity and tuning consumed by the runtime task.
    pub fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            user_id: self.user_id.clone(),
            user_token: self.user_token.clone(),
            history_page_limit: self.history_page_limit,
            typing_idle: Duration::from_millis(self.typing_idle_ms),
            typing_lifetime: Duration::from_millis(self.typing_lifetime_ms),
            reconnect: RetryPolicy::new(self.reconnect_base_ms, self.reconnect_max_ms)
                .with_max_attempts(self.reconnect_max_attempts),
            auth_timeout: Duration::from_millis(self.auth_timeout_ms),
        }
    }
}

/// Session-scoped identity plus timing knobs for one runtime instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub user_id: String,
    pub user_token: String,
    pub history_page_limit: u16,
    pub typing_idle: Duration,
    pub typing_lifetime: Duration,
    pub reconnect: RetryPolicy,
    pub auth_timeout: Duration,
}

impl RuntimeConfig {
    /// Defaults for everything except identity.
    pub fn new(user_id: impl Into<String>, user_token: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            user_token: user_token.into(),
            history_page_limit: MessageStore::bounded_paginate_limit(
                DEFAULT_HISTORY_PAGE_LIMIT,
                SERVER_PAGINATION_LIMIT_CAP,
            ),
            typing_idle: Duration::from_millis(DEFAULT_TYPING_IDLE_MS),
            typing_lifetime: Duration::from_millis(DEFAULT_TYPING_LIFETIME_MS),
            reconnect: RetryPolicy::new(DEFAULT_RECONNECT_BASE_MS, DEFAULT_RECONNECT_MAX_MS)
                .with_max_attempts(DEFAULT_RECONNECT_MAX_ATTEMPTS),
            auth_timeout: Duration::from_millis(DEFAULT_AUTH_TIMEOUT_MS),
        }
    }
}

/// Errors produced while parsing configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A required variable is unset or blank.
    #[error("missing required {key}")]
    Missing { key: &'static str },
    /// A variable could not be parsed or is out of range.
    #[error("invalid {key}='{value}': {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

fn optional_trimmed_env<F>(key: &'static str, lookup: &mut F) -> Option<String>
where
    F: FnMut(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn required_trimmed_env<F>(key: &'static str, lookup: &mut F) -> Result<String, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    optional_trimmed_env(key, lookup).ok_or(ConfigError::Missing { key })
}

fn parse_with_default<T, F>(key: &'static str, default: T, lookup: &mut F) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: FnMut(&str) -> Option<String>,
{
    let Some(value) = optional_trimmed_env(key, lookup) else {
        return Ok(default);
    };
    value.parse::<T>().map_err(|err| ConfigError::InvalidValue {
        key,
        reason: err.to_string(),
        value,
    })
}
