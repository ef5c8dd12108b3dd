//! Engine configuration parsed from environment variables.

use std::time::Duration;

use crate::error::{EngineError, Result};

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_WS_PATH: &str = "/ws";
pub const DEFAULT_RECONNECT_INITIAL_MS: u64 = 1_000;
pub const DEFAULT_RECONNECT_MAX_MS: u64 = 10_000;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_QUIZ_DURATION_MINUTES: u32 = 30;

/// Reconnect backoff bounds. Delays double from `initial` up to `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(DEFAULT_RECONNECT_INITIAL_MS),
            max: Duration::from_millis(DEFAULT_RECONNECT_MAX_MS),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Backend origin without trailing slash, e.g. `https://lms.example.com`.
    pub base_url: String,
    /// Path of the live event stream endpoint.
    pub ws_path: String,
    /// Bearer token for REST calls and the stream handshake.
    pub auth_token: Option<String>,
    pub reconnect: ReconnectPolicy,
    pub timeouts: HttpTimeouts,
    /// Timer duration used when the quiz metadata fetch fails.
    pub default_duration_minutes: u32,
}

impl EngineConfig {
    /// Config with defaults for everything but the backend origin.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] when `base_url` is not an http(s) URL.
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            base_url: validate_base_url(base_url)?,
            ws_path: DEFAULT_WS_PATH.to_owned(),
            auth_token: None,
            reconnect: ReconnectPolicy::default(),
            timeouts: HttpTimeouts {
                request_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
                connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            },
            default_duration_minutes: DEFAULT_QUIZ_DURATION_MINUTES,
        })
    }

    /// Build typed config from environment variables.
    ///
    /// Optional:
    /// - `QUIZLIVE_BASE_URL`: default `http://127.0.0.1:8000`
    /// - `QUIZLIVE_WS_PATH`: default `/ws`
    /// - `QUIZLIVE_AUTH_TOKEN`: bearer token, unset by default
    /// - `QUIZLIVE_RECONNECT_INITIAL_MS`: default 1000
    /// - `QUIZLIVE_RECONNECT_MAX_MS`: default 10000
    /// - `QUIZLIVE_REQUEST_TIMEOUT_SECS`: default 15
    /// - `QUIZLIVE_CONNECT_TIMEOUT_SECS`: default 5
    /// - `QUIZLIVE_DEFAULT_DURATION_MINUTES`: default 30
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] for an unusable base URL or reconnect bounds.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let base_url = lookup("QUIZLIVE_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_owned());
        let mut config = Self::new(&base_url)?;

        if let Some(path) = lookup("QUIZLIVE_WS_PATH") {
            config.ws_path = normalize_path(&path);
        }
        config.auth_token = lookup("QUIZLIVE_AUTH_TOKEN").filter(|token| !token.trim().is_empty());

        let initial_ms = parse_or(&lookup, "QUIZLIVE_RECONNECT_INITIAL_MS", DEFAULT_RECONNECT_INITIAL_MS);
        let max_ms = parse_or(&lookup, "QUIZLIVE_RECONNECT_MAX_MS", DEFAULT_RECONNECT_MAX_MS);
        if initial_ms == 0 || max_ms < initial_ms {
            return Err(EngineError::Config(format!(
                "reconnect bounds must satisfy 0 < initial ({initial_ms}ms) <= max ({max_ms}ms)"
            )));
        }
        config.reconnect =
            ReconnectPolicy { initial: Duration::from_millis(initial_ms), max: Duration::from_millis(max_ms) };

        config.timeouts = HttpTimeouts {
            request_secs: parse_or(&lookup, "QUIZLIVE_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_secs: parse_or(&lookup, "QUIZLIVE_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS),
        };
        config.default_duration_minutes =
            parse_or(&lookup, "QUIZLIVE_DEFAULT_DURATION_MINUTES", DEFAULT_QUIZ_DURATION_MINUTES);

        Ok(config)
    }

    /// Full URL for a REST path such as `/api/quizzes/7`.
    #[must_use]
    pub fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, normalize_path(path))
    }

    /// Event stream URL: `ws(s)://host/ws_path`, with the token as a
    /// percent-encoded query parameter.
    #[must_use]
    pub fn ws_url(&self) -> String {
        let origin = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.base_url.clone()
        };
        match &self.auth_token {
            Some(token) => format!("{origin}{}?token={}", self.ws_path, urlencoding::encode(token)),
            None => format!("{origin}{}", self.ws_path),
        }
    }
}

fn validate_base_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    let has_host = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .is_some_and(|host| !host.is_empty());
    if !has_host {
        return Err(EngineError::Config(format!("base URL must be http(s)://host, got {raw:?}")));
    }
    Ok(trimmed.to_owned())
}

fn normalize_path(path: &str) -> String {
    let trimmed = path.trim();
    if trimmed.starts_with('/') { trimmed.to_owned() } else { format!("/{trimmed}") }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    lookup(key)
        .and_then(|value| value.trim().parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
