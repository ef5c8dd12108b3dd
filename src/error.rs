//! Engine error type.
//!
//! Nothing in this crate treats an error as fatal to the session: callers log
//! and fall back to the last known state. The variants exist so that logs say
//! which collaborator failed.

/// Errors surfaced by the engine and its collaborators.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),
    #[error("server returned HTTP {status} for {path}")]
    Status { status: u16, path: String },
    #[error("websocket connect failed: {0}")]
    WsConnect(Box<tokio_tungstenite::tungstenite::Error>),
    #[error("no link available from connector")]
    LinkUnavailable,
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("no tokio runtime available")]
    NoRuntime,
}

pub type Result<T> = std::result::Result<T, EngineError>;

impl From<tokio_tungstenite::tungstenite::Error> for EngineError {
    fn from(error: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WsConnect(Box::new(error))
    }
}
