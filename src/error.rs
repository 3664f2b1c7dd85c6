//! Crate-level error type.
//!
//! Every fallible operation in the library returns [`Result<T>`]. The binary
//! boxes these into `Box<dyn std::error::Error>` at the top level.

use thiserror::Error;

/// Errors produced by the workspace engine and its collaborators.
#[derive(Debug, Error)]
pub enum DevmindError {
    /// The completion stream or the HTTP connection failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The provider answered with a non-2xx status.
    #[error("{provider} API error (HTTP {status}): {body}")]
    Api {
        provider: String,
        status: u16,
        body: String,
    },

    /// The collaborator no longer knows the session entity.
    #[error("session entity was not found")]
    SessionNotFound,

    #[error("{0} not set. Export it or pass via environment.")]
    MissingApiKey(&'static str),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("a file already exists at '{0}'")]
    FileExists(String),

    #[error("invalid file path '{0}'")]
    InvalidPath(String),

    #[error("no file with id '{0}'")]
    FileNotFound(String),

    #[error("no project with id '{0}'")]
    ProjectNotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl DevmindError {
    /// True when the collaborator reported that the session is gone.
    ///
    /// The conversation drops its handle on this error so the next turn
    /// starts a fresh session instead of repeating the failure.
    pub fn is_session_missing(&self) -> bool {
        match self {
            DevmindError::SessionNotFound => true,
            DevmindError::Api { body, .. } | DevmindError::Transport(body) => {
                body.contains("entity was not found")
            }
            _ => false,
        }
    }
}

impl From<rusqlite::Error> for DevmindError {
    fn from(e: rusqlite::Error) -> Self {
        DevmindError::Storage(e.to_string())
    }
}

impl From<reqwest::Error> for DevmindError {
    fn from(e: reqwest::Error) -> Self {
        DevmindError::Transport(e.to_string())
    }
}

impl From<toml::de::Error> for DevmindError {
    fn from(e: toml::de::Error) -> Self {
        DevmindError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DevmindError>;
