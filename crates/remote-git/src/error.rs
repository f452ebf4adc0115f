//! Error types for remote-git

use thiserror::Error;

/// Errors returned by a [`GitHost`](crate::GitHost) implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    /// The addressed resource (ref, commit, tree, blob, path) does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Missing or rejected credential (401/403)
    #[error("authentication failed ({status}): {message}")]
    Auth { status: u16, message: String },

    /// The host refused to create something that already exists (422)
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The host rejected the request as unprocessable for another reason (422)
    #[error("unprocessable request: {0}")]
    Unprocessable(String),

    /// Any other non-success response
    #[error("hosting API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Connection, TLS or timeout failure
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body did not match the expected schema
    #[error("unexpected response shape: {0}")]
    Decode(String),
}

impl HostError {
    /// True for 404-style failures.
    pub fn is_not_found(&self) -> bool {
        matches!(self, HostError::NotFound(_))
    }

    /// True for failures that should abort a crawl instead of being skipped.
    pub fn is_fatal_for_crawl(&self) -> bool {
        matches!(self, HostError::Auth { .. } | HostError::Transport(_))
    }

    /// Upstream HTTP status, when the error came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            HostError::NotFound(_) => Some(404),
            HostError::Auth { status, .. } | HostError::Api { status, .. } => Some(*status),
            HostError::AlreadyExists(_) | HostError::Unprocessable(_) => Some(422),
            HostError::Transport(_) | HostError::Decode(_) => None,
        }
    }
}

impl From<reqwest::Error> for HostError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            HostError::Decode(err.to_string())
        } else {
            HostError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for HostError {
    fn from(err: serde_json::Error) -> Self {
        HostError::Decode(err.to_string())
    }
}
