//! Error types for model-gateway

use thiserror::Error;

/// Errors produced while talking to the generative model.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// No API key configured
    #[error("model API key is not configured")]
    MissingApiKey,

    /// Key rejected by the provider
    #[error("model API rejected the credential ({status}): {message}")]
    Auth { status: u16, message: String },

    /// Non-success response from the provider
    #[error("model API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Connection or timeout failure
    #[error("model transport error: {0}")]
    Transport(String),

    /// Response envelope did not decode
    #[error("malformed model API response: {0}")]
    Envelope(String),

    /// The completion text violated the response contract
    #[error("invalid model response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for ModelError {
    fn from(err: reqwest::Error) -> Self {
        ModelError::Transport(err.to_string())
    }
}
