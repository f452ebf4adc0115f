//! Pipeline error taxonomy.
//!
//! An out-of-scope query is not represented here: it is a normal outcome of
//! the pipeline, see [`crate::pipeline::AnalysisOutcome`].

use model_gateway::ModelError;
use remote_git::HostError;

/// Errors that end a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("hosting API error{}: {message}", .status.map(|s| format!(" ({s})")).unwrap_or_default())]
    RemoteApi { status: Option<u16>, message: String },

    #[error("model API error ({status}): {message}")]
    ModelApi { status: u16, message: String },

    #[error("model response error: {0}")]
    ModelResponse(String),

    #[error("ref conflict on {branch}: {detail}")]
    RefConflict {
        branch: String,
        detail: String,
        observed_sha: Option<String>,
    },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<HostError> for PipelineError {
    fn from(err: HostError) -> Self {
        match err {
            HostError::NotFound(what) => PipelineError::NotFound(what),
            HostError::Auth { status, message } => {
                PipelineError::Auth(format!("hosting API rejected the credential ({status}): {message}"))
            }
            HostError::AlreadyExists(message) | HostError::Unprocessable(message) => {
                PipelineError::RemoteApi {
                    status: Some(422),
                    message,
                }
            }
            HostError::Api { status, message } => PipelineError::RemoteApi {
                status: Some(status),
                message,
            },
            HostError::Transport(message) => PipelineError::Transport(message),
            HostError::Decode(message) => PipelineError::RemoteApi {
                status: None,
                message,
            },
        }
    }
}

impl From<ModelError> for PipelineError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::MissingApiKey => PipelineError::Config(err.to_string()),
            ModelError::Auth { .. } => PipelineError::Auth(err.to_string()),
            ModelError::Api { status, message } => PipelineError::ModelApi { status, message },
            ModelError::Transport(message) => PipelineError::Transport(message),
            ModelError::Envelope(message) | ModelError::InvalidResponse(message) => {
                PipelineError::ModelResponse(message)
            }
        }
    }
}

/// Result type for pipeline operations.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
