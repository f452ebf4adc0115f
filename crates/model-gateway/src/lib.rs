//! Model-Gateway: the generative model behind Storyforge
//!
//! The model is an external collaborator. This crate fixes only the contract
//! with it: how prompts are built, how a completion is requested, and what a
//! code-generation answer must look like.
//!
//! ## Layer 1 - Model access
//!
//! - [`ModelClient`] is the seam the pipeline calls.
//! - [`anthropic::AnthropicClient`] is the production implementation.
//! - [`files::parse_generated_files`] validates generation output.

pub mod anthropic;
pub mod error;
pub mod fakes;
pub mod files;
pub mod prompt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use anthropic::{AnthropicClient, AnthropicConfig};
pub use error::ModelError;
pub use files::{parse_generated_files, GeneratedFileSet};
pub use prompt::{analysis_request, generation_request, StoryBrief};

/// A single-shot completion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// System instructions
    pub system: String,
    /// User turn: context plus question or story
    pub prompt: String,
    /// Output token budget
    pub max_tokens: u32,
}

/// A generative model that turns one prompt into one text answer.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ModelError>;

    /// Model identifier, for logs.
    fn name(&self) -> &str;
}
