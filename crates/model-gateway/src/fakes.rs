//! Scripted model (testing only)

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::ModelError;
use crate::{CompletionRequest, ModelClient};

#[derive(Debug, Default)]
struct Script {
    replies: VecDeque<Result<String, ModelError>>,
    seen: Vec<CompletionRequest>,
}

/// Returns queued replies in order and records every request it receives.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    script: Mutex<Script>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one successful reply.
    pub fn reply(self, text: impl Into<String>) -> Self {
        self.lock().replies.push_back(Ok(text.into()));
        self
    }

    /// Queue one failure.
    pub fn fail(self, err: ModelError) -> Self {
        self.lock().replies.push_back(Err(err));
        self
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of completions requested so far.
    pub fn invocations(&self) -> usize {
        self.lock().seen.len()
    }

    /// Requests received, oldest first.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.lock().seen.clone()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ModelError> {
        let mut script = self.lock();
        script.seen.push(request.clone());
        script.replies.pop_front().unwrap_or_else(|| {
            Err(ModelError::Api {
                status: 500,
                message: "scripted model has no reply queued".to_string(),
            })
        })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
