//! Caller-facing request and outcome types.

use model_gateway::StoryBrief;
use remote_git::RepoId;
use serde::{Deserialize, Serialize};

use crate::domain::PublishResult;

/// What the caller wants done.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequestKind {
    Analyze { query: String },
    Generate { story: StoryBrief },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineRequest {
    /// Carried through to logs only.
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub story_id: Option<String>,
    pub repo: RepoId,
    /// Base branch hint; the configured preferred branch when absent.
    #[serde(default)]
    pub selected_branch: Option<String>,
    pub kind: RequestKind,
}

impl PipelineRequest {
    pub fn analyze(repo: RepoId, query: impl Into<String>) -> Self {
        Self {
            project_id: None,
            story_id: None,
            repo,
            selected_branch: None,
            kind: RequestKind::Analyze {
                query: query.into(),
            },
        }
    }

    pub fn generate(repo: RepoId, story: StoryBrief) -> Self {
        Self {
            project_id: None,
            story_id: None,
            repo,
            selected_branch: None,
            kind: RequestKind::Generate { story },
        }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.selected_branch = Some(branch.into());
        self
    }

    pub fn with_ids(mut self, project_id: impl Into<String>, story_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self.story_id = Some(story_id.into());
        self
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            RequestKind::Analyze { .. } => "analyze",
            RequestKind::Generate { .. } => "generate",
        }
    }
}

/// Result of an analysis run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AnalysisOutcome {
    Answer {
        text: String,
        /// Paths whose content went into the context.
        files: Vec<String>,
    },
    OutOfScope { message: String },
}

/// Result of a generation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GenerationOutcome {
    Published(PublishResult),
    OutOfScope { message: String },
}

impl AnalysisOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            AnalysisOutcome::Answer { .. } => "answered",
            AnalysisOutcome::OutOfScope { .. } => "out_of_scope",
        }
    }
}

impl GenerationOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            GenerationOutcome::Published(_) => "published",
            GenerationOutcome::OutOfScope { .. } => "out_of_scope",
        }
    }
}
