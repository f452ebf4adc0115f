//! Domain types shared by every pipeline stage.

pub mod error;

use serde::{Deserialize, Serialize};

pub use error::{PipelineError, PipelineResult};

/// A file fetched from the remote repository. Immutable for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoFile {
    pub path: String,
    pub content: String,
    pub blob_sha: Option<String>,
}

impl RepoFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            blob_sha: None,
        }
    }

    /// Final path segment.
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Lowercased extension without the dot, if any.
    pub fn extension(&self) -> Option<String> {
        let name = self.name();
        let (stem, ext) = name.rsplit_once('.')?;
        if stem.is_empty() {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }
}

/// How a generated file's blob was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlobOutcome {
    /// Content matched the base tree; the existing blob was reused.
    Reused,
    /// A new blob was written.
    Created,
}

/// One synthesized tree entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesizedEntry {
    pub path: String,
    pub sha: String,
    pub outcome: BlobOutcome,
}

/// Result of one synthesis: a commit on top of a base commit, not yet
/// referenced by any branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRef {
    pub branch_name: String,
    pub base_commit_sha: String,
    pub new_commit_sha: String,
    pub new_tree_sha: String,
    pub entries: Vec<SynthesizedEntry>,
}

impl CommitRef {
    pub fn reused_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.outcome == BlobOutcome::Reused)
            .count()
    }

    pub fn created_count(&self) -> usize {
        self.entries.len() - self.reused_count()
    }
}

/// The terminal artifact of a generation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishResult {
    pub branch_name: String,
    pub base_branch: String,
    pub commit_sha: String,
    pub pull_request_url: String,
    pub pull_request_number: u64,
    /// True when the pull request was already open before this run.
    pub pull_request_existed: bool,
}
