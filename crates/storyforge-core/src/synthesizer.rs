//! Turns a generated file set into blob, tree and commit objects on the
//! host, on top of a base branch, without a local clone.
//!
//! Objects are created strictly in dependency order: every blob before the
//! tree naming it, the tree before the commit, and the commit is returned
//! without any ref pointing at it.

use std::collections::HashMap;
use std::sync::Arc;

use model_gateway::GeneratedFileSet;
use remote_git::{GitHost, NewTreeEntry, ObjectKind, RepoId};
use tracing::{debug, info, warn};

use crate::domain::{BlobOutcome, CommitRef, PipelineResult, SynthesizedEntry};
use crate::metrics::METRICS;
use crate::obs;

pub struct ObjectGraphSynthesizer {
    host: Arc<dyn GitHost>,
}

impl ObjectGraphSynthesizer {
    pub fn new(host: Arc<dyn GitHost>) -> Self {
        Self { host }
    }

    /// Create one commit whose tree is the base branch's tree with `files`
    /// written over it. Paths not in `files` are inherited through
    /// `base_tree`.
    pub async fn synthesize(
        &self,
        repo: &RepoId,
        base_branch: &str,
        branch_name: &str,
        files: &GeneratedFileSet,
        message: &str,
    ) -> PipelineResult<CommitRef> {
        let base_commit_sha = self.host.get_branch_sha(repo, base_branch).await?;
        let base_commit = self.host.get_commit(repo, &base_commit_sha).await?;
        let existing: HashMap<String, String> = self
            .host
            .get_tree_recursive(repo, &base_commit.tree_sha)
            .await?
            .into_iter()
            .filter(|item| item.kind == ObjectKind::Blob)
            .map(|item| (item.path, item.sha))
            .collect();
        debug!(
            base = %base_commit_sha,
            tree = %base_commit.tree_sha,
            existing = existing.len(),
            "base tree loaded"
        );

        let mut entries = Vec::with_capacity(files.len());
        for (path, content) in files.iter() {
            let reused = match existing.get(path) {
                Some(sha) if self.unchanged(repo, path, sha, content).await => Some(sha.clone()),
                _ => None,
            };
            let entry = match reused {
                Some(sha) => {
                    METRICS.inc_blobs_reused();
                    obs::emit_blob_reused(path, &sha);
                    SynthesizedEntry {
                        path: path.to_string(),
                        sha,
                        outcome: BlobOutcome::Reused,
                    }
                }
                None => {
                    let sha = self.host.create_blob(repo, content).await?;
                    METRICS.inc_blobs_created();
                    debug!(path = %path, sha = %sha, "blob created");
                    SynthesizedEntry {
                        path: path.to_string(),
                        sha,
                        outcome: BlobOutcome::Created,
                    }
                }
            };
            entries.push(entry);
        }

        let tree_entries: Vec<NewTreeEntry> = entries
            .iter()
            .map(|e| NewTreeEntry::blob(e.path.clone(), e.sha.clone()))
            .collect();
        let new_tree_sha = self
            .host
            .create_tree(repo, &base_commit.tree_sha, &tree_entries)
            .await?;
        let new_commit_sha = self
            .host
            .create_commit(repo, message, &new_tree_sha, &[base_commit_sha.clone()])
            .await?;

        let commit = CommitRef {
            branch_name: branch_name.to_string(),
            base_commit_sha,
            new_commit_sha,
            new_tree_sha,
            entries,
        };
        info!(
            repo = %repo,
            commit = %commit.new_commit_sha,
            created = commit.created_count(),
            reused = commit.reused_count(),
            "commit synthesized"
        );
        Ok(commit)
    }

    /// Whether the blob at `sha` already holds `content`. A failed read
    /// counts as changed.
    async fn unchanged(&self, repo: &RepoId, path: &str, sha: &str, content: &str) -> bool {
        match self.host.get_blob(repo, sha).await {
            Ok(bytes) => bytes == content.as_bytes(),
            Err(e) => {
                warn!(path = %path, sha = %sha, error = %e, "blob comparison failed, writing a new blob");
                false
            }
        }
    }
}

/// `<prefix>: <title>`, or just the title when the prefix is empty.
pub fn commit_message(prefix: &str, title: &str) -> String {
    let title = title.trim();
    if prefix.trim().is_empty() {
        title.to_string()
    } else {
        format!("{}: {title}", prefix.trim())
    }
}
