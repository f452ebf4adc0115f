//! Branch and pull-request publishing.
//!
//! Publishing moves a branch ref to a synthesized commit and opens (or
//! recognizes) a pull request into the base branch. Ref moves follow the
//! configured [`RefUpdatePolicy`]; the default never discards commits.

mod locks;
mod naming;
mod resolve;

use std::sync::Arc;

use model_gateway::StoryBrief;
use remote_git::{GitHost, HostError, NewPullRequest, PullRequest, RepoId};
use tracing::{info, warn};

pub use locks::BranchLocks;
pub use naming::{
    available_branch_name, derive_branch_name, slugify, timestamp_suffix, FALLBACK_SLUG,
    MAX_SLUG_LEN,
};
pub use resolve::{resolve_base_branch, ResolutionSource, ResolvedBranch};

use crate::config::RefUpdatePolicy;
use crate::domain::{CommitRef, PipelineError, PipelineResult, PublishResult};
use crate::metrics::METRICS;
use crate::obs;

pub struct BranchPublisher {
    host: Arc<dyn GitHost>,
    locks: Arc<BranchLocks>,
    policy: RefUpdatePolicy,
    draft: bool,
}

impl BranchPublisher {
    pub fn new(host: Arc<dyn GitHost>, locks: Arc<BranchLocks>) -> Self {
        Self {
            host,
            locks,
            policy: RefUpdatePolicy::default(),
            draft: false,
        }
    }

    pub fn with_policy(mut self, policy: RefUpdatePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_draft(mut self, draft: bool) -> Self {
        self.draft = draft;
        self
    }

    pub fn policy(&self) -> RefUpdatePolicy {
        self.policy
    }

    /// Point `commit.branch_name` at the new commit and open a pull request
    /// into `base_branch`.
    pub async fn publish(
        &self,
        repo: &RepoId,
        base_branch: &str,
        commit: &CommitRef,
        story: &StoryBrief,
    ) -> PipelineResult<PublishResult> {
        let branch = commit.branch_name.as_str();
        let _guard = self.locks.acquire(repo, branch).await;

        self.move_ref(repo, branch, &commit.new_commit_sha).await?;

        let request = NewPullRequest {
            title: story.title.trim().to_string(),
            head: branch.to_string(),
            base: base_branch.to_string(),
            body: pull_request_body(story, commit),
            draft: self.draft,
        };
        let (pr, existed) = self.open_pull_request(repo, &request).await?;

        info!(
            repo = %repo,
            branch = %branch,
            pr = pr.number,
            existed,
            "branch published"
        );
        Ok(PublishResult {
            branch_name: branch.to_string(),
            base_branch: base_branch.to_string(),
            commit_sha: commit.new_commit_sha.clone(),
            pull_request_url: pr.html_url,
            pull_request_number: pr.number,
            pull_request_existed: existed,
        })
    }

    async fn move_ref(&self, repo: &RepoId, branch: &str, sha: &str) -> PipelineResult<()> {
        match self.host.create_ref(repo, branch, sha).await {
            Ok(()) => return Ok(()),
            Err(HostError::AlreadyExists(_)) => {}
            Err(e) => return Err(e.into()),
        }

        let observed = self.host.get_branch_sha(repo, branch).await?;
        if observed == sha {
            info!(branch = %branch, "branch already at the new commit");
            return Ok(());
        }

        match self.policy {
            RefUpdatePolicy::FastForwardOnly => {
                match self.host.update_ref(repo, branch, sha, false).await {
                    Ok(()) => {
                        info!(branch = %branch, from = %observed, to = %sha, "branch fast-forwarded");
                        Ok(())
                    }
                    Err(HostError::Unprocessable(detail)) => {
                        obs::emit_ref_conflict(branch, Some(&observed), sha);
                        Err(PipelineError::RefConflict {
                            branch: branch.to_string(),
                            detail: format!("branch holds {observed}, which the new commit does not descend from: {detail}"),
                            observed_sha: Some(observed),
                        })
                    }
                    Err(e) => Err(e.into()),
                }
            }
            RefUpdatePolicy::Force => {
                self.host.update_ref(repo, branch, sha, true).await?;
                METRICS.inc_refs_force_updated();
                warn!(
                    branch = %branch,
                    orphaned = %observed,
                    to = %sha,
                    "branch force-updated"
                );
                Ok(())
            }
        }
    }

    async fn open_pull_request(
        &self,
        repo: &RepoId,
        request: &NewPullRequest,
    ) -> PipelineResult<(PullRequest, bool)> {
        match self.host.create_pull_request(repo, request).await {
            Ok(pr) => Ok((pr, false)),
            Err(HostError::AlreadyExists(detail)) => {
                match self
                    .host
                    .find_pull_request(repo, &request.head, &request.base)
                    .await?
                {
                    Some(pr) => {
                        info!(pr = pr.number, "pull request already open");
                        Ok((pr, true))
                    }
                    None => Err(PipelineError::RefConflict {
                        branch: request.head.clone(),
                        detail: format!("host reports an existing pull request that could not be found: {detail}"),
                        observed_sha: None,
                    }),
                }
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Pull request description: the story followed by the changed files.
pub fn pull_request_body(story: &StoryBrief, commit: &CommitRef) -> String {
    let mut body = String::new();
    if !story.description.trim().is_empty() {
        body.push_str(story.description.trim());
        body.push_str("\n\n");
    }
    if !story.acceptance_criteria.is_empty() {
        body.push_str("### Acceptance criteria\n");
        for criterion in &story.acceptance_criteria {
            body.push_str(&format!("- {criterion}\n"));
        }
        body.push('\n');
    }
    body.push_str("### Files\n");
    for entry in &commit.entries {
        body.push_str(&format!("- `{}`\n", entry.path));
    }
    body
}
