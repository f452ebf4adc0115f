//! Base-branch resolution: exact name, then case-insensitive, then the
//! repository default.

use remote_git::{GitHost, RepoId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::{PipelineError, PipelineResult};

/// Which step of the resolution chain produced the branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    Exact,
    CaseInsensitive,
    DefaultBranch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedBranch {
    pub name: String,
    pub commit_sha: String,
    pub via: ResolutionSource,
}

/// Tip of `branch`, or `None` when the host does not know it.
async fn lookup(host: &dyn GitHost, repo: &RepoId, branch: &str) -> PipelineResult<Option<String>> {
    match host.get_branch_sha(repo, branch).await {
        Ok(sha) => Ok(Some(sha)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub async fn resolve_base_branch(
    host: &dyn GitHost,
    repo: &RepoId,
    preferred: &str,
) -> PipelineResult<ResolvedBranch> {
    let preferred = preferred.trim();
    if !preferred.is_empty() {
        if let Some(sha) = lookup(host, repo, preferred).await? {
            return Ok(resolved(preferred, sha, ResolutionSource::Exact));
        }
        debug!(branch = %preferred, "no exact match, trying case-insensitive");

        let branches = host.list_branches(repo).await?;
        if let Some(name) = branches.iter().find(|b| b.eq_ignore_ascii_case(preferred)) {
            if let Some(sha) = lookup(host, repo, name).await? {
                return Ok(resolved(name, sha, ResolutionSource::CaseInsensitive));
            }
        }
    }

    let default = host.default_branch(repo).await?;
    let sha = lookup(host, repo, &default)
        .await?
        .ok_or_else(|| PipelineError::NotFound(format!("default branch {default} of {repo}")))?;
    Ok(resolved(&default, sha, ResolutionSource::DefaultBranch))
}

fn resolved(name: &str, commit_sha: String, via: ResolutionSource) -> ResolvedBranch {
    info!(branch = %name, via = ?via, "base branch resolved");
    ResolvedBranch {
        name: name.to_string(),
        commit_sha,
        via,
    }
}
