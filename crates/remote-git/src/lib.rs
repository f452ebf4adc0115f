//! Remote-Git: hosting API access without a local clone
//!
//! This crate is the storage layer of Storyforge. Everything the pipeline
//! knows about a repository arrives through the [`GitHost`] trait: reading
//! refs, commits, trees and blobs, writing new objects, moving branch refs and
//! opening pull requests.
//!
//! ## Layer 0 - Remote object store
//!
//! - [`github::GitHubClient`] talks to a GitHub-compatible REST API.
//! - [`fakes::MemoryGitHost`] is a content-addressed in-memory host used by
//!   tests across the workspace.

pub mod error;
pub mod fakes;
pub mod github;
pub mod types;

use async_trait::async_trait;

pub use error::HostError;
pub use github::{GitHubClient, GitHubConfig};
pub use types::{
    CommitInfo, DirEntry, EntryKind, NewPullRequest, NewTreeEntry, ObjectKind, PullRequest,
    RepoId, TreeItem, FILE_MODE,
};

/// Result type for hosting operations
pub type HostResult<T> = std::result::Result<T, HostError>;

/// Git hosting provider operations used by the pipeline.
///
/// Guarantees expected of implementations:
/// - `create_blob` returns the content address of the stored bytes.
/// - `create_tree` with a `base_tree` inherits every path not named in `entries`.
/// - `create_ref` fails with [`HostError::AlreadyExists`] when the ref exists.
/// - `update_ref` with `force = false` fails with [`HostError::Unprocessable`]
///   unless the move is a fast-forward.
/// - `create_pull_request` fails with [`HostError::AlreadyExists`] when an open
///   pull request for the same head/base pair exists.
#[async_trait]
pub trait GitHost: Send + Sync {
    /// Resolve `refs/heads/<branch>` to a commit SHA.
    async fn get_branch_sha(&self, repo: &RepoId, branch: &str) -> HostResult<String>;

    /// Read a commit object.
    async fn get_commit(&self, repo: &RepoId, sha: &str) -> HostResult<CommitInfo>;

    /// List a tree recursively (blobs and subtrees, full paths).
    async fn get_tree_recursive(&self, repo: &RepoId, tree_sha: &str) -> HostResult<Vec<TreeItem>>;

    /// Read and decode a blob's bytes.
    async fn get_blob(&self, repo: &RepoId, sha: &str) -> HostResult<Vec<u8>>;

    /// Store a UTF-8 blob and return its SHA.
    async fn create_blob(&self, repo: &RepoId, content: &str) -> HostResult<String>;

    /// Create a tree from `entries` layered over `base_tree`.
    async fn create_tree(
        &self,
        repo: &RepoId,
        base_tree: &str,
        entries: &[NewTreeEntry],
    ) -> HostResult<String>;

    /// Create a commit pointing at `tree_sha` with the given parents.
    async fn create_commit(
        &self,
        repo: &RepoId,
        message: &str,
        tree_sha: &str,
        parents: &[String],
    ) -> HostResult<String>;

    /// Create `refs/heads/<branch>` at `sha`.
    async fn create_ref(&self, repo: &RepoId, branch: &str, sha: &str) -> HostResult<()>;

    /// Move `refs/heads/<branch>` to `sha`.
    async fn update_ref(&self, repo: &RepoId, branch: &str, sha: &str, force: bool)
        -> HostResult<()>;

    /// All branch names.
    async fn list_branches(&self, repo: &RepoId) -> HostResult<Vec<String>>;

    /// The repository's configured default branch.
    async fn default_branch(&self, repo: &RepoId) -> HostResult<String>;

    /// Immediate children of `path` (empty string for the root) at `git_ref`.
    async fn list_directory(
        &self,
        repo: &RepoId,
        path: &str,
        git_ref: &str,
    ) -> HostResult<Vec<DirEntry>>;

    /// Raw text content of a file at `git_ref`.
    async fn get_file_content(&self, repo: &RepoId, path: &str, git_ref: &str)
        -> HostResult<String>;

    /// Open a pull request.
    async fn create_pull_request(
        &self,
        repo: &RepoId,
        pr: &NewPullRequest,
    ) -> HostResult<PullRequest>;

    /// Find the open pull request for a head/base pair, if any.
    async fn find_pull_request(
        &self,
        repo: &RepoId,
        head: &str,
        base: &str,
    ) -> HostResult<Option<PullRequest>>;
}
