//! In-memory hosting fake (testing only)
//!
//! `MemoryGitHost` keeps a content-addressed object store per repository and
//! enforces the same ordering rules a real host does: a tree may only name
//! blobs that exist, a commit may only name an existing tree and parents, and
//! a ref may only point at an existing commit.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::HostError;
use crate::types::{
    CommitInfo, DirEntry, EntryKind, NewPullRequest, NewTreeEntry, ObjectKind, PullRequest,
    RepoId, TreeItem, FILE_MODE,
};
use crate::{GitHost, HostResult};

/// Operations that can be counted or made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostOp {
    GetBranchSha,
    GetCommit,
    GetTree,
    GetBlob,
    CreateBlob,
    CreateTree,
    CreateCommit,
    CreateRef,
    UpdateRef,
    ListBranches,
    DefaultBranch,
    ListDirectory,
    GetFileContent,
    CreatePullRequest,
    FindPullRequest,
}

#[derive(Debug, Clone)]
struct StoredCommit {
    tree: String,
    parents: Vec<String>,
}

#[derive(Debug, Default)]
struct RepoState {
    blobs: HashMap<String, Vec<u8>>,
    /// Flattened trees: full path -> blob sha
    trees: HashMap<String, BTreeMap<String, String>>,
    commits: HashMap<String, StoredCommit>,
    refs: BTreeMap<String, String>,
    default_branch: String,
    pulls: Vec<PullRequest>,
}

#[derive(Debug, Default)]
struct Inner {
    repos: HashMap<RepoId, RepoState>,
    calls: HashMap<HostOp, u64>,
    fail_next: HashMap<HostOp, HostError>,
    broken_files: HashMap<String, HostError>,
    commit_seq: u64,
}

fn object_sha(kind: &str, payload: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{kind} {}\0", payload.len()).as_bytes());
    hasher.update(payload);
    let mut hex = hex::encode(hasher.finalize());
    hex.truncate(40);
    hex
}

fn tree_sha(files: &BTreeMap<String, String>) -> String {
    let mut payload = Vec::new();
    for (path, sha) in files {
        payload.extend_from_slice(format!("{FILE_MODE} {path}\0{sha}\n").as_bytes());
    }
    object_sha("tree", &payload)
}

fn missing_repo(repo: &RepoId) -> HostError {
    HostError::NotFound(format!("repository {repo}"))
}

/// Content-addressed in-memory [`GitHost`].
#[derive(Debug, Default)]
pub struct MemoryGitHost {
    inner: Mutex<Inner>,
}

impl MemoryGitHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Count the call and return the injected failure, if one is armed.
    fn enter(&self, op: HostOp) -> HostResult<()> {
        let mut inner = self.lock();
        *inner.calls.entry(op).or_default() += 1;
        match inner.fail_next.remove(&op) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    // -- seeding ------------------------------------------------------------

    /// Create a repository with one root commit on `default_branch`.
    /// Returns the commit SHA.
    pub fn seed_repo(&self, repo: &RepoId, default_branch: &str, files: &[(&str, &str)]) -> String {
        let mut inner = self.lock();
        inner.commit_seq += 1;
        let seq = inner.commit_seq;
        let state = inner.repos.entry(repo.clone()).or_default();
        state.default_branch = default_branch.to_string();

        let mut tree = BTreeMap::new();
        for (path, content) in files {
            let sha = object_sha("blob", content.as_bytes());
            state.blobs.insert(sha.clone(), content.as_bytes().to_vec());
            tree.insert(path.to_string(), sha);
        }
        let tree_id = tree_sha(&tree);
        state.trees.insert(tree_id.clone(), tree);

        let commit_id = object_sha("commit", format!("{tree_id}\n{seq}\nseed").as_bytes());
        state.commits.insert(
            commit_id.clone(),
            StoredCommit {
                tree: tree_id,
                parents: Vec::new(),
            },
        );
        state.refs.insert(default_branch.to_string(), commit_id.clone());
        commit_id
    }

    /// Point a new branch at the tip of an existing one.
    pub fn add_branch(&self, repo: &RepoId, branch: &str, from: &str) {
        let mut inner = self.lock();
        if let Some(state) = inner.repos.get_mut(repo) {
            if let Some(sha) = state.refs.get(from).cloned() {
                state.refs.insert(branch.to_string(), sha);
            }
        }
    }

    /// Commit `files` on top of `branch` and advance it. Returns the new SHA.
    pub fn commit_on_branch(
        &self,
        repo: &RepoId,
        branch: &str,
        files: &[(&str, &str)],
    ) -> Option<String> {
        let mut inner = self.lock();
        inner.commit_seq += 1;
        let seq = inner.commit_seq;
        let state = inner.repos.get_mut(repo)?;
        let parent = state.refs.get(branch)?.clone();
        let mut tree = state.trees.get(&state.commits.get(&parent)?.tree)?.clone();
        for (path, content) in files {
            let sha = object_sha("blob", content.as_bytes());
            state.blobs.insert(sha.clone(), content.as_bytes().to_vec());
            tree.insert(path.to_string(), sha);
        }
        let tree_id = tree_sha(&tree);
        state.trees.insert(tree_id.clone(), tree);
        let commit_id = object_sha("commit", format!("{tree_id}\n{parent}\n{seq}").as_bytes());
        state.commits.insert(
            commit_id.clone(),
            StoredCommit {
                tree: tree_id,
                parents: vec![parent],
            },
        );
        state.refs.insert(branch.to_string(), commit_id.clone());
        Some(commit_id)
    }

    // -- fault injection ----------------------------------------------------

    /// Make the next call of `op` fail with `err`.
    pub fn fail_next(&self, op: HostOp, err: HostError) {
        self.lock().fail_next.insert(op, err);
    }

    /// Make every content fetch of `path` fail with `err`.
    pub fn break_file(&self, path: &str, err: HostError) {
        self.lock().broken_files.insert(path.to_string(), err);
    }

    // -- inspection ---------------------------------------------------------

    /// Number of times `op` was invoked.
    pub fn calls(&self, op: HostOp) -> u64 {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Current tip of `branch`.
    pub fn branch_sha(&self, repo: &RepoId, branch: &str) -> Option<String> {
        self.lock().repos.get(repo)?.refs.get(branch).cloned()
    }

    /// Parents of a commit.
    pub fn commit_parents(&self, repo: &RepoId, sha: &str) -> Option<Vec<String>> {
        Some(self.lock().repos.get(repo)?.commits.get(sha)?.parents.clone())
    }

    /// Every file of the tree behind `commit_sha`, decoded as text.
    pub fn files_at(&self, repo: &RepoId, commit_sha: &str) -> Option<BTreeMap<String, String>> {
        let inner = self.lock();
        let state = inner.repos.get(repo)?;
        let tree = state.trees.get(&state.commits.get(commit_sha)?.tree)?;
        tree.iter()
            .map(|(path, sha)| {
                let bytes = state.blobs.get(sha)?;
                Some((path.clone(), String::from_utf8_lossy(bytes).into_owned()))
            })
            .collect()
    }

    /// Blob SHA recorded for `path` in the tree behind `commit_sha`.
    pub fn blob_sha_at(&self, repo: &RepoId, commit_sha: &str, path: &str) -> Option<String> {
        let inner = self.lock();
        let state = inner.repos.get(repo)?;
        let tree = state.trees.get(&state.commits.get(commit_sha)?.tree)?;
        tree.get(path).cloned()
    }

    /// Open pull requests.
    pub fn pull_requests(&self, repo: &RepoId) -> Vec<PullRequest> {
        self.lock()
            .repos
            .get(repo)
            .map(|s| s.pulls.clone())
            .unwrap_or_default()
    }

    fn resolve_tree(state: &RepoState, git_ref: &str) -> HostResult<BTreeMap<String, String>> {
        let commit = state
            .refs
            .get(git_ref)
            .cloned()
            .unwrap_or_else(|| git_ref.to_string());
        let stored = state
            .commits
            .get(&commit)
            .ok_or_else(|| HostError::NotFound(format!("No commit found for the ref {git_ref}")))?;
        state
            .trees
            .get(&stored.tree)
            .cloned()
            .ok_or_else(|| HostError::NotFound(format!("tree {}", stored.tree)))
    }

    fn is_ancestor(state: &RepoState, ancestor: &str, descendant: &str) -> bool {
        let mut stack = vec![descendant.to_string()];
        while let Some(sha) = stack.pop() {
            if sha == ancestor {
                return true;
            }
            if let Some(c) = state.commits.get(&sha) {
                stack.extend(c.parents.iter().cloned());
            }
        }
        false
    }
}

#[async_trait]
impl GitHost for MemoryGitHost {
    async fn get_branch_sha(&self, repo: &RepoId, branch: &str) -> HostResult<String> {
        self.enter(HostOp::GetBranchSha)?;
        let inner = self.lock();
        let state = inner.repos.get(repo).ok_or_else(|| missing_repo(repo))?;
        state
            .refs
            .get(branch)
            .cloned()
            .ok_or_else(|| HostError::NotFound(format!("refs/heads/{branch}")))
    }

    async fn get_commit(&self, repo: &RepoId, sha: &str) -> HostResult<CommitInfo> {
        self.enter(HostOp::GetCommit)?;
        let inner = self.lock();
        let state = inner.repos.get(repo).ok_or_else(|| missing_repo(repo))?;
        let c = state
            .commits
            .get(sha)
            .ok_or_else(|| HostError::NotFound(format!("commit {sha}")))?;
        Ok(CommitInfo {
            sha: sha.to_string(),
            tree_sha: c.tree.clone(),
            parents: c.parents.clone(),
        })
    }

    async fn get_tree_recursive(&self, repo: &RepoId, tree_sha: &str) -> HostResult<Vec<TreeItem>> {
        self.enter(HostOp::GetTree)?;
        let inner = self.lock();
        let state = inner.repos.get(repo).ok_or_else(|| missing_repo(repo))?;
        let tree = state
            .trees
            .get(tree_sha)
            .ok_or_else(|| HostError::NotFound(format!("tree {tree_sha}")))?;
        Ok(tree
            .iter()
            .map(|(path, sha)| TreeItem {
                path: path.clone(),
                mode: FILE_MODE.to_string(),
                kind: ObjectKind::Blob,
                sha: sha.clone(),
            })
            .collect())
    }

    async fn get_blob(&self, repo: &RepoId, sha: &str) -> HostResult<Vec<u8>> {
        self.enter(HostOp::GetBlob)?;
        let inner = self.lock();
        let state = inner.repos.get(repo).ok_or_else(|| missing_repo(repo))?;
        state
            .blobs
            .get(sha)
            .cloned()
            .ok_or_else(|| HostError::NotFound(format!("blob {sha}")))
    }

    async fn create_blob(&self, repo: &RepoId, content: &str) -> HostResult<String> {
        self.enter(HostOp::CreateBlob)?;
        let mut inner = self.lock();
        let state = inner.repos.get_mut(repo).ok_or_else(|| missing_repo(repo))?;
        let sha = object_sha("blob", content.as_bytes());
        state.blobs.insert(sha.clone(), content.as_bytes().to_vec());
        Ok(sha)
    }

    async fn create_tree(
        &self,
        repo: &RepoId,
        base_tree: &str,
        entries: &[NewTreeEntry],
    ) -> HostResult<String> {
        self.enter(HostOp::CreateTree)?;
        let mut inner = self.lock();
        let state = inner.repos.get_mut(repo).ok_or_else(|| missing_repo(repo))?;
        let mut tree = state
            .trees
            .get(base_tree)
            .cloned()
            .ok_or_else(|| HostError::Unprocessable(format!("base_tree {base_tree} is not a tree")))?;
        for entry in entries {
            if !state.blobs.contains_key(&entry.sha) {
                return Err(HostError::Unprocessable(format!(
                    "tree.sha {} is not a valid blob",
                    entry.sha
                )));
            }
            tree.insert(entry.path.clone(), entry.sha.clone());
        }
        let sha = tree_sha(&tree);
        state.trees.insert(sha.clone(), tree);
        Ok(sha)
    }

    async fn create_commit(
        &self,
        repo: &RepoId,
        message: &str,
        tree_sha: &str,
        parents: &[String],
    ) -> HostResult<String> {
        self.enter(HostOp::CreateCommit)?;
        let mut inner = self.lock();
        inner.commit_seq += 1;
        let seq = inner.commit_seq;
        let state = inner.repos.get_mut(repo).ok_or_else(|| missing_repo(repo))?;
        if !state.trees.contains_key(tree_sha) {
            return Err(HostError::Unprocessable(format!("tree {tree_sha} does not exist")));
        }
        if let Some(missing) = parents.iter().find(|p| !state.commits.contains_key(*p)) {
            return Err(HostError::Unprocessable(format!("parent {missing} does not exist")));
        }
        let sha = object_sha(
            "commit",
            format!("{tree_sha}\n{}\n{message}\n{seq}", parents.join(",")).as_bytes(),
        );
        state.commits.insert(
            sha.clone(),
            StoredCommit {
                tree: tree_sha.to_string(),
                parents: parents.to_vec(),
            },
        );
        Ok(sha)
    }

    async fn create_ref(&self, repo: &RepoId, branch: &str, sha: &str) -> HostResult<()> {
        self.enter(HostOp::CreateRef)?;
        let mut inner = self.lock();
        let state = inner.repos.get_mut(repo).ok_or_else(|| missing_repo(repo))?;
        if state.refs.contains_key(branch) {
            return Err(HostError::AlreadyExists("Reference already exists".to_string()));
        }
        if !state.commits.contains_key(sha) {
            return Err(HostError::Unprocessable("Object does not exist".to_string()));
        }
        state.refs.insert(branch.to_string(), sha.to_string());
        Ok(())
    }

    async fn update_ref(
        &self,
        repo: &RepoId,
        branch: &str,
        sha: &str,
        force: bool,
    ) -> HostResult<()> {
        self.enter(HostOp::UpdateRef)?;
        let mut inner = self.lock();
        let state = inner.repos.get_mut(repo).ok_or_else(|| missing_repo(repo))?;
        let current = state
            .refs
            .get(branch)
            .cloned()
            .ok_or_else(|| HostError::Unprocessable("Reference does not exist".to_string()))?;
        if !state.commits.contains_key(sha) {
            return Err(HostError::Unprocessable("Object does not exist".to_string()));
        }
        if !force && !Self::is_ancestor(state, &current, sha) {
            return Err(HostError::Unprocessable(
                "Update is not a fast forward".to_string(),
            ));
        }
        state.refs.insert(branch.to_string(), sha.to_string());
        Ok(())
    }

    async fn list_branches(&self, repo: &RepoId) -> HostResult<Vec<String>> {
        self.enter(HostOp::ListBranches)?;
        let inner = self.lock();
        let state = inner.repos.get(repo).ok_or_else(|| missing_repo(repo))?;
        Ok(state.refs.keys().cloned().collect())
    }

    async fn default_branch(&self, repo: &RepoId) -> HostResult<String> {
        self.enter(HostOp::DefaultBranch)?;
        let inner = self.lock();
        let state = inner.repos.get(repo).ok_or_else(|| missing_repo(repo))?;
        Ok(state.default_branch.clone())
    }

    async fn list_directory(
        &self,
        repo: &RepoId,
        path: &str,
        git_ref: &str,
    ) -> HostResult<Vec<DirEntry>> {
        self.enter(HostOp::ListDirectory)?;
        let inner = self.lock();
        let state = inner.repos.get(repo).ok_or_else(|| missing_repo(repo))?;
        let tree = Self::resolve_tree(state, git_ref)?;
        let dir = path.trim_matches('/');

        if let Some(sha) = tree.get(dir) {
            let name = dir.rsplit('/').next().unwrap_or(dir).to_string();
            return Ok(vec![DirEntry {
                name,
                path: dir.to_string(),
                kind: EntryKind::File,
                sha: Some(sha.clone()),
            }]);
        }

        let prefix = if dir.is_empty() {
            String::new()
        } else {
            format!("{dir}/")
        };
        let mut entries: Vec<DirEntry> = Vec::new();
        for (file_path, sha) in tree.iter() {
            let Some(rest) = file_path.strip_prefix(&prefix) else {
                continue;
            };
            match rest.split_once('/') {
                Some((child, _)) => {
                    let child_path = format!("{prefix}{child}");
                    if !entries.iter().any(|e| e.path == child_path) {
                        entries.push(DirEntry {
                            name: child.to_string(),
                            path: child_path,
                            kind: EntryKind::Dir,
                            sha: None,
                        });
                    }
                }
                None => entries.push(DirEntry {
                    name: rest.to_string(),
                    path: file_path.clone(),
                    kind: EntryKind::File,
                    sha: Some(sha.clone()),
                }),
            }
        }

        if entries.is_empty() && !dir.is_empty() {
            return Err(HostError::NotFound(format!("path {dir}")));
        }
        Ok(entries)
    }

    async fn get_file_content(
        &self,
        repo: &RepoId,
        path: &str,
        git_ref: &str,
    ) -> HostResult<String> {
        self.enter(HostOp::GetFileContent)?;
        let inner = self.lock();
        if let Some(err) = inner.broken_files.get(path) {
            return Err(err.clone());
        }
        let state = inner.repos.get(repo).ok_or_else(|| missing_repo(repo))?;
        let tree = Self::resolve_tree(state, git_ref)?;
        let sha = tree
            .get(path)
            .ok_or_else(|| HostError::NotFound(format!("path {path}")))?;
        let bytes = state
            .blobs
            .get(sha)
            .ok_or_else(|| HostError::NotFound(format!("blob {sha}")))?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    async fn create_pull_request(
        &self,
        repo: &RepoId,
        pr: &NewPullRequest,
    ) -> HostResult<PullRequest> {
        self.enter(HostOp::CreatePullRequest)?;
        let mut inner = self.lock();
        let state = inner.repos.get_mut(repo).ok_or_else(|| missing_repo(repo))?;
        if !state.refs.contains_key(&pr.head) || !state.refs.contains_key(&pr.base) {
            return Err(HostError::Unprocessable(
                "Validation Failed: head or base branch is invalid".to_string(),
            ));
        }
        if state
            .pulls
            .iter()
            .any(|p| p.head == pr.head && p.base == pr.base)
        {
            return Err(HostError::AlreadyExists(format!(
                "Validation Failed: A pull request already exists for {}:{}.",
                repo.owner, pr.head
            )));
        }
        let number = state.pulls.len() as u64 + 1;
        let created = PullRequest {
            number,
            html_url: format!("https://github.test/{}/{}/pull/{number}", repo.owner, repo.name),
            head: pr.head.clone(),
            base: pr.base.clone(),
        };
        state.pulls.push(created.clone());
        Ok(created)
    }

    async fn find_pull_request(
        &self,
        repo: &RepoId,
        head: &str,
        base: &str,
    ) -> HostResult<Option<PullRequest>> {
        self.enter(HostOp::FindPullRequest)?;
        let inner = self.lock();
        let state = inner.repos.get(repo).ok_or_else(|| missing_repo(repo))?;
        Ok(state
            .pulls
            .iter()
            .find(|p| p.head == head && p.base == base)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> RepoId {
        RepoId::new("acme", "crm")
    }

    #[tokio::test]
    async fn test_blob_sha_is_content_addressed() {
        let host = MemoryGitHost::new();
        host.seed_repo(&repo(), "main", &[]);
        let a = host.create_blob(&repo(), "hello").await.unwrap();
        let b = host.create_blob(&repo(), "hello").await.unwrap();
        let c = host.create_blob(&repo(), "hello!").await.unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 40);
        assert_eq!(host.calls(HostOp::CreateBlob), 3);
    }

    #[tokio::test]
    async fn test_tree_rejects_unknown_blob() {
        let host = MemoryGitHost::new();
        let head = host.seed_repo(&repo(), "main", &[("a.txt", "a")]);
        let base = host.get_commit(&repo(), &head).await.unwrap().tree_sha;
        let err = host
            .create_tree(&repo(), &base, &[NewTreeEntry::blob("b.txt", "deadbeef")])
            .await
            .unwrap_err();
        assert!(matches!(err, HostError::Unprocessable(_)));
    }

    #[tokio::test]
    async fn test_fail_next_fires_once() {
        let host = MemoryGitHost::new();
        host.seed_repo(&repo(), "main", &[]);
        host.fail_next(HostOp::ListBranches, HostError::Transport("reset".into()));
        assert!(host.list_branches(&repo()).await.is_err());
        assert_eq!(host.list_branches(&repo()).await.unwrap(), vec!["main"]);
    }
}
