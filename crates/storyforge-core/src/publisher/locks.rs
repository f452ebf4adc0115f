//! In-process serialization of publishes per `(repository, branch)`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use remote_git::RepoId;
use tokio::sync::OwnedMutexGuard;

/// Keyed async mutexes. Holding the guard excludes every other publish to
/// the same branch of the same repository in this process.
#[derive(Debug, Default)]
pub struct BranchLocks {
    handles: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl BranchLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, key: String) -> Arc<tokio::sync::Mutex<()>> {
        let mut handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
        // Drop entries nobody holds or waits on.
        handles.retain(|_, h| Arc::strong_count(h) > 1);
        handles.entry(key).or_default().clone()
    }

    pub async fn acquire(&self, repo: &RepoId, branch: &str) -> OwnedMutexGuard<()> {
        self.handle(format!("{repo}#{branch}")).lock_owned().await
    }

    /// Number of keys currently tracked.
    pub fn tracked(&self) -> usize {
        self.handles.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
