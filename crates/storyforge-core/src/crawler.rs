//! Remote repository crawler.
//!
//! Walks a branch's directory tree through the hosting API with an explicit
//! stack, so depth is bounded by heap rather than call stack, then fetches the
//! selected files through a bounded-concurrency stream. The resulting order is
//! the depth-first order a recursive walk would produce.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use remote_git::{DirEntry, EntryKind, GitHost, HostError, RepoId};
use tracing::{debug, info, warn};

use crate::domain::{PipelineResult, RepoFile};
use crate::metrics::METRICS;

/// Extensions fetched by the crawler (lowercase, without the dot).
pub const ALLOWED_EXTENSIONS: &[&str] = &[
    // Salesforce metadata and source
    "cls", "trigger", "page", "component", "cmp", "app", "evt", "design", "auradoc", "apex",
    "soql",
    // Web / UI
    "js", "ts", "jsx", "tsx", "mjs", "html", "css", "scss", "svg",
    // General source
    "py", "java", "rb", "go", "rs", "kt", "php", "cs", "sh", "sql",
    // Text and config
    "xml", "json", "yml", "yaml", "toml", "md", "txt", "properties", "csv",
];

/// Extension-less file names fetched by the crawler.
pub const ALLOWED_NAMES: &[&str] = &["Dockerfile", "Makefile", "Procfile", "LICENSE", "README"];

/// Whether a file with this name is fetched.
pub fn is_crawlable(name: &str) -> bool {
    if name.len() > 1 && name.starts_with('.') {
        return true;
    }
    if ALLOWED_NAMES.contains(&name) {
        return true;
    }
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => {
            let ext = ext.to_ascii_lowercase();
            ALLOWED_EXTENSIONS.contains(&ext.as_str())
        }
        _ => false,
    }
}

/// Enumerates and fetches the text files of a branch.
pub struct RepositoryCrawler {
    host: Arc<dyn GitHost>,
    concurrency: usize,
}

impl RepositoryCrawler {
    pub fn new(host: Arc<dyn GitHost>, concurrency: usize) -> Self {
        Self {
            host,
            concurrency: concurrency.max(1),
        }
    }

    /// List a directory. A missing path is empty; only auth and transport
    /// failures are returned as errors.
    async fn list(&self, repo: &RepoId, branch: &str, path: &str) -> PipelineResult<Vec<DirEntry>> {
        match self.host.list_directory(repo, path, branch).await {
            Ok(entries) => Ok(entries),
            Err(e) if e.is_not_found() => {
                debug!(path = %path, "path not found, treating as empty");
                Ok(Vec::new())
            }
            Err(e) if e.is_fatal_for_crawl() => Err(e.into()),
            Err(e) => {
                warn!(path = %path, error = %e, "skipping unreadable directory");
                Ok(Vec::new())
            }
        }
    }

    /// Collect every crawlable file entry under `root`, depth-first.
    async fn walk(&self, repo: &RepoId, branch: &str, root: &str) -> PipelineResult<Vec<DirEntry>> {
        let mut stack: Vec<DirEntry> = self.list(repo, branch, root).await?;
        stack.reverse();
        let mut files = Vec::new();

        while let Some(entry) = stack.pop() {
            match entry.kind {
                EntryKind::File if is_crawlable(&entry.name) => files.push(entry),
                EntryKind::Dir => {
                    let mut children = self.list(repo, branch, &entry.path).await?;
                    children.reverse();
                    stack.extend(children);
                }
                _ => {}
            }
        }
        Ok(files)
    }

    async fn fetch(
        &self,
        repo: &RepoId,
        branch: &str,
        entry: DirEntry,
    ) -> PipelineResult<Option<RepoFile>> {
        match self.host.get_file_content(repo, &entry.path, branch).await {
            Ok(content) => Ok(Some(RepoFile {
                path: entry.path,
                content,
                blob_sha: entry.sha,
            })),
            Err(e @ (HostError::Auth { .. } | HostError::Transport(_))) => Err(e.into()),
            Err(e) => {
                warn!(path = %entry.path, error = %e, "skipping file that could not be fetched");
                Ok(None)
            }
        }
    }

    /// Fetch every crawlable file under `root` on `branch`.
    pub async fn crawl(
        &self,
        repo: &RepoId,
        branch: &str,
        root: &str,
    ) -> PipelineResult<Vec<RepoFile>> {
        let root = root.trim_matches('/');
        let entries = self.walk(repo, branch, root).await?;
        let wanted = entries.len();

        let results: Vec<PipelineResult<Option<RepoFile>>> = stream::iter(entries)
            .map(|entry| self.fetch(repo, branch, entry))
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut files = Vec::with_capacity(wanted);
        for result in results {
            if let Some(file) = result? {
                METRICS.inc_files_crawled();
                files.push(file);
            }
        }

        info!(
            repo = %repo,
            branch = %branch,
            files = files.len(),
            skipped = wanted - files.len(),
            "crawl finished"
        );
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_list() {
        assert!(is_crawlable("AccountController.cls"));
        assert!(is_crawlable("OpportunityTrigger.trigger"));
        assert!(is_crawlable("Home.page"));
        assert!(is_crawlable("Header.component"));
        assert!(is_crawlable("accountList.js-meta.xml"));
        assert!(is_crawlable("README.MD"));
        assert!(is_crawlable(".forceignore"));
        assert!(is_crawlable("Makefile"));

        assert!(!is_crawlable("logo.png"));
        assert!(!is_crawlable("archive.zip"));
        assert!(!is_crawlable("."));
        assert!(!is_crawlable("noext"));
    }
}
