//! Crawling a hosted branch and routing queries over the result.

use std::sync::Arc;

use remote_git::fakes::{HostOp, MemoryGitHost};
use remote_git::{HostError, RepoId};
use storyforge_core::{
    render_directory_tree, Detector, PipelineError, RelevanceRouter, RepositoryCrawler,
};

fn repo() -> RepoId {
    RepoId::new("acme", "crm")
}

fn seeded() -> Arc<MemoryGitHost> {
    let host = Arc::new(MemoryGitHost::new());
    host.seed_repo(
        &repo(),
        "main",
        &[
            ("README.md", "# crm"),
            ("force-app/a.cls", "public class A {}"),
            ("force-app/lwc/tile/tile.js", "import { LightningElement } from 'lwc';"),
            ("force-app/lwc/tile/logo.png", "\u{89}PNG"),
            ("force-app/z.cls", "public class Z {}"),
            (".forceignore", "**/jsconfig.json"),
        ],
    );
    host
}

#[tokio::test]
async fn test_crawl_returns_allowed_files_depth_first() {
    let host = seeded();
    let files = RepositoryCrawler::new(host.clone(), 4)
        .crawl(&repo(), "main", "")
        .await
        .unwrap();

    let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(
        paths,
        vec![
            ".forceignore",
            "README.md",
            "force-app/a.cls",
            "force-app/lwc/tile/tile.js",
            "force-app/z.cls",
        ]
    );
    assert!(files.iter().all(|f| f.blob_sha.is_some()));
    assert_eq!(files[2].content, "public class A {}");
}

#[tokio::test]
async fn test_crawl_of_missing_path_is_empty() {
    let host = seeded();
    let files = RepositoryCrawler::new(host, 4)
        .crawl(&repo(), "main", "does/not/exist")
        .await
        .unwrap();
    assert!(files.is_empty());
}

#[tokio::test]
async fn test_crawl_skips_unreadable_file() {
    let host = seeded();
    host.break_file(
        "force-app/z.cls",
        HostError::Api {
            status: 500,
            message: "server error".into(),
        },
    );
    let files = RepositoryCrawler::new(host.clone(), 2)
        .crawl(&repo(), "main", "force-app")
        .await
        .unwrap();
    let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(paths, vec!["force-app/a.cls", "force-app/lwc/tile/tile.js"]);
    assert_eq!(host.calls(HostOp::GetFileContent), 3);
}

#[tokio::test]
async fn test_crawl_propagates_auth_failure() {
    let host = seeded();
    host.break_file(
        "README.md",
        HostError::Auth {
            status: 401,
            message: "Bad credentials".into(),
        },
    );
    let err = RepositoryCrawler::new(host, 4)
        .crawl(&repo(), "main", "")
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Auth(_)));
}

#[tokio::test]
async fn test_crawl_propagates_listing_transport_failure() {
    let host = seeded();
    host.fail_next(HostOp::ListDirectory, HostError::Transport("connection reset".into()));
    let err = RepositoryCrawler::new(host, 4)
        .crawl(&repo(), "main", "")
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Transport(_)));
}

#[tokio::test]
async fn test_scope_gate_over_crawled_files() {
    let host = Arc::new(MemoryGitHost::new());
    host.seed_repo(
        &repo(),
        "main",
        &[
            (
                "force-app/main/default/classes/AccountController.cls",
                "public with sharing class AccountController {}",
            ),
            (
                "force-app/main/default/lwc/accountList/accountList.js",
                "import { LightningElement } from 'lwc';",
            ),
        ],
    );
    let files = RepositoryCrawler::new(host, 4)
        .crawl(&repo(), "main", "")
        .await
        .unwrap();
    let router = RelevanceRouter::new();

    let decision = router.route("What's the weather today?", &files);
    assert!(!decision.in_scope());

    let decision = router.route("explain AccountController apex class", &files);
    assert!(decision.in_scope());
    assert_eq!(decision.decisive(), Some(Detector::IdentifierMention));
    let selected: Vec<&str> = decision
        .selected_files()
        .iter()
        .map(|f| f.path.as_str())
        .collect();
    assert_eq!(
        selected,
        vec!["force-app/main/default/classes/AccountController.cls"]
    );
}

#[tokio::test]
async fn test_search_verb_after_polite_lead_in() {
    let host = Arc::new(MemoryGitHost::new());
    host.seed_repo(
        &repo(),
        "main",
        &[
            (
                "force-app/main/default/lwc/contactCard/contactCard.js",
                "import { getRecord } from 'lightning/uiRecordApi';",
            ),
            (
                "force-app/main/default/lwc/tileGrid/tileGrid.js",
                "import { LightningElement } from 'lwc';",
            ),
        ],
    );
    let files = RepositoryCrawler::new(host, 4)
        .crawl(&repo(), "main", "")
        .await
        .unwrap();
    let router = RelevanceRouter::new();

    for query in [
        "Can you find every component calling getRecord?",
        "Please list components referencing getRecord",
    ] {
        let decision = router.route(query, &files);
        assert_eq!(decision.decisive(), Some(Detector::CodebaseSearch), "{query}");
        let selected: Vec<&str> = decision
            .selected_files()
            .iter()
            .map(|f| f.path.as_str())
            .collect();
        assert_eq!(
            selected,
            vec!["force-app/main/default/lwc/contactCard/contactCard.js"],
            "{query}"
        );
    }
}

#[test]
fn test_directory_rendering_siblings_and_nesting() {
    let text = render_directory_tree(["a/b.cls", "a/c.trigger", "d.txt"]);
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines, vec!["- a/", "  - b.cls", "  - c.trigger", "- d.txt"]);
}
