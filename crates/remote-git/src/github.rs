//! GitHub REST client
//!
//! Implements [`GitHost`] over the GitHub (or GitHub Enterprise) REST API
//! using the Git Data endpoints, so no working copy is ever needed.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::HostError;
use crate::types::{
    CommitInfo, DirEntry, NewPullRequest, NewTreeEntry, PullRequest, RepoId, TreeItem,
};
use crate::{GitHost, HostResult};

/// Public GitHub API endpoint
const DEFAULT_API_URL: &str = "https://api.github.com";

/// REST API version header value
const API_VERSION: &str = "2022-11-28";

/// Branch listing page size (the API maximum)
const PAGE_SIZE: usize = 100;

/// GitHub client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// API base URL
    pub api_url: String,
    /// Personal access token sent as a bearer credential
    pub token: Option<String>,
    /// Descriptive client identifier, sent on every request
    pub user_agent: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        GitHubConfig {
            api_url: std::env::var("GITHUB_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            token: std::env::var("GITHUB_TOKEN").ok().filter(|t| !t.trim().is_empty()),
            user_agent: concat!("storyforge-remote-git/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl GitHubConfig {
    /// Create a new config from environment variables
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Config for an explicit API endpoint
    pub fn new(api_url: &str) -> Self {
        GitHubConfig {
            api_url: api_url.to_string(),
            token: None,
            user_agent: Self::default().user_agent,
        }
    }

    /// Set the access token
    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    /// Set the client identifier
    pub fn with_user_agent(mut self, user_agent: &str) -> Self {
        self.user_agent = user_agent.to_string();
        self
    }
}

// ---------------------------------------------------------------------------
// Wire schemas
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct ShaOnly {
    sha: String,
}

#[derive(Deserialize)]
struct RefResponse {
    object: ShaOnly,
}

#[derive(Deserialize)]
struct CommitResponse {
    sha: String,
    tree: ShaOnly,
    #[serde(default)]
    parents: Vec<ShaOnly>,
}

#[derive(Deserialize)]
struct TreeResponse {
    tree: Vec<TreeItem>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Deserialize)]
pub(crate) struct BlobPayload {
    pub(crate) content: String,
    pub(crate) encoding: String,
}

#[derive(Deserialize)]
struct BranchResponse {
    name: String,
}

#[derive(Deserialize)]
struct RepoResponse {
    default_branch: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum ContentsResponse {
    Listing(Vec<DirEntry>),
    Single(DirEntry),
}

#[derive(Deserialize)]
struct PullBranch {
    #[serde(rename = "ref")]
    name: String,
}

#[derive(Deserialize)]
struct PullResponse {
    number: u64,
    html_url: String,
    head: PullBranch,
    base: PullBranch,
}

impl From<PullResponse> for PullRequest {
    fn from(p: PullResponse) -> Self {
        PullRequest {
            number: p.number,
            html_url: p.html_url,
            head: p.head.name,
            base: p.base.name,
        }
    }
}

#[derive(Deserialize, Default)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    errors: Vec<ErrorDetail>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorDetail {
    Text(String),
    Object {
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        code: Option<String>,
    },
}

#[derive(Serialize)]
struct CreateBlob<'a> {
    content: &'a str,
    encoding: &'static str,
}

#[derive(Serialize)]
struct CreateTree<'a> {
    base_tree: &'a str,
    tree: &'a [NewTreeEntry],
}

#[derive(Serialize)]
struct CreateCommit<'a> {
    message: &'a str,
    tree: &'a str,
    parents: &'a [String],
}

#[derive(Serialize)]
struct CreateRef<'a> {
    #[serde(rename = "ref")]
    name: String,
    sha: &'a str,
}

#[derive(Serialize)]
struct UpdateRef<'a> {
    sha: &'a str,
    force: bool,
}

// ---------------------------------------------------------------------------
// Response helpers
// ---------------------------------------------------------------------------

/// Map a non-success response to the host error taxonomy.
pub(crate) fn classify_error(status: u16, body: &str) -> HostError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let mut parts: Vec<String> = parsed.message.into_iter().collect();
    for detail in parsed.errors {
        match detail {
            ErrorDetail::Text(text) => parts.push(text),
            ErrorDetail::Object { message, code } => {
                if let Some(m) = message.or(code) {
                    parts.push(m);
                }
            }
        }
    }
    let message = if parts.is_empty() {
        body.trim().to_string()
    } else {
        parts.join(": ")
    };

    match status {
        401 | 403 => HostError::Auth { status, message },
        404 => HostError::NotFound(message),
        422 if message.to_ascii_lowercase().contains("already exists") => {
            HostError::AlreadyExists(message)
        }
        422 => HostError::Unprocessable(message),
        _ => HostError::Api { status, message },
    }
}

/// Decode a blob payload into raw bytes.
pub(crate) fn decode_blob(payload: BlobPayload) -> HostResult<Vec<u8>> {
    match payload.encoding.as_str() {
        "base64" => {
            let compact: String = payload
                .content
                .chars()
                .filter(|c| !c.is_ascii_whitespace())
                .collect();
            BASE64
                .decode(compact)
                .map_err(|e| HostError::Decode(format!("invalid base64 blob: {e}")))
        }
        "utf-8" | "utf8" => Ok(payload.content.into_bytes()),
        other => Err(HostError::Decode(format!("unsupported blob encoding: {other}"))),
    }
}

/// Percent-encode each segment of a repository path, keeping the slashes.
pub(crate) fn encode_path(path: &str) -> String {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(|s| urlencoding::encode(s).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// GitHub REST client
pub struct GitHubClient {
    config: GitHubConfig,
    http: reqwest::Client,
}

impl GitHubClient {
    /// Create a client. Fails with [`HostError::Auth`] when no token is configured.
    pub fn new(config: GitHubConfig) -> HostResult<Self> {
        let token = config
            .token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| HostError::Auth {
                status: 401,
                message: "no hosting access token configured".to_string(),
            })?;

        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
            HostError::Auth {
                status: 401,
                message: "access token contains invalid header characters".to_string(),
            }
        })?;
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("x-github-api-version", HeaderValue::from_static(API_VERSION));

        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .build()?;

        Ok(GitHubClient { config, http })
    }

    /// Create client from environment variables
    pub fn from_env() -> HostResult<Self> {
        Self::new(GitHubConfig::from_env())
    }

    fn repo_url(&self, repo: &RepoId, tail: &str) -> String {
        let base = self.config.api_url.trim_end_matches('/');
        if tail.is_empty() {
            format!("{base}/repos/{}/{}", repo.owner, repo.name)
        } else {
            format!("{base}/repos/{}/{}/{tail}", repo.owner, repo.name)
        }
    }

    async fn send(&self, request: RequestBuilder) -> HostResult<reqwest::Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let err = classify_error(status.as_u16(), &body);
        debug!(status = status.as_u16(), error = %err, "hosting API returned an error");
        Err(err)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> HostResult<T> {
        let response = self.send(self.http.get(url)).await?;
        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> HostResult<T> {
        let response = self.send(self.http.post(url).json(body)).await?;
        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl GitHost for GitHubClient {
    async fn get_branch_sha(&self, repo: &RepoId, branch: &str) -> HostResult<String> {
        let url = self.repo_url(repo, &format!("git/ref/heads/{}", encode_path(branch)));
        let r: RefResponse = self.get_json(&url).await?;
        Ok(r.object.sha)
    }

    async fn get_commit(&self, repo: &RepoId, sha: &str) -> HostResult<CommitInfo> {
        let url = self.repo_url(repo, &format!("git/commits/{sha}"));
        let c: CommitResponse = self.get_json(&url).await?;
        Ok(CommitInfo {
            sha: c.sha,
            tree_sha: c.tree.sha,
            parents: c.parents.into_iter().map(|p| p.sha).collect(),
        })
    }

    async fn get_tree_recursive(&self, repo: &RepoId, tree_sha: &str) -> HostResult<Vec<TreeItem>> {
        let url = self.repo_url(repo, &format!("git/trees/{tree_sha}?recursive=1"));
        let t: TreeResponse = self.get_json(&url).await?;
        if t.truncated {
            warn!(repo = %repo, tree = %tree_sha, "recursive tree listing was truncated by the host");
        }
        Ok(t.tree)
    }

    async fn get_blob(&self, repo: &RepoId, sha: &str) -> HostResult<Vec<u8>> {
        let url = self.repo_url(repo, &format!("git/blobs/{sha}"));
        let payload: BlobPayload = self.get_json(&url).await?;
        decode_blob(payload)
    }

    async fn create_blob(&self, repo: &RepoId, content: &str) -> HostResult<String> {
        let url = self.repo_url(repo, "git/blobs");
        let r: ShaOnly = self
            .post_json(
                &url,
                &CreateBlob {
                    content,
                    encoding: "utf-8",
                },
            )
            .await?;
        Ok(r.sha)
    }

    async fn create_tree(
        &self,
        repo: &RepoId,
        base_tree: &str,
        entries: &[NewTreeEntry],
    ) -> HostResult<String> {
        let url = self.repo_url(repo, "git/trees");
        let r: ShaOnly = self
            .post_json(
                &url,
                &CreateTree {
                    base_tree,
                    tree: entries,
                },
            )
            .await?;
        Ok(r.sha)
    }

    async fn create_commit(
        &self,
        repo: &RepoId,
        message: &str,
        tree_sha: &str,
        parents: &[String],
    ) -> HostResult<String> {
        let url = self.repo_url(repo, "git/commits");
        let r: ShaOnly = self
            .post_json(
                &url,
                &CreateCommit {
                    message,
                    tree: tree_sha,
                    parents,
                },
            )
            .await?;
        Ok(r.sha)
    }

    async fn create_ref(&self, repo: &RepoId, branch: &str, sha: &str) -> HostResult<()> {
        let url = self.repo_url(repo, "git/refs");
        let body = CreateRef {
            name: format!("refs/heads/{branch}"),
            sha,
        };
        self.send(self.http.post(&url).json(&body)).await?;
        Ok(())
    }

    async fn update_ref(
        &self,
        repo: &RepoId,
        branch: &str,
        sha: &str,
        force: bool,
    ) -> HostResult<()> {
        let url = self.repo_url(repo, &format!("git/refs/heads/{}", encode_path(branch)));
        self.send(self.http.patch(&url).json(&UpdateRef { sha, force }))
            .await?;
        Ok(())
    }

    async fn list_branches(&self, repo: &RepoId) -> HostResult<Vec<String>> {
        let mut names = Vec::new();
        let mut page = 1;
        loop {
            let url = self.repo_url(repo, &format!("branches?per_page={PAGE_SIZE}&page={page}"));
            let batch: Vec<BranchResponse> = self.get_json(&url).await?;
            let len = batch.len();
            names.extend(batch.into_iter().map(|b| b.name));
            if len < PAGE_SIZE {
                break;
            }
            page += 1;
        }
        Ok(names)
    }

    async fn default_branch(&self, repo: &RepoId) -> HostResult<String> {
        let r: RepoResponse = self.get_json(&self.repo_url(repo, "")).await?;
        Ok(r.default_branch)
    }

    async fn list_directory(
        &self,
        repo: &RepoId,
        path: &str,
        git_ref: &str,
    ) -> HostResult<Vec<DirEntry>> {
        let url = self.repo_url(
            repo,
            &format!(
                "contents/{}?ref={}",
                encode_path(path),
                urlencoding::encode(git_ref)
            ),
        );
        let listing: ContentsResponse = self.get_json(&url).await?;
        Ok(match listing {
            ContentsResponse::Listing(entries) => entries,
            ContentsResponse::Single(entry) => vec![entry],
        })
    }

    async fn get_file_content(
        &self,
        repo: &RepoId,
        path: &str,
        git_ref: &str,
    ) -> HostResult<String> {
        let url = self.repo_url(
            repo,
            &format!(
                "contents/{}?ref={}",
                encode_path(path),
                urlencoding::encode(git_ref)
            ),
        );
        let request = self
            .http
            .get(&url)
            .header(ACCEPT, "application/vnd.github.raw+json");
        let response = self.send(request).await?;
        Ok(response.text().await?)
    }

    async fn create_pull_request(
        &self,
        repo: &RepoId,
        pr: &NewPullRequest,
    ) -> HostResult<PullRequest> {
        let url = self.repo_url(repo, "pulls");
        let created: PullResponse = self.post_json(&url, pr).await?;
        Ok(created.into())
    }

    async fn find_pull_request(
        &self,
        repo: &RepoId,
        head: &str,
        base: &str,
    ) -> HostResult<Option<PullRequest>> {
        let url = self.repo_url(
            repo,
            &format!(
                "pulls?state=open&head={}&base={}&per_page=1",
                urlencoding::encode(&format!("{}:{head}", repo.owner)),
                urlencoding::encode(base)
            ),
        );
        let found: Vec<PullResponse> = self.get_json(&url).await?;
        Ok(found.into_iter().next().map(PullRequest::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_requires_token() {
        let config = GitHubConfig::new("https://ghe.example.com/api/v3");
        let err = GitHubClient::new(config).err().unwrap();
        assert!(matches!(err, HostError::Auth { status: 401, .. }));
    }

    #[test]
    fn test_repo_url_building() {
        let client =
            GitHubClient::new(GitHubConfig::new("https://ghe.example.com/api/v3/").with_token("t"))
                .unwrap();
        let repo = RepoId::new("acme", "crm");
        assert_eq!(
            client.repo_url(&repo, ""),
            "https://ghe.example.com/api/v3/repos/acme/crm"
        );
        assert_eq!(
            client.repo_url(&repo, "git/blobs"),
            "https://ghe.example.com/api/v3/repos/acme/crm/git/blobs"
        );
    }

    #[test]
    fn test_classify_ref_already_exists() {
        let err = classify_error(422, r#"{"message":"Reference already exists"}"#);
        assert_eq!(err, HostError::AlreadyExists("Reference already exists".into()));
    }

    #[test]
    fn test_classify_pull_request_already_exists() {
        let body = r#"{"message":"Validation Failed","errors":[{"resource":"PullRequest","code":"custom","message":"A pull request already exists for acme:feature/x."}]}"#;
        match classify_error(422, body) {
            HostError::AlreadyExists(msg) => assert!(msg.contains("acme:feature/x")),
            other => panic!("expected AlreadyExists, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_non_fast_forward_is_unprocessable() {
        let err = classify_error(422, r#"{"message":"Update is not a fast forward"}"#);
        assert!(matches!(err, HostError::Unprocessable(_)));
    }

    #[test]
    fn test_classify_auth_and_missing() {
        assert!(matches!(
            classify_error(401, r#"{"message":"Bad credentials"}"#),
            HostError::Auth { status: 401, .. }
        ));
        assert!(classify_error(404, r#"{"message":"Not Found"}"#).is_not_found());
        assert_eq!(
            classify_error(500, "upstream exploded"),
            HostError::Api {
                status: 500,
                message: "upstream exploded".into()
            }
        );
    }

    #[test]
    fn test_decode_base64_blob_with_line_breaks() {
        let payload = BlobPayload {
            content: "aGVs\nbG8=\n".to_string(),
            encoding: "base64".to_string(),
        };
        assert_eq!(decode_blob(payload).unwrap(), b"hello");

        let bad = BlobPayload {
            content: "x".to_string(),
            encoding: "rot13".to_string(),
        };
        assert!(matches!(decode_blob(bad), Err(HostError::Decode(_))));
    }

    #[test]
    fn test_encode_path_keeps_slashes() {
        assert_eq!(encode_path("force-app/main/My Page.page"), "force-app/main/My%20Page.page");
        assert_eq!(encode_path(""), "");
        assert_eq!(encode_path("feature/add-login"), "feature/add-login");
    }

    #[test]
    fn test_contents_response_accepts_listing_or_single() {
        let listing: ContentsResponse = serde_json::from_str(
            r#"[{"name":"a.cls","path":"classes/a.cls","type":"file","sha":"1"},{"name":"lwc","path":"lwc","type":"dir","sha":"2"}]"#,
        )
        .unwrap();
        assert!(matches!(listing, ContentsResponse::Listing(ref v) if v.len() == 2));

        let single: ContentsResponse = serde_json::from_str(
            r#"{"name":"a.cls","path":"classes/a.cls","type":"file","sha":"1","content":"eA=="}"#,
        )
        .unwrap();
        assert!(matches!(single, ContentsResponse::Single(_)));
    }
}
