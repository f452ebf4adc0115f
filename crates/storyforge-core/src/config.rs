//! Layered configuration.
//!
//! Precedence (highest first): explicit overrides from the caller, environment
//! variables, an optional TOML file, built-in defaults.

use std::path::Path;

use model_gateway::AnthropicConfig;
use remote_git::GitHubConfig;
use serde::{Deserialize, Serialize};

use crate::domain::{PipelineError, PipelineResult};

/// What to do when the target branch already exists at publish time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RefUpdatePolicy {
    /// Only move the branch forward; anything else is a `RefConflict`.
    #[default]
    FastForwardOnly,
    /// Force-move the branch to the new commit, orphaning whatever was there.
    Force,
}

impl std::str::FromStr for RefUpdatePolicy {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fast-forward" | "fast-forward-only" | "ff" => Ok(Self::FastForwardOnly),
            "force" => Ok(Self::Force),
            other => Err(PipelineError::Config(format!(
                "unknown ref update policy '{other}' (expected fast-forward or force)"
            ))),
        }
    }
}

/// Hosting API settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostSettings {
    pub api_url: String,
    pub token: Option<String>,
    pub user_agent: String,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            token: None,
            user_agent: concat!("storyforge/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Model API settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.anthropic.com".to_string(),
            api_key: None,
            model: "claude-sonnet-4-5".to_string(),
            max_tokens: 8192,
        }
    }
}

/// Pipeline behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Branch tried first when resolving the base branch.
    pub preferred_base_branch: String,
    /// Prefix of generated branch names.
    pub branch_prefix: String,
    /// Number of title words used for the branch slug.
    pub slug_words: usize,
    /// Conventional-commit style prefix of the commit message.
    pub commit_prefix: String,
    /// Upper bound on the assembled context, in characters.
    pub context_budget_chars: usize,
    /// Parallel file fetches during a crawl.
    pub crawl_concurrency: usize,
    /// Directory the crawl starts from (empty for the repository root).
    pub crawl_root: String,
    pub ref_policy: RefUpdatePolicy,
    pub draft_pull_requests: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            preferred_base_branch: "dev".to_string(),
            branch_prefix: "story/".to_string(),
            slug_words: 5,
            commit_prefix: "feat".to_string(),
            context_budget_chars: 120_000,
            crawl_concurrency: 8,
            crawl_root: String::new(),
            ref_policy: RefUpdatePolicy::FastForwardOnly,
            draft_pull_requests: false,
        }
    }
}

/// Complete Storyforge configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoryforgeConfig {
    pub host: HostSettings,
    pub model: ModelSettings,
    pub pipeline: PipelineSettings,
}

impl StoryforgeConfig {
    /// Defaults, then `path` (if given), then the process environment.
    pub fn load(path: Option<&Path>) -> PipelineResult<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML file.
    pub fn from_file(path: &Path) -> PipelineResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        toml::from_str(&text)
            .map_err(|e| PipelineError::Config(format!("invalid {}: {e}", path.display())))
    }

    /// Overlay environment variables read through `lookup`.
    ///
    /// Unparseable numeric values are ignored with a warning.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("GITHUB_API_URL") {
            self.host.api_url = v;
        }
        if let Some(v) = get("GITHUB_TOKEN") {
            self.host.token = Some(v);
        }
        if let Some(v) = get("ANTHROPIC_BASE_URL") {
            self.model.base_url = v;
        }
        if let Some(v) = get("ANTHROPIC_API_KEY") {
            self.model.api_key = Some(v);
        }
        if let Some(v) = get("STORYFORGE_MODEL") {
            self.model.model = v;
        }
        if let Some(v) = get("STORYFORGE_MAX_TOKENS") {
            match v.parse() {
                Ok(n) => self.model.max_tokens = n,
                Err(_) => tracing::warn!(value = %v, "ignoring invalid STORYFORGE_MAX_TOKENS"),
            }
        }
        if let Some(v) = get("STORYFORGE_BASE_BRANCH") {
            self.pipeline.preferred_base_branch = v;
        }
        if let Some(v) = get("STORYFORGE_BRANCH_PREFIX") {
            self.pipeline.branch_prefix = v;
        }
        if let Some(v) = get("STORYFORGE_CONTEXT_BUDGET") {
            match v.parse() {
                Ok(n) => self.pipeline.context_budget_chars = n,
                Err(_) => tracing::warn!(value = %v, "ignoring invalid STORYFORGE_CONTEXT_BUDGET"),
            }
        }
        if let Some(v) = get("STORYFORGE_CRAWL_CONCURRENCY") {
            match v.parse() {
                Ok(n) => self.pipeline.crawl_concurrency = n,
                Err(_) => {
                    tracing::warn!(value = %v, "ignoring invalid STORYFORGE_CRAWL_CONCURRENCY")
                }
            }
        }
        if let Some(v) = get("STORYFORGE_REF_POLICY") {
            match v.parse() {
                Ok(policy) => self.pipeline.ref_policy = policy,
                Err(e) => tracing::warn!(error = %e, "ignoring STORYFORGE_REF_POLICY"),
            }
        }
    }

    /// Reject settings no run could succeed with.
    pub fn validate(&self) -> PipelineResult<()> {
        if self.pipeline.crawl_concurrency == 0 {
            return Err(PipelineError::Config(
                "pipeline.crawl_concurrency must be at least 1".to_string(),
            ));
        }
        if self.pipeline.slug_words == 0 {
            return Err(PipelineError::Config(
                "pipeline.slug_words must be at least 1".to_string(),
            ));
        }
        if self.pipeline.context_budget_chars < 1_000 {
            return Err(PipelineError::Config(
                "pipeline.context_budget_chars must be at least 1000".to_string(),
            ));
        }
        if self.pipeline.preferred_base_branch.trim().is_empty() {
            return Err(PipelineError::Config(
                "pipeline.preferred_base_branch must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Hosting client settings. Fails with `Auth` when no token is set.
    pub fn github_config(&self) -> PipelineResult<GitHubConfig> {
        let token = self
            .host
            .token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                PipelineError::Auth(
                    "no hosting access token configured (set GITHUB_TOKEN)".to_string(),
                )
            })?;
        Ok(GitHubConfig::new(&self.host.api_url)
            .with_token(token)
            .with_user_agent(&self.host.user_agent))
    }

    /// Model client settings.
    pub fn anthropic_config(&self) -> AnthropicConfig {
        AnthropicConfig {
            base_url: self.model.base_url.clone(),
            api_key: self.model.api_key.clone(),
            model: self.model.model.clone(),
            user_agent: self.host.user_agent.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = StoryforgeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pipeline.preferred_base_branch, "dev");
        assert_eq!(config.pipeline.ref_policy, RefUpdatePolicy::FastForwardOnly);
    }

    #[test]
    fn test_file_then_env_precedence() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[host]
api_url = "https://ghe.example.com/api/v3"

[pipeline]
preferred_base_branch = "develop"
ref_policy = "force"
crawl_concurrency = 2
"#
        )
        .unwrap();

        let mut config = StoryforgeConfig::from_file(file.path()).unwrap();
        assert_eq!(config.host.api_url, "https://ghe.example.com/api/v3");
        assert_eq!(config.pipeline.ref_policy, RefUpdatePolicy::Force);
        // untouched sections keep defaults
        assert_eq!(config.model.max_tokens, 8192);

        let env: HashMap<&str, &str> = [
            ("STORYFORGE_BASE_BRANCH", "qa"),
            ("GITHUB_TOKEN", "ghp_test"),
            ("STORYFORGE_CRAWL_CONCURRENCY", "not-a-number"),
        ]
        .into_iter()
        .collect();
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.pipeline.preferred_base_branch, "qa");
        assert_eq!(config.host.token.as_deref(), Some("ghp_test"));
        assert_eq!(config.pipeline.crawl_concurrency, 2);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[pipeline\nslug_words = ").unwrap();
        let err = StoryforgeConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn test_missing_token_is_auth_error() {
        let err = StoryforgeConfig::default().github_config().unwrap_err();
        assert!(matches!(err, PipelineError::Auth(_)));
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let mut config = StoryforgeConfig::default();
        config.pipeline.crawl_concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ref_policy_parse() {
        assert_eq!("force".parse::<RefUpdatePolicy>().unwrap(), RefUpdatePolicy::Force);
        assert_eq!(
            "fast-forward".parse::<RefUpdatePolicy>().unwrap(),
            RefUpdatePolicy::FastForwardOnly
        );
        assert!("yolo".parse::<RefUpdatePolicy>().is_err());
    }
}
