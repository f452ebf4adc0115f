//! Target branch naming.

use chrono::{DateTime, Utc};
use remote_git::{GitHost, RepoId};

use crate::domain::PipelineResult;

/// Longest slug kept from a title.
pub const MAX_SLUG_LEN: usize = 60;

/// Slug used when the title has no usable characters.
pub const FALLBACK_SLUG: &str = "generated-change";

/// Lowercase slug of the first `words` words of `title`; runs of anything
/// outside `[a-z0-9]` collapse to a single `-`.
pub fn slugify(title: &str, words: usize) -> String {
    let head = title
        .split_whitespace()
        .take(words.max(1))
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

    let mut slug = String::with_capacity(head.len());
    for c in head.chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            slug.push(c);
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let mut slug = slug.trim_matches('-').to_string();
    if slug.len() > MAX_SLUG_LEN {
        slug.truncate(MAX_SLUG_LEN);
        slug = slug.trim_end_matches('-').to_string();
    }
    if slug.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        slug
    }
}

/// `<prefix><slug>` for a story title.
pub fn derive_branch_name(title: &str, prefix: &str, words: usize) -> String {
    format!("{prefix}{}", slugify(title, words))
}

pub fn timestamp_suffix(now: DateTime<Utc>) -> String {
    now.format("%Y%m%d%H%M%S").to_string()
}

/// `candidate` if no such branch exists yet, otherwise `candidate` with a
/// timestamp suffix.
pub async fn available_branch_name(
    host: &dyn GitHost,
    repo: &RepoId,
    candidate: &str,
    now: DateTime<Utc>,
) -> PipelineResult<String> {
    match host.get_branch_sha(repo, candidate).await {
        Ok(_) => Ok(format!("{candidate}-{}", timestamp_suffix(now))),
        Err(e) if e.is_not_found() => Ok(candidate.to_string()),
        Err(e) => Err(e.into()),
    }
}
