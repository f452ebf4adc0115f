//! Query tokenisation shared by the detectors.

/// Words too common to say anything about which files a query is about.
pub const STOP_WORDS: &[&str] = &[
    "a", "about", "all", "an", "and", "any", "are", "can", "code", "does", "explain", "file",
    "files", "for", "from", "give", "have", "how", "into", "is", "me", "of", "on", "or",
    "please", "show", "tell", "that", "the", "there", "this", "to", "use", "used", "uses",
    "using", "what", "whats", "when", "where", "which", "who", "why", "will", "with", "you",
    "your",
];

pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(&word.to_ascii_lowercase().as_str())
}

/// Lowercased tokens. Path-ish characters (`_ . - /`) stay inside a token;
/// trailing punctuation is trimmed.
pub fn tokenize(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || matches!(c, '_' | '.' | '-' | '/')))
        .map(|t| t.trim_matches(|c| matches!(c, '.' | '-' | '/')))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Tokens meaningful enough to be matched against file paths.
pub fn significant(tokens: &[String]) -> Vec<&str> {
    tokens
        .iter()
        .map(String::as_str)
        .filter(|t| t.chars().count() >= 3 && !is_stop_word(t))
        .collect()
}
