//! Validation of the code-generation response.
//!
//! The model must answer with a JSON object mapping repository-relative paths
//! to complete file contents. Anything else is rejected before any object is
//! written to the host.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::ModelError;

/// `path -> full content` produced by the model.
///
/// Keys are validated repository-relative paths. Iteration order is the path
/// order, so blob creation is deterministic across runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeneratedFileSet {
    files: BTreeMap<String, String>,
}

impl GeneratedFileSet {
    /// Build from already-validated pairs.
    pub fn from_pairs<I, P, C>(pairs: I) -> Result<Self, ModelError>
    where
        I: IntoIterator<Item = (P, C)>,
        P: Into<String>,
        C: Into<String>,
    {
        let mut files = BTreeMap::new();
        for (raw, content) in pairs {
            let raw = raw.into();
            let path = normalize_path(&raw)?;
            if files.contains_key(&path) {
                return Err(ModelError::InvalidResponse(format!(
                    "{raw} names the same file as another entry ({path})"
                )));
            }
            files.insert(path, content.into());
        }
        if files.is_empty() {
            return Err(ModelError::InvalidResponse(
                "response contains no files".to_string(),
            ));
        }
        Ok(Self { files })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.files.iter().map(|(p, c)| (p.as_str(), c.as_str()))
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }
}

fn normalize_path(raw: &str) -> Result<String, ModelError> {
    let path = raw.trim().trim_start_matches("./");
    if path.is_empty() {
        return Err(ModelError::InvalidResponse("empty file path".to_string()));
    }
    if path.starts_with('/') || path.contains('\\') {
        return Err(ModelError::InvalidResponse(format!(
            "path is not repository-relative: {raw}"
        )));
    }
    if path.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..") {
        return Err(ModelError::InvalidResponse(format!("invalid path segment in: {raw}")));
    }
    Ok(path.to_string())
}

/// Remove one surrounding Markdown code fence, if present.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop the info string (`json`, `JSON`, ...) on the opening line.
    match body.split_once('\n') {
        Some((info, inner)) if !info.trim().contains(['{', '[']) => inner.trim(),
        _ => body.trim(),
    }
}

/// Parse the model's code-generation answer.
pub fn parse_generated_files(text: &str) -> Result<GeneratedFileSet, ModelError> {
    let body = strip_code_fence(text);
    let value: Value = serde_json::from_str(body)
        .map_err(|e| ModelError::InvalidResponse(format!("response is not valid JSON: {e}")))?;

    let Value::Object(map) = value else {
        return Err(ModelError::InvalidResponse(
            "expected a JSON object mapping file paths to contents".to_string(),
        ));
    };

    let mut pairs = Vec::with_capacity(map.len());
    for (path, content) in map {
        match content {
            Value::String(s) => pairs.push((path, s)),
            other => {
                return Err(ModelError::InvalidResponse(format!(
                    "content for {path} is {}, expected a string",
                    json_kind(&other)
                )))
            }
        }
    }
    GeneratedFileSet::from_pairs(pairs)
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_plain_object() {
        let set = parse_generated_files(
            r#"{"force-app/main/default/classes/Foo.cls":"public class Foo {}","README.md":"hi"}"#,
        )
        .unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(
            set.get("force-app/main/default/classes/Foo.cls"),
            Some("public class Foo {}")
        );
        // BTreeMap order
        assert_eq!(set.paths().next(), Some("README.md"));
    }

    #[test]
    fn test_strips_json_fence() {
        let text = "```json\n{\"a.txt\": \"x\"}\n```";
        assert_eq!(parse_generated_files(text).unwrap().get("a.txt"), Some("x"));
    }

    #[test]
    fn test_rejects_prose() {
        let err = parse_generated_files("Sure! Here is the code you asked for.").unwrap_err();
        assert!(matches!(err, ModelError::InvalidResponse(_)));
    }

    #[test]
    fn test_rejects_non_object_json() {
        let err = parse_generated_files(r#"["a.txt", "x"]"#).unwrap_err();
        assert!(err.to_string().contains("JSON object"));
    }

    #[test]
    fn test_rejects_non_string_values() {
        let err = parse_generated_files(r#"{"a.txt": {"content": "x"}}"#).unwrap_err();
        assert!(err.to_string().contains("an object"));
    }

    #[test]
    fn test_rejects_escaping_paths() {
        assert!(parse_generated_files(r#"{"../secrets.txt": "x"}"#).is_err());
        assert!(parse_generated_files(r#"{"/etc/passwd": "x"}"#).is_err());
        assert!(parse_generated_files(r#"{"a//b.txt": "x"}"#).is_err());
    }

    #[test]
    fn test_rejects_empty_object() {
        assert!(parse_generated_files("{}").is_err());
    }

    #[test]
    fn test_leading_dot_slash_is_normalized() {
        let set = parse_generated_files(r#"{"./src/a.js": "x"}"#).unwrap();
        assert_eq!(set.get("src/a.js"), Some("x"));
    }

    #[test]
    fn test_rejects_paths_that_normalize_to_the_same_file() {
        let err = parse_generated_files(r#"{"./src/a.cls": "one", "src/a.cls": "two"}"#).unwrap_err();
        assert!(matches!(err, ModelError::InvalidResponse(msg) if msg.contains("src/a.cls")));
    }
}
