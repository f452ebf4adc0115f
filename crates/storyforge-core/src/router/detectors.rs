//! The individual relevance detectors.
//!
//! Each detector looks at the query and the crawled files and either stays
//! silent (`None`) or proposes a complete [`RouteOutcome`].

use std::sync::OnceLock;

use regex::Regex;

use super::tokens::{is_stop_word, significant};
use super::{RouteContext, RouteOutcome};
use crate::assembler::render_directory_tree;
use crate::domain::RepoFile;

/// Query words that mark a question as being about the repository.
pub const DOMAIN_VOCABULARY: &[&str] = &[
    "salesforce", "apex", "github", "analyze", "analyse", "analysis", "analyzing", "repo",
    "repository", "codebase", "lwc", "aura", "visualforce", "soql", "trigger", "triggers",
    "class", "classes", "component", "components", "branch", "commit",
];

/// Capture words that are declaration keywords, not declared names.
const DECLARATION_KEYWORDS: &[&str] = &[
    "function", "def", "public", "private", "protected", "static", "void", "class", "global",
    "virtual", "abstract", "override", "final", "with", "without", "inherited", "sharing",
    "async", "export", "default", "interface", "enum", "extends", "implements", "webservice",
];

/// Extensions of UI bundle files considered by the bulk component analysis.
const UI_EXTENSIONS: &[&str] = &["js", "html", "css", "xml"];

fn compiled(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).unwrap_or_else(|e| panic!("invalid pattern {pattern}: {e}")))
}

fn declaration_re() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    compiled(
        &CELL,
        r"\b(?:function|def|public|private|protected|static|void|class)\s+([A-Za-z_][A-Za-z0-9_]*)",
    )
}

/// True for files inside a UI component bundle directory.
pub fn is_component_path(path: &str) -> bool {
    let lower = format!("/{}", path.to_ascii_lowercase());
    lower.contains("/lwc/") || lower.contains("/aura/") || lower.contains("/components/")
}

fn lwc_path(path: &str) -> bool {
    format!("/{}", path.to_ascii_lowercase()).contains("/lwc/")
}

/// 1. Query mentions the domain vocabulary: in scope, everything selected.
pub(super) fn domain_keyword(ctx: &RouteContext<'_>) -> Option<RouteOutcome> {
    ctx.tokens
        .iter()
        .any(|t| DOMAIN_VOCABULARY.contains(&t.as_str()))
        .then(|| RouteOutcome::Narrowed(ctx.files.to_vec()))
}

/// 2. A query token appears inside file paths: keep those files.
pub(super) fn path_mention(ctx: &RouteContext<'_>) -> Option<RouteOutcome> {
    let needles = significant(&ctx.tokens);
    if needles.is_empty() {
        return None;
    }
    let selected: Vec<RepoFile> = ctx
        .files
        .iter()
        .filter(|f| {
            let path = f.path.to_lowercase();
            needles.iter().any(|n| path.contains(n))
        })
        .cloned()
        .collect();
    (!selected.is_empty()).then_some(RouteOutcome::Narrowed(selected))
}

/// Names declared in `content` (`class Foo`, `def bar`, `void baz` ...).
pub fn declared_identifiers(content: &str) -> Vec<&str> {
    declaration_re()
        .captures_iter(content)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .filter(|id| id.len() >= 3 && !DECLARATION_KEYWORDS.contains(&id.to_ascii_lowercase().as_str()))
        .collect()
}

/// 3. A query token names something declared in a file: that single file.
pub(super) fn identifier_mention(ctx: &RouteContext<'_>) -> Option<RouteOutcome> {
    ctx.files
        .iter()
        .find(|f| {
            declared_identifiers(&f.content)
                .iter()
                .any(|id| ctx.tokens.iter().any(|t| t.eq_ignore_ascii_case(id)))
        })
        .map(|f| RouteOutcome::Narrowed(vec![f.clone()]))
}

/// Candidate type name referred to by the query.
pub fn class_candidate(query: &str) -> Option<String> {
    static NAME_APEX_CLASS: OnceLock<Regex> = OnceLock::new();
    static APEX_CLASS_NAME: OnceLock<Regex> = OnceLock::new();
    static USE_NAME: OnceLock<Regex> = OnceLock::new();
    static MEMBER_ACCESS: OnceLock<Regex> = OnceLock::new();
    static CAPITALIZED: OnceLock<Regex> = OnceLock::new();

    let explicit = [
        compiled(&NAME_APEX_CLASS, r"(?i)\b([A-Za-z_][A-Za-z0-9_]*)\s+apex\s+class\b"),
        compiled(&APEX_CLASS_NAME, r"(?i)\bapex\s+class\s+([A-Za-z_][A-Za-z0-9_]*)"),
        compiled(&USE_NAME, r"(?i)\buses?\s+([A-Za-z_][A-Za-z0-9_]*)"),
        compiled(&MEMBER_ACCESS, r"\b([A-Za-z_][A-Za-z0-9_]*)\.[A-Za-z_][A-Za-z0-9_]*\s*\("),
    ];
    for re in explicit {
        if let Some(name) = re
            .captures_iter(query)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str())
            .find(|n| !is_stop_word(n) && !DECLARATION_KEYWORDS.contains(&n.to_ascii_lowercase().as_str()))
        {
            return Some(name.to_string());
        }
    }

    // Fallback: a capitalized word that is not a sentence opener.
    let capitalized = compiled(&CAPITALIZED, r"\b[A-Z][A-Za-z0-9_]{2,}\b");
    capitalized
        .find_iter(query)
        .filter(|m| m.start() > 0 || m.as_str().chars().skip(1).any(|c| c.is_ascii_uppercase()))
        .map(|m| m.as_str())
        .find(|w| !is_stop_word(w))
        .map(str::to_string)
}

/// 4. The query names a class used by UI components: the referencing files.
pub(super) fn class_usage(ctx: &RouteContext<'_>) -> Option<RouteOutcome> {
    let name = class_candidate(ctx.query)?;
    let selected: Vec<RepoFile> = ctx
        .files
        .iter()
        .filter(|f| is_component_path(&f.path) && f.content.contains(&name))
        .cloned()
        .collect();
    (!selected.is_empty()).then_some(RouteOutcome::Narrowed(selected))
}

/// 5. "analyze all lwc" / "lwc analysis": every UI bundle file.
pub(super) fn bulk_component_analysis(ctx: &RouteContext<'_>) -> Option<RouteOutcome> {
    static BULK: OnceLock<Regex> = OnceLock::new();
    if !compiled(&BULK, r"\banaly[sz]e\s+(?:all\s+)?lwcs?\b|\blwc\s+analysis\b").is_match(&ctx.lower) {
        return None;
    }
    let selected: Vec<RepoFile> = ctx
        .files
        .iter()
        .filter(|f| {
            lwc_path(&f.path)
                && f
                    .extension()
                    .map(|e| UI_EXTENSIONS.contains(&e.as_str()))
                    .unwrap_or(false)
        })
        .cloned()
        .collect();
    if selected.is_empty() {
        return Some(RouteOutcome::Rendered {
            text: "No Lightning Web Component files were found in this repository.".to_string(),
            files: Vec::new(),
        });
    }
    Some(RouteOutcome::Narrowed(selected))
}

/// 6. The query names a file (`name.ext`): that file.
pub(super) fn explicit_file(ctx: &RouteContext<'_>) -> Option<RouteOutcome> {
    static FILE_TOKEN: OnceLock<Regex> = OnceLock::new();
    let re = compiled(&FILE_TOKEN, r"[A-Za-z0-9_\-./]*[A-Za-z0-9_\-]\.[A-Za-z][A-Za-z0-9\-]{0,11}\b");
    for m in re.find_iter(ctx.query) {
        let wanted = m.as_str().trim_start_matches("./").to_lowercase();
        let exact = ctx.files.iter().find(|f| f.path.to_lowercase() == wanted);
        let hit = exact.or_else(|| {
            ctx.files
                .iter()
                .find(|f| f.path.to_lowercase().ends_with(&wanted))
        });
        if let Some(file) = hit {
            return Some(RouteOutcome::Narrowed(vec![file.clone()]));
        }
    }
    None
}

/// 7. Structure request: the rendered directory tree instead of contents.
pub(super) fn structure_request(ctx: &RouteContext<'_>) -> Option<RouteOutcome> {
    static STRUCTURE: OnceLock<Regex> = OnceLock::new();
    let re = compiled(
        &STRUCTURE,
        r"folder structure|directory (?:tree|structure)|list (?:all )?files|(?:repo|repository|project) structure",
    );
    re.is_match(&ctx.lower).then(|| RouteOutcome::Rendered {
        text: render_directory_tree(ctx.files.iter().map(|f| f.path.as_str())),
        files: ctx.files.to_vec(),
    })
}

/// Term a codebase-wide search is looking for.
pub fn search_term(query: &str) -> Option<String> {
    static QUOTED: OnceLock<Regex> = OnceLock::new();
    static AFTER_VERB: OnceLock<Regex> = OnceLock::new();
    static WHERE_USED: OnceLock<Regex> = OnceLock::new();

    // A single quote only opens at a word start, so contractions never do.
    let quoted = compiled(&QUOTED, r#""([^"]+)"|`([^`]+)`|(?:^|\s)'([^']+)'"#);
    if let Some(c) = quoted.captures(query) {
        let term = (1..=3)
            .find_map(|i| c.get(i))
            .map(|m| m.as_str().trim())
            .unwrap_or_default();
        if !term.is_empty() {
            return Some(term.to_string());
        }
    }
    let after_verb = compiled(
        &AFTER_VERB,
        r"(?i)\b(?:use|uses|using|with|for|call|calls|calling|reference|references|referencing)\s+([A-Za-z0-9_@/.\-]+)",
    );
    let candidate = after_verb
        .captures_iter(query)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim_end_matches(['.', '?', '!', ',']))
        .find(|t| !t.is_empty() && !is_stop_word(t));
    if let Some(term) = candidate {
        return Some(term.to_string());
    }
    compiled(&WHERE_USED, r"(?i)\bwhere\s+is\s+([A-Za-z0-9_@/.\-]+)\s+used\b")
        .captures(query)
        .map(|c| c[1].to_string())
}

/// 8. Codebase-wide search: every file containing the term.
pub(super) fn codebase_search(ctx: &RouteContext<'_>) -> Option<RouteOutcome> {
    static SHAPE: OnceLock<Regex> = OnceLock::new();
    let shape = compiled(
        &SHAPE,
        r"(?:^\s*|\b(?:can you|could you|please)\s+)(?:find|list|show|detect|search)\b|\bare there any\b|\bdo any\b|\bwhere is \S+ used\b|\bfiles (?:that use|with)\b",
    );
    if !shape.is_match(&ctx.lower) {
        return None;
    }
    let term = search_term(ctx.query)?;
    let needle = term.to_lowercase();
    let selected: Vec<RepoFile> = ctx
        .files
        .iter()
        .filter(|f| f.content.to_lowercase().contains(&needle))
        .cloned()
        .collect();
    if selected.is_empty() {
        return Some(RouteOutcome::Rendered {
            text: format!("No files in the repository contain \"{term}\"."),
            files: Vec::new(),
        });
    }
    Some(RouteOutcome::Narrowed(selected))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declared_identifiers_skip_keywords() {
        let src = "public with sharing class AccountController {\n  public static void syncAll() {}\n  private String name;\n}";
        let ids = declared_identifiers(src);
        assert!(ids.contains(&"AccountController"));
        assert!(ids.contains(&"syncAll"));
        assert!(ids.contains(&"String"));
        assert!(!ids.contains(&"static"));
        assert!(!ids.contains(&"void"));
    }

    #[test]
    fn test_class_candidate_patterns() {
        assert_eq!(
            class_candidate("explain AccountController apex class").as_deref(),
            Some("AccountController")
        );
        assert_eq!(
            class_candidate("what does apex class LeadRouter do").as_deref(),
            Some("LeadRouter")
        );
        assert_eq!(
            class_candidate("which components use OrderService").as_deref(),
            Some("OrderService")
        );
        assert_eq!(
            class_candidate("who calls CaseHelper.escalate() here").as_deref(),
            Some("CaseHelper")
        );
        assert_eq!(
            class_candidate("is the Invoice total correct").as_deref(),
            Some("Invoice")
        );
        assert_eq!(class_candidate("What is going on"), None);
    }

    #[test]
    fn test_search_term_extraction() {
        assert_eq!(search_term(r#"find files with "getRecord""#).as_deref(), Some("getRecord"));
        assert_eq!(search_term("are there any files using NavigationMixin?").as_deref(), Some("NavigationMixin"));
        assert_eq!(search_term("search for @wire").as_deref(), Some("@wire"));
        assert_eq!(search_term("where is formatDate used").as_deref(), Some("formatDate"));
        assert_eq!(search_term("list the things"), None);
        assert_eq!(search_term("which components call getRecord?").as_deref(), Some("getRecord"));
    }

    #[test]
    fn test_search_term_ignores_contractions() {
        assert_eq!(
            search_term("Are there any components that don't call 'getRecord'?").as_deref(),
            Some("getRecord")
        );
        assert_eq!(search_term("find `@api` in what's left").as_deref(), Some("@api"));
        assert_eq!(search_term("'wire' adapters").as_deref(), Some("wire"));
    }

    #[test]
    fn test_component_paths() {
        assert!(is_component_path("force-app/main/default/lwc/list/list.js"));
        assert!(is_component_path("aura/Header/Header.cmp"));
        assert!(!is_component_path("force-app/main/default/classes/A.cls"));
    }
}
