//! Packs a routing decision into a bounded block of prompt context.

use tracing::debug;

use crate::domain::RepoFile;
use crate::router::RoutingDecision;

/// Default context size in characters.
pub const DEFAULT_CONTEXT_BUDGET: usize = 120_000;

/// Separator between file blocks.
pub const BLOCK_DELIMITER: &str = "\n\n---\n\n";

/// Extensions of Salesforce source and UI component files. When a selection
/// contains any of these, only those files are packed.
pub const PREFERRED_EXTENSIONS: &[&str] = &[
    "cls", "trigger", "page", "component", "cmp", "app", "evt", "design", "auradoc", "apex",
    "soql", "js", "ts", "html", "css", "xml",
];

#[derive(Debug, Clone)]
pub struct ContextAssembler {
    budget_chars: usize,
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_CONTEXT_BUDGET)
    }
}

impl ContextAssembler {
    pub fn new(budget_chars: usize) -> Self {
        Self { budget_chars }
    }

    pub fn budget_chars(&self) -> usize {
        self.budget_chars
    }

    /// Rendered text wins; otherwise the preferred files are concatenated as
    /// `// File: <path>` blocks and cut to the budget.
    pub fn assemble(&self, decision: &RoutingDecision) -> String {
        if let Some(text) = decision.rendered_context() {
            return self.truncate(text.to_string());
        }
        let files = preferred(decision.selected_files());
        let body = files
            .iter()
            .map(|f| format!("// File: {}\n{}", f.path, f.content))
            .collect::<Vec<_>>()
            .join(BLOCK_DELIMITER);
        debug!(files = files.len(), chars = body.chars().count(), "context assembled");
        self.truncate(body)
    }

    fn truncate(&self, text: String) -> String {
        let total = text.chars().count();
        if total <= self.budget_chars {
            return text;
        }
        let cut = text
            .char_indices()
            .nth(self.budget_chars)
            .map(|(i, _)| i)
            .unwrap_or(text.len());
        let omitted = total - self.budget_chars;
        debug!(omitted, "context truncated");
        format!(
            "{}\n\n[... context truncated: {omitted} characters omitted ...]",
            &text[..cut]
        )
    }
}

/// The Salesforce/UI subset of `files`, or all of them when that subset is empty.
pub fn preferred(files: &[RepoFile]) -> Vec<&RepoFile> {
    let subset: Vec<&RepoFile> = files
        .iter()
        .filter(|f| {
            f.extension()
                .is_some_and(|e| PREFERRED_EXTENSIONS.contains(&e.as_str()))
        })
        .collect();
    if subset.is_empty() {
        files.iter().collect()
    } else {
        subset
    }
}

#[derive(Default)]
struct TreeNode {
    // (segment, child) pairs in first-insertion order
    children: Vec<(String, TreeNode)>,
}

impl TreeNode {
    fn child(&mut self, name: &str) -> &mut TreeNode {
        let pos = match self.children.iter().position(|(n, _)| n == name) {
            Some(pos) => pos,
            None => {
                self.children.push((name.to_string(), TreeNode::default()));
                self.children.len() - 1
            }
        };
        &mut self.children[pos].1
    }

    fn render(&self, depth: usize, out: &mut Vec<String>) {
        let indent = "  ".repeat(depth);
        for (name, node) in &self.children {
            if node.children.is_empty() {
                out.push(format!("{indent}- {name}"));
            } else {
                out.push(format!("{indent}- {name}/"));
                node.render(depth + 1, out);
            }
        }
    }
}

/// Render paths as an indented tree. Siblings appear in the order their
/// first path was seen, not alphabetically.
pub fn render_directory_tree<'a, I>(paths: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut root = TreeNode::default();
    for path in paths {
        let mut node = &mut root;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            node = node.child(segment);
        }
    }
    let mut lines = Vec::new();
    root.render(0, &mut lines);
    lines.join("\n")
}
