//! Relevance routing: decide whether a query concerns the repository and,
//! if so, which files (or which pre-rendered text) make up its context.
//!
//! Detectors run in a fixed order. Every detector that fires marks the
//! query as in scope, and the last one that fires determines the outcome.

mod detectors;
pub mod tokens;

use serde::{Deserialize, Serialize};
use tracing::debug;

pub use detectors::{
    class_candidate, declared_identifiers, is_component_path, search_term, DOMAIN_VOCABULARY,
};

use crate::domain::RepoFile;

/// The detectors, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Detector {
    DomainKeyword,
    PathMention,
    IdentifierMention,
    ClassUsage,
    BulkComponentAnalysis,
    ExplicitFile,
    StructureRequest,
    CodebaseSearch,
}

impl Detector {
    pub const ALL: [Detector; 8] = [
        Detector::DomainKeyword,
        Detector::PathMention,
        Detector::IdentifierMention,
        Detector::ClassUsage,
        Detector::BulkComponentAnalysis,
        Detector::ExplicitFile,
        Detector::StructureRequest,
        Detector::CodebaseSearch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Detector::DomainKeyword => "domain_keyword",
            Detector::PathMention => "path_mention",
            Detector::IdentifierMention => "identifier_mention",
            Detector::ClassUsage => "class_usage",
            Detector::BulkComponentAnalysis => "bulk_component_analysis",
            Detector::ExplicitFile => "explicit_file",
            Detector::StructureRequest => "structure_request",
            Detector::CodebaseSearch => "codebase_search",
        }
    }

    fn evaluate(&self, ctx: &RouteContext<'_>) -> Option<RouteOutcome> {
        match self {
            Detector::DomainKeyword => detectors::domain_keyword(ctx),
            Detector::PathMention => detectors::path_mention(ctx),
            Detector::IdentifierMention => detectors::identifier_mention(ctx),
            Detector::ClassUsage => detectors::class_usage(ctx),
            Detector::BulkComponentAnalysis => detectors::bulk_component_analysis(ctx),
            Detector::ExplicitFile => detectors::explicit_file(ctx),
            Detector::StructureRequest => detectors::structure_request(ctx),
            Detector::CodebaseSearch => detectors::codebase_search(ctx),
        }
    }
}

impl std::fmt::Display for Detector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the router decided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum RouteOutcome {
    /// Nothing in the query relates to the repository.
    OutOfScope,
    /// In scope; these files form the context.
    Narrowed(Vec<RepoFile>),
    /// In scope; `text` is used verbatim as the context.
    Rendered { text: String, files: Vec<RepoFile> },
}

/// Router output plus which detectors fired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub outcome: RouteOutcome,
    pub matched: Vec<Detector>,
}

impl RoutingDecision {
    pub fn out_of_scope() -> Self {
        Self {
            outcome: RouteOutcome::OutOfScope,
            matched: Vec::new(),
        }
    }

    pub fn in_scope(&self) -> bool {
        !matches!(self.outcome, RouteOutcome::OutOfScope)
    }

    pub fn selected_files(&self) -> &[RepoFile] {
        match &self.outcome {
            RouteOutcome::OutOfScope => &[],
            RouteOutcome::Narrowed(files) => files,
            RouteOutcome::Rendered { files, .. } => files,
        }
    }

    pub fn rendered_context(&self) -> Option<&str> {
        match &self.outcome {
            RouteOutcome::Rendered { text, .. } => Some(text),
            _ => None,
        }
    }

    /// The detector that produced the outcome.
    pub fn decisive(&self) -> Option<Detector> {
        self.matched.last().copied()
    }
}

/// Per-query data shared by all detectors.
pub(crate) struct RouteContext<'a> {
    pub query: &'a str,
    pub lower: String,
    pub tokens: Vec<String>,
    pub files: &'a [RepoFile],
}

/// Runs the detector chain over a crawled file set.
#[derive(Debug, Clone)]
pub struct RelevanceRouter {
    detectors: Vec<Detector>,
}

impl Default for RelevanceRouter {
    fn default() -> Self {
        Self {
            detectors: Detector::ALL.to_vec(),
        }
    }
}

impl RelevanceRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict routing to a subset of detectors. They still run in the
    /// canonical order.
    pub fn with_detectors(detectors: &[Detector]) -> Self {
        Self {
            detectors: Detector::ALL
                .iter()
                .copied()
                .filter(|d| detectors.contains(d))
                .collect(),
        }
    }

    pub fn detectors(&self) -> &[Detector] {
        &self.detectors
    }

    pub fn route(&self, query: &str, files: &[RepoFile]) -> RoutingDecision {
        let ctx = RouteContext {
            query,
            lower: query.to_lowercase(),
            tokens: tokens::tokenize(query),
            files,
        };

        let mut decision = RoutingDecision::out_of_scope();
        for detector in &self.detectors {
            if let Some(outcome) = detector.evaluate(&ctx) {
                debug!(detector = %detector, "detector matched");
                decision.matched.push(*detector);
                decision.outcome = outcome;
            }
        }
        debug!(
            in_scope = decision.in_scope(),
            selected = decision.selected_files().len(),
            "routing complete"
        );
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<RepoFile> {
        vec![
            RepoFile::new(
                "force-app/main/default/classes/AccountController.cls",
                "public with sharing class AccountController {\n  public static List<Account> getAccounts() { return null; }\n}",
            ),
            RepoFile::new(
                "force-app/main/default/classes/InvoiceService.cls",
                "public class InvoiceService {\n  public static void post() {}\n}",
            ),
            RepoFile::new(
                "force-app/main/default/triggers/OrderTrigger.trigger",
                "trigger OrderTrigger on Order (before insert) {}",
            ),
            RepoFile::new(
                "force-app/main/default/lwc/invoiceList/invoiceList.js",
                "import post from '@salesforce/apex/InvoiceService.post';\nimport { NavigationMixin } from 'lightning/navigation';",
            ),
            RepoFile::new(
                "force-app/main/default/lwc/invoiceList/invoiceList.html",
                "<template><p>Invoices</p></template>",
            ),
            RepoFile::new("README.md", "# Sample project"),
        ]
    }

    fn paths(decision: &RoutingDecision) -> Vec<&str> {
        decision
            .selected_files()
            .iter()
            .map(|f| f.path.as_str())
            .collect()
    }

    #[test]
    fn test_unrelated_query_is_out_of_scope() {
        let decision = RelevanceRouter::new().route("What's the weather today?", &corpus());
        assert!(!decision.in_scope());
        assert!(decision.matched.is_empty());
        assert!(decision.selected_files().is_empty());
    }

    #[test]
    fn test_domain_keyword_selects_everything() {
        let files = corpus();
        let decision =
            RelevanceRouter::with_detectors(&[Detector::DomainKeyword]).route("summarize this repo", &files);
        assert!(decision.in_scope());
        assert_eq!(decision.selected_files().len(), files.len());
    }

    #[test]
    fn test_path_mention_narrows() {
        let decision = RelevanceRouter::new().route("how does the invoicelist render", &corpus());
        assert_eq!(decision.decisive(), Some(Detector::PathMention));
        assert_eq!(
            paths(&decision),
            vec![
                "force-app/main/default/lwc/invoiceList/invoiceList.js",
                "force-app/main/default/lwc/invoiceList/invoiceList.html",
            ]
        );
    }

    #[test]
    fn test_identifier_mention_picks_declaring_file() {
        let decision = RelevanceRouter::new().route("explain AccountController apex class", &corpus());
        assert!(decision.matched.contains(&Detector::IdentifierMention));
        assert_eq!(
            paths(&decision),
            vec!["force-app/main/default/classes/AccountController.cls"]
        );
    }

    #[test]
    fn test_later_detector_overrides_earlier() {
        // InvoiceService is declared in a class file, but the component
        // usage detector runs later and wins.
        let decision = RelevanceRouter::new().route("which components use InvoiceService", &corpus());
        assert!(decision.matched.contains(&Detector::IdentifierMention));
        assert_eq!(decision.decisive(), Some(Detector::ClassUsage));
        assert_eq!(
            paths(&decision),
            vec!["force-app/main/default/lwc/invoiceList/invoiceList.js"]
        );
    }

    #[test]
    fn test_bulk_component_analysis() {
        let decision = RelevanceRouter::new().route("analyze all lwc", &corpus());
        assert_eq!(decision.decisive(), Some(Detector::BulkComponentAnalysis));
        assert_eq!(decision.selected_files().len(), 2);

        let no_lwc: Vec<RepoFile> = corpus().into_iter().filter(|f| !f.path.contains("/lwc/")).collect();
        let decision = RelevanceRouter::new().route("lwc analysis please", &no_lwc);
        assert!(decision.in_scope());
        assert!(decision
            .rendered_context()
            .is_some_and(|t| t.contains("No Lightning Web Component files")));
    }

    #[test]
    fn test_explicit_file_suffix_match() {
        let decision = RelevanceRouter::new().route("open OrderTrigger.trigger", &corpus());
        assert_eq!(decision.decisive(), Some(Detector::ExplicitFile));
        assert_eq!(
            paths(&decision),
            vec!["force-app/main/default/triggers/OrderTrigger.trigger"]
        );
    }

    #[test]
    fn test_structure_request_renders_tree() {
        let files = vec![
            RepoFile::new("a/b.cls", ""),
            RepoFile::new("a/c.trigger", ""),
            RepoFile::new("d.txt", ""),
        ];
        let decision = RelevanceRouter::new().route("show me the folder structure", &files);
        assert_eq!(decision.decisive(), Some(Detector::StructureRequest));
        assert_eq!(
            decision.rendered_context(),
            Some("- a/\n  - b.cls\n  - c.trigger\n- d.txt")
        );
        assert_eq!(decision.selected_files().len(), 3);
    }

    #[test]
    fn test_codebase_search() {
        let decision = RelevanceRouter::new().route("are there any files using NavigationMixin?", &corpus());
        assert_eq!(decision.decisive(), Some(Detector::CodebaseSearch));
        assert_eq!(
            paths(&decision),
            vec!["force-app/main/default/lwc/invoiceList/invoiceList.js"]
        );

        let decision = RelevanceRouter::new().route(r#"find "deprecatedApi""#, &corpus());
        assert!(decision.in_scope());
        assert_eq!(
            decision.rendered_context(),
            Some("No files in the repository contain \"deprecatedApi\".")
        );
    }
}
