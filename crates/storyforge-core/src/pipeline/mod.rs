//! The orchestrator: crawl, route, assemble, ask the model, and for
//! generation runs synthesize a commit and publish it.
//!
//! Each run gets a [`StatusReporter`] that records its stage and streams
//! progress. Every run ends in `Completed` or `Failed`; there are no
//! retries.

mod request;
mod stage;

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use model_gateway::{
    analysis_request, generation_request, parse_generated_files, ModelClient, StoryBrief,
};
use remote_git::{GitHost, RepoId};
use tracing::{info, Instrument};

pub use request::{AnalysisOutcome, GenerationOutcome, PipelineRequest, RequestKind};
pub use stage::{PipelineStage, StatusEvent, StatusReporter};

use crate::assembler::ContextAssembler;
use crate::config::{PipelineSettings, StoryforgeConfig};
use crate::crawler::RepositoryCrawler;
use crate::domain::{PipelineError, PipelineResult, RepoFile};
use crate::metrics::METRICS;
use crate::obs;
use crate::publisher::{
    available_branch_name, derive_branch_name, resolve_base_branch, BranchLocks,
    BranchPublisher, ResolvedBranch,
};
use crate::router::{RelevanceRouter, RoutingDecision};
use crate::synthesizer::{commit_message, ObjectGraphSynthesizer};

/// Returned instead of an answer when a query has nothing to do with the
/// repository. The model is not called in that case.
pub const OUT_OF_SCOPE_MESSAGE: &str = "I can only help with questions about this project's \
repository: its Salesforce code, components, files and structure. Please rephrase your \
request in terms of the codebase.";

pub struct Pipeline {
    host: Arc<dyn GitHost>,
    model: Arc<dyn ModelClient>,
    settings: PipelineSettings,
    max_tokens: u32,
    router: RelevanceRouter,
    locks: Arc<BranchLocks>,
}

impl Pipeline {
    pub fn new(host: Arc<dyn GitHost>, model: Arc<dyn ModelClient>, config: &StoryforgeConfig) -> Self {
        Self {
            host,
            model,
            settings: config.pipeline.clone(),
            max_tokens: config.model.max_tokens,
            router: RelevanceRouter::default(),
            locks: Arc::new(BranchLocks::new()),
        }
    }

    pub fn with_router(mut self, router: RelevanceRouter) -> Self {
        self.router = router;
        self
    }

    /// Share branch locks with other pipelines in the process.
    pub fn with_locks(mut self, locks: Arc<BranchLocks>) -> Self {
        self.locks = locks;
        self
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Answer a question about the repository.
    pub async fn analyze(
        &self,
        request: &PipelineRequest,
        reporter: &mut StatusReporter,
    ) -> PipelineResult<AnalysisOutcome> {
        let RequestKind::Analyze { query } = &request.kind else {
            return Err(PipelineError::Config(format!(
                "analyze called with a {} request",
                request.kind_name()
            )));
        };
        let span = obs::run_span(reporter.run_id());
        async {
            let started = begin(request, reporter);
            let result = self.analysis_steps(request, query, reporter).await;
            end(result, AnalysisOutcome::label, started, reporter)
        }
        .instrument(span)
        .await
    }

    /// Implement a story on a new branch and open a pull request for it.
    pub async fn generate(
        &self,
        request: &PipelineRequest,
        reporter: &mut StatusReporter,
    ) -> PipelineResult<GenerationOutcome> {
        let RequestKind::Generate { story } = &request.kind else {
            return Err(PipelineError::Config(format!(
                "generate called with a {} request",
                request.kind_name()
            )));
        };
        let span = obs::run_span(reporter.run_id());
        async {
            let started = begin(request, reporter);
            let result = self.generation_steps(request, story, reporter).await;
            end(result, GenerationOutcome::label, started, reporter)
        }
        .instrument(span)
        .await
    }

    async fn analysis_steps(
        &self,
        request: &PipelineRequest,
        query: &str,
        reporter: &mut StatusReporter,
    ) -> PipelineResult<AnalysisOutcome> {
        let (_, files) = self.crawl(&request.repo, request.selected_branch.as_deref(), reporter).await?;

        let Some(decision) = self.route(query, &files, reporter) else {
            return Ok(AnalysisOutcome::OutOfScope {
                message: OUT_OF_SCOPE_MESSAGE.to_string(),
            });
        };
        let context = self.assemble(&decision, reporter);

        reporter.advance(
            PipelineStage::ModelInvocation,
            format!("asking {}", self.model.name()),
        );
        METRICS.inc_model_invocations();
        let text = self
            .model
            .complete(&analysis_request(query, &context, self.max_tokens))
            .await?;

        Ok(AnalysisOutcome::Answer {
            text,
            files: decision
                .selected_files()
                .iter()
                .map(|f| f.path.clone())
                .collect(),
        })
    }

    async fn generation_steps(
        &self,
        request: &PipelineRequest,
        story: &StoryBrief,
        reporter: &mut StatusReporter,
    ) -> PipelineResult<GenerationOutcome> {
        let repo = &request.repo;
        let (base, files) = self.crawl(repo, request.selected_branch.as_deref(), reporter).await?;

        let Some(decision) = self.route(&story.as_query(), &files, reporter) else {
            return Ok(GenerationOutcome::OutOfScope {
                message: OUT_OF_SCOPE_MESSAGE.to_string(),
            });
        };
        let context = self.assemble(&decision, reporter);

        reporter.advance(
            PipelineStage::ModelInvocation,
            format!("asking {} for the implementation", self.model.name()),
        );
        METRICS.inc_model_invocations();
        let text = self
            .model
            .complete(&generation_request(story, &context, self.max_tokens))
            .await?;
        let generated = parse_generated_files(&text)?;
        info!(files = generated.len(), "model returned a file set");

        reporter.advance(
            PipelineStage::Synthesizing,
            format!("writing {} files on top of {}", generated.len(), base.name),
        );
        let candidate = derive_branch_name(
            &story.title,
            &self.settings.branch_prefix,
            self.settings.slug_words,
        );
        let branch = available_branch_name(self.host.as_ref(), repo, &candidate, Utc::now()).await?;
        let commit = ObjectGraphSynthesizer::new(Arc::clone(&self.host))
            .synthesize(
                repo,
                &base.name,
                &branch,
                &generated,
                &commit_message(&self.settings.commit_prefix, &story.title),
            )
            .await?;

        reporter.advance(
            PipelineStage::Publishing,
            format!("publishing {}", commit.branch_name),
        );
        let published = BranchPublisher::new(Arc::clone(&self.host), Arc::clone(&self.locks))
            .with_policy(self.settings.ref_policy)
            .with_draft(self.settings.draft_pull_requests)
            .publish(repo, &base.name, &commit, story)
            .await?;

        Ok(GenerationOutcome::Published(published))
    }

    /// Resolve the base branch and fetch its files.
    async fn crawl(
        &self,
        repo: &RepoId,
        selected: Option<&str>,
        reporter: &mut StatusReporter,
    ) -> PipelineResult<(ResolvedBranch, Vec<RepoFile>)> {
        let hint = selected
            .filter(|b| !b.trim().is_empty())
            .unwrap_or(&self.settings.preferred_base_branch);
        reporter.advance(PipelineStage::Crawling, format!("crawling {repo}"));
        let base = resolve_base_branch(self.host.as_ref(), repo, hint).await?;
        let files = RepositoryCrawler::new(Arc::clone(&self.host), self.settings.crawl_concurrency)
            .crawl(repo, &base.name, &self.settings.crawl_root)
            .await?;
        Ok((base, files))
    }

    /// `None` when the query is out of scope; the run is then complete.
    fn route(
        &self,
        query: &str,
        files: &[RepoFile],
        reporter: &mut StatusReporter,
    ) -> Option<RoutingDecision> {
        reporter.advance(
            PipelineStage::Routing,
            format!("routing over {} files", files.len()),
        );
        let decision = self.router.route(query, files);
        if decision.in_scope() {
            Some(decision)
        } else {
            info!("query is out of scope, model not called");
            None
        }
    }

    fn assemble(&self, decision: &RoutingDecision, reporter: &mut StatusReporter) -> String {
        reporter.advance(
            PipelineStage::Assembling,
            format!("assembling context from {} files", decision.selected_files().len()),
        );
        ContextAssembler::new(self.settings.context_budget_chars).assemble(decision)
    }
}

fn begin(request: &PipelineRequest, reporter: &StatusReporter) -> Instant {
    obs::emit_run_started(
        reporter.run_id(),
        request.kind_name(),
        &request.repo.to_string(),
        request.story_id.as_deref(),
    );
    Instant::now()
}

/// Move the reporter to its terminal stage and log the outcome.
fn end<T>(
    result: PipelineResult<T>,
    label: fn(&T) -> &'static str,
    started: Instant,
    reporter: &mut StatusReporter,
) -> PipelineResult<T> {
    let elapsed = started.elapsed().as_millis() as u64;
    match &result {
        Ok(value) => {
            reporter.advance(PipelineStage::Completed, label(value));
            obs::emit_run_finished(reporter.run_id(), elapsed, label(value));
        }
        Err(err) => {
            let stage = reporter.stage().name();
            obs::emit_run_failed(reporter.run_id(), stage, err);
            reporter.fail(err.to_string());
        }
    }
    METRICS.flush();
    result
}
