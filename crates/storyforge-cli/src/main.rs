//! Storyforge CLI
//!
//! The `storyforge` command runs the pipeline against a hosted repository.
//!
//! ## Commands
//!
//! - `analyze`: answer a question about the repository
//! - `generate`: implement a story on a new branch and open a pull request
//! - `route`: show which files a query would be answered from (no model call)

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use model_gateway::{AnthropicClient, StoryBrief};
use remote_git::{GitHost, GitHubClient, RepoId};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, Level};

use storyforge_core::{
    resolve_base_branch, AnalysisOutcome, Detector, GenerationOutcome, Pipeline, PipelineRequest,
    RefUpdatePolicy, RelevanceRouter, RepositoryCrawler, ResolutionSource, StatusEvent,
    StatusReporter, StoryforgeConfig,
};

#[derive(Parser)]
#[command(name = "storyforge")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Answer questions about a hosted repository and turn stories into pull requests", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON results and JSON log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Target {
    /// Repository as owner/name
    #[arg(short, long)]
    repo: String,

    /// Base branch hint (defaults to the configured preferred branch)
    #[arg(short, long)]
    branch: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a question about the repository
    Analyze {
        #[command(flatten)]
        target: Target,

        /// The question
        #[arg(short, long)]
        query: String,
    },

    /// Generate code for a story and publish it as a pull request
    Generate {
        #[command(flatten)]
        target: Target,

        /// Story title (also names the branch)
        #[arg(short, long)]
        title: String,

        /// Story description
        #[arg(short, long, default_value = "")]
        description: String,

        /// Acceptance criterion (repeatable)
        #[arg(long = "criteria")]
        criteria: Vec<String>,

        /// Force-move the target branch if it has diverged
        #[arg(long)]
        force_update: bool,

        /// Open the pull request as a draft
        #[arg(long)]
        draft: bool,

        /// Project identifier, for logs
        #[arg(long)]
        project_id: Option<String>,

        /// Story identifier, for logs
        #[arg(long)]
        story_id: Option<String>,
    },

    /// Crawl and route a query without calling the model
    Route {
        #[command(flatten)]
        target: Target,

        /// The query to route
        #[arg(short, long)]
        query: String,
    },
}

#[derive(Serialize)]
struct RouteReport {
    branch: String,
    resolved_via: ResolutionSource,
    crawled: usize,
    in_scope: bool,
    matched: Vec<Detector>,
    files: Vec<String>,
    rendered: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    storyforge_core::init_tracing(cli.json, level);

    let mut config =
        StoryforgeConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Analyze { target, query } => cmd_analyze(&config, &target, &query, cli.json).await,
        Commands::Generate {
            target,
            title,
            description,
            criteria,
            force_update,
            draft,
            project_id,
            story_id,
        } => {
            if force_update {
                config.pipeline.ref_policy = RefUpdatePolicy::Force;
            }
            if draft {
                config.pipeline.draft_pull_requests = true;
            }
            let mut story = StoryBrief::new(title).with_description(description);
            for criterion in criteria {
                story = story.with_criterion(criterion);
            }
            let mut request = PipelineRequest::generate(parse_repo(&target.repo)?, story);
            request.selected_branch = target.branch;
            request.project_id = project_id;
            request.story_id = story_id;
            cmd_generate(&config, &request, cli.json).await
        }
        Commands::Route { target, query } => cmd_route(&config, &target, &query, cli.json).await,
    }
}

fn parse_repo(raw: &str) -> Result<RepoId> {
    RepoId::parse(raw).ok_or_else(|| anyhow!("invalid repository '{raw}', expected owner/name"))
}

/// `--branch` when given and non-blank, else the configured preferred branch.
fn base_hint<'a>(target: &'a Target, config: &'a StoryforgeConfig) -> &'a str {
    target
        .branch
        .as_deref()
        .filter(|b| !b.trim().is_empty())
        .unwrap_or(&config.pipeline.preferred_base_branch)
}

fn connect_host(config: &StoryforgeConfig) -> Result<Arc<dyn GitHost>> {
    let settings = config.github_config()?;
    let client = GitHubClient::new(settings).context("Failed to build hosting client")?;
    Ok(Arc::new(client))
}

fn build_pipeline(config: &StoryforgeConfig) -> Result<Pipeline> {
    let host = connect_host(config)?;
    let model =
        AnthropicClient::new(config.anthropic_config()).context("Failed to build model client")?;
    Ok(Pipeline::new(host, Arc::new(model), config))
}

/// Print status events to stderr as they arrive.
fn status_printer() -> (StatusReporter, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<StatusEvent>();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            eprintln!("[{}] {}", event.stage.name(), event.message);
        }
    });
    (StatusReporter::new(Some(tx)), printer)
}

async fn drain(reporter: StatusReporter, printer: JoinHandle<()>) {
    drop(reporter);
    if let Err(e) = printer.await {
        debug!(error = %e, "status printer ended abnormally");
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to serialize result")?
    );
    Ok(())
}

async fn cmd_analyze(config: &StoryforgeConfig, target: &Target, query: &str, json: bool) -> Result<()> {
    let pipeline = build_pipeline(config)?;
    let mut request = PipelineRequest::analyze(parse_repo(&target.repo)?, query);
    request.selected_branch = target.branch.clone();

    let (mut reporter, printer) = status_printer();
    let outcome = pipeline.analyze(&request, &mut reporter).await;
    drain(reporter, printer).await;
    let outcome = outcome.context("Analysis failed")?;

    if json {
        return print_json(&outcome);
    }
    match outcome {
        AnalysisOutcome::Answer { text, files } => {
            println!("{text}");
            if !files.is_empty() {
                println!();
                println!("Context files:");
                for file in files {
                    println!("  {file}");
                }
            }
        }
        AnalysisOutcome::OutOfScope { message } => println!("{message}"),
    }
    Ok(())
}

async fn cmd_generate(config: &StoryforgeConfig, request: &PipelineRequest, json: bool) -> Result<()> {
    let pipeline = build_pipeline(config)?;

    let (mut reporter, printer) = status_printer();
    let outcome = pipeline.generate(request, &mut reporter).await;
    drain(reporter, printer).await;
    let outcome = outcome.context("Generation failed")?;

    if json {
        return print_json(&outcome);
    }
    match outcome {
        GenerationOutcome::Published(result) => {
            println!("Branch:       {} (from {})", result.branch_name, result.base_branch);
            println!("Commit:       {}", result.commit_sha);
            let note = if result.pull_request_existed {
                " (already open)"
            } else {
                ""
            };
            println!(
                "Pull request: #{} {}{note}",
                result.pull_request_number, result.pull_request_url
            );
        }
        GenerationOutcome::OutOfScope { message } => println!("{message}"),
    }
    Ok(())
}

async fn cmd_route(config: &StoryforgeConfig, target: &Target, query: &str, json: bool) -> Result<()> {
    let host = connect_host(config)?;
    let repo = parse_repo(&target.repo)?;
    let hint = base_hint(target, config);

    let base = resolve_base_branch(host.as_ref(), &repo, hint)
        .await
        .context("Failed to resolve base branch")?;
    let files = RepositoryCrawler::new(Arc::clone(&host), config.pipeline.crawl_concurrency)
        .crawl(&repo, &base.name, &config.pipeline.crawl_root)
        .await
        .context("Crawl failed")?;
    let decision = RelevanceRouter::new().route(query, &files);

    let report = RouteReport {
        branch: base.name,
        resolved_via: base.via,
        crawled: files.len(),
        in_scope: decision.in_scope(),
        matched: decision.matched.clone(),
        files: decision
            .selected_files()
            .iter()
            .map(|f| f.path.clone())
            .collect(),
        rendered: decision.rendered_context().map(str::to_string),
    };

    if json {
        return print_json(&report);
    }
    println!(
        "Branch:   {} ({:?}), {} files crawled",
        report.branch, report.resolved_via, report.crawled
    );
    if !report.in_scope {
        println!("Out of scope: the model would not be called.");
        return Ok(());
    }
    let matched: Vec<&str> = report.matched.iter().map(Detector::as_str).collect();
    println!("Matched:  {}", matched.join(", "));
    match &report.rendered {
        Some(text) => println!("{text}"),
        None => {
            for file in &report.files {
                println!("  {file}");
            }
        }
    }
    Ok(())
}
