//! Storyforge Core Library
//!
//! Turns a natural-language request against a hosted repository into either
//! an answer or a published branch with a pull request, without cloning.
//!
//! ## Layer 2 - Pipeline
//!
//! - [`crawler`] fetches a branch's text files through the hosting API.
//! - [`router`] decides whether a query is about the repository and which
//!   files matter.
//! - [`assembler`] packs the selection into a bounded prompt context.
//! - [`synthesizer`] writes blobs, a tree and a commit on the host.
//! - [`publisher`] resolves the base branch, moves the target ref and opens
//!   the pull request.
//! - [`pipeline`] sequences the stages and reports progress.

pub mod assembler;
pub mod config;
pub mod crawler;
pub mod domain;
pub mod metrics;
pub mod obs;
pub mod pipeline;
pub mod publisher;
pub mod router;
pub mod synthesizer;
pub mod telemetry;

pub use assembler::{render_directory_tree, ContextAssembler};
pub use config::{RefUpdatePolicy, StoryforgeConfig};
pub use crawler::RepositoryCrawler;
pub use domain::{
    BlobOutcome, CommitRef, PipelineError, PipelineResult, PublishResult, RepoFile,
    SynthesizedEntry,
};
pub use pipeline::{
    AnalysisOutcome, GenerationOutcome, Pipeline, PipelineRequest, PipelineStage, RequestKind,
    StatusEvent, StatusReporter, OUT_OF_SCOPE_MESSAGE,
};
pub use publisher::{
    derive_branch_name, resolve_base_branch, BranchLocks, BranchPublisher, ResolutionSource,
    ResolvedBranch,
};
pub use router::{Detector, RelevanceRouter, RouteOutcome, RoutingDecision};
pub use synthesizer::ObjectGraphSynthesizer;

pub use metrics::METRICS;
pub use telemetry::init_tracing;

/// Storyforge version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
