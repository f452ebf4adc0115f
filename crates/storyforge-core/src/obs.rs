//! Structured lifecycle events for pipeline runs.
//!
//! Every helper logs one event with a stable `event` field so runs can be
//! followed in JSON log output.

use tracing::{info, warn};

/// Span tagging everything logged during one run with its id. Attach it to
/// the run future with `tracing::Instrument::instrument`.
pub fn run_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("storyforge.run", run_id = %run_id)
}

pub fn emit_run_started(run_id: &str, kind: &str, repo: &str, story_id: Option<&str>) {
    info!(
        event = "run.started",
        run_id = %run_id,
        kind = %kind,
        repo = %repo,
        story_id = story_id.unwrap_or("-"),
    );
}

pub fn emit_stage_entered(run_id: &str, stage: &str) {
    info!(event = "run.stage", run_id = %run_id, stage = %stage);
}

pub fn emit_run_finished(run_id: &str, duration_ms: u64, outcome: &str) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        outcome = %outcome,
    );
}

pub fn emit_run_failed(run_id: &str, stage: &str, error: &dyn std::fmt::Display) {
    warn!(event = "run.failed", run_id = %run_id, stage = %stage, error = %error);
}

/// A generated file matched the base tree; its blob was not rewritten.
pub fn emit_blob_reused(path: &str, sha: &str) {
    info!(event = "blob.reused", path = %path, sha = %sha);
}

/// The target ref held an unexpected commit.
pub fn emit_ref_conflict(branch: &str, observed: Option<&str>, wanted: &str) {
    warn!(
        event = "ref.conflict",
        branch = %branch,
        observed = observed.unwrap_or("-"),
        wanted = %wanted,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_span_create() {
        let span = run_span("test-run-id");
        let _entered = span.enter();
        emit_stage_entered("test-run-id", "crawling");
    }
}
