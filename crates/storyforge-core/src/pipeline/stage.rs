//! Run state machine and progress reporting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tracing::error;
use uuid::Uuid;

use crate::obs;

/// Where a run is.
///
/// Generation walks every stage from `Idle` to `Completed`. Analysis skips
/// synthesis and publishing; an out-of-scope query completes straight from
/// `Routing`. Any non-terminal stage may move to `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", content = "reason", rename_all = "snake_case")]
pub enum PipelineStage {
    Idle,
    Crawling,
    Routing,
    Assembling,
    ModelInvocation,
    Synthesizing,
    Publishing,
    Completed,
    Failed(String),
}

impl PipelineStage {
    pub fn name(&self) -> &'static str {
        match self {
            PipelineStage::Idle => "idle",
            PipelineStage::Crawling => "crawling",
            PipelineStage::Routing => "routing",
            PipelineStage::Assembling => "assembling",
            PipelineStage::ModelInvocation => "model_invocation",
            PipelineStage::Synthesizing => "synthesizing",
            PipelineStage::Publishing => "publishing",
            PipelineStage::Completed => "completed",
            PipelineStage::Failed(_) => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineStage::Completed | PipelineStage::Failed(_))
    }

    pub fn can_transition_to(&self, next: &PipelineStage) -> bool {
        use PipelineStage::*;
        match (self, next) {
            (from, Failed(_)) => !from.is_terminal(),
            (Idle, Crawling)
            | (Crawling, Routing)
            | (Routing, Assembling)
            | (Routing, Completed)
            | (Assembling, ModelInvocation)
            | (ModelInvocation, Synthesizing)
            | (ModelInvocation, Completed)
            | (Synthesizing, Publishing)
            | (Publishing, Completed) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineStage::Failed(reason) => write!(f, "failed: {reason}"),
            other => f.write_str(other.name()),
        }
    }
}

/// One progress update, suitable for streaming to a UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub run_id: String,
    pub stage: PipelineStage,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Tracks the stage of one run and forwards each transition to an optional
/// listener. Illegal transitions are logged and ignored.
#[derive(Debug)]
pub struct StatusReporter {
    run_id: String,
    stage: PipelineStage,
    tx: Option<UnboundedSender<StatusEvent>>,
}

impl StatusReporter {
    pub fn new(tx: Option<UnboundedSender<StatusEvent>>) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            stage: PipelineStage::Idle,
            tx,
        }
    }

    /// A reporter nobody listens to.
    pub fn silent() -> Self {
        Self::new(None)
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn stage(&self) -> &PipelineStage {
        &self.stage
    }

    /// Move to `next`. Returns false (and changes nothing) for an illegal
    /// transition.
    pub fn advance(&mut self, next: PipelineStage, message: impl Into<String>) -> bool {
        if !self.stage.can_transition_to(&next) {
            error!(
                run_id = %self.run_id,
                from = %self.stage,
                to = %next,
                "illegal stage transition ignored"
            );
            return false;
        }
        obs::emit_stage_entered(&self.run_id, next.name());
        self.stage = next.clone();
        if let Some(tx) = &self.tx {
            // A dropped receiver only means nobody is watching.
            let _ = tx.send(StatusEvent {
                run_id: self.run_id.clone(),
                stage: next,
                message: message.into(),
                at: Utc::now(),
            });
        }
        true
    }

    pub fn fail(&mut self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        self.advance(PipelineStage::Failed(reason.clone()), reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_generation_path_is_legal() {
        use PipelineStage::*;
        let path = [
            Idle,
            Crawling,
            Routing,
            Assembling,
            ModelInvocation,
            Synthesizing,
            Publishing,
            Completed,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(&pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_terminal_stages_are_final() {
        let failed = PipelineStage::Failed("boom".into());
        assert!(!failed.can_transition_to(&PipelineStage::Crawling));
        assert!(!PipelineStage::Completed.can_transition_to(&PipelineStage::Failed("x".into())));
        assert!(PipelineStage::Publishing.can_transition_to(&failed));
        assert!(!PipelineStage::Idle.can_transition_to(&PipelineStage::Publishing));
    }

    #[test]
    fn test_reporter_streams_and_rejects_illegal() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut reporter = StatusReporter::new(Some(tx));

        assert!(reporter.advance(PipelineStage::Crawling, "crawling acme/crm"));
        assert!(!reporter.advance(PipelineStage::Publishing, "skip ahead"));
        assert_eq!(reporter.stage(), &PipelineStage::Crawling);
        assert!(reporter.fail("network down"));

        let first = rx.try_recv().unwrap();
        assert_eq!(first.stage, PipelineStage::Crawling);
        assert_eq!(first.run_id, reporter.run_id());
        let second = rx.try_recv().unwrap();
        assert_eq!(second.stage, PipelineStage::Failed("network down".into()));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_stage_wire_shape() {
        let json = serde_json::to_value(PipelineStage::ModelInvocation).unwrap();
        assert_eq!(json, serde_json::json!({"stage": "model_invocation"}));
        let json = serde_json::to_value(PipelineStage::Failed("no token".into())).unwrap();
        assert_eq!(json, serde_json::json!({"stage": "failed", "reason": "no token"}));
    }
}
