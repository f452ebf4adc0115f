//! End-to-end runs of both flows against the in-memory host and a scripted
//! model.

use std::sync::Arc;

use model_gateway::fakes::ScriptedModel;
use model_gateway::{ModelError, StoryBrief};
use remote_git::fakes::{HostOp, MemoryGitHost};
use remote_git::RepoId;
use storyforge_core::{
    AnalysisOutcome, GenerationOutcome, Pipeline, PipelineError, PipelineRequest, PipelineStage,
    StatusEvent, StatusReporter, StoryforgeConfig, OUT_OF_SCOPE_MESSAGE,
};
use tokio::sync::mpsc;

const CONTROLLER: &str = "force-app/main/default/classes/AccountController.cls";

fn repo() -> RepoId {
    RepoId::new("acme", "crm")
}

fn host() -> Arc<MemoryGitHost> {
    let host = Arc::new(MemoryGitHost::new());
    host.seed_repo(
        &repo(),
        "main",
        &[
            ("README.md", "# crm"),
            (CONTROLLER, "public with sharing class AccountController {}"),
            (
                "force-app/main/default/lwc/accountList/accountList.js",
                "import { LightningElement } from 'lwc';",
            ),
            (
                "force-app/main/default/lwc/accountList/accountList.html",
                "<template></template>",
            ),
        ],
    );
    host
}

fn pipeline(host: &Arc<MemoryGitHost>, model: &Arc<ScriptedModel>) -> Pipeline {
    Pipeline::new(host.clone(), model.clone(), &StoryforgeConfig::default())
}

fn reporter() -> (StatusReporter, mpsc::UnboundedReceiver<StatusEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (StatusReporter::new(Some(tx)), rx)
}

fn stages(rx: &mut mpsc::UnboundedReceiver<StatusEvent>) -> Vec<PipelineStage> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event.stage);
    }
    out
}

fn story() -> StoryBrief {
    StoryBrief::new("Add invoice list lwc component")
        .with_description("Show unpaid invoices next to the account list.")
        .with_criterion("Only unpaid invoices are shown")
}

const GENERATED: &str = r#"```json
{
  "force-app/main/default/lwc/invoiceList/invoiceList.js": "import { LightningElement } from 'lwc';\nexport default class InvoiceList extends LightningElement {}",
  "force-app/main/default/lwc/accountList/accountList.html": "<template></template>"
}
```"#;

#[tokio::test]
async fn test_out_of_scope_question_never_reaches_model() {
    let host = host();
    let model = Arc::new(ScriptedModel::new().reply("should not be used"));
    let (mut reporter, mut rx) = reporter();

    let outcome = pipeline(&host, &model)
        .analyze(
            &PipelineRequest::analyze(repo(), "What's the weather today?"),
            &mut reporter,
        )
        .await
        .unwrap();

    assert_eq!(
        outcome,
        AnalysisOutcome::OutOfScope {
            message: OUT_OF_SCOPE_MESSAGE.to_string()
        }
    );
    assert_eq!(model.invocations(), 0);
    assert_eq!(
        stages(&mut rx),
        vec![
            PipelineStage::Crawling,
            PipelineStage::Routing,
            PipelineStage::Completed
        ]
    );
}

#[tokio::test]
async fn test_analysis_answers_with_routed_context() {
    let host = host();
    let model = Arc::new(ScriptedModel::new().reply("AccountController is an empty class."));
    let (mut reporter, mut rx) = reporter();

    let outcome = pipeline(&host, &model)
        .analyze(
            &PipelineRequest::analyze(repo(), "explain AccountController apex class"),
            &mut reporter,
        )
        .await
        .unwrap();

    assert_eq!(
        outcome,
        AnalysisOutcome::Answer {
            text: "AccountController is an empty class.".into(),
            files: vec![CONTROLLER.to_string()],
        }
    );
    let requests = model.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].prompt.contains(&format!("// File: {CONTROLLER}")));
    assert!(requests[0].prompt.contains("explain AccountController apex class"));
    assert!(!requests[0].prompt.contains("accountList.js"));
    assert_eq!(
        stages(&mut rx),
        vec![
            PipelineStage::Crawling,
            PipelineStage::Routing,
            PipelineStage::Assembling,
            PipelineStage::ModelInvocation,
            PipelineStage::Completed
        ]
    );
}

#[tokio::test]
async fn test_generation_publishes_branch_and_pull_request() {
    let host = host();
    let model = Arc::new(ScriptedModel::new().reply(GENERATED));
    let (mut reporter, mut rx) = reporter();

    let outcome = pipeline(&host, &model)
        .generate(
            &PipelineRequest::generate(repo(), story()).with_ids("proj-1", "story-7"),
            &mut reporter,
        )
        .await
        .unwrap();

    let GenerationOutcome::Published(result) = outcome else {
        panic!("expected a published branch");
    };
    assert_eq!(result.branch_name, "story/add-invoice-list-lwc-component");
    assert_eq!(result.base_branch, "main");
    assert!(!result.pull_request_existed);
    assert_eq!(
        host.branch_sha(&repo(), &result.branch_name),
        Some(result.commit_sha.clone())
    );

    let tree = host.files_at(&repo(), &result.commit_sha).unwrap();
    assert_eq!(tree.len(), 5);
    assert!(tree.contains_key("force-app/main/default/lwc/invoiceList/invoiceList.js"));
    assert_eq!(tree["README.md"], "# crm");
    // The unchanged markup file reused its blob.
    assert_eq!(host.calls(HostOp::CreateBlob), 1);

    let prompt = &model.requests()[0].prompt;
    assert!(prompt.contains("Add invoice list lwc component"));
    assert!(prompt.contains("Only unpaid invoices are shown"));

    assert_eq!(
        stages(&mut rx),
        vec![
            PipelineStage::Crawling,
            PipelineStage::Routing,
            PipelineStage::Assembling,
            PipelineStage::ModelInvocation,
            PipelineStage::Synthesizing,
            PipelineStage::Publishing,
            PipelineStage::Completed
        ]
    );
    assert_eq!(reporter.stage(), &PipelineStage::Completed);
}

#[tokio::test]
async fn test_second_generation_gets_suffixed_branch() {
    let host = host();
    let model = Arc::new(ScriptedModel::new().reply(GENERATED).reply(GENERATED));
    let pipeline = pipeline(&host, &model);
    let request = PipelineRequest::generate(repo(), story());

    let first = pipeline
        .generate(&request, &mut StatusReporter::silent())
        .await
        .unwrap();
    let second = pipeline
        .generate(&request, &mut StatusReporter::silent())
        .await
        .unwrap();

    let (GenerationOutcome::Published(first), GenerationOutcome::Published(second)) =
        (first, second)
    else {
        panic!("both runs should publish");
    };
    assert_ne!(first.branch_name, second.branch_name);
    let suffix = second
        .branch_name
        .strip_prefix(&format!("{}-", first.branch_name))
        .unwrap();
    assert_eq!(suffix.len(), 14);
    assert!(suffix.chars().all(|c| c.is_ascii_digit()));
    assert_eq!(host.pull_requests(&repo()).len(), 2);
}

#[tokio::test]
async fn test_invalid_model_output_aborts_before_synthesis() {
    let host = host();
    let model = Arc::new(ScriptedModel::new().reply("Here is the code you asked for!"));
    let (mut reporter, mut rx) = reporter();

    let err = pipeline(&host, &model)
        .generate(&PipelineRequest::generate(repo(), story()), &mut reporter)
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::ModelResponse(_)));
    assert_eq!(host.calls(HostOp::CreateBlob), 0);
    assert_eq!(host.calls(HostOp::CreateTree), 0);
    assert_eq!(host.calls(HostOp::CreateRef), 0);
    assert!(matches!(reporter.stage(), PipelineStage::Failed(_)));
    assert!(matches!(stages(&mut rx).last(), Some(PipelineStage::Failed(_))));
}

#[tokio::test]
async fn test_model_api_failure_is_terminal() {
    let host = host();
    let model = Arc::new(ScriptedModel::new().fail(ModelError::Api {
        status: 529,
        message: "overloaded".into(),
    }));
    let mut reporter = StatusReporter::silent();

    let err = pipeline(&host, &model)
        .analyze(
            &PipelineRequest::analyze(repo(), "analyze the lwc components"),
            &mut reporter,
        )
        .await
        .unwrap_err();

    assert_eq!(
        err,
        PipelineError::ModelApi {
            status: 529,
            message: "overloaded".into()
        }
    );
    assert_eq!(model.invocations(), 1);
    assert!(matches!(reporter.stage(), PipelineStage::Failed(_)));
}

#[tokio::test]
async fn test_selected_branch_is_used_as_base() {
    let host = host();
    host.add_branch(&repo(), "Release", "main");
    let model = Arc::new(ScriptedModel::new().reply(GENERATED));

    let outcome = pipeline(&host, &model)
        .generate(
            &PipelineRequest::generate(repo(), story()).with_branch("release"),
            &mut StatusReporter::silent(),
        )
        .await
        .unwrap();

    let GenerationOutcome::Published(result) = outcome else {
        panic!("expected a published branch");
    };
    assert_eq!(result.base_branch, "Release");
    assert_eq!(host.pull_requests(&repo())[0].base, "Release");
}

#[tokio::test]
async fn test_wrong_request_kind_is_config_error() {
    let host = host();
    let model = Arc::new(ScriptedModel::new());
    let err = pipeline(&host, &model)
        .generate(
            &PipelineRequest::analyze(repo(), "explain the repo"),
            &mut StatusReporter::silent(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Config(_)));
}
