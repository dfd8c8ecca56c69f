//! End-to-end runs of the fact-checking graph with scripted collaborators.

mod common;

use std::sync::Arc;
use std::time::Duration;

use clarifai::core::{GraphError, NodeId};
use clarifai::nodes::NO_CLAIMS_REPORT;
use clarifai::VerificationSource;

use common::*;

#[tokio::test]
async fn test_llm_verification_path() {
    let model = Arc::new(full_model());
    let execution = pipeline(model.clone(), VerificationSource::Llm)
        .run(TEXT)
        .await
        .unwrap();

    assert!(execution.completed.contains(&NodeId::VerifyClaimsLlm));
    assert!(!execution.completed.contains(&NodeId::VerifyClaimsWeb));
    assert_eq!(execution.skipped, vec![NodeId::VerifyClaimsWeb]);

    let position = |id| execution.completed.iter().position(|n| *n == id).unwrap();
    assert!(position(NodeId::AggregateVerdict) > position(NodeId::VerifyClaimsLlm));
    assert!(position(NodeId::AggregateVerdict) > position(NodeId::DetectBiases));
    assert_eq!(execution.completed.last(), Some(&NodeId::ExportReport));

    let state = &execution.state;
    assert_eq!(state.cleaned_content, TEXT);
    assert_eq!(state.segments.len(), 2);
    assert_eq!(state.report, "The text is mostly reliable.");
    assert_eq!(state.details.len(), 2);
    assert_eq!(state.details[0].id, 0);
    assert_eq!(state.details[0].claims.len(), 1);
    assert_eq!(state.details[1].biases.len(), 1);

    assert_eq!(model.calls().iter().filter(|c| *c == "stream").count(), 1);
}

#[tokio::test]
async fn test_events_come_from_preprocess_extract_and_verify() {
    let execution = pipeline(Arc::new(full_model()), VerificationSource::Llm)
        .run(TEXT)
        .await
        .unwrap();

    let mut steps = execution.state.events.steps();
    assert_eq!(steps.len(), 3);
    assert_eq!(steps[0], "segments");
    steps.sort();
    assert_eq!(steps, vec!["claims", "claims", "segments"]);
}

#[tokio::test]
async fn test_web_verification_path() {
    let model = Arc::new(full_model());
    let search = Arc::new(FakeSearch::default());
    let execution = pipeline_with_search(model.clone(), search.clone())
        .run(TEXT)
        .await
        .unwrap();

    assert!(execution.completed.contains(&NodeId::VerifyClaimsWeb));
    assert_eq!(execution.skipped, vec![NodeId::VerifyClaimsLlm]);
    assert_eq!(search.queries(), vec!["The Eiffel Tower is 330 metres tall"]);

    // Web verification contributes no events
    let steps = execution.state.events.steps();
    assert_eq!(steps.len(), 2);
    assert_eq!(execution.state.verified_claims.len(), 1);
}

#[tokio::test]
async fn test_no_claims_skips_verification() {
    let model = Arc::new(
        full_model().answer("Claims", no_claims_answer()),
    );
    let execution = pipeline(model.clone(), VerificationSource::Web)
        .run(TEXT)
        .await
        .unwrap();

    let mut skipped = execution.skipped.clone();
    skipped.sort();
    assert_eq!(skipped, vec![NodeId::VerifyClaimsLlm, NodeId::VerifyClaimsWeb]);
    assert!(!model.called("VerifiedClaims"));
    assert!(execution.state.verified_claims.is_empty());

    // Biases alone still produce a generated report
    assert_eq!(execution.state.report, "The text is mostly reliable.");
    assert_eq!(execution.state.details.len(), 1);
    assert_eq!(execution.state.details[0].id, 1);
}

#[tokio::test]
async fn test_aggregate_waits_for_slow_bias_detection() {
    let model = Arc::new(full_model().delay("Biases", Duration::from_millis(100)));
    let execution = pipeline(model, VerificationSource::Llm)
        .run(TEXT)
        .await
        .unwrap();

    let position = |id| execution.completed.iter().position(|n| *n == id).unwrap();
    assert!(position(NodeId::VerifyClaimsLlm) < position(NodeId::DetectBiases));
    assert!(position(NodeId::DetectBiases) < position(NodeId::AggregateVerdict));
    assert_eq!(
        execution
            .completed
            .iter()
            .filter(|n| **n == NodeId::AggregateVerdict)
            .count(),
        1
    );
    assert_eq!(execution.state.details[1].biases.len(), 1);
}

#[tokio::test]
async fn test_empty_input_still_produces_report() {
    let model = Arc::new(ScriptedModel::new());
    let execution = pipeline(model.clone(), VerificationSource::Llm)
        .run("   \n  ")
        .await
        .unwrap();

    assert!(execution.state.segments.is_empty());
    assert!(execution.state.details.is_empty());
    assert_eq!(execution.state.report, NO_CLAIMS_REPORT);
    assert!(model.calls().is_empty());
    assert_eq!(execution.completed.last(), Some(&NodeId::ExportReport));
}

#[tokio::test]
async fn test_model_failure_aborts_run() {
    let model = Arc::new(full_model().fail("Claims", "rate limited"));
    let err = pipeline(model, VerificationSource::Llm)
        .run(TEXT)
        .await
        .unwrap_err();

    match err {
        GraphError::NodeFailed { node, source } => {
            assert_eq!(node, NodeId::ExtractClaims);
            assert!(source.to_string().contains("rate limited"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_schema_violation_aborts_run() {
    let model = Arc::new(
        full_model().answer("VerifiedClaims", serde_json::json!({"items": [{"verdict": "maybe"}]})),
    );
    let err = pipeline(model, VerificationSource::Llm)
        .run(TEXT)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        GraphError::NodeFailed {
            node: NodeId::VerifyClaimsLlm,
            ..
        }
    ));
}

#[tokio::test]
async fn test_concurrent_runs_are_isolated() {
    let pipeline = pipeline(Arc::new(full_model()), VerificationSource::Llm);

    let (first, second) = tokio::join!(pipeline.run(TEXT), pipeline.run("   "));
    let first = first.unwrap();
    let second = second.unwrap();

    assert_ne!(first.run_id, second.run_id);
    assert_eq!(first.state.segments.len(), 2);
    assert!(second.state.segments.is_empty());
    assert_eq!(second.state.report, NO_CLAIMS_REPORT);
}
