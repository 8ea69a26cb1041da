//! End-to-end orchestration scenarios against the scriptable mock upstream.

#![cfg_attr(
    test,
    allow(
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::tests_outside_test_module,
        reason = "Test allows"
    )
)]

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use uuid::Uuid;

use adlens_core::{Complexity, TaskIntent};
use adlens_orchestrator::{
    ClassificationResult, DriftSignal, ModelId, Orchestrator, OrchestratorConfig, ProcessOptions,
    RequestProvenance,
};
use adlens_providers::MockUpstream;
use tracing_subscriber::fmt;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt as _, registry, util::SubscriberInitExt as _};

fn init_tracing() {
    drop(
        registry()
            .with(fmt::layer().with_test_writer().with_target(false))
            .with(EnvFilter::from_default_env())
            .try_init(),
    );
}

fn orchestrator_with(mock: Arc<MockUpstream>, config: OrchestratorConfig) -> Orchestrator {
    let mut config = config;
    config.keys.api_keys = vec!["key-a".to_owned(), "key-b".to_owned()];
    Orchestrator::new(mock, config)
}

fn classified(intent: TaskIntent, complexity: Complexity, two_pass: bool) -> ClassificationResult {
    ClassificationResult {
        intent,
        complexity,
        estimated_tokens: 200,
        confidence: 1.0,
        requires_two_pass: two_pass,
    }
}

/// A long prompt needs a model-backed classification, yet only the main
/// execution call lands in the audit trail.
#[tokio::test]
async fn long_summarization_request_yields_exactly_one_provenance_row() {
    init_tracing();
    let mock = Arc::new(MockUpstream::new().with_default_response(
        r#"{"intent":"summarization","complexity":"medium","confidence":0.9,"requires_two_pass":false}"#,
    ));
    let orchestrator = orchestrator_with(Arc::clone(&mock), OrchestratorConfig::default());

    let prompt = "Summarize the regional performance differences in our latest campaign. "
        .repeat(9);
    assert!(prompt.len() > 600);

    let outcome = orchestrator.process(&prompt, ProcessOptions::default()).await;

    assert!(outcome.success);
    assert_eq!(
        outcome.classification.expect("classified").intent,
        TaskIntent::Summarization
    );
    assert_eq!(outcome.provenance_ids.len(), 1);
    // Classifier call plus execution call.
    assert_eq!(mock.call_count(), 2);

    let report = orchestrator.operator_report(1).await.expect("report");
    assert_eq!(
        report.task_distribution.get(&TaskIntent::Summarization),
        Some(&1)
    );
    let total_audited: usize = report.task_distribution.values().sum();
    assert_eq!(total_audited, 1);
}

/// An exhausted premium budget silently downgrades to a cheaper affine
/// model instead of failing the request.
#[tokio::test]
async fn exhausted_premium_budget_downgrades_reasoning_request() {
    init_tracing();
    let mock = Arc::new(MockUpstream::new().with_default_response("reasoned answer"));
    let mut config = OrchestratorConfig::default();
    config.budgets.high_daily_limit = 0;
    let orchestrator = orchestrator_with(Arc::clone(&mock), config);

    let options = ProcessOptions::default()
        .with_classification(classified(TaskIntent::Reasoning, Complexity::High, false));
    let outcome = orchestrator
        .process("why did engagement drop after the rebrand", options)
        .await;

    assert!(outcome.success);
    let used = outcome.model_used.expect("a model ran");
    assert_ne!(used, ModelId::Claude35Sonnet);
}

/// A strategy request runs draft-then-critique: two audited calls, the
/// second tagged as critique, and the draft's text as the final data.
#[tokio::test]
async fn strategy_request_runs_two_pass_with_critique_audit() {
    init_tracing();
    let judgment = r#"{"validation_passed": true, "rigor_score": 0.85,
                       "gaps": [], "suggestions": ["sharpen the CTA"]}"#;
    let mock = Arc::new(
        MockUpstream::new()
            .with_default_response("draft strategy outline")
            .with_response("Draft to evaluate", judgment),
    );
    let orchestrator = orchestrator_with(Arc::clone(&mock), OrchestratorConfig::default());

    let outcome = orchestrator
        .generate_strategy("launch plan for the autumn collection")
        .await;

    assert!(outcome.success);
    assert_eq!(outcome.data.as_deref(), Some("draft strategy outline"));
    assert_eq!(outcome.provenance_ids.len(), 2);

    let critique = outcome.critique.expect("judgment parsed");
    assert!(critique.validation_passed);
    assert_eq!(critique.suggestions, vec!["sharpen the CTA"]);

    let report = orchestrator.operator_report(1).await.expect("report");
    assert_eq!(report.task_distribution.get(&TaskIntent::Critique), Some(&1));
}

/// Premium requests succeed until the class budget is spent, then fail
/// structurally with zero upstream cost.
#[tokio::test]
async fn budget_cycle_allows_n_requests_then_denies() {
    init_tracing();
    let mock = Arc::new(MockUpstream::new().with_default_response("answer"));
    let mut config = OrchestratorConfig::default();
    config.budgets.low_daily_limit = 0;
    config.budgets.medium_daily_limit = 0;
    config.budgets.high_daily_limit = 2;
    let orchestrator = orchestrator_with(Arc::clone(&mock), config);

    for _ in 0..2 {
        let options = ProcessOptions::default()
            .with_classification(classified(TaskIntent::Reasoning, Complexity::High, false));
        let outcome = orchestrator.process("deep question", options).await;
        assert!(outcome.success);
    }
    assert_eq!(mock.call_count(), 2);

    let options = ProcessOptions::default()
        .with_classification(classified(TaskIntent::Reasoning, Complexity::High, false));
    let denied = orchestrator.process("deep question", options).await;

    assert!(!denied.success);
    assert!(denied.error.as_deref().unwrap_or("").contains("Budget"));
    assert!(denied.provenance_ids.is_empty());
    // No third upstream call was made.
    assert_eq!(mock.call_count(), 2);
}

/// Drift detection over the public store: a model whose recent latency
/// degrades past the threshold is flagged.
#[tokio::test]
async fn operator_report_surfaces_latency_drift() {
    init_tracing();
    let mock = Arc::new(MockUpstream::new().with_default_response("answer"));
    let orchestrator = orchestrator_with(mock, OrchestratorConfig::default());
    let store = orchestrator.provenance();

    let record = |latency_ms: u64, age_hours: i64| RequestProvenance {
        request_id: Uuid::new_v4(),
        model: ModelId::Gpt4o,
        task_type: TaskIntent::Analysis,
        prompt_hash: "abcd1234abcd1234".to_owned(),
        output_hash: Some("1234abcd1234abcd".to_owned()),
        input_tokens: 100,
        output_tokens: 50,
        latency_ms,
        quality_score: None,
        error: None,
        created_at: Utc::now() - ChronoDuration::hours(age_hours),
    };

    for offset in 0..6 {
        store.log_request(record(200, 48 + offset)).await.expect("history");
    }
    for _ in 0..6 {
        store.log_request(record(600, 1)).await.expect("recent");
    }

    let report = orchestrator.operator_report(30).await.expect("report");
    let entry = report
        .drift
        .iter()
        .find(|entry| entry.model == ModelId::Gpt4o)
        .expect("gpt-4o drift entry");
    assert!(matches!(entry.signal, DriftSignal::Detected { .. }));

    let quiet = report
        .drift
        .iter()
        .find(|entry| entry.model == ModelId::Claude35Haiku)
        .expect("haiku drift entry");
    assert_eq!(quiet.signal, DriftSignal::InsufficientData);
}

/// Retrying a request id does not duplicate audit history.
#[tokio::test]
async fn duplicate_request_id_is_rejected_by_the_store() {
    init_tracing();
    let mock = Arc::new(MockUpstream::new().with_default_response("answer"));
    let orchestrator = orchestrator_with(mock, OrchestratorConfig::default());
    let store = orchestrator.provenance();

    let record = RequestProvenance {
        request_id: Uuid::new_v4(),
        model: ModelId::Gpt4oMini,
        task_type: TaskIntent::Summarization,
        prompt_hash: "abcd1234abcd1234".to_owned(),
        output_hash: None,
        input_tokens: 10,
        output_tokens: 0,
        latency_ms: 5,
        quality_score: None,
        error: Some("timeout".to_owned()),
        created_at: Utc::now(),
    };

    store.log_request(record.clone()).await.expect("first write");
    assert!(store.log_request(record).await.is_err());
}
