//! End-to-end request orchestration.
//!
//! The [`Orchestrator`] is the single entry point callers use. It owns every
//! component explicitly; nothing here reaches for globals, so two
//! orchestrators with different configs can coexist in one process.
//!
//! A request flows: validate, classify, route, budget check, execute
//! (single-pass with one-shot model failover, or draft-then-critique), then
//! usage and provenance accounting for every attempted call.

use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use adlens_core::{
    CompletionOptions, Complexity, Priority, ResponseFormat, TaskIntent, UpstreamClient,
};

use crate::classifier::{ClassificationResult, ClassifierHints, TaskClassifier};
use crate::config::OrchestratorConfig;
use crate::error::{OrchestrationError, Result};
use crate::executor::{
    CallTelemetry, DailyUsage, ExecutionOutcome, KeyPoolStatus, ModelExecutor, approx_tokens,
};
use crate::governor::{BudgetSnapshot, BudgetWarning, CostDecision, CostGovernor};
use crate::provenance::{
    DriftSignal, MemoryProvenanceStore, ModelStats, ProvenanceStore, RequestProvenance,
};
use crate::registry::{ModelId, ModelRegistry};
use crate::router::{ModelRouter, RouterDecision};
use crate::twopass::{self, CritiqueJudgment, TwoPassPhase};

/// Per-request options supplied by the caller.
#[derive(Debug, Clone, Default)]
pub struct ProcessOptions {
    /// Routing tiebreak preference.
    pub priority: Priority,
    /// Hints forwarded to classification.
    pub hints: ClassifierHints,
    /// Pre-made classification; skips the classifier entirely when set.
    pub classification_override: Option<ClassificationResult>,
    /// Caller-supplied system prompt replacing the intent-based framing.
    pub system_prompt: Option<String>,
    /// Sampling temperature override for the single-pass path.
    pub temperature: Option<f32>,
    /// Completion token limit override.
    pub max_tokens: Option<u32>,
    /// Requested shape of the final output.
    pub response_format: ResponseFormat,
}

impl ProcessOptions {
    /// Sets the routing priority.
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets classification hints.
    #[must_use]
    pub fn with_hints(mut self, hints: ClassifierHints) -> Self {
        self.hints = hints;
        self
    }

    /// Supplies a pre-made classification, skipping the classifier.
    #[must_use]
    pub fn with_classification(mut self, classification: ClassificationResult) -> Self {
        self.classification_override = Some(classification);
        self
    }

    /// Replaces the intent-based system prompt framing.
    #[must_use]
    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    /// Overrides the sampling temperature for the single-pass path.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Overrides the completion token limit.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Sets the requested output shape.
    #[must_use]
    pub fn with_response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = format;
        self
    }
}

/// Full account of one processed request.
#[derive(Debug)]
pub struct ProcessOutcome {
    /// Whether the request produced usable output.
    pub success: bool,
    /// Final output text; always the draft's data on the two-pass path.
    pub data: Option<String>,
    /// Terminal error description when the request failed.
    pub error: Option<String>,
    /// Non-fatal degradations (skipped or unparseable critique).
    pub notes: Vec<String>,
    /// Classification the request ran under, absent on validation failure.
    pub classification: Option<ClassificationResult>,
    /// Routing decision, absent on validation failure.
    pub decision: Option<RouterDecision>,
    /// Critique verdict when the two-pass protocol produced one.
    pub critique: Option<CritiqueJudgment>,
    /// Provenance ids for every attempted upstream call, in call order.
    pub provenance_ids: Vec<Uuid>,
    /// Model whose output became the final data.
    pub model_used: Option<ModelId>,
}

impl ProcessOutcome {
    fn pending() -> Self {
        Self {
            success: false,
            data: None,
            error: None,
            notes: Vec::new(),
            classification: None,
            decision: None,
            critique: None,
            provenance_ids: Vec::new(),
            model_used: None,
        }
    }

    fn rejected(error: &OrchestrationError) -> Self {
        let mut outcome = Self::pending();
        outcome.error = Some(error.to_string());
        outcome
    }
}

/// Operator-facing snapshot of budgets, credentials, and model health.
#[derive(Debug, Serialize)]
pub struct OperatorReport {
    /// Budget windows per cost class.
    pub budgets: Vec<BudgetSnapshot>,
    /// Cost classes above the warning threshold.
    pub budget_warnings: Vec<BudgetWarning>,
    /// Credential pool health.
    pub key_pool: KeyPoolStatus,
    /// Per-key daily usage.
    pub daily_usage: DailyUsage,
    /// Aggregated statistics per model over the report window.
    pub model_stats: Vec<ModelStats>,
    /// Request counts per task intent over the report window.
    pub task_distribution: HashMap<TaskIntent, usize>,
    /// Drift signal per model.
    pub drift: Vec<ModelDrift>,
}

/// Drift signal paired with its model.
#[derive(Debug, Serialize)]
pub struct ModelDrift {
    /// Model the signal covers.
    pub model: ModelId,
    /// The drift verdict.
    pub signal: DriftSignal,
}

/// Explicit context object wiring every orchestration component together.
pub struct Orchestrator {
    config: OrchestratorConfig,
    registry: Arc<ModelRegistry>,
    executor: Arc<ModelExecutor>,
    classifier: TaskClassifier,
    router: ModelRouter,
    governor: CostGovernor,
    store: Arc<dyn ProvenanceStore>,
}

impl Orchestrator {
    /// Creates an orchestrator with an in-memory provenance store.
    #[must_use]
    pub fn new(client: Arc<dyn UpstreamClient>, config: OrchestratorConfig) -> Self {
        Self::with_store(client, config, Arc::new(MemoryProvenanceStore::new()))
    }

    /// Creates an orchestrator over a caller-supplied provenance store.
    #[must_use]
    pub fn with_store(
        client: Arc<dyn UpstreamClient>,
        config: OrchestratorConfig,
        store: Arc<dyn ProvenanceStore>,
    ) -> Self {
        let registry = Arc::new(ModelRegistry::with_defaults());
        let executor = Arc::new(
            ModelExecutor::new(client, Arc::clone(&registry), config.resolve_api_keys())
                .with_timeout(Duration::from_secs(config.execution.timeout_seconds))
                .with_cooldown(Duration::from_secs(config.execution.key_cooldown_seconds)),
        );
        let classifier = TaskClassifier::new(Arc::clone(&executor), config.classifier.clone());
        let router = ModelRouter::new(Arc::clone(&registry));
        let governor = CostGovernor::new(Arc::clone(&registry), &config.budgets);

        Self {
            config,
            registry,
            executor,
            classifier,
            router,
            governor,
            store,
        }
    }

    /// The provenance store this orchestrator writes to.
    #[must_use]
    pub fn provenance(&self) -> Arc<dyn ProvenanceStore> {
        Arc::clone(&self.store)
    }

    /// Processes one request end to end.
    pub async fn process(&self, input: &str, options: ProcessOptions) -> ProcessOutcome {
        if input.trim().is_empty() {
            let error = OrchestrationError::Validation("input is empty".to_owned());
            return ProcessOutcome::rejected(&error);
        }

        let classification = match options.classification_override.clone() {
            Some(classification) => classification,
            None => self.classifier.classify(input, options.hints).await,
        };

        let mut decision = self.router.route(
            classification.intent,
            classification.complexity,
            classification.estimated_tokens,
            options.priority,
            options.hints.has_media,
        );
        decision.requires_two_pass =
            classification.requires_two_pass && self.config.execution.two_pass_enabled;

        tracing::info!(
            intent = %classification.intent,
            complexity = %classification.complexity,
            primary = %decision.primary,
            two_pass = decision.requires_two_pass,
            "request routed"
        );

        if decision.requires_two_pass {
            self.run_two_pass(input, classification, decision, &options)
                .await
        } else {
            self.run_single_pass(input, classification, decision, &options)
                .await
        }
    }

    /// Single-pass execution with one-shot failover to the fallback model.
    async fn run_single_pass(
        &self,
        input: &str,
        classification: ClassificationResult,
        decision: RouterDecision,
        options: &ProcessOptions,
    ) -> ProcessOutcome {
        let mut outcome = ProcessOutcome::pending();

        let primary = match self.admit(decision.primary, &mut outcome) {
            Some(model) => model,
            None => {
                outcome.classification = Some(classification);
                outcome.decision = Some(decision);
                return outcome;
            }
        };

        let call_options = CompletionOptions::default()
            .with_temperature(options.temperature.unwrap_or(0.7))
            .with_max_tokens(
                options
                    .max_tokens
                    .unwrap_or(self.config.execution.max_output_tokens),
            )
            .with_response_format(options.response_format);

        let system = options.system_prompt.clone().unwrap_or_else(|| {
            system_prompt_for(classification.intent, options.response_format)
        });
        // Format validation folds into the result before accounting, so a
        // schema failure lands on the provenance record like any other error.
        let mut execution = checked_format(
            self.executor
                .execute(primary, &system, input, call_options.clone())
                .await,
            options.response_format,
        );
        self.account(&execution.telemetry, classification.intent, execution.result.as_ref().err(), &mut outcome)
            .await;

        // One-shot failover: a retryable failure gets exactly one attempt
        // against the routed fallback model, never a third model.
        let needs_failover = decision.fallback != primary
            && matches!(&execution.result, Err(error) if error.is_retryable());
        if needs_failover {
            tracing::warn!(
                "failing over from {primary} to {fallback}",
                fallback = decision.fallback
            );
            execution = checked_format(
                self.executor
                    .execute(decision.fallback, &system, input, call_options)
                    .await,
                options.response_format,
            );
            self.account(
                &execution.telemetry,
                classification.intent,
                execution.result.as_ref().err(),
                &mut outcome,
            )
            .await;
        }

        match execution.result {
            Ok(response) => {
                outcome.model_used = Some(execution.telemetry.model);
                outcome.success = true;
                outcome.data = Some(response.text);
            }
            Err(error) => outcome.error = Some(error.to_string()),
        }

        outcome.classification = Some(classification);
        outcome.decision = Some(decision);
        outcome
    }

    /// Draft-then-critique execution.
    ///
    /// The draft is single-attempt at the model level; a draft failure ends
    /// the sequence. The critique never blocks the draft's data: a failed or
    /// unparseable critique degrades the annotation only.
    async fn run_two_pass(
        &self,
        input: &str,
        classification: ClassificationResult,
        decision: RouterDecision,
        options: &ProcessOptions,
    ) -> ProcessOutcome {
        let mut outcome = ProcessOutcome::pending();

        let draft_model = match self.admit(
            ModelRouter::draft_model(classification.intent),
            &mut outcome,
        ) {
            Some(model) => model,
            None => {
                outcome.classification = Some(classification);
                outcome.decision = Some(decision);
                return outcome;
            }
        };

        let max_tokens = options
            .max_tokens
            .unwrap_or(self.config.execution.max_output_tokens);
        let draft_system = options
            .system_prompt
            .clone()
            .unwrap_or_else(|| twopass::draft_system_prompt(classification.intent));
        tracing::info!(phase = %TwoPassPhase::Draft, model = %draft_model, "two-pass call");
        let draft_execution = checked_format(
            self.executor
                .execute(
                    draft_model,
                    &draft_system,
                    input,
                    twopass::draft_options(max_tokens, options.response_format),
                )
                .await,
            options.response_format,
        );
        let draft_id = self
            .account(
                &draft_execution.telemetry,
                classification.intent,
                draft_execution.result.as_ref().err(),
                &mut outcome,
            )
            .await;

        let draft = match draft_execution.result {
            Ok(response) => response,
            Err(error) => {
                outcome.error = Some(error.to_string());
                outcome.classification = Some(classification);
                outcome.decision = Some(decision);
                return outcome;
            }
        };
        outcome.model_used = Some(draft_model);

        self.run_critique(input, &draft.text, classification.complexity, draft_id, &mut outcome)
            .await;

        // Merge policy: the draft's data always wins; the critique only
        // annotates it.
        outcome.success = true;
        outcome.data = Some(draft.text);

        outcome.classification = Some(classification);
        outcome.decision = Some(decision);
        outcome
    }

    /// Critique pass: evaluates the draft and attaches its rigor score to
    /// the draft's provenance record.
    async fn run_critique(
        &self,
        input: &str,
        draft_text: &str,
        complexity: Complexity,
        draft_id: Uuid,
        outcome: &mut ProcessOutcome,
    ) {
        let mut critique_model = ModelRouter::critique_model(complexity);
        let admission = self.governor.check_budget(critique_model);
        if !admission.allowed {
            match admission.suggested_downgrade {
                Some(downgrade) => critique_model = downgrade,
                None => {
                    outcome.notes.push(format!(
                        "{} skipped: {}",
                        TwoPassPhase::Critique,
                        admission.reason
                    ));
                    return;
                }
            }
        }

        tracing::info!(phase = %TwoPassPhase::Critique, model = %critique_model, "two-pass call");
        let (system, user) = twopass::critique_prompts(draft_text, input);
        let execution = self
            .executor
            .execute(critique_model, &system, &user, twopass::critique_options())
            .await;

        // The verdict is parsed before accounting so an unparseable critique
        // is an error on the critique's own record, not a clean sample.
        let judged = match execution.result {
            Ok(response) => twopass::parse_judgment(&response.text).ok_or_else(|| {
                OrchestrationError::UpstreamOutput(
                    "critique verdict failed schema validation".to_owned(),
                )
            }),
            Err(error) => Err(error),
        };
        self.account(
            &execution.telemetry,
            TaskIntent::Critique,
            judged.as_ref().err(),
            outcome,
        )
        .await;

        match judged {
            Ok(judgment) => {
                if let Err(error) = self
                    .store
                    .record_quality(draft_id, judgment.rigor_score)
                    .await
                {
                    tracing::warn!("failed to attach quality score: {error}");
                }
                outcome.critique = Some(judgment);
            }
            Err(error) => outcome
                .notes
                .push(format!("{} degraded: {error}", TwoPassPhase::Critique)),
        }
    }

    /// Budget admission with downgrade substitution.
    ///
    /// Returns the model to execute against, or `None` after recording a
    /// structured denial on the outcome. A denial costs nothing and writes
    /// no provenance.
    fn admit(&self, model: ModelId, outcome: &mut ProcessOutcome) -> Option<ModelId> {
        let admission = self.governor.check_budget(model);
        if admission.allowed {
            return Some(model);
        }

        if let Some(downgrade) = admission.suggested_downgrade {
            tracing::info!("budget downgrade: {model} -> {downgrade}");
            return Some(downgrade);
        }

        outcome.error = Some(self.budget_denial(model, &admission).to_string());
        None
    }

    fn budget_denial(&self, model: ModelId, admission: &CostDecision) -> OrchestrationError {
        let cost_class = self
            .registry
            .get(model)
            .map_or_else(|| "unknown".to_owned(), |profile| profile.cost_class.to_string());
        OrchestrationError::BudgetExceeded {
            cost_class,
            reason: admission.reason.clone(),
            remaining: admission.remaining,
            suggested_downgrade: admission.suggested_downgrade,
        }
    }

    /// Usage and provenance accounting for one attempted call.
    ///
    /// A provenance write failure is logged and swallowed; the audit trail
    /// never fails a request that the upstream call did not.
    async fn account(
        &self,
        telemetry: &CallTelemetry,
        task_type: TaskIntent,
        error: Option<&OrchestrationError>,
        outcome: &mut ProcessOutcome,
    ) -> Uuid {
        self.governor.record_usage(telemetry.model);

        let record = RequestProvenance {
            request_id: Uuid::new_v4(),
            model: telemetry.model,
            task_type,
            prompt_hash: telemetry.prompt_hash.clone(),
            output_hash: telemetry.output_hash.clone(),
            input_tokens: telemetry.input_tokens,
            output_tokens: telemetry.output_tokens,
            latency_ms: telemetry.latency_ms,
            quality_score: None,
            error: error.map(ToString::to_string),
            created_at: Utc::now(),
        };
        let id = record.request_id;

        if let Err(store_error) = self.store.log_request(record).await {
            tracing::warn!("provenance write failed: {store_error}");
        }
        outcome.provenance_ids.push(id);
        id
    }

    /// Classifies text without executing it.
    pub async fn classify_text(&self, input: &str) -> ClassificationResult {
        self.classifier
            .classify(input, ClassifierHints::default())
            .await
    }

    /// Summarizes source material.
    pub async fn summarize(&self, input: &str) -> ProcessOutcome {
        let options = ProcessOptions::default()
            .with_classification(known_classification(TaskIntent::Summarization, input));
        self.process(input, options).await
    }

    /// Generates a marketing strategy; always two-pass eligible.
    pub async fn generate_strategy(&self, input: &str) -> ProcessOutcome {
        let hints = ClassifierHints {
            is_strategy_request: true,
            ..ClassifierHints::default()
        };
        let options = ProcessOptions::default()
            .with_priority(Priority::Quality)
            .with_hints(hints);
        self.process(input, options).await
    }

    /// Runs an analysis that must return a JSON object.
    pub async fn structured_analysis(&self, input: &str) -> ProcessOutcome {
        let options = ProcessOptions::default()
            .with_classification(known_classification(TaskIntent::Analysis, input))
            .with_response_format(ResponseFormat::Json);
        self.process(input, options).await
    }

    /// Builds the operator snapshot over the last `days` days.
    pub async fn operator_report(&self, days: i64) -> Result<OperatorReport> {
        let signals =
            join_all(ModelId::all().map(|model| self.store.detect_drift(model))).await;
        let mut drift = Vec::with_capacity(signals.len());
        for (model, signal) in ModelId::all().into_iter().zip(signals) {
            drift.push(ModelDrift {
                model,
                signal: signal?,
            });
        }

        Ok(OperatorReport {
            budgets: self.governor.usage_stats(),
            budget_warnings: self.governor.warnings(),
            key_pool: self.executor.pool_status(),
            daily_usage: self.executor.daily_usage(),
            model_stats: self.store.all_model_stats(days).await?,
            task_distribution: self.store.task_distribution(days).await?,
            drift,
        })
    }
}

/// Classification built from caller knowledge instead of a model call.
fn known_classification(intent: TaskIntent, input: &str) -> ClassificationResult {
    let estimated_tokens = approx_tokens(input);
    let complexity = if estimated_tokens < 500 {
        Complexity::Low
    } else if estimated_tokens < 2_000 {
        Complexity::Medium
    } else {
        Complexity::High
    };

    ClassificationResult {
        intent,
        complexity,
        estimated_tokens,
        confidence: 1.0,
        requires_two_pass: false,
    }
}

/// System prompt framing for the single-pass path.
fn system_prompt_for(intent: TaskIntent, format: ResponseFormat) -> String {
    let framing = match intent {
        TaskIntent::Analysis => {
            "You are a marketing analyst. Provide a clear, evidence-grounded analysis."
        }
        TaskIntent::Summarization => {
            "You are a marketing analyst. Summarize the material faithfully and concisely."
        }
        TaskIntent::Ideation => {
            "You are a marketing strategist. Generate concrete, actionable ideas."
        }
        TaskIntent::Classification => {
            "You are a marketing analyst. Assign the input to the most fitting category \
             and justify briefly."
        }
        TaskIntent::Reasoning => {
            "You are a marketing analyst. Reason step by step and state your conclusion."
        }
        TaskIntent::Critique => {
            "You are a marketing reviewer. Evaluate the material candidly and concretely."
        }
    };

    match format {
        ResponseFormat::Text => framing.to_owned(),
        ResponseFormat::Json => format!("{framing} Answer with a single JSON object."),
    }
}

/// Folds output-shape validation into an execution result.
///
/// A response that fails validation becomes an error before any accounting
/// happens, so provenance and model statistics see it as a failed call.
fn checked_format(mut execution: ExecutionOutcome, format: ResponseFormat) -> ExecutionOutcome {
    if let Ok(response) = &execution.result {
        if let Err(error) = validate_format(&response.text, format) {
            execution.result = Err(error);
        }
    }
    execution
}

/// Validates the final output against the requested shape.
fn validate_format(text: &str, format: ResponseFormat) -> Result<()> {
    match format {
        ResponseFormat::Text => Ok(()),
        ResponseFormat::Json => {
            serde_json::from_str::<serde_json::Value>(text.trim()).map_err(|error| {
                OrchestrationError::UpstreamOutput(format!(
                    "expected a JSON object, got unparseable output: {error}"
                ))
            })?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adlens_providers::{MockUpstream, ScriptedFailure};

    fn orchestrator(mock: Arc<MockUpstream>) -> Orchestrator {
        orchestrator_with_config(mock, OrchestratorConfig::default())
    }

    fn orchestrator_with_config(
        mock: Arc<MockUpstream>,
        mut config: OrchestratorConfig,
    ) -> Orchestrator {
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

    #[tokio::test]
    async fn test_empty_input_rejected_before_any_cost() {
        let mock = Arc::new(MockUpstream::new().with_default_response("unused"));
        let orchestrator = orchestrator(Arc::clone(&mock));

        let outcome = orchestrator.process("   ", ProcessOptions::default()).await;

        assert!(!outcome.success);
        assert!(outcome.error.as_deref().unwrap_or("").contains("Validation"));
        assert!(outcome.provenance_ids.is_empty());
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_short_request_single_pass_one_record() {
        let mock = Arc::new(MockUpstream::new().with_default_response("categorized"));
        let orchestrator = orchestrator(Arc::clone(&mock));

        let outcome = orchestrator
            .process("classify this ad", ProcessOptions::default())
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.data.as_deref(), Some("categorized"));
        // Fast-path classification costs no model call; execution costs one.
        assert_eq!(mock.call_count(), 1);
        assert_eq!(outcome.provenance_ids.len(), 1);
        assert_eq!(outcome.model_used, Some(ModelId::Claude35Haiku));
    }

    #[tokio::test]
    async fn test_long_request_classifier_call_not_in_provenance() {
        // The classifier's own model call and the main call both hit the
        // mock, but only the main call is audited.
        let mock = Arc::new(MockUpstream::new().with_default_response(
            r#"{"intent":"analysis","complexity":"medium","confidence":0.9,"requires_two_pass":false}"#,
        ));
        let orchestrator = orchestrator(Arc::clone(&mock));

        let input = "Analyze the performance of our spring campaign. ".repeat(15);
        let outcome = orchestrator.process(&input, ProcessOptions::default()).await;

        assert!(outcome.success);
        assert_eq!(mock.call_count(), 2);
        assert_eq!(outcome.provenance_ids.len(), 1);
    }

    #[tokio::test]
    async fn test_budget_denial_costs_nothing() {
        let mock = Arc::new(MockUpstream::new().with_default_response("unused"));
        let mut config = OrchestratorConfig::default();
        config.budgets.low_daily_limit = 0;
        config.budgets.medium_daily_limit = 0;
        config.budgets.high_daily_limit = 0;
        let orchestrator = orchestrator_with_config(Arc::clone(&mock), config);

        let options = ProcessOptions::default()
            .with_classification(classified(TaskIntent::Reasoning, Complexity::High, false));
        let outcome = orchestrator.process("deep question", options).await;

        assert!(!outcome.success);
        assert!(outcome.error.as_deref().unwrap_or("").contains("Budget"));
        assert!(outcome.provenance_ids.is_empty());
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_exhausted_class_substitutes_downgrade() {
        let mock = Arc::new(MockUpstream::new().with_default_response("downgraded answer"));
        let mut config = OrchestratorConfig::default();
        config.budgets.high_daily_limit = 0;
        let orchestrator = orchestrator_with_config(Arc::clone(&mock), config);

        let options = ProcessOptions::default()
            .with_classification(classified(TaskIntent::Reasoning, Complexity::High, false));
        let outcome = orchestrator.process("deep question", options).await;

        assert!(outcome.success);
        let used = outcome.model_used.expect("a model ran");
        let registry = ModelRegistry::with_defaults();
        let profile = registry.get(used).expect("profile");
        assert!(profile.cost_class < adlens_core::CostClass::High);
    }

    #[tokio::test]
    async fn test_single_pass_fails_over_to_fallback_model() {
        // Two transient failures exhaust the primary's cross-key attempts;
        // the one-shot failover lands on the fallback model.
        let mock = Arc::new(
            MockUpstream::new()
                .with_default_response("fallback answer")
                .with_failure(ScriptedFailure::Transient)
                .with_failure(ScriptedFailure::Transient),
        );
        let orchestrator = orchestrator(Arc::clone(&mock));

        let options = ProcessOptions::default()
            .with_classification(classified(TaskIntent::Analysis, Complexity::Low, false));
        let outcome = orchestrator.process("analyze the numbers", options).await;

        assert!(outcome.success);
        assert_eq!(outcome.data.as_deref(), Some("fallback answer"));
        assert_eq!(mock.call_count(), 3);
        // One record per attempted call: the failed primary and the fallback.
        assert_eq!(outcome.provenance_ids.len(), 2);
        let decision = outcome.decision.expect("routed");
        assert_eq!(outcome.model_used, Some(decision.fallback));
    }

    #[tokio::test]
    async fn test_non_retryable_failure_does_not_fail_over() {
        let mock = Arc::new(
            MockUpstream::new()
                .with_default_response("unused")
                .with_failure(ScriptedFailure::Malformed),
        );
        let orchestrator = orchestrator(Arc::clone(&mock));

        let options = ProcessOptions::default()
            .with_classification(classified(TaskIntent::Analysis, Complexity::Low, false));
        let outcome = orchestrator.process("analyze the numbers", options).await;

        assert!(!outcome.success);
        assert_eq!(mock.call_count(), 1);
        assert_eq!(outcome.provenance_ids.len(), 1);
    }

    #[tokio::test]
    async fn test_two_pass_draft_always_wins() {
        let judgment = r#"{"validation_passed": false, "rigor_score": 0.4,
                           "gaps": ["thin audience analysis"], "suggestions": []}"#;
        let mock = Arc::new(
            MockUpstream::new()
                .with_default_response("draft strategy")
                .with_response("Draft to evaluate", judgment),
        );
        let orchestrator = orchestrator(Arc::clone(&mock));

        let options = ProcessOptions::default()
            .with_classification(classified(TaskIntent::Ideation, Complexity::High, true));
        let outcome = orchestrator.process("plan a launch campaign", options).await;

        assert!(outcome.success);
        // The critique failed the draft, but the draft's data still wins.
        assert_eq!(outcome.data.as_deref(), Some("draft strategy"));
        let critique = outcome.critique.expect("judgment parsed");
        assert!(!critique.validation_passed);
        assert_eq!(outcome.provenance_ids.len(), 2);
        assert_eq!(mock.call_count(), 2);

        let history = mock.call_history();
        assert!(history[0].temperature > history[1].temperature);
    }

    #[tokio::test]
    async fn test_two_pass_attaches_quality_to_draft_record() {
        let judgment = r#"{"validation_passed": true, "rigor_score": 0.9,
                           "gaps": [], "suggestions": []}"#;
        let mock = Arc::new(
            MockUpstream::new()
                .with_default_response("draft strategy")
                .with_response("Draft to evaluate", judgment),
        );
        let orchestrator = orchestrator(Arc::clone(&mock));

        let options = ProcessOptions::default()
            .with_classification(classified(TaskIntent::Ideation, Complexity::High, true));
        let outcome = orchestrator.process("plan a launch campaign", options).await;
        assert!(outcome.success);

        let draft_model = outcome.model_used.expect("draft ran");
        let stats = orchestrator
            .provenance()
            .model_stats(draft_model, 1)
            .await
            .expect("stats");
        assert_eq!(stats.avg_quality, Some(0.9));
    }

    #[tokio::test]
    async fn test_two_pass_draft_failure_ends_sequence() {
        let mock = Arc::new(
            MockUpstream::new()
                .with_default_response("unused")
                .with_failure(ScriptedFailure::Transient)
                .with_failure(ScriptedFailure::Transient),
        );
        let orchestrator = orchestrator(Arc::clone(&mock));

        let options = ProcessOptions::default()
            .with_classification(classified(TaskIntent::Ideation, Complexity::High, true));
        let outcome = orchestrator.process("plan a launch campaign", options).await;

        assert!(!outcome.success);
        // Exactly one record: the failed draft. No critique call was made.
        assert_eq!(outcome.provenance_ids.len(), 1);
        assert_eq!(mock.call_count(), 2);
        assert!(outcome.critique.is_none());
    }

    #[tokio::test]
    async fn test_two_pass_unparseable_critique_still_succeeds() {
        let mock = Arc::new(
            MockUpstream::new()
                .with_default_response("draft strategy")
                .with_response("Draft to evaluate", "sounds good to me"),
        );
        let orchestrator = orchestrator(Arc::clone(&mock));

        let options = ProcessOptions::default()
            .with_classification(classified(TaskIntent::Ideation, Complexity::High, true));
        let outcome = orchestrator.process("plan a launch campaign", options).await;

        assert!(outcome.success);
        assert_eq!(outcome.data.as_deref(), Some("draft strategy"));
        assert!(outcome.critique.is_none());
        // The degradation note names the phase that produced it.
        assert!(
            outcome.notes[0].starts_with(&TwoPassPhase::Critique.to_string()),
            "note: {}",
            outcome.notes[0]
        );
        assert_eq!(outcome.provenance_ids.len(), 2);

        // The unparseable verdict is an error on the critique model's record,
        // not a clean sample in its statistics.
        let critique_model = ModelRouter::critique_model(Complexity::High);
        let stats = orchestrator
            .provenance()
            .model_stats(critique_model, 1)
            .await
            .expect("stats");
        assert_eq!(stats.request_count, 1);
        assert!(stats.error_rate > 0.0);
    }

    #[tokio::test]
    async fn test_global_flag_disables_two_pass() {
        let mock = Arc::new(MockUpstream::new().with_default_response("single pass answer"));
        let mut config = OrchestratorConfig::default();
        config.execution.two_pass_enabled = false;
        let orchestrator = orchestrator_with_config(Arc::clone(&mock), config);

        let options = ProcessOptions::default()
            .with_classification(classified(TaskIntent::Ideation, Complexity::High, true));
        let outcome = orchestrator.process("plan a launch campaign", options).await;

        assert!(outcome.success);
        assert_eq!(mock.call_count(), 1);
        assert!(outcome.critique.is_none());
        assert!(!outcome.decision.expect("routed").requires_two_pass);
    }

    #[tokio::test]
    async fn test_json_format_validates_output() {
        let mock = Arc::new(MockUpstream::new().with_default_response("not json at all"));
        let orchestrator = orchestrator(Arc::clone(&mock));

        let options = ProcessOptions::default()
            .with_classification(classified(TaskIntent::Analysis, Complexity::Low, false))
            .with_response_format(ResponseFormat::Json);
        let outcome = orchestrator.process("analyze this", options).await;

        assert!(!outcome.success);
        assert!(outcome.error.as_deref().unwrap_or("").contains("JSON"));
        // The call itself happened and is audited as a failure: the record
        // carries the error and the model's error rate reflects it.
        assert_eq!(outcome.provenance_ids.len(), 1);
        let model = outcome.decision.expect("routed").primary;
        let stats = orchestrator
            .provenance()
            .model_stats(model, 1)
            .await
            .expect("stats");
        assert_eq!(stats.request_count, 1);
        assert!(stats.error_rate > 0.0);
    }

    #[tokio::test]
    async fn test_structured_analysis_accepts_json_output() {
        let mock =
            Arc::new(MockUpstream::new().with_default_response(r#"{"insight": "CTR is up"}"#));
        let orchestrator = orchestrator(Arc::clone(&mock));

        let outcome = orchestrator.structured_analysis("analyze campaign metrics").await;

        assert!(outcome.success);
        assert_eq!(
            outcome.classification.expect("classified").intent,
            TaskIntent::Analysis
        );
    }

    #[tokio::test]
    async fn test_strategy_shortcut_runs_two_pass() {
        let judgment = r#"{"validation_passed": true, "rigor_score": 0.8,
                           "gaps": [], "suggestions": []}"#;
        let mock = Arc::new(
            MockUpstream::new()
                .with_default_response("strategy draft")
                .with_response("Draft to evaluate", judgment),
        );
        let orchestrator = orchestrator(Arc::clone(&mock));

        let outcome = orchestrator.generate_strategy("launch plan for Q4").await;

        assert!(outcome.success);
        assert!(outcome.critique.is_some());
        assert_eq!(outcome.provenance_ids.len(), 2);
    }

    #[tokio::test]
    async fn test_operator_report_reflects_activity() {
        let mock = Arc::new(MockUpstream::new().with_default_response("answer"));
        let orchestrator = orchestrator(Arc::clone(&mock));

        let options = ProcessOptions::default()
            .with_classification(classified(TaskIntent::Analysis, Complexity::Low, false));
        let outcome = orchestrator.process("analyze this", options).await;
        assert!(outcome.success);

        let report = orchestrator.operator_report(7).await.expect("report");
        assert_eq!(report.budgets.len(), 3);
        assert_eq!(report.key_pool.total, 2);
        assert_eq!(report.daily_usage.total_requests, 1);
        assert_eq!(report.model_stats.len(), 1);
        assert_eq!(report.task_distribution.get(&TaskIntent::Analysis), Some(&1));
        assert!(report
            .drift
            .iter()
            .all(|entry| entry.signal == DriftSignal::InsufficientData));
    }
}
