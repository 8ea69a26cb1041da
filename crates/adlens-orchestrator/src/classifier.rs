//! Task classification: turning free-text requests into typed judgments.
//!
//! Short inputs take a deterministic fast path with no model call. Longer
//! inputs get one call to a small, cheap, low-temperature model with a
//! constrained JSON schema; any failure on that path degrades to a keyword
//! heuristic rather than aborting the request.

use serde::{Deserialize, Serialize};

use adlens_core::{CompletionOptions, Complexity, ResponseFormat, TaskIntent};

use crate::config::ClassifierConfig;
use crate::executor::{ModelExecutor, approx_tokens};
use crate::registry::ModelId;

/// Model used for classification calls: small, cheap, deterministic.
const CLASSIFIER_MODEL: ModelId = ModelId::Gpt4oMini;

/// Confidence assigned to fast-path classifications.
const FAST_PATH_CONFIDENCE: f64 = 0.9;

/// Confidence assigned when the model path degrades to the heuristic.
const DEGRADED_CONFIDENCE: f64 = 0.5;

/// Caller-supplied hints accompanying a classification request.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ClassifierHints {
    /// The request carries media context (images, video frames).
    pub has_media: bool,
    /// The caller knows this is a strategy request; forces two-pass.
    pub is_strategy_request: bool,
    /// The output will be shown to a client; forces two-pass.
    pub is_client_facing: bool,
}

impl ClassifierHints {
    /// Whether the hints alone force the two-pass protocol.
    #[must_use]
    pub fn forces_two_pass(&self) -> bool {
        self.is_strategy_request || self.is_client_facing
    }
}

/// Typed judgment produced once per request, never mutated afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// Classified purpose of the request.
    pub intent: TaskIntent,
    /// Estimated difficulty.
    pub complexity: Complexity,
    /// Approximate token count of the input.
    pub estimated_tokens: u64,
    /// Classifier confidence, clamped to [0, 1].
    pub confidence: f64,
    /// Whether the two-pass protocol should run.
    pub requires_two_pass: bool,
}

/// Constrained JSON schema the classification model must answer with.
#[derive(Debug, Deserialize)]
struct RawClassification {
    /// Intent name; anything unrecognized defaults to `analysis`.
    intent: Option<String>,
    /// Complexity name; anything unrecognized defaults to `medium`.
    complexity: Option<String>,
    /// Model confidence.
    confidence: Option<f64>,
    /// Model's own two-pass judgment.
    requires_two_pass: Option<bool>,
}

/// Classifies free-text requests into typed `(intent, complexity)` judgments.
pub struct TaskClassifier {
    /// Executor used for the model-backed path.
    executor: std::sync::Arc<ModelExecutor>,
    /// Thresholds and truncation budget.
    config: ClassifierConfig,
}

impl TaskClassifier {
    /// Creates a classifier over the given executor.
    #[must_use]
    pub fn new(executor: std::sync::Arc<ModelExecutor>, config: ClassifierConfig) -> Self {
        Self { executor, config }
    }

    /// Classifies a request. Never fails: the model path degrades to the
    /// keyword heuristic on any error.
    pub async fn classify(&self, text: &str, hints: ClassifierHints) -> ClassificationResult {
        let estimated_tokens = approx_tokens(text);

        // Fast path keeps trivial requests free and instant.
        if text.len() <= self.config.fast_path_max_chars && !hints.has_media {
            return Self::finalize(
                ClassificationResult {
                    intent: TaskIntent::Classification,
                    complexity: Complexity::Low,
                    estimated_tokens,
                    confidence: FAST_PATH_CONFIDENCE,
                    requires_two_pass: false,
                },
                hints,
            );
        }

        let result = match self.classify_with_model(text, hints).await {
            Some(result) => result,
            None => {
                tracing::warn!("classifier degraded to keyword heuristic");
                Self::heuristic(text, estimated_tokens)
            }
        };

        Self::finalize(result, hints)
    }

    /// Applies the hint OR-rule and the fixed ideation/high rule.
    fn finalize(mut result: ClassificationResult, hints: ClassifierHints) -> ClassificationResult {
        result.requires_two_pass = result.requires_two_pass
            || hints.forces_two_pass()
            || (result.intent == TaskIntent::Ideation && result.complexity == Complexity::High);
        result.confidence = result.confidence.clamp(0.0, 1.0);
        result
    }

    /// One model call with a constrained JSON schema; `None` on any failure.
    async fn classify_with_model(
        &self,
        text: &str,
        hints: ClassifierHints,
    ) -> Option<ClassificationResult> {
        let truncated: String = text.chars().take(self.config.truncate_chars).collect();
        let estimated_tokens = approx_tokens(text);

        let system = "Classify the request. Answer with one JSON object: \
                      {\"intent\": one of [\"analysis\",\"summarization\",\"ideation\",\
                      \"classification\",\"reasoning\",\"critique\"], \
                      \"complexity\": one of [\"low\",\"medium\",\"high\"], \
                      \"confidence\": number 0-1, \"requires_two_pass\": boolean}. \
                      No prose.";
        let user = if hints.has_media {
            format!("[request includes media context]\n{truncated}")
        } else {
            truncated
        };

        let options = CompletionOptions::default()
            .with_temperature(0.0)
            .with_max_tokens(128)
            .with_response_format(ResponseFormat::Json);

        let outcome = self
            .executor
            .execute(CLASSIFIER_MODEL, system, &user, options)
            .await;

        let response = match outcome.result {
            Ok(response) => response,
            Err(error) => {
                tracing::debug!("classifier model call failed: {error}");
                return None;
            }
        };

        let raw = parse_json_object::<RawClassification>(&response.text)?;

        let intent = raw
            .intent
            .as_deref()
            .and_then(TaskIntent::parse)
            .unwrap_or(TaskIntent::Analysis);
        let complexity = raw
            .complexity
            .as_deref()
            .and_then(Complexity::parse)
            .unwrap_or(Complexity::Medium);

        Some(ClassificationResult {
            intent,
            complexity,
            estimated_tokens,
            confidence: raw.confidence.unwrap_or(0.7).clamp(0.0, 1.0),
            requires_two_pass: raw.requires_two_pass.unwrap_or(false),
        })
    }

    /// Deterministic keyword classifier used when the model path fails.
    fn heuristic(text: &str, estimated_tokens: u64) -> ClassificationResult {
        let lower = text.to_lowercase();

        let intent = if lower.contains("summar") || lower.contains("tl;dr") {
            TaskIntent::Summarization
        } else if lower.contains("brainstorm")
            || lower.contains("ideas")
            || lower.contains("campaign concept")
            || lower.contains("strategy")
        {
            TaskIntent::Ideation
        } else if lower.contains("critique") || lower.contains("review") || lower.contains("score")
        {
            TaskIntent::Critique
        } else if lower.contains("classify")
            || lower.contains("categorize")
            || lower.contains("which category")
        {
            TaskIntent::Classification
        } else if lower.contains("why") || lower.contains("explain") || lower.contains("compare") {
            TaskIntent::Reasoning
        } else {
            TaskIntent::Analysis
        };

        let word_count = text.split_whitespace().count();
        let complexity = if word_count < 40 {
            Complexity::Low
        } else if word_count < 150 {
            Complexity::Medium
        } else {
            Complexity::High
        };

        ClassificationResult {
            intent,
            complexity,
            estimated_tokens,
            confidence: DEGRADED_CONFIDENCE,
            requires_two_pass: false,
        }
    }
}

/// Parses a JSON object from model output, tolerating surrounding prose.
pub(crate) fn parse_json_object<T: serde::de::DeserializeOwned>(text: &str) -> Option<T> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }

    // Salvage an embedded object when the model wrapped it in prose/fences.
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&trimmed[start..=end]).ok()
}
