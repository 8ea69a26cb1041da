//! Deterministic, table-driven model routing.
//!
//! A fixed `(intent, complexity)` matrix picks the primary model; the
//! caller's priority breaks ties among equally-affine models, and the
//! fallback is a different intent-affine model preferring a cheaper cost
//! class. Routing is pure: same inputs and registry state, same decision.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use adlens_core::{Complexity, CostClass, Priority, TaskIntent};

use crate::registry::{ModelId, ModelRegistry};

/// Routing decision with rationale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterDecision {
    /// Model the request should run against.
    pub primary: ModelId,
    /// Different intent-affine model to fail over to; equals `primary`
    /// only in the degenerate single-eligible-model case.
    pub fallback: ModelId,
    /// Rough cost estimate for the call in USD.
    pub estimated_cost: f64,
    /// Human-readable routing rationale.
    pub reasoning: String,
    /// Carried through from classification; the orchestrator resolves the
    /// final value against caller hints and the global feature flag.
    pub requires_two_pass: bool,
}

/// Table-driven router over the capability registry.
pub struct ModelRouter {
    /// Capability table consulted for affinities and cost classes.
    registry: Arc<ModelRegistry>,
}

impl ModelRouter {
    /// Creates a router over the given registry.
    #[must_use]
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self { registry }
    }

    /// Routes a classified request to a primary and fallback model.
    #[must_use]
    pub fn route(
        &self,
        intent: TaskIntent,
        complexity: Complexity,
        input_tokens: u64,
        priority: Priority,
        has_media: bool,
    ) -> RouterDecision {
        let matrix_choice = Self::matrix_primary(intent, complexity);
        let primary = self.apply_priority(matrix_choice, intent, input_tokens, priority, has_media);
        let fallback = self.select_fallback(primary, intent);

        let estimated_cost = self.estimate_cost(primary, input_tokens);
        let reasoning = format!(
            "Selected {primary} for {intent}/{complexity} \
             (priority {priority:?}, ~{input_tokens} input tokens); fallback {fallback}"
        );

        RouterDecision {
            primary,
            fallback,
            estimated_cost,
            reasoning,
            requires_two_pass: false,
        }
    }

    /// The fixed `(intent, complexity)` routing matrix.
    const fn matrix_primary(intent: TaskIntent, complexity: Complexity) -> ModelId {
        use Complexity::{High, Low, Medium};
        use TaskIntent::{
            Analysis, Classification, Critique, Ideation, Reasoning, Summarization,
        };

        match (intent, complexity) {
            (Classification, _) | (Summarization, Low) => ModelId::Claude35Haiku,
            (Summarization, Medium) | (Analysis, Low) => ModelId::Gpt4oMini,
            (Summarization, High) | (Ideation, Low | Medium) => ModelId::Llama3370BVersatile,
            (Analysis, Medium) | (Ideation, High) | (Critique, Medium) => ModelId::Gpt4o,
            (Reasoning, Low | Medium) | (Critique, Low) => ModelId::DeepSeekReasoner,
            (Analysis, High) | (Reasoning, High) | (Critique, High) => ModelId::Claude35Sonnet,
        }
    }

    /// Adjusts the matrix choice for caller priority and context fit.
    fn apply_priority(
        &self,
        matrix_choice: ModelId,
        intent: TaskIntent,
        input_tokens: u64,
        priority: Priority,
        has_media: bool,
    ) -> ModelId {
        let candidates: Vec<ModelId> = self
            .registry
            .models_for_intent(intent)
            .into_iter()
            .filter(|model| self.fits_context(*model, input_tokens, has_media))
            .collect();

        if candidates.is_empty() {
            return matrix_choice;
        }

        match priority {
            // The matrix already scales capability with complexity.
            Priority::Quality => {
                if candidates.contains(&matrix_choice) {
                    matrix_choice
                } else {
                    candidates[0]
                }
            }
            // Throughput proxy: highest per-key tokens-per-minute.
            Priority::Speed => candidates
                .iter()
                .copied()
                .max_by_key(|model| {
                    self.registry
                        .get(*model)
                        .map_or(0, |profile| profile.tokens_per_minute)
                })
                .unwrap_or(matrix_choice),
            Priority::Cost => candidates
                .iter()
                .copied()
                .min_by_key(|model| {
                    self.registry
                        .get(*model)
                        .map_or(CostClass::High, |profile| profile.cost_class)
                })
                .unwrap_or(matrix_choice),
        }
    }

    /// Whether a model's context window fits the input (with media overhead).
    fn fits_context(&self, model: ModelId, input_tokens: u64, has_media: bool) -> bool {
        let Some(profile) = self.registry.get(model) else {
            return false;
        };
        let media_overhead: u64 = if has_media { 8_000 } else { 0 };
        // Leave headroom for the completion.
        (input_tokens + media_overhead) * 2 <= u64::from(profile.context_window)
    }

    /// Different intent-affine model, preferring a cheaper cost class;
    /// degenerates to the primary itself when no other model is eligible.
    fn select_fallback(&self, primary: ModelId, intent: TaskIntent) -> ModelId {
        let mut candidates: Vec<ModelId> = self
            .registry
            .models_for_intent(intent)
            .into_iter()
            .filter(|model| *model != primary)
            .collect();

        candidates.sort_by_key(|model| {
            self.registry
                .get(*model)
                .map_or(CostClass::High, |profile| profile.cost_class)
        });

        candidates.first().copied().unwrap_or(primary)
    }

    /// Draft pass model: a versatile, creative-class pick per intent.
    #[must_use]
    pub const fn draft_model(intent: TaskIntent) -> ModelId {
        match intent {
            TaskIntent::Reasoning => ModelId::Gpt4o,
            _ => ModelId::Llama3370BVersatile,
        }
    }

    /// Critique pass model: a reasoning-class pick, scaled down for low
    /// complexity to control cost.
    #[must_use]
    pub const fn critique_model(complexity: Complexity) -> ModelId {
        match complexity {
            Complexity::Low => ModelId::DeepSeekReasoner,
            Complexity::Medium | Complexity::High => ModelId::Claude35Sonnet,
        }
    }

    /// Rough per-call cost estimate from the cost class.
    fn estimate_cost(&self, model: ModelId, input_tokens: u64) -> f64 {
        let rate_per_1k = self.registry.get(model).map_or(0.003, |profile| {
            match profile.cost_class {
                CostClass::Low => 0.000_2,
                CostClass::Medium => 0.002_5,
                CostClass::High => 0.015,
            }
        });
        (input_tokens as f64 / 1_000.0) * rate_per_1k
    }
}
