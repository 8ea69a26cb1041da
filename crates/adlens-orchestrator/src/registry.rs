//! Model definitions and the static capability registry.
//!
//! Centralizes everything the router and governor need to know about a
//! model so that neither ever hard-codes model-specific logic.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::{Display, Formatter, Result as FmtResult};

use adlens_core::{CostClass, TaskIntent};

/// All models the orchestration core can route to.
///
/// This enum provides type-safe model handling; per-model capabilities live
/// in the [`ModelProfile`] the registry holds for each variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ModelId {
    /// GPT-4o Mini (cheap workhorse)
    #[default]
    Gpt4oMini,
    /// Claude 3.5 Haiku (fast, cheap)
    Claude35Haiku,
    /// Llama 3.3 70B Versatile (creative mid-range)
    Llama3370BVersatile,
    /// GPT-4o (capable mid-range)
    Gpt4o,
    /// DeepSeek Reasoner (mid-range reasoning specialist)
    DeepSeekReasoner,
    /// Claude 3.5 Sonnet (premium reasoning)
    Claude35Sonnet,
}

impl ModelId {
    /// Get the model identifier string used by the upstream provider.
    #[must_use]
    pub const fn wire_id(&self) -> &'static str {
        match self {
            Self::Gpt4oMini => "gpt-4o-mini",
            Self::Claude35Haiku => "claude-3-5-haiku",
            Self::Llama3370BVersatile => "llama-3.3-70b-versatile",
            Self::Gpt4o => "gpt-4o",
            Self::DeepSeekReasoner => "deepseek-reasoner",
            Self::Claude35Sonnet => "claude-3-5-sonnet",
        }
    }

    /// Get all supported models.
    #[must_use]
    pub const fn all() -> [Self; 6] {
        [
            Self::Gpt4oMini,
            Self::Claude35Haiku,
            Self::Llama3370BVersatile,
            Self::Gpt4o,
            Self::DeepSeekReasoner,
            Self::Claude35Sonnet,
        ]
    }
}

impl Display for ModelId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Gpt4oMini => write!(f, "GPT-4o Mini"),
            Self::Claude35Haiku => write!(f, "Claude 3.5 Haiku"),
            Self::Llama3370BVersatile => write!(f, "Llama 3.3 70B Versatile"),
            Self::Gpt4o => write!(f, "GPT-4o"),
            Self::DeepSeekReasoner => write!(f, "DeepSeek Reasoner"),
            Self::Claude35Sonnet => write!(f, "Claude 3.5 Sonnet"),
        }
    }
}

/// Static capability record for one model. Immutable after startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelProfile {
    /// Model identifier.
    pub id: ModelId,
    /// Human-readable display name.
    pub display_name: String,
    /// Maximum context window in tokens.
    pub context_window: u32,
    /// Budget pool this model draws from.
    pub cost_class: CostClass,
    /// Task intents this model is well suited to.
    pub affinities: Vec<TaskIntent>,
    /// Upstream-imposed tokens-per-minute limit per credential.
    pub tokens_per_minute: u64,
    /// Upstream-imposed requests-per-day limit per credential.
    pub requests_per_day: u64,
}

impl ModelProfile {
    /// Whether this model is affine to the given intent.
    #[must_use]
    pub fn supports(&self, intent: TaskIntent) -> bool {
        self.affinities.contains(&intent)
    }
}

/// Static lookup table of model capabilities, keyed by model id.
///
/// Pure read access; exists so the router and governor never hard-code
/// model-specific knowledge.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    /// Profiles keyed by model id (no locking needed - immutable after init).
    profiles: HashMap<ModelId, ModelProfile>,
}

impl ModelRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            profiles: HashMap::new(),
        }
    }

    /// Creates a registry with the default capability table.
    #[must_use]
    #[allow(clippy::too_many_lines, reason = "static capability table")]
    pub fn with_defaults() -> Self {
        use TaskIntent::{
            Analysis, Classification, Critique, Ideation, Reasoning, Summarization,
        };

        let mut registry = Self::new();

        registry.register(ModelProfile {
            id: ModelId::Gpt4oMini,
            display_name: ModelId::Gpt4oMini.to_string(),
            context_window: 128_000,
            cost_class: CostClass::Low,
            affinities: vec![Classification, Summarization, Analysis],
            tokens_per_minute: 200_000,
            requests_per_day: 10_000,
        });

        registry.register(ModelProfile {
            id: ModelId::Claude35Haiku,
            display_name: ModelId::Claude35Haiku.to_string(),
            context_window: 200_000,
            cost_class: CostClass::Low,
            affinities: vec![Classification, Summarization],
            tokens_per_minute: 100_000,
            requests_per_day: 5_000,
        });

        registry.register(ModelProfile {
            id: ModelId::Llama3370BVersatile,
            display_name: ModelId::Llama3370BVersatile.to_string(),
            context_window: 128_000,
            cost_class: CostClass::Medium,
            affinities: vec![Ideation, Analysis, Summarization],
            tokens_per_minute: 300_000,
            requests_per_day: 14_400,
        });

        registry.register(ModelProfile {
            id: ModelId::Gpt4o,
            display_name: ModelId::Gpt4o.to_string(),
            context_window: 128_000,
            cost_class: CostClass::Medium,
            affinities: vec![Analysis, Ideation, Critique],
            tokens_per_minute: 150_000,
            requests_per_day: 10_000,
        });

        registry.register(ModelProfile {
            id: ModelId::DeepSeekReasoner,
            display_name: ModelId::DeepSeekReasoner.to_string(),
            context_window: 64_000,
            cost_class: CostClass::Medium,
            affinities: vec![Reasoning, Critique],
            tokens_per_minute: 80_000,
            requests_per_day: 5_000,
        });

        registry.register(ModelProfile {
            id: ModelId::Claude35Sonnet,
            display_name: ModelId::Claude35Sonnet.to_string(),
            context_window: 200_000,
            cost_class: CostClass::High,
            affinities: vec![Reasoning, Analysis, Critique, Ideation],
            tokens_per_minute: 80_000,
            requests_per_day: 2_000,
        });

        registry
    }

    /// Registers or replaces a profile.
    pub fn register(&mut self, profile: ModelProfile) {
        self.profiles.insert(profile.id, profile);
    }

    /// Looks up the profile for a model.
    #[must_use]
    pub fn get(&self, id: ModelId) -> Option<&ModelProfile> {
        self.profiles.get(&id)
    }

    /// All registered profiles.
    #[must_use]
    pub fn profiles(&self) -> Vec<&ModelProfile> {
        let mut profiles: Vec<_> = self.profiles.values().collect();
        profiles.sort_by_key(|profile| ModelId::all().iter().position(|id| *id == profile.id));
        profiles
    }

    /// Models affine to the given intent, in declaration order.
    #[must_use]
    pub fn models_for_intent(&self, intent: TaskIntent) -> Vec<ModelId> {
        self.profiles()
            .into_iter()
            .filter(|profile| profile.supports(intent))
            .map(|profile| profile.id)
            .collect()
    }

    /// Downgrade targets for `model`: every profile in a strictly lower
    /// cost class whose affinities overlap the model's own, cheapest class
    /// first. This is the single definition of the downgrade policy; the
    /// governor layers budget headroom on top of it.
    #[must_use]
    pub fn downgrade_candidates(&self, model: ModelId) -> Vec<&ModelProfile> {
        let Some(profile) = self.get(model) else {
            return Vec::new();
        };

        let mut candidates: Vec<_> = self
            .profiles()
            .into_iter()
            .filter(|candidate| {
                candidate.id != model
                    && candidate.cost_class < profile.cost_class
                    && candidate
                        .affinities
                        .iter()
                        .any(|intent| profile.supports(*intent))
            })
            .collect();
        candidates.sort_by_key(|candidate| candidate.cost_class);
        candidates
    }

    /// Cheapest model affine to `intent` in a strictly lower cost class
    /// than `model`, if one exists.
    #[must_use]
    pub fn cheaper_alternative(&self, model: ModelId, intent: TaskIntent) -> Option<ModelId> {
        self.downgrade_candidates(model)
            .into_iter()
            .find(|candidate| candidate.supports(intent))
            .map(|candidate| candidate.id)
    }

    /// Whether the registry has no models.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
