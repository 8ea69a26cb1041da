//! Multi-model request orchestration for marketing analysis workloads.
//!
//! Routes each request to the model best suited for it, enforces
//! per-cost-class budgets, retries across upstream credentials, runs a
//! draft-then-critique protocol for high-stakes outputs, and audits every
//! attempted call in a provenance store with drift detection.
//!
//! [`Orchestrator`] is the entry point; everything else is reachable
//! through it but exported for callers that want to compose components
//! themselves.

pub mod classifier;
pub mod config;
pub mod error;
pub mod executor;
pub mod governor;
pub mod orchestrator;
pub mod provenance;
pub mod registry;
pub mod router;
pub mod twopass;

pub use classifier::{ClassificationResult, ClassifierHints, TaskClassifier};
pub use config::{
    BudgetLimits, ClassifierConfig, ExecutionConfig, KeyConfig, OrchestratorConfig,
};
pub use error::{OrchestrationError, Result};
pub use executor::{
    CallTelemetry, DailyUsage, ExecutionOutcome, KeyPoolStatus, ModelExecutor, approx_tokens,
    content_hash,
};
pub use governor::{BudgetSnapshot, BudgetWarning, CostDecision, CostGovernor};
pub use orchestrator::{
    ModelDrift, OperatorReport, Orchestrator, ProcessOptions, ProcessOutcome,
};
pub use provenance::{
    DriftSignal, MemoryProvenanceStore, ModelStats, ProvenanceStore, RequestProvenance,
};
pub use registry::{ModelId, ModelProfile, ModelRegistry};
pub use router::{ModelRouter, RouterDecision};
pub use twopass::{CritiqueJudgment, TwoPassPhase, parse_judgment};
