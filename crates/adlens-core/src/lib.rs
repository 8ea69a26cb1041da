//! Core types and traits for the adlens orchestration system.
//!
//! This crate provides the shared vocabulary of the system: task intents,
//! cost classes, completion request/response wire types, the error taxonomy
//! for upstream interactions, and the `UpstreamClient` trait that makes
//! model providers interchangeable.

/// Error types and result definitions.
pub mod error;
/// Synchronization utilities.
pub mod sync;
/// Trait definitions for upstream model clients.
pub mod traits;
/// Core data types for completion requests, responses, and task metadata.
pub mod types;

pub use error::{Error, Result};
pub use sync::IgnoreLock;
pub use traits::UpstreamClient;
pub use types::{
    CompletionOptions, CompletionRequest, CompletionResponse, Complexity, CostClass, Priority,
    ResponseFormat, TaskIntent, TokenUsage,
};
