//! Upstream model client implementations for the adlens orchestration core.
//!
//! Two clients live here: an OpenAI-compatible HTTP client used in
//! production, and a scriptable mock used by the orchestration test suites.

/// Scriptable mock client for tests.
pub mod mock;
/// OpenAI-compatible chat-completions HTTP client.
pub mod openai_compat;

pub use mock::{MockUpstream, ScriptedFailure};
pub use openai_compat::OpenAiCompatClient;
