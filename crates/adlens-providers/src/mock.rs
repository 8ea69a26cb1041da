//! Mock upstream client for testing orchestration flows.
//!
//! Allows defining canned responses for specific prompts and scripting
//! failures, enabling end-to-end testing of routing, budgeting, retry, and
//! two-pass flows without real API calls.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use adlens_core::{
    CompletionRequest, CompletionResponse, Error, IgnoreLock as _, Result, TokenUsage,
    UpstreamClient,
};

/// Failure kinds that can be scripted ahead of calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedFailure {
    /// Rate-limit rejection (429-style).
    Quota,
    /// Transient upstream failure (5xx-style).
    Transient,
    /// Response that fails schema validation.
    Malformed,
}

impl ScriptedFailure {
    fn into_error(self) -> Error {
        match self {
            Self::Quota => Error::QuotaExhausted("scripted 429".to_owned()),
            Self::Transient => Error::Provider("scripted transient failure".to_owned()),
            Self::Malformed => Error::InvalidResponse("scripted malformed output".to_owned()),
        }
    }
}

/// One recorded upstream call, for test verification.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    /// Provider-facing model identifier.
    pub model: String,
    /// API key the call was made with.
    pub api_key: String,
    /// Sampling temperature of the call.
    pub temperature: f32,
    /// User prompt content.
    pub user_prompt: String,
}

/// Mock upstream client returning pre-defined responses by prompt pattern.
pub struct MockUpstream {
    /// Predefined responses keyed by user-prompt substring.
    responses: Mutex<HashMap<String, String>>,
    /// Default response if no pattern matches.
    default_response: Mutex<Option<String>>,
    /// Failures consumed FIFO before any canned response is returned.
    scripted_failures: Mutex<VecDeque<ScriptedFailure>>,
    /// Call history for verification.
    call_history: Mutex<Vec<RecordedCall>>,
}

impl MockUpstream {
    /// Creates a mock with no canned responses.
    #[must_use]
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
            default_response: Mutex::new(None),
            scripted_failures: Mutex::new(VecDeque::new()),
            call_history: Mutex::new(Vec::new()),
        }
    }

    /// Adds a pattern-based response matched against the user prompt.
    #[must_use]
    pub fn with_response(self, pattern: impl Into<String>, response: impl Into<String>) -> Self {
        {
            let mut responses = self.responses.lock_ignore_poison();
            responses.insert(pattern.into(), response.into());
        }
        self
    }

    /// Sets a default response for prompts that match no pattern.
    #[must_use]
    pub fn with_default_response(self, response: impl Into<String>) -> Self {
        {
            let mut default = self.default_response.lock_ignore_poison();
            *default = Some(response.into());
        }
        self
    }

    /// Scripts a failure for the next un-consumed call.
    #[must_use]
    pub fn with_failure(self, failure: ScriptedFailure) -> Self {
        self.push_failure(failure);
        self
    }

    /// Scripts a failure after construction.
    pub fn push_failure(&self, failure: ScriptedFailure) {
        let mut failures = self.scripted_failures.lock_ignore_poison();
        failures.push_back(failure);
    }

    /// Returns the full call history.
    #[must_use]
    pub fn call_history(&self) -> Vec<RecordedCall> {
        self.call_history.lock_ignore_poison().clone()
    }

    /// Returns the number of calls made.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.call_history.lock_ignore_poison().len()
    }

    /// Clears the call history.
    pub fn clear_history(&self) {
        self.call_history.lock_ignore_poison().clear();
    }

    fn find_response(&self, user_prompt: &str) -> Option<String> {
        let responses = self.responses.lock_ignore_poison();

        if let Some(response) = responses.get(user_prompt) {
            return Some(response.clone());
        }

        responses
            .iter()
            .find(|(pattern, _)| user_prompt.contains(pattern.as_str()))
            .map(|(_, response)| response.clone())
    }
}

impl Default for MockUpstream {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UpstreamClient for MockUpstream {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn complete(
        &self,
        api_key: &str,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse> {
        {
            let mut history = self.call_history.lock_ignore_poison();
            history.push(RecordedCall {
                model: request.model.clone(),
                api_key: api_key.to_owned(),
                temperature: request.options.temperature,
                user_prompt: request.user_prompt.clone(),
            });
        }

        let scripted = {
            let mut failures = self.scripted_failures.lock_ignore_poison();
            failures.pop_front()
        };
        if let Some(failure) = scripted {
            return Err(failure.into_error());
        }

        let text = self.find_response(&request.user_prompt).unwrap_or_else(|| {
            let default = self.default_response.lock_ignore_poison();
            default
                .clone()
                .unwrap_or_else(|| format!("Mock response for: {}", request.user_prompt))
        });

        let usage = TokenUsage {
            prompt_tokens: request.token_estimate(),
            completion_tokens: (text.len() / 4) as u64,
        };

        Ok(CompletionResponse { text, usage })
    }
}
