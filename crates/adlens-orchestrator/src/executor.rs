//! Model execution against a pool of interchangeable upstream credentials.
//!
//! The executor is the only component that talks to the upstream client.
//! It layers per-key rate-limit tracking (upstream-imposed) on top of
//! whatever cost-class budgeting the governor applies (self-imposed),
//! rotates keys round-robin, retries at most once across keys, and returns
//! telemetry for every attempt so provenance is always populated.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use adlens_core::{
    CompletionOptions, CompletionRequest, CompletionResponse, IgnoreLock as _, UpstreamClient,
};

use crate::error::{OrchestrationError, Result};
use crate::registry::{ModelId, ModelRegistry};

/// Truncated SHA-256 content hash (first 8 bytes, hex-encoded).
#[must_use]
pub fn content_hash(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    hex::encode(&digest[..8])
}

/// Approximate token count for a text (chars / 4 heuristic).
#[must_use]
pub fn approx_tokens(text: &str) -> u64 {
    (text.len() / 4) as u64
}

/// Telemetry captured for one upstream attempt, success or failure.
#[derive(Debug, Clone)]
pub struct CallTelemetry {
    /// Model the call targeted.
    pub model: ModelId,
    /// Truncated hash of the combined prompt.
    pub prompt_hash: String,
    /// Truncated hash of the output, when one was produced.
    pub output_hash: Option<String>,
    /// Prompt-side token count.
    pub input_tokens: u64,
    /// Completion-side token count.
    pub output_tokens: u64,
    /// Wall-clock latency in milliseconds.
    pub latency_ms: u64,
}

/// Result of one executor call: the response or a classified failure, plus
/// telemetry that is populated either way.
#[derive(Debug)]
pub struct ExecutionOutcome {
    /// The upstream response or the classified failure.
    pub result: Result<CompletionResponse>,
    /// Telemetry for the attempt.
    pub telemetry: CallTelemetry,
}

/// Read-only snapshot of credential pool health.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyPoolStatus {
    /// Total credentials in the pool.
    pub total: usize,
    /// Credentials currently usable.
    pub available: usize,
    /// Credentials cooling down after a quota rejection.
    pub rate_limited: usize,
}

/// Read-only snapshot of per-key daily usage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyUsage {
    /// Requests across all keys today.
    pub total_requests: u64,
    /// Requests per key today, pool order.
    pub per_key_counts: Vec<u64>,
}

/// Mutable state for one credential.
struct KeyState {
    /// The credential itself.
    key: String,
    /// Cooling-down deadline after a quota rejection.
    cooling_until: Option<Instant>,
    /// Requests made today.
    requests_today: u64,
    /// Day the daily counter belongs to.
    day: NaiveDate,
    /// Start of the current per-minute token window.
    minute_started: Instant,
    /// Tokens charged in the current minute window.
    tokens_this_minute: u64,
}

impl KeyState {
    fn new(key: String) -> Self {
        Self {
            key,
            cooling_until: None,
            requests_today: 0,
            day: Utc::now().date_naive(),
            minute_started: Instant::now(),
            tokens_this_minute: 0,
        }
    }

    /// Rolls the daily and per-minute windows forward when they have lapsed.
    fn roll_windows(&mut self, now: Instant) {
        let today = Utc::now().date_naive();
        if today != self.day {
            self.day = today;
            self.requests_today = 0;
        }
        if now.duration_since(self.minute_started) >= Duration::from_secs(60) {
            self.minute_started = now;
            self.tokens_this_minute = 0;
        }
        if let Some(deadline) = self.cooling_until {
            if now >= deadline {
                self.cooling_until = None;
            }
        }
    }

    fn is_usable(&self, tokens_per_minute: u64, requests_per_day: u64, estimate: u64) -> bool {
        self.cooling_until.is_none()
            && self.requests_today < requests_per_day
            && self.tokens_this_minute + estimate <= tokens_per_minute
    }
}

/// Round-robin credential pool.
struct KeyPool {
    keys: Vec<KeyState>,
    cursor: usize,
}

/// Executes single model calls with per-key rate-limit awareness and
/// bounded cross-key retry.
pub struct ModelExecutor {
    /// Upstream client implementation.
    client: Arc<dyn UpstreamClient>,
    /// Capability table for per-key limits.
    registry: Arc<ModelRegistry>,
    /// Credential pool, shared across all concurrent requests.
    pool: Mutex<KeyPool>,
    /// Per-call timeout.
    timeout: Duration,
    /// Cooldown applied to a key after a quota rejection.
    cooldown: Duration,
}

impl ModelExecutor {
    /// Creates an executor over the given client and credential pool.
    #[must_use]
    pub fn new(
        client: Arc<dyn UpstreamClient>,
        registry: Arc<ModelRegistry>,
        api_keys: Vec<String>,
    ) -> Self {
        Self {
            client,
            registry,
            pool: Mutex::new(KeyPool {
                keys: api_keys.into_iter().map(KeyState::new).collect(),
                cursor: 0,
            }),
            timeout: Duration::from_secs(45),
            cooldown: Duration::from_secs(60),
        }
    }

    /// Sets the per-call timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the quota-rejection cooldown.
    #[must_use]
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Checks out the next usable key round-robin, charging its windows.
    ///
    /// Returns the pool index and the key. The token estimate is charged
    /// optimistically at checkout; a failed call still consumed upstream
    /// quota in most providers, so nothing is refunded.
    fn checkout(&self, model: ModelId, token_estimate: u64) -> Result<(usize, String)> {
        let profile = self.registry.get(model).ok_or_else(|| {
            OrchestrationError::Other(format!("model {model} is not registered"))
        })?;
        let (tpm, rpd) = (profile.tokens_per_minute, profile.requests_per_day);

        let now = Instant::now();
        let mut pool = self.pool.lock_ignore_poison();
        if pool.keys.is_empty() {
            return Err(OrchestrationError::Other(
                "no upstream credentials configured".to_owned(),
            ));
        }

        let total = pool.keys.len();
        for offset in 0..total {
            let index = (pool.cursor + offset) % total;
            let state = &mut pool.keys[index];
            state.roll_windows(now);

            if state.is_usable(tpm, rpd, token_estimate) {
                state.requests_today += 1;
                state.tokens_this_minute += token_estimate;
                let key = state.key.clone();
                pool.cursor = (index + 1) % total;
                return Ok((index, key));
            }
        }

        Err(OrchestrationError::UpstreamQuota(
            "all upstream credentials are rate limited or exhausted".to_owned(),
        ))
    }

    /// Marks a key as cooling down after a quota rejection.
    fn mark_cooling(&self, index: usize) {
        let mut pool = self.pool.lock_ignore_poison();
        if let Some(state) = pool.keys.get_mut(index) {
            state.cooling_until = Some(Instant::now() + self.cooldown);
        }
    }

    /// Executes one model call with bounded retry.
    ///
    /// At most one cross-key retry is made when the first attempt fails
    /// retryably; a quota rejection additionally puts the offending key
    /// into cooldown. Telemetry is populated for every outcome.
    pub async fn execute(
        &self,
        model: ModelId,
        system_prompt: &str,
        user_prompt: &str,
        options: CompletionOptions,
    ) -> ExecutionOutcome {
        let request = CompletionRequest::new(model.wire_id(), system_prompt, user_prompt)
            .with_options(options);
        let prompt_hash = content_hash(&format!("{system_prompt}\n{user_prompt}"));
        let input_estimate = request.token_estimate();
        let started = Instant::now();

        let mut result = self.attempt(model, &request, input_estimate).await;

        if let Err(error) = &result {
            if error.is_retryable() {
                tracing::debug!("retrying {model} on next credential after: {error}");
                result = self.attempt(model, &request, input_estimate).await;
            }
        }

        let latency_ms = started.elapsed().as_millis() as u64;
        let telemetry = match &result {
            Ok(response) => CallTelemetry {
                model,
                prompt_hash,
                output_hash: Some(content_hash(&response.text)),
                input_tokens: if response.usage.prompt_tokens > 0 {
                    response.usage.prompt_tokens
                } else {
                    input_estimate
                },
                output_tokens: if response.usage.completion_tokens > 0 {
                    response.usage.completion_tokens
                } else {
                    approx_tokens(&response.text)
                },
                latency_ms,
            },
            Err(_) => CallTelemetry {
                model,
                prompt_hash,
                output_hash: None,
                input_tokens: input_estimate,
                output_tokens: 0,
                latency_ms,
            },
        };

        ExecutionOutcome { result, telemetry }
    }

    /// One attempt: checkout, timed upstream call, quota bookkeeping.
    async fn attempt(
        &self,
        model: ModelId,
        request: &CompletionRequest,
        token_estimate: u64,
    ) -> Result<CompletionResponse> {
        let (index, key) = self.checkout(model, token_estimate)?;

        let call = self.client.complete(&key, request);
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(error)) => {
                if error.is_quota() {
                    tracing::warn!("credential {index} rate limited, cooling down");
                    self.mark_cooling(index);
                }
                Err(OrchestrationError::from_upstream(error))
            }
            Err(_) => Err(OrchestrationError::Timeout(self.timeout.as_millis() as u64)),
        }
    }

    /// Snapshot of credential pool health.
    #[must_use]
    pub fn pool_status(&self) -> KeyPoolStatus {
        let now = Instant::now();
        let mut pool = self.pool.lock_ignore_poison();

        let total = pool.keys.len();
        let rate_limited = pool
            .keys
            .iter_mut()
            .map(|state| {
                state.roll_windows(now);
                state
            })
            .filter(|state| state.cooling_until.is_some())
            .count();

        KeyPoolStatus {
            total,
            available: total - rate_limited,
            rate_limited,
        }
    }

    /// Snapshot of per-key daily usage.
    #[must_use]
    pub fn daily_usage(&self) -> DailyUsage {
        let pool = self.pool.lock_ignore_poison();
        let per_key_counts: Vec<u64> = pool.keys.iter().map(|state| state.requests_today).collect();

        DailyUsage {
            total_requests: per_key_counts.iter().sum(),
            per_key_counts,
        }
    }
}
