//! Append-only audit trail of model calls, with drift detection.
//!
//! Every attempted upstream call produces exactly one provenance record,
//! successful or not. Records are keyed by request id; logging the same id
//! twice is rejected so retries cannot silently overwrite history.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use adlens_core::{IgnoreLock as _, TaskIntent};

use crate::error::{OrchestrationError, Result};
use crate::registry::ModelId;

/// Minimum samples per window before drift is judged.
const DRIFT_MIN_SAMPLES: usize = 5;
/// Recent window length in hours.
const DRIFT_RECENT_HOURS: i64 = 24;
/// Historical window length in days (recent window excluded).
const DRIFT_HISTORY_DAYS: i64 = 30;
/// Latency degradation ratio that counts as drift.
const DRIFT_LATENCY_RATIO: f64 = 1.2;
/// Error rate degradation ratio that counts as drift.
const DRIFT_ERROR_RATIO: f64 = 2.0;

/// One audited model call, successful or failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestProvenance {
    /// Unique id of this call attempt.
    pub request_id: Uuid,
    /// Model the call ran against.
    pub model: ModelId,
    /// Task intent the call served.
    pub task_type: TaskIntent,
    /// Content hash of the prompt.
    pub prompt_hash: String,
    /// Content hash of the output; absent when the call failed.
    pub output_hash: Option<String>,
    /// Prompt tokens consumed.
    pub input_tokens: u64,
    /// Completion tokens produced.
    pub output_tokens: u64,
    /// Wall-clock latency of the call.
    pub latency_ms: u64,
    /// Quality score attached after the fact, in `[0, 1]`.
    pub quality_score: Option<f64>,
    /// Error description when the call failed.
    pub error: Option<String>,
    /// When the record was logged.
    pub created_at: DateTime<Utc>,
}

impl RequestProvenance {
    fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Aggregated statistics for one model over a time window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelStats {
    /// Model the statistics cover.
    pub model: ModelId,
    /// Calls observed in the window.
    pub request_count: usize,
    /// Mean latency across those calls.
    pub avg_latency_ms: f64,
    /// Fraction of calls that failed.
    pub error_rate: f64,
    /// Mean quality score among scored calls, when any exist.
    pub avg_quality: Option<f64>,
    /// Total prompt plus completion tokens.
    pub total_tokens: u64,
}

/// Outcome of a drift check for one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DriftSignal {
    /// Too few samples in one of the windows to judge.
    InsufficientData,
    /// Recent behavior is consistent with history.
    NoDrift,
    /// Recent behavior degraded past the drift thresholds.
    Detected {
        /// Mean latency in the recent window.
        recent_latency_ms: f64,
        /// Mean latency in the historical window.
        historical_latency_ms: f64,
        /// Error rate in the recent window.
        recent_error_rate: f64,
        /// Error rate in the historical window.
        historical_error_rate: f64,
    },
}

/// Storage seam for the audit trail.
#[async_trait]
pub trait ProvenanceStore: Send + Sync {
    /// Appends one record. Rejects a duplicate request id.
    async fn log_request(&self, record: RequestProvenance) -> Result<()>;

    /// Attaches a quality score to an existing record.
    async fn record_quality(&self, request_id: Uuid, score: f64) -> Result<()>;

    /// Aggregated statistics for one model over the last `days` days.
    async fn model_stats(&self, model: ModelId, days: i64) -> Result<ModelStats>;

    /// Statistics for every model seen in the last `days` days.
    async fn all_model_stats(&self, days: i64) -> Result<Vec<ModelStats>>;

    /// Request counts per task intent over the last `days` days.
    async fn task_distribution(&self, days: i64) -> Result<HashMap<TaskIntent, usize>>;

    /// Compares a model's recent window against its history.
    async fn detect_drift(&self, model: ModelId) -> Result<DriftSignal>;
}

/// In-memory provenance store.
#[derive(Default)]
pub struct MemoryProvenanceStore {
    records: Mutex<Vec<RequestProvenance>>,
}

impl MemoryProvenanceStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn stats_over<'a, I>(model: ModelId, records: I) -> ModelStats
    where
        I: Iterator<Item = &'a RequestProvenance>,
    {
        let mut request_count = 0_usize;
        let mut error_count = 0_usize;
        let mut latency_sum = 0_u64;
        let mut total_tokens = 0_u64;
        let mut quality_sum = 0.0_f64;
        let mut quality_count = 0_usize;

        for record in records {
            request_count += 1;
            latency_sum += record.latency_ms;
            total_tokens += record.input_tokens + record.output_tokens;
            if record.is_error() {
                error_count += 1;
            }
            if let Some(score) = record.quality_score {
                quality_sum += score;
                quality_count += 1;
            }
        }

        let (avg_latency_ms, error_rate) = if request_count == 0 {
            (0.0, 0.0)
        } else {
            (
                latency_sum as f64 / request_count as f64,
                error_count as f64 / request_count as f64,
            )
        };
        let avg_quality = (quality_count > 0).then(|| quality_sum / quality_count as f64);

        ModelStats {
            model,
            request_count,
            avg_latency_ms,
            error_rate,
            avg_quality,
            total_tokens,
        }
    }
}

#[async_trait]
impl ProvenanceStore for MemoryProvenanceStore {
    async fn log_request(&self, record: RequestProvenance) -> Result<()> {
        let mut records = self.records.lock_ignore_poison();
        if records
            .iter()
            .any(|existing| existing.request_id == record.request_id)
        {
            return Err(OrchestrationError::Other(format!(
                "duplicate provenance record for request {}",
                record.request_id
            )));
        }
        records.push(record);
        Ok(())
    }

    async fn record_quality(&self, request_id: Uuid, score: f64) -> Result<()> {
        let mut records = self.records.lock_ignore_poison();
        let record = records
            .iter_mut()
            .find(|record| record.request_id == request_id)
            .ok_or_else(|| {
                OrchestrationError::Other(format!("no provenance record for request {request_id}"))
            })?;
        record.quality_score = Some(score.clamp(0.0, 1.0));
        Ok(())
    }

    async fn model_stats(&self, model: ModelId, days: i64) -> Result<ModelStats> {
        let cutoff = Utc::now() - ChronoDuration::days(days);
        let records = self.records.lock_ignore_poison();
        Ok(Self::stats_over(
            model,
            records
                .iter()
                .filter(|record| record.model == model && record.created_at >= cutoff),
        ))
    }

    async fn all_model_stats(&self, days: i64) -> Result<Vec<ModelStats>> {
        let cutoff = Utc::now() - ChronoDuration::days(days);
        let records = self.records.lock_ignore_poison();

        let mut models: Vec<ModelId> = Vec::new();
        for record in records.iter().filter(|record| record.created_at >= cutoff) {
            if !models.contains(&record.model) {
                models.push(record.model);
            }
        }

        Ok(models
            .into_iter()
            .map(|model| {
                Self::stats_over(
                    model,
                    records
                        .iter()
                        .filter(|record| record.model == model && record.created_at >= cutoff),
                )
            })
            .collect())
    }

    async fn task_distribution(&self, days: i64) -> Result<HashMap<TaskIntent, usize>> {
        let cutoff = Utc::now() - ChronoDuration::days(days);
        let records = self.records.lock_ignore_poison();

        let mut distribution = HashMap::new();
        for record in records.iter().filter(|record| record.created_at >= cutoff) {
            *distribution.entry(record.task_type).or_insert(0) += 1;
        }
        Ok(distribution)
    }

    async fn detect_drift(&self, model: ModelId) -> Result<DriftSignal> {
        let now = Utc::now();
        let recent_cutoff = now - ChronoDuration::hours(DRIFT_RECENT_HOURS);
        let history_cutoff = now - ChronoDuration::days(DRIFT_HISTORY_DAYS);

        let records = self.records.lock_ignore_poison();
        let recent = Self::stats_over(
            model,
            records
                .iter()
                .filter(|record| record.model == model && record.created_at >= recent_cutoff),
        );
        let historical = Self::stats_over(
            model,
            records.iter().filter(|record| {
                record.model == model
                    && record.created_at >= history_cutoff
                    && record.created_at < recent_cutoff
            }),
        );

        if recent.request_count < DRIFT_MIN_SAMPLES
            || historical.request_count < DRIFT_MIN_SAMPLES
        {
            return Ok(DriftSignal::InsufficientData);
        }

        let latency_degraded = historical.avg_latency_ms > 0.0
            && recent.avg_latency_ms > historical.avg_latency_ms * DRIFT_LATENCY_RATIO;
        let errors_degraded = recent.error_rate > 0.0
            && recent.error_rate > historical.error_rate * DRIFT_ERROR_RATIO;

        if latency_degraded || errors_degraded {
            Ok(DriftSignal::Detected {
                recent_latency_ms: recent.avg_latency_ms,
                historical_latency_ms: historical.avg_latency_ms,
                recent_error_rate: recent.error_rate,
                historical_error_rate: historical.error_rate,
            })
        } else {
            Ok(DriftSignal::NoDrift)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_at(model: ModelId, latency_ms: u64, failed: bool, age_hours: i64) -> RequestProvenance {
        RequestProvenance {
            request_id: Uuid::new_v4(),
            model,
            task_type: TaskIntent::Analysis,
            prompt_hash: "abcd1234abcd1234".to_owned(),
            output_hash: (!failed).then(|| "1234abcd1234abcd".to_owned()),
            input_tokens: 100,
            output_tokens: 50,
            latency_ms,
            quality_score: None,
            error: failed.then(|| "upstream transient failure".to_owned()),
            created_at: Utc::now() - ChronoDuration::hours(age_hours),
        }
    }

    #[tokio::test]
    async fn test_duplicate_request_id_rejected() {
        let store = MemoryProvenanceStore::new();
        let record = record_at(ModelId::Gpt4oMini, 200, false, 0);
        let duplicate = record.clone();

        store.log_request(record).await.unwrap();
        let error = store.log_request(duplicate).await.unwrap_err();
        assert!(error.to_string().contains("duplicate"));
    }

    #[tokio::test]
    async fn test_quality_score_attaches_and_clamps() {
        let store = MemoryProvenanceStore::new();
        let record = record_at(ModelId::Gpt4o, 300, false, 0);
        let id = record.request_id;
        store.log_request(record).await.unwrap();

        store.record_quality(id, 1.4).await.unwrap();
        let stats = store.model_stats(ModelId::Gpt4o, 1).await.unwrap();
        assert_eq!(stats.avg_quality, Some(1.0));

        let missing = store.record_quality(Uuid::new_v4(), 0.5).await;
        assert!(missing.is_err());
    }

    #[tokio::test]
    async fn test_model_stats_aggregation() {
        let store = MemoryProvenanceStore::new();
        store
            .log_request(record_at(ModelId::Claude35Sonnet, 100, false, 1))
            .await
            .unwrap();
        store
            .log_request(record_at(ModelId::Claude35Sonnet, 300, true, 2))
            .await
            .unwrap();
        // Outside the queried window.
        store
            .log_request(record_at(ModelId::Claude35Sonnet, 900, false, 24 * 10))
            .await
            .unwrap();

        let stats = store.model_stats(ModelId::Claude35Sonnet, 7).await.unwrap();
        assert_eq!(stats.request_count, 2);
        assert!((stats.avg_latency_ms - 200.0).abs() < f64::EPSILON);
        assert!((stats.error_rate - 0.5).abs() < f64::EPSILON);
        assert_eq!(stats.total_tokens, 300);
    }

    #[tokio::test]
    async fn test_task_distribution_counts() {
        let store = MemoryProvenanceStore::new();
        let mut summarization = record_at(ModelId::Gpt4oMini, 100, false, 1);
        summarization.task_type = TaskIntent::Summarization;
        store.log_request(summarization).await.unwrap();
        store
            .log_request(record_at(ModelId::Gpt4o, 100, false, 1))
            .await
            .unwrap();
        store
            .log_request(record_at(ModelId::Gpt4o, 100, false, 1))
            .await
            .unwrap();

        let distribution = store.task_distribution(7).await.unwrap();
        assert_eq!(distribution.get(&TaskIntent::Analysis), Some(&2));
        assert_eq!(distribution.get(&TaskIntent::Summarization), Some(&1));
    }

    #[tokio::test]
    async fn test_drift_insufficient_data() {
        let store = MemoryProvenanceStore::new();
        for _ in 0..3 {
            store
                .log_request(record_at(ModelId::Gpt4o, 200, false, 1))
                .await
                .unwrap();
        }

        let signal = store.detect_drift(ModelId::Gpt4o).await.unwrap();
        assert_eq!(signal, DriftSignal::InsufficientData);
    }

    #[tokio::test]
    async fn test_drift_detected_on_latency_degradation() {
        let store = MemoryProvenanceStore::new();
        // Historical window: steady 200ms.
        for offset in 0..6 {
            store
                .log_request(record_at(ModelId::Gpt4o, 200, false, 48 + offset))
                .await
                .unwrap();
        }
        // Recent window: 500ms, well past the 1.2x threshold.
        for _ in 0..6 {
            store
                .log_request(record_at(ModelId::Gpt4o, 500, false, 1))
                .await
                .unwrap();
        }

        match store.detect_drift(ModelId::Gpt4o).await.unwrap() {
            DriftSignal::Detected {
                recent_latency_ms,
                historical_latency_ms,
                ..
            } => {
                assert!(recent_latency_ms > historical_latency_ms * 1.2);
            }
            other => panic!("expected drift, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_drift_detected_on_new_errors() {
        let store = MemoryProvenanceStore::new();
        // Clean history.
        for offset in 0..6 {
            store
                .log_request(record_at(ModelId::Gpt4o, 200, false, 48 + offset))
                .await
                .unwrap();
        }
        // Recent window at the same latency but with failures.
        for index in 0..6 {
            store
                .log_request(record_at(ModelId::Gpt4o, 200, index % 2 == 0, 1))
                .await
                .unwrap();
        }

        match store.detect_drift(ModelId::Gpt4o).await.unwrap() {
            DriftSignal::Detected {
                recent_error_rate,
                historical_error_rate,
                ..
            } => {
                assert!(recent_error_rate > 0.0);
                assert!((historical_error_rate - 0.0).abs() < f64::EPSILON);
            }
            other => panic!("expected drift, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_no_drift_on_steady_behavior() {
        let store = MemoryProvenanceStore::new();
        for offset in 0..6 {
            store
                .log_request(record_at(ModelId::Gpt4o, 200, false, 48 + offset))
                .await
                .unwrap();
        }
        for _ in 0..6 {
            store
                .log_request(record_at(ModelId::Gpt4o, 210, false, 1))
                .await
                .unwrap();
        }

        let signal = store.detect_drift(ModelId::Gpt4o).await.unwrap();
        assert_eq!(signal, DriftSignal::NoDrift);
    }
}
