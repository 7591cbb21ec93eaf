//! # Stage: Batch Coordination
//!
//! ## Responsibility
//! Validate a bounded list of texts up front, analyse the items concurrently
//! through a shared [`HybridOrchestrator`], and aggregate a [`BatchSummary`].
//!
//! ## Guarantees
//! - Fail fast: an invalid batch is rejected before any predictor call
//! - Order-preserving: `results[i]` always belongs to `texts[i]`
//! - Fail soft: a failing or panicking item never aborts its siblings
//! - Bounded: at most `max_concurrency` items are analysed at once
//! - All-or-nothing under a deadline: partial results are discarded
//!
//! ## NOT Responsible For
//! - Routing or predictor calls (that belongs to `orchestrator`)

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::config::BatchConfig;
use crate::metrics;
use crate::orchestrator::{AnalysisResult, HybridOrchestrator, ModelKind};
use crate::{SentimentError, ValidationError};

// ── Summary ──────────────────────────────────────────────────────────────

/// How many successful items each predictor answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RoutingSplit {
    /// Items answered by the fast predictor.
    pub fast_model: usize,
    /// Items escalated to the accurate predictor.
    pub accurate_model: usize,
}

/// Aggregate statistics for one batch call.
///
/// Averages cover successful items only and are `0.0` when there are none.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Items in the batch.
    pub total_texts: usize,
    /// Items with a successful analysis.
    pub successful: usize,
    /// Items that failed.
    pub failed: usize,
    /// Fast / accurate split over successful items.
    pub routing: RoutingSplit,
    /// Mean confidence of the adopted predictions.
    pub average_confidence: f64,
    /// Mean total processing time in seconds.
    pub average_processing_time: f64,
}

impl BatchSummary {
    /// Compute the summary of `results`.
    pub fn from_results(results: &[AnalysisResult]) -> Self {
        let mut summary = Self {
            total_texts: results.len(),
            ..Self::default()
        };
        let mut confidence_sum = 0.0;
        let mut time_sum = 0.0;

        for analysis in results.iter().filter_map(AnalysisResult::analysis) {
            summary.successful += 1;
            match analysis.model_used {
                ModelKind::Fast => summary.routing.fast_model += 1,
                ModelKind::Accurate => summary.routing.accurate_model += 1,
            }
            confidence_sum += analysis.prediction.confidence;
            time_sum += analysis.timing.total;
        }

        summary.failed = summary.total_texts - summary.successful;
        if summary.successful > 0 {
            let n = summary.successful as f64;
            summary.average_confidence = confidence_sum / n;
            summary.average_processing_time = time_sum / n;
        }
        summary
    }
}

/// Per-item results, in input order, plus their summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    /// One result per input text.
    pub results: Vec<AnalysisResult>,
    /// Aggregate statistics.
    #[serde(rename = "statistics")]
    pub summary: BatchSummary,
}

// ── Coordinator ──────────────────────────────────────────────────────────

/// Runs a [`HybridOrchestrator`] over bounded batches.
pub struct BatchCoordinator {
    orchestrator: Arc<HybridOrchestrator>,
    config: BatchConfig,
}

impl BatchCoordinator {
    /// Create a coordinator with the default limits (100 texts, 8 at a time).
    pub fn new(orchestrator: Arc<HybridOrchestrator>) -> Self {
        Self::with_config(orchestrator, BatchConfig::default())
    }

    /// Create a coordinator with explicit limits.
    ///
    /// A `max_concurrency` of 0 is raised to 1.
    pub fn with_config(orchestrator: Arc<HybridOrchestrator>, mut config: BatchConfig) -> Self {
        config.max_concurrency = config.max_concurrency.max(1);
        Self {
            orchestrator,
            config,
        }
    }

    /// The orchestrator items are analysed with.
    pub fn orchestrator(&self) -> &Arc<HybridOrchestrator> {
        &self.orchestrator
    }

    /// The limits in force.
    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Check a batch without analysing it.
    ///
    /// Checks run in order: empty batch, size cap, then the first empty or
    /// whitespace-only element.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] found.
    pub fn validate<S: AsRef<str>>(&self, texts: &[S]) -> Result<(), ValidationError> {
        if texts.is_empty() {
            return Err(ValidationError::EmptyBatch);
        }
        if texts.len() > self.config.max_batch_size {
            return Err(ValidationError::BatchTooLarge {
                size: texts.len(),
                max: self.config.max_batch_size,
            });
        }
        if let Some(index) = texts.iter().position(|t| t.as_ref().trim().is_empty()) {
            return Err(ValidationError::EmptyElement { index });
        }
        Ok(())
    }

    /// Validate and analyse a batch.
    ///
    /// # Errors
    ///
    /// Returns [`SentimentError::Validation`] if the batch is rejected; no
    /// item is analysed in that case. Item failures are reported inside the
    /// report, never as an error.
    pub async fn analyze_batch(&self, texts: Vec<String>) -> Result<BatchReport, SentimentError> {
        self.accept(&texts)?;
        Ok(self.run(texts).await)
    }

    /// Like [`analyze_batch`](Self::analyze_batch), aborting after `deadline`.
    ///
    /// # Errors
    ///
    /// - [`SentimentError::Validation`] if the batch is rejected.
    /// - [`SentimentError::DeadlineExceeded`] if the batch did not finish in
    ///   time. In-flight items are aborted and no partial results are kept.
    pub async fn analyze_batch_with_deadline(
        &self,
        texts: Vec<String>,
        deadline: Duration,
    ) -> Result<BatchReport, SentimentError> {
        self.accept(&texts)?;
        match tokio::time::timeout(deadline, self.run(texts)).await {
            Ok(report) => Ok(report),
            Err(_) => {
                metrics::inc_error("batch", "deadline_exceeded");
                warn!(
                    target: "sentiment::batch",
                    deadline_ms = deadline.as_millis() as u64,
                    "Batch deadline exceeded, results discarded"
                );
                Err(SentimentError::DeadlineExceeded(deadline))
            }
        }
    }

    fn accept(&self, texts: &[String]) -> Result<(), ValidationError> {
        self.validate(texts).map_err(|e| {
            metrics::inc_error("batch", e.code());
            warn!(target: "sentiment::batch", error = %e, "Batch rejected");
            e
        })?;
        metrics::observe_batch_size(texts.len());
        info!(target: "sentiment::batch", size = texts.len(), "Batch accepted");
        Ok(())
    }

    /// Analyse every item; dropping the returned future aborts all tasks.
    async fn run(&self, texts: Vec<String>) -> BatchReport {
        let total = texts.len();
        let permits = Arc::new(Semaphore::new(self.config.max_concurrency));
        let mut tasks = JoinSet::new();

        for (index, text) in texts.into_iter().enumerate() {
            let orchestrator = Arc::clone(&self.orchestrator);
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                (index, orchestrator.analyze(&text).await)
            });
        }

        let mut slots: Vec<Option<AnalysisResult>> = (0..total).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => {
                    if let Some(slot) = slots.get_mut(index) {
                        *slot = Some(result);
                    }
                }
                Err(e) => {
                    warn!(target: "sentiment::batch", error = %e, "Batch task did not complete");
                }
            }
        }

        let results: Vec<AnalysisResult> = slots
            .into_iter()
            .map(|slot| slot.unwrap_or_else(|| AnalysisResult::failure("analysis task did not complete")))
            .collect();
        let summary = BatchSummary::from_results(&results);

        info!(
            target: "sentiment::batch",
            total = summary.total_texts,
            successful = summary.successful,
            failed = summary.failed,
            fast = summary.routing.fast_model,
            accurate = summary.routing.accurate_model,
            "Batch complete"
        );

        BatchReport { results, summary }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predictor::{LexiconPredictor, Predictor, PredictorError, PredictorOutput};
    use crate::routing::{RoutingConfig, RoutingPolicy};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Wraps the lexicon predictor, counting calls and tracking peak concurrency.
    struct TrackingPredictor {
        inner: LexiconPredictor,
        calls: AtomicUsize,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl TrackingPredictor {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                inner: LexiconPredictor::new().with_delay(delay),
                calls: AtomicUsize::new(0),
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Predictor for TrackingPredictor {
        fn name(&self) -> &str {
            "tracking"
        }

        async fn predict_with_confidence(&self, text: &str) -> Result<PredictorOutput, PredictorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let out = self.inner.predict_with_confidence(text).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            out
        }
    }

    /// Fails or panics on marker texts.
    struct FlakyPredictor;

    #[async_trait]
    impl Predictor for FlakyPredictor {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn predict_with_confidence(&self, text: &str) -> Result<PredictorOutput, PredictorError> {
            if text.contains("fail") {
                return Err(PredictorError::Request("connection reset".into()));
            }
            if text.contains("boom") {
                std::panic::panic_any("predictor exploded");
            }
            LexiconPredictor::new().predict_with_confidence(text).await
        }
    }

    fn coordinator(predictor: Arc<dyn Predictor>, config: BatchConfig) -> BatchCoordinator {
        let policy = RoutingPolicy::new(RoutingConfig::default())
            .unwrap_or_else(|e| std::panic::panic_any(format!("test: policy: {e}")));
        let orch = HybridOrchestrator::new(Arc::clone(&predictor), predictor, policy);
        BatchCoordinator::with_config(Arc::new(orch), config)
    }

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    // -- validation --------------------------------------------------------

    #[test]
    fn test_validate_empty_batch_is_rejected() {
        let c = coordinator(TrackingPredictor::new(Duration::ZERO), BatchConfig::default());
        assert_eq!(c.validate::<String>(&[]), Err(ValidationError::EmptyBatch));
    }

    #[test]
    fn test_validate_size_cap_checked_before_elements() {
        let c = coordinator(TrackingPredictor::new(Duration::ZERO), BatchConfig::default());
        let mut batch = vec!["ok".to_string(); 101];
        batch[3] = String::new();
        assert_eq!(
            c.validate(&batch),
            Err(ValidationError::BatchTooLarge { size: 101, max: 100 })
        );
    }

    #[test]
    fn test_validate_reports_first_blank_element_index() {
        let c = coordinator(TrackingPredictor::new(Duration::ZERO), BatchConfig::default());
        let batch = texts(&["a", "b", " \t", ""]);
        assert_eq!(c.validate(&batch), Err(ValidationError::EmptyElement { index: 2 }));
    }

    #[test]
    fn test_validate_exactly_max_batch_size_passes() {
        let c = coordinator(TrackingPredictor::new(Duration::ZERO), BatchConfig::default());
        assert!(c.validate(&vec!["ok".to_string(); 100]).is_ok());
    }

    // -- processing --------------------------------------------------------

    #[tokio::test]
    async fn test_analyze_batch_preserves_input_order() {
        let c = coordinator(TrackingPredictor::new(Duration::ZERO), BatchConfig::default());
        let batch = texts(&["отлично", "ужасно", "возможно хорошо", "обычный день"]);
        let report = c
            .analyze_batch(batch.clone())
            .await
            .unwrap_or_else(|e| std::panic::panic_any(format!("test: {e}")));

        assert_eq!(report.results.len(), batch.len());
        for (result, text) in report.results.iter().zip(&batch) {
            let analysis = result
                .analysis()
                .unwrap_or_else(|| std::panic::panic_any("test: expected success"));
            assert_eq!(&analysis.sample.text, text);
        }
    }

    #[tokio::test]
    async fn test_analyze_batch_rejection_makes_no_predictor_calls() {
        let predictor = TrackingPredictor::new(Duration::ZERO);
        let c = coordinator(predictor.clone(), BatchConfig::default());
        let result = c.analyze_batch(texts(&["a", "", "b"])).await;
        assert!(matches!(
            result,
            Err(SentimentError::Validation(ValidationError::EmptyElement { index: 1 }))
        ));
        assert_eq!(predictor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_analyze_batch_respects_max_concurrency() {
        let predictor = TrackingPredictor::new(Duration::from_millis(10));
        let config = BatchConfig {
            max_concurrency: 2,
            ..BatchConfig::default()
        };
        let c = coordinator(predictor.clone(), config);
        let batch = vec!["хороший товар".to_string(); 8];
        let report = c
            .analyze_batch(batch)
            .await
            .unwrap_or_else(|e| std::panic::panic_any(format!("test: {e}")));
        assert_eq!(report.summary.successful, 8);
        assert!(predictor.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_analyze_batch_isolates_failures_and_panics() {
        let c = coordinator(Arc::new(FlakyPredictor), BatchConfig::default());
        let report = c
            .analyze_batch(texts(&["отлично", "fail here", "boom", "ужасно"]))
            .await
            .unwrap_or_else(|e| std::panic::panic_any(format!("test: {e}")));

        assert_eq!(report.summary.total_texts, 4);
        assert_eq!(report.summary.successful, 2);
        assert_eq!(report.summary.failed, 2);
        assert!(report.results[0].success);
        assert!(!report.results[1].success);
        let panic_msg = report.results[2].error.clone().unwrap_or_default();
        assert!(panic_msg.starts_with("fast predictor panicked"), "got {panic_msg}");
        assert!(panic_msg.contains("predictor exploded"), "got {panic_msg}");
        assert!(report.results[3].success);
    }

    #[tokio::test]
    async fn test_analyze_batch_with_deadline_discards_partial_results() {
        let c = coordinator(
            TrackingPredictor::new(Duration::from_millis(200)),
            BatchConfig::default(),
        );
        let result = c
            .analyze_batch_with_deadline(texts(&["отлично", "ужасно"]), Duration::from_millis(20))
            .await;
        assert!(matches!(result, Err(SentimentError::DeadlineExceeded(_))));
    }

    #[tokio::test]
    async fn test_analyze_batch_with_generous_deadline_completes() {
        let c = coordinator(TrackingPredictor::new(Duration::ZERO), BatchConfig::default());
        let report = c
            .analyze_batch_with_deadline(texts(&["отлично"]), Duration::from_secs(5))
            .await
            .unwrap_or_else(|e| std::panic::panic_any(format!("test: {e}")));
        assert_eq!(report.summary.successful, 1);
    }

    // -- summary -----------------------------------------------------------

    #[test]
    fn test_summary_of_only_failures_has_zero_averages() {
        let results = vec![AnalysisResult::failure("x"), AnalysisResult::failure("y")];
        let summary = BatchSummary::from_results(&results);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.average_confidence, 0.0);
        assert_eq!(summary.average_processing_time, 0.0);
    }

    #[tokio::test]
    async fn test_summary_counts_add_up() {
        let c = coordinator(Arc::new(FlakyPredictor), BatchConfig::default());
        let report = c
            .analyze_batch(texts(&["отлично", "возможно, неплохо", "fail", "хороший товар"]))
            .await
            .unwrap_or_else(|e| std::panic::panic_any(format!("test: {e}")));
        let s = &report.summary;
        assert_eq!(s.routing.fast_model + s.routing.accurate_model, s.successful);
        assert_eq!(s.successful + s.failed, s.total_texts);
        assert!(s.routing.accurate_model >= 1);
    }

    #[test]
    fn test_summary_serializes_with_routing_keys() {
        let json = serde_json::to_value(BatchSummary::default())
            .unwrap_or_else(|e| std::panic::panic_any(format!("test: {e}")));
        assert!(json["routing"]["fast_model"].is_number());
        assert!(json["routing"]["accurate_model"].is_number());
        assert!(json["average_processing_time"].is_number());
    }
}
