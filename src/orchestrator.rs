//! # Stage: Hybrid Orchestration
//!
//! ## Responsibility
//! Drive one request end to end: prepare the text, call the fast predictor,
//! ask the [`RoutingPolicy`] for a verdict, call the accurate predictor when
//! the verdict escalates, and assemble an [`AnalysisResult`] with a timing
//! breakdown.
//!
//! ## Guarantees
//! - Never fails hard: every error degrades to a failed [`AnalysisResult`]
//! - Empty input is rejected before any predictor call
//! - The fast prediction is never passed to the accurate predictor
//! - Stateless across calls: safe to share behind `Arc` between tasks
//!
//! ## NOT Responsible For
//! - Routing rules (that belongs to `routing`)
//! - Batch validation and statistics (that belongs to `batch`)

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn, Instrument, Span};

use crate::config::{ConfigError, ServiceConfig};
use crate::metrics;
use crate::predictor::{Predictor, PredictorOutput};
use crate::routing::{RoutingPolicy, RoutingVerdict};
use crate::{SentimentError, ValidationError};

/// Default truncation limit in code points.
pub const DEFAULT_MAX_TEXT_LENGTH: usize = 1000;

// ── Input ────────────────────────────────────────────────────────────────

/// A request text after truncation, with derived size features.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextSample {
    /// The text the predictors see (truncated if needed).
    pub text: String,
    /// Length of `text` in code points.
    pub length: usize,
    /// Whitespace-separated word count of `text`.
    pub word_count: usize,
    /// `true` if the input was longer than the limit and was cut.
    pub truncated: bool,
}

impl TextSample {
    /// Prepare `raw`, keeping at most `max_length` code points.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyText`] if `raw` has no characters.
    pub fn new(raw: &str, max_length: usize) -> Result<Self, ValidationError> {
        if raw.is_empty() {
            return Err(ValidationError::EmptyText);
        }

        let (text, truncated) = match raw.char_indices().nth(max_length) {
            Some((cut, _)) => (raw[..cut].to_string(), true),
            None => (raw.to_string(), false),
        };

        Ok(Self {
            length: text.chars().count(),
            word_count: text.split_whitespace().count(),
            text,
            truncated,
        })
    }
}

// ── Output ───────────────────────────────────────────────────────────────

/// Which predictor produced the final answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// The low-latency default predictor.
    Fast,
    /// The predictor used on escalation.
    Accurate,
}

impl ModelKind {
    /// Lower-case name, also used as the `model` metrics label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Accurate => "accurate",
        }
    }

    /// Stage label used for latency and error metrics.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Fast => "fast_model",
            Self::Accurate => "accurate_model",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-step wall-clock times, in seconds.
///
/// `total` is measured by its own clock spanning every step, so it is never
/// less than the sum of the parts.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TimingBreakdown {
    /// Fast predictor call.
    #[serde(rename = "fast_model_time")]
    pub fast_model: f64,
    /// Routing decision.
    #[serde(rename = "routing_time")]
    pub routing: f64,
    /// Accurate predictor call; `0.0` when the fast answer was kept.
    #[serde(rename = "final_model_time")]
    pub final_model: f64,
    /// Whole request.
    #[serde(rename = "total_time")]
    pub total: f64,
}

/// The derived fields of a successful analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    /// The text that was analysed.
    pub sample: TextSample,
    /// The prediction adopted as final.
    pub prediction: PredictorOutput,
    /// Which predictor produced `prediction`.
    pub model_used: ModelKind,
    /// `name()` of that predictor.
    pub predictor: String,
    /// The routing decision and its justification.
    pub routing: RoutingVerdict,
    /// Per-step timings.
    pub timing: TimingBreakdown,
}

/// Outcome of one `analyze` call.
///
/// A failed result has `success == false`, an `error` message and no
/// analysis fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// `true` if an analysis was produced.
    pub success: bool,
    /// Failure message for unsuccessful results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Derived fields, present only on success.
    #[serde(flatten)]
    pub analysis: Option<Analysis>,
}

impl AnalysisResult {
    /// Build a successful result.
    pub fn success(analysis: Analysis) -> Self {
        Self {
            success: true,
            error: None,
            analysis: Some(analysis),
        }
    }

    /// Build a failed result carrying `message`.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            analysis: None,
        }
    }

    /// The analysis, if successful.
    pub fn analysis(&self) -> Option<&Analysis> {
        self.analysis.as_ref()
    }
}

// ── Orchestrator ─────────────────────────────────────────────────────────

/// Runs the fast → route → (accurate) flow for single texts.
///
/// Holds two independent predictor instances and an immutable policy; one
/// orchestrator is shared by every concurrent request.
///
/// ## Example
///
/// ```
/// use std::sync::Arc;
/// use hybrid_sentiment_router::orchestrator::HybridOrchestrator;
/// use hybrid_sentiment_router::predictor::{BoostedPredictor, LexiconPredictor, Predictor};
/// use hybrid_sentiment_router::routing::{RoutingConfig, RoutingPolicy};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let fast: Arc<dyn Predictor> = Arc::new(LexiconPredictor::new());
/// let accurate: Arc<dyn Predictor> =
///     Arc::new(BoostedPredictor::new(Arc::new(LexiconPredictor::new())));
/// let policy = RoutingPolicy::new(RoutingConfig::default())?;
///
/// let orchestrator = HybridOrchestrator::new(fast, accurate, policy);
/// let result = orchestrator.analyze("хороший товар").await;
/// assert!(result.success);
/// # Ok(()) }
/// ```
pub struct HybridOrchestrator {
    fast: Arc<dyn Predictor>,
    accurate: Arc<dyn Predictor>,
    policy: RoutingPolicy,
    max_text_length: usize,
}

impl HybridOrchestrator {
    /// Create an orchestrator with the default truncation limit.
    pub fn new(fast: Arc<dyn Predictor>, accurate: Arc<dyn Predictor>, policy: RoutingPolicy) -> Self {
        Self {
            fast,
            accurate,
            policy,
            max_text_length: DEFAULT_MAX_TEXT_LENGTH,
        }
    }

    /// Build an orchestrator from a service configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the routing section is invalid.
    pub fn from_config(
        fast: Arc<dyn Predictor>,
        accurate: Arc<dyn Predictor>,
        config: &ServiceConfig,
    ) -> Result<Self, ConfigError> {
        let policy = RoutingPolicy::new(config.routing.clone())?;
        Ok(Self::new(fast, accurate, policy).with_max_text_length(config.analysis.max_text_length))
    }

    /// Set the truncation limit in code points (at least 1).
    pub fn with_max_text_length(mut self, max_text_length: usize) -> Self {
        self.max_text_length = max_text_length.max(1);
        self
    }

    /// The routing policy in use.
    pub fn policy(&self) -> &RoutingPolicy {
        &self.policy
    }

    /// The truncation limit in code points.
    pub fn max_text_length(&self) -> usize {
        self.max_text_length
    }

    /// Name of the fast predictor.
    pub fn fast_name(&self) -> &str {
        self.fast.name()
    }

    /// Name of the accurate predictor.
    pub fn accurate_name(&self) -> &str {
        self.accurate.name()
    }

    /// Analyse one text.
    ///
    /// Never fails: validation errors, predictor errors and predictor panics
    /// become a failed [`AnalysisResult`] whose message starts with the error
    /// code (`EMPTY_TEXT`) or names the predictor that failed.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub async fn analyze(&self, text: &str) -> AnalysisResult {
        match self.try_analyze(text).await {
            Ok(analysis) => AnalysisResult::success(analysis),
            Err(e) => AnalysisResult::failure(e.to_string()),
        }
    }

    /// Analyse one text, returning the error instead of a failed result.
    ///
    /// # Errors
    ///
    /// - [`SentimentError::Validation`] if `text` is empty.
    /// - [`SentimentError::Predictor`] if a predictor call fails.
    /// - [`SentimentError::PredictorPanicked`] if a predictor call panics.
    pub async fn try_analyze(&self, text: &str) -> Result<Analysis, SentimentError> {
        let span = tracing::info_span!(
            "sentiment.analyze",
            length = tracing::field::Empty,
            model = tracing::field::Empty,
            reason = tracing::field::Empty,
            duration_ms = tracing::field::Empty,
        );
        self.run(text).instrument(span).await
    }

    async fn run(&self, text: &str) -> Result<Analysis, SentimentError> {
        let started = Instant::now();

        let sample = TextSample::new(text, self.max_text_length).map_err(|e| {
            metrics::inc_error("validation", e.code());
            warn!(target: "sentiment::orchestrator", error = %e, "Rejected input");
            e
        })?;
        Span::current().record("length", sample.length);

        if sample.truncated {
            warn!(
                target: "sentiment::orchestrator",
                original_length = text.chars().count(),
                max_text_length = self.max_text_length,
                "Text truncated"
            );
        }

        // Text content is NOT logged.
        let fast_started = Instant::now();
        let fast = self.predict(ModelKind::Fast, &sample.text).await?;
        let fast_time = fast_started.elapsed();

        let routing_started = Instant::now();
        let verdict = self.policy.decide(&sample.text, Some(fast.confidence));
        let routing_time = routing_started.elapsed();
        metrics::record_stage_latency("routing", routing_time);

        let (prediction, model_used, final_time) = if verdict.use_fast {
            (fast, ModelKind::Fast, Duration::ZERO)
        } else {
            metrics::inc_escalation(verdict.reason.code());
            let accurate_started = Instant::now();
            let accurate = self.predict(ModelKind::Accurate, &sample.text).await?;
            (accurate, ModelKind::Accurate, accurate_started.elapsed())
        };

        let total = started.elapsed();
        metrics::record_stage_latency("total", total);
        metrics::inc_request(model_used.as_str());

        Span::current().record("model", model_used.as_str());
        Span::current().record("reason", tracing::field::display(&verdict.reason));
        Span::current().record("duration_ms", total.as_millis() as u64);

        info!(
            target: "sentiment::orchestrator",
            model = %model_used,
            reason = %verdict.reason,
            label = %prediction.label,
            confidence = prediction.confidence,
            truncated = sample.truncated,
            "Analysis complete"
        );

        let predictor = match model_used {
            ModelKind::Fast => self.fast.name(),
            ModelKind::Accurate => self.accurate.name(),
        }
        .to_string();

        Ok(Analysis {
            sample,
            prediction,
            model_used,
            predictor,
            routing: verdict,
            timing: TimingBreakdown {
                fast_model: fast_time.as_secs_f64(),
                routing: routing_time.as_secs_f64(),
                final_model: final_time.as_secs_f64(),
                total: total.as_secs_f64(),
            },
        })
    }

    async fn predict(&self, model: ModelKind, text: &str) -> Result<PredictorOutput, SentimentError> {
        let predictor = match model {
            ModelKind::Fast => &self.fast,
            ModelKind::Accurate => &self.accurate,
        };

        let started = Instant::now();
        let outcome = AssertUnwindSafe(predictor.predict_with_confidence(text))
            .catch_unwind()
            .await;
        metrics::record_stage_latency(model.stage(), started.elapsed());

        let result = outcome.map_err(|panic| {
            let message = panic_message(panic.as_ref()).to_string();
            metrics::inc_error(model.stage(), "panic");
            error!(
                target: "sentiment::orchestrator",
                model = %model,
                predictor = predictor.name(),
                panic = %message,
                "Predictor panicked"
            );
            SentimentError::PredictorPanicked { model, message }
        })?;

        result.map_err(|source| {
            metrics::inc_error(model.stage(), source.kind());
            warn!(
                target: "sentiment::orchestrator",
                model = %model,
                predictor = predictor.name(),
                error = %source,
                "Predictor failed"
            );
            SentimentError::Predictor { model, source }
        })
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
