//! # hybrid-sentiment-router
//!
//! Sentiment classification that combines a cheap, low-latency classifier
//! with a slower, higher-quality one and decides per request which answer to
//! trust.
//!
//! ## Architecture
//!
//! ```text
//! BatchCoordinator → HybridOrchestrator (×N) → RoutingPolicy → ComplexityScorer
//!                           │
//!                           ├── fast Predictor
//!                           └── accurate Predictor (on escalation)
//! ```
//!
//! Every request gets an auditable [`RoutingVerdict`] with a reason code and
//! a per-step timing breakdown.

// ── Lint policy ───────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(missing_docs)]

use std::time::Duration;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use config::LogFormat;

pub mod batch;
pub mod config;
pub mod metrics;
pub mod orchestrator;
pub mod predictor;
pub mod routing;

#[cfg(feature = "web-api")]
pub mod web_api;

// Re-exports for convenience
pub use batch::{BatchCoordinator, BatchReport, BatchSummary, RoutingSplit};
pub use config::{ConfigError, ServiceConfig};
pub use orchestrator::{
    Analysis, AnalysisResult, HybridOrchestrator, ModelKind, TextSample, TimingBreakdown,
};
pub use predictor::{
    BoostedPredictor, ClassProbabilities, HttpPredictor, LexiconPredictor, Predictor,
    PredictorError, PredictorOutput, SentimentLabel,
};
pub use routing::{RoutingConfig, RoutingPolicy, RoutingReason, RoutingVerdict};

/// Initialise the global tracing subscriber.
///
/// Reads the `LOG_FORMAT` environment variable to choose output format:
/// - `"json"`: structured JSON output for log aggregators
/// - anything else (including unset): human-readable pretty output
///
/// Filter level is controlled by `RUST_LOG` (e.g. `RUST_LOG=info`).
///
/// # Errors
///
/// Returns [`SentimentError::Other`] if the global subscriber has already
/// been set (e.g. by a previous call or a test harness).
///
/// # Panics
///
/// This function never panics.
///
/// # Example
///
/// ```no_run
/// # use hybrid_sentiment_router::{init_tracing, SentimentError};
/// # fn example() -> Result<(), SentimentError> {
/// init_tracing()?;
/// # Ok(()) }
/// ```
pub fn init_tracing() -> Result<(), SentimentError> {
    init_tracing_with(LogFormat::from_env_or(LogFormat::Pretty))
}

/// Initialise the global tracing subscriber with an explicit output format.
///
/// Filter level is still controlled by `RUST_LOG`.
///
/// # Errors
///
/// Returns [`SentimentError::Other`] if the global subscriber has already
/// been set.
///
/// # Panics
///
/// This function never panics.
pub fn init_tracing_with(format: LogFormat) -> Result<(), SentimentError> {
    let result = match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(EnvFilter::from_default_env())
            .with_current_span(true)
            .with_span_list(true)
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(EnvFilter::from_default_env())
            .try_init(),
    };

    result.map_err(|e| SentimentError::Other(format!("tracing init failed: {e}")))
}

/// Input rejected before any predictor work.
///
/// Each message starts with a stable code (see [`ValidationError::code`]).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The text has no characters.
    #[error("EMPTY_TEXT: text is empty")]
    EmptyText,

    /// The batch has no texts.
    #[error("EMPTY_BATCH: batch contains no texts")]
    EmptyBatch,

    /// The batch is above the configured cap.
    #[error("BATCH_TOO_LARGE: batch of {size} texts exceeds the maximum of {max}")]
    BatchTooLarge {
        /// Texts submitted.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// A batch element is empty or whitespace only.
    #[error("EMPTY_ELEMENT: text at position {index} is empty")]
    EmptyElement {
        /// Zero-based position of the first offending element.
        index: usize,
    },
}

impl ValidationError {
    /// Stable error code, also used as a metrics label.
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyText => "EMPTY_TEXT",
            Self::EmptyBatch => "EMPTY_BATCH",
            Self::BatchTooLarge { .. } => "BATCH_TOO_LARGE",
            Self::EmptyElement { .. } => "EMPTY_ELEMENT",
        }
    }
}

/// Top-level errors.
///
/// Every error surface in the crate is mapped to a variant here.
#[derive(Error, Debug)]
pub enum SentimentError {
    /// Input was rejected up front.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A predictor call failed.
    #[error("{model} predictor failed: {source}")]
    Predictor {
        /// Which predictor failed.
        model: ModelKind,
        /// Underlying predictor error.
        #[source]
        source: PredictorError,
    },

    /// A predictor call panicked; the panic was contained.
    #[error("{model} predictor panicked: {message}")]
    PredictorPanicked {
        /// Which predictor panicked.
        model: ModelKind,
        /// Panic payload, when it was a string.
        message: String,
    },

    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A batch did not finish before its deadline.
    #[error("deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),

    /// Catch-all for errors that do not fit a specific variant.
    #[error("{0}")]
    Other(String),
}
