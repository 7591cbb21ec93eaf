//! Sentiment predictor abstraction and implementations
//!
//! Provides the [`Predictor`] trait consumed by the orchestrator and the
//! collaborators shipped with the crate:
//! - [`LexiconPredictor`]: deterministic stem-lexicon classifier (fast path, demos, tests)
//! - [`BoostedPredictor`]: placeholder accurate classifier wrapping another predictor
//! - [`HttpPredictor`]: remote model server speaking JSON over HTTP
//!
//! Every predictor answers over the same closed label set
//! ([`SentimentLabel`]) and returns a full probability distribution
//! ([`ClassProbabilities`]) that always contains exactly those labels.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Tolerance for probability distributions summing to one.
pub const PROBABILITY_TOLERANCE: f64 = 1e-3;

// ============================================================================
// Labels and distributions
// ============================================================================

/// The closed set of sentiment classes shared by every predictor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    /// Negative sentiment.
    Negative,
    /// Positive sentiment.
    Positive,
    /// Neutral, mixed or off-topic.
    Other,
}

impl SentimentLabel {
    /// All labels in index order.
    pub const ALL: [SentimentLabel; 3] = [Self::Negative, Self::Positive, Self::Other];

    /// Lower-case label name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Negative => "negative",
            Self::Positive => "positive",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SentimentLabel {
    type Err = PredictorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|label| label.as_str() == s)
            .ok_or_else(|| PredictorError::InvalidOutput(format!("unknown label {s:?}")))
    }
}

/// Wire form of [`ClassProbabilities`]; rejects unknown and missing labels.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ProbabilityMap {
    negative: f64,
    positive: f64,
    other: f64,
}

impl TryFrom<ProbabilityMap> for ClassProbabilities {
    type Error = PredictorError;

    fn try_from(map: ProbabilityMap) -> Result<Self, Self::Error> {
        Self::new(map.negative, map.positive, map.other)
    }
}

/// A probability per sentiment label.
///
/// Holds exactly one value per [`SentimentLabel`], each finite and in
/// `[0.0, 1.0]`, summing to `1.0` within [`PROBABILITY_TOLERANCE`].
/// Serialises as a JSON object keyed by label name.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ProbabilityMap")]
pub struct ClassProbabilities {
    negative: f64,
    positive: f64,
    other: f64,
}

impl ClassProbabilities {
    /// Build a validated distribution.
    ///
    /// # Errors
    ///
    /// Returns [`PredictorError::InvalidOutput`] if any value is outside
    /// `[0.0, 1.0]` or the values do not sum to one.
    pub fn new(negative: f64, positive: f64, other: f64) -> Result<Self, PredictorError> {
        let probs = Self {
            negative,
            positive,
            other,
        };
        for (label, p) in probs.iter() {
            if !p.is_finite() || !(0.0..=1.0).contains(&p) {
                return Err(PredictorError::InvalidOutput(format!(
                    "probability for {label} must be in [0.0, 1.0], got {p}"
                )));
            }
        }
        let sum = negative + positive + other;
        if (sum - 1.0).abs() > PROBABILITY_TOLERANCE {
            return Err(PredictorError::InvalidOutput(format!(
                "probabilities must sum to 1.0, got {sum}"
            )));
        }
        Ok(probs)
    }

    /// Normalise non-negative weights (indexed like [`SentimentLabel::ALL`]).
    ///
    /// # Errors
    ///
    /// Returns [`PredictorError::InvalidOutput`] if a weight is negative or
    /// non-finite, or all weights are zero.
    pub fn from_weights(weights: [f64; 3]) -> Result<Self, PredictorError> {
        let sum: f64 = weights.iter().sum();
        if !sum.is_finite() || sum <= 0.0 || weights.iter().any(|w| *w < 0.0) {
            return Err(PredictorError::InvalidOutput(format!(
                "cannot normalise weights {weights:?}"
            )));
        }
        Self::new(weights[0] / sum, weights[1] / sum, weights[2] / sum)
    }

    /// Probability assigned to `label`.
    pub fn get(&self, label: SentimentLabel) -> f64 {
        match label {
            SentimentLabel::Negative => self.negative,
            SentimentLabel::Positive => self.positive,
            SentimentLabel::Other => self.other,
        }
    }

    /// Iterate `(label, probability)` pairs in label index order.
    pub fn iter(&self) -> impl Iterator<Item = (SentimentLabel, f64)> + '_ {
        SentimentLabel::ALL.into_iter().map(|l| (l, self.get(l)))
    }

    /// Most probable label and its probability; ties go to the lower index.
    pub fn argmax(&self) -> (SentimentLabel, f64) {
        self.iter()
            .fold((SentimentLabel::Negative, f64::NEG_INFINITY), |best, cur| {
                if cur.1 > best.1 {
                    cur
                } else {
                    best
                }
            })
    }
}

/// One prediction: label, confidence, and the full distribution.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictorOutput {
    /// Predicted class.
    pub label: SentimentLabel,
    /// Confidence in `[0.0, 1.0]`.
    pub confidence: f64,
    /// Probability per class.
    pub probabilities: ClassProbabilities,
}

impl PredictorOutput {
    /// Build a validated output.
    ///
    /// # Errors
    ///
    /// Returns [`PredictorError::InvalidOutput`] if `confidence` is outside
    /// `[0.0, 1.0]`.
    pub fn new(
        label: SentimentLabel,
        confidence: f64,
        probabilities: ClassProbabilities,
    ) -> Result<Self, PredictorError> {
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(PredictorError::InvalidOutput(format!(
                "confidence must be in [0.0, 1.0], got {confidence}"
            )));
        }
        Ok(Self {
            label,
            confidence,
            probabilities,
        })
    }

    /// Derive label and confidence from the most probable class.
    pub fn from_probabilities(probabilities: ClassProbabilities) -> Self {
        let (label, confidence) = probabilities.argmax();
        Self {
            label,
            confidence,
            probabilities,
        }
    }
}

// ============================================================================
// Trait
// ============================================================================

/// Errors reported by a predictor.
///
/// The orchestrator converts these into failed analysis results; they are
/// never fatal.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PredictorError {
    /// The transport to the model failed (network, timeout).
    #[error("request failed: {0}")]
    Request(String),

    /// The model answered with a payload that could not be decoded.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The decoded output breaks the predictor contract.
    #[error("invalid output: {0}")]
    InvalidOutput(String),

    /// The model is not ready to serve.
    #[error("unavailable: {0}")]
    Unavailable(String),
}

impl PredictorError {
    /// Short variant name, used as a metrics label.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Request(_) => "request",
            Self::InvalidResponse(_) => "invalid_response",
            Self::InvalidOutput(_) => "invalid_output",
            Self::Unavailable(_) => "unavailable",
        }
    }
}

/// Trait for sentiment classifiers.
///
/// Implementations must be thread-safe (Send + Sync): one instance is shared
/// by every concurrent analysis through `Arc<dyn Predictor>`.
#[async_trait]
pub trait Predictor: Send + Sync {
    /// Stable name reported in analysis results and logs.
    fn name(&self) -> &str;

    /// Classify `text`, returning label, confidence and full distribution.
    async fn predict_with_confidence(&self, text: &str) -> Result<PredictorOutput, PredictorError>;
}

// ============================================================================
// Lexicon Predictor
// ============================================================================

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

/// Deterministic stem-lexicon classifier.
///
/// Lower-cases the text, splits it into alphanumeric tokens, and counts
/// tokens starting with a positive, negative or neutral stem.  A polar stem
/// directly after a negation particle counts toward the opposite polarity.
/// The counts are soft-maxed into a distribution over
/// `(3·negative, 3·positive, 1 + 3·neutral)`.
///
/// Useful as the fast classifier in demos and pipeline tests without a real
/// model dependency.
pub struct LexiconPredictor {
    name: String,
    positive: Vec<String>,
    negative: Vec<String>,
    neutral: Vec<String>,
    negations: Vec<String>,
    /// Simulated inference delay
    delay: Duration,
}

impl LexiconPredictor {
    /// Create a predictor with the built-in Russian review lexicon.
    pub fn new() -> Self {
        Self {
            name: "lexicon_fast".to_string(),
            positive: to_strings(&[
                "отличн",
                "прекрасн",
                "супер",
                "восхитительн",
                "шикарн",
                "люблю",
                "лучш",
                "великолепн",
                "превосходн",
                "идеальн",
                "рекоменд",
                "совет",
                "доволен",
                "рад",
                "замечательн",
                "хорош",
                "понрав",
                "молодец",
            ]),
            negative: to_strings(&[
                "плох",
                "ужасн",
                "кошмар",
                "разочар",
                "гадк",
                "отвратительн",
                "худш",
                "брак",
                "обман",
                "мусор",
                "сломал",
                "неудовлетвор",
                "низк",
            ]),
            neutral: to_strings(&[
                "нормальн",
                "обычн",
                "средн",
                "сойдет",
                "приемлем",
                "неплох",
                "стандартн",
                "посредственн",
            ]),
            negations: to_strings(&["не", "ни", "без"]),
            delay: Duration::ZERO,
        }
    }

    /// Override the reported predictor name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Simulate inference latency.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Count `(negative, positive, neutral)` stem hits.
    fn count_hits(&self, text: &str) -> (u32, u32, u32) {
        let lower = text.to_lowercase();
        let mut counts = (0_u32, 0_u32, 0_u32);
        let mut negated = false;

        for token in lower.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
            let has_stem = |stems: &[String]| stems.iter().any(|s| token.starts_with(s.as_str()));
            if has_stem(&self.neutral) {
                counts.2 += 1;
            } else if has_stem(&self.positive) {
                if negated {
                    counts.0 += 1;
                } else {
                    counts.1 += 1;
                }
            } else if has_stem(&self.negative) {
                if negated {
                    counts.1 += 1;
                } else {
                    counts.0 += 1;
                }
            }
            negated = self.negations.iter().any(|n| n == token);
        }

        counts
    }
}

impl Default for LexiconPredictor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Predictor for LexiconPredictor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn predict_with_confidence(&self, text: &str) -> Result<PredictorOutput, PredictorError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let (neg, pos, neutral) = self.count_hits(text);
        let logits = [
            3.0 * f64::from(neg),
            3.0 * f64::from(pos),
            1.0 + 3.0 * f64::from(neutral),
        ];
        // Shift by the max logit so exp() cannot overflow on long texts.
        let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let weights = logits.map(|l| (l - max).exp());

        ClassProbabilities::from_weights(weights).map(PredictorOutput::from_probabilities)
    }
}

// ============================================================================
// Boosted Predictor (accurate placeholder)
// ============================================================================

/// Placeholder accurate classifier.
///
/// Runs its own inner predictor, keeps the label, raises the confidence to
/// `min(confidence · factor, cap)` and spreads the remaining mass evenly over
/// the other labels.  Stands in for a slower, higher-quality model until one
/// is wired up; the orchestrator treats it as an independent collaborator.
pub struct BoostedPredictor {
    name: String,
    inner: Arc<dyn Predictor>,
    factor: f64,
    cap: f64,
}

impl BoostedPredictor {
    /// Wrap `inner` with the default boost (×1.2, capped at 0.95).
    pub fn new(inner: Arc<dyn Predictor>) -> Self {
        Self {
            name: "accurate_boosted".to_string(),
            inner,
            factor: 1.2,
            cap: 0.95,
        }
    }

    /// Override the reported predictor name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the confidence multiplier and ceiling.
    ///
    /// The ceiling is clamped to `[0.0, 1.0]`.
    pub fn with_boost(mut self, factor: f64, cap: f64) -> Self {
        self.factor = factor;
        self.cap = cap.clamp(0.0, 1.0);
        self
    }
}

#[async_trait]
impl Predictor for BoostedPredictor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn predict_with_confidence(&self, text: &str) -> Result<PredictorOutput, PredictorError> {
        let base = self.inner.predict_with_confidence(text).await?;
        let boosted = (base.confidence * self.factor).clamp(0.0, self.cap);
        let rest = (1.0 - boosted) / (SentimentLabel::ALL.len() - 1) as f64;

        let mut weights = [rest; 3];
        if let Some(i) = SentimentLabel::ALL.iter().position(|l| *l == base.label) {
            weights[i] = boosted;
        }
        let probabilities = ClassProbabilities::new(weights[0], weights[1], weights[2])?;

        PredictorOutput::new(base.label, boosted, probabilities)
    }
}

// ============================================================================
// HTTP Predictor
// ============================================================================

/// Request payload for `POST {base_url}/predict`.
#[derive(Debug, Serialize)]
struct PredictRequest<'a> {
    text: &'a str,
}

/// Response payload from a remote model server.
#[derive(Debug, Deserialize)]
struct PredictResponse {
    label: SentimentLabel,
    confidence: f64,
    probabilities: ClassProbabilities,
}

/// Remote model server client.
///
/// Sends `{"text": ...}` to `POST {base_url}/predict` and expects
/// `{"label", "confidence", "probabilities"}` back.
///
/// ## Example
///
/// ```no_run
/// use hybrid_sentiment_router::predictor::HttpPredictor;
/// use std::time::Duration;
///
/// let accurate = HttpPredictor::new("http://localhost:9000")
///     .with_name("bert_accurate")
///     .with_timeout(Duration::from_secs(2));
/// ```
pub struct HttpPredictor {
    client: reqwest::Client,
    name: String,
    base_url: String,
    timeout: Duration,
}

impl HttpPredictor {
    /// Create a client for the server at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            name: "http".to_string(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    /// Override the reported predictor name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Predictor for HttpPredictor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn predict_with_confidence(&self, text: &str) -> Result<PredictorOutput, PredictorError> {
        let response = self
            .client
            .post(format!("{}/predict", self.base_url))
            .timeout(self.timeout)
            .json(&PredictRequest { text })
            .send()
            .await
            .map_err(|e| PredictorError::Request(format!("{}: {e}", self.name)))?;

        let status = response.status();
        if status == reqwest::StatusCode::SERVICE_UNAVAILABLE {
            return Err(PredictorError::Unavailable(format!("{} returned {status}", self.name)));
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(PredictorError::Request(format!(
                "{} returned {status}: {error_text}",
                self.name
            )));
        }

        let body: PredictResponse = response
            .json()
            .await
            .map_err(|e| PredictorError::InvalidResponse(format!("{}: {e}", self.name)))?;

        PredictorOutput::new(body.label, body.confidence, body.probabilities)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn probs(n: f64, p: f64, o: f64) -> ClassProbabilities {
        ClassProbabilities::new(n, p, o)
            .unwrap_or_else(|e| std::panic::panic_any(format!("test: probs: {e}")))
    }

    async fn predict(p: &dyn Predictor, text: &str) -> PredictorOutput {
        p.predict_with_confidence(text)
            .await
            .unwrap_or_else(|e| std::panic::panic_any(format!("test: predict: {e}")))
    }

    // -- labels ------------------------------------------------------------

    #[test]
    fn test_label_round_trips_through_str() {
        for label in SentimentLabel::ALL {
            assert_eq!(label.as_str().parse::<SentimentLabel>(), Ok(label));
        }
        assert!("neutral".parse::<SentimentLabel>().is_err());
    }

    #[test]
    fn test_label_serializes_lowercase() {
        let json = serde_json::to_string(&SentimentLabel::Positive)
            .unwrap_or_else(|e| std::panic::panic_any(format!("test: serialize: {e}")));
        assert_eq!(json, "\"positive\"");
    }

    // -- probabilities -----------------------------------------------------

    #[test]
    fn test_probabilities_reject_bad_sum() {
        assert!(ClassProbabilities::new(0.5, 0.5, 0.5).is_err());
    }

    #[test]
    fn test_probabilities_reject_out_of_range_value() {
        assert!(ClassProbabilities::new(-0.1, 0.6, 0.5).is_err());
        assert!(ClassProbabilities::new(f64::NAN, 0.5, 0.5).is_err());
    }

    #[test]
    fn test_probabilities_accept_sum_within_tolerance() {
        assert!(ClassProbabilities::new(0.3333, 0.3333, 0.3333).is_ok());
    }

    #[test]
    fn test_probabilities_serialize_with_exact_label_keys() {
        let value = serde_json::to_value(probs(0.1, 0.7, 0.2))
            .unwrap_or_else(|e| std::panic::panic_any(format!("test: serialize: {e}")));
        let obj = value
            .as_object()
            .unwrap_or_else(|| std::panic::panic_any("test: not an object"));
        let mut keys: Vec<_> = obj.keys().cloned().collect();
        keys.sort();
        assert_eq!(keys, vec!["negative", "other", "positive"]);
    }

    #[test]
    fn test_probabilities_deserialize_rejects_unknown_label() {
        let json = r#"{"negative":0.2,"positive":0.3,"other":0.4,"neutral":0.1}"#;
        assert!(serde_json::from_str::<ClassProbabilities>(json).is_err());
    }

    #[test]
    fn test_probabilities_deserialize_rejects_missing_label() {
        let json = r#"{"negative":0.5,"positive":0.5}"#;
        assert!(serde_json::from_str::<ClassProbabilities>(json).is_err());
    }

    #[test]
    fn test_argmax_prefers_lower_index_on_tie() {
        let (label, p) = probs(0.4, 0.4, 0.2).argmax();
        assert_eq!(label, SentimentLabel::Negative);
        assert!((p - 0.4).abs() < f64::EPSILON);
    }

    #[test]
    fn test_from_weights_rejects_all_zero() {
        assert!(ClassProbabilities::from_weights([0.0, 0.0, 0.0]).is_err());
    }

    // -- output ------------------------------------------------------------

    #[test]
    fn test_output_rejects_confidence_above_one() {
        assert!(PredictorOutput::new(SentimentLabel::Other, 1.2, probs(0.0, 0.0, 1.0)).is_err());
    }

    #[test]
    fn test_output_from_probabilities_uses_argmax() {
        let out = PredictorOutput::from_probabilities(probs(0.1, 0.2, 0.7));
        assert_eq!(out.label, SentimentLabel::Other);
        assert!((out.confidence - 0.7).abs() < f64::EPSILON);
    }

    // -- lexicon -----------------------------------------------------------

    #[tokio::test]
    async fn test_lexicon_positive_review_predicts_positive() {
        let out = predict(&LexiconPredictor::new(), "Отличный товар! Очень рекомендую!").await;
        assert_eq!(out.label, SentimentLabel::Positive);
        assert!(out.confidence > 0.9, "got {}", out.confidence);
    }

    #[tokio::test]
    async fn test_lexicon_negative_review_predicts_negative() {
        let out = predict(&LexiconPredictor::new(), "Ужасное качество, брак").await;
        assert_eq!(out.label, SentimentLabel::Negative);
    }

    #[tokio::test]
    async fn test_lexicon_negation_flips_polarity() {
        let out = predict(&LexiconPredictor::new(), "не рекомендую").await;
        assert_eq!(out.label, SentimentLabel::Negative);
    }

    #[tokio::test]
    async fn test_lexicon_unknown_words_predict_other() {
        let out = predict(&LexiconPredictor::new(), "сегодня вторник").await;
        assert_eq!(out.label, SentimentLabel::Other);
        assert!(out.confidence < 0.7);
    }

    #[tokio::test]
    async fn test_lexicon_is_deterministic() {
        let p = LexiconPredictor::new();
        let a = predict(&p, "Хороший, но дорогой").await;
        let b = predict(&p, "Хороший, но дорогой").await;
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_lexicon_long_text_does_not_overflow() {
        let text = "отлично ".repeat(2000);
        let out = predict(&LexiconPredictor::new(), &text).await;
        assert_eq!(out.label, SentimentLabel::Positive);
        assert!(out.confidence.is_finite());
    }

    // -- boosted -----------------------------------------------------------

    #[tokio::test]
    async fn test_boosted_keeps_label_and_raises_confidence() {
        let inner: Arc<dyn Predictor> = Arc::new(LexiconPredictor::new());
        let base = predict(inner.as_ref(), "хороший товар").await;
        let boosted = predict(&BoostedPredictor::new(Arc::clone(&inner)), "хороший товар").await;
        assert_eq!(boosted.label, base.label);
        assert!(boosted.confidence > base.confidence);
        assert!(boosted.confidence <= 0.95 + f64::EPSILON);
    }

    #[tokio::test]
    async fn test_boosted_caps_confidence() {
        let inner: Arc<dyn Predictor> = Arc::new(LexiconPredictor::new());
        let out = predict(
            &BoostedPredictor::new(inner),
            "отличный прекрасный супер товар",
        )
        .await;
        assert!((out.confidence - 0.95).abs() < 1e-9);
        assert!((out.probabilities.get(SentimentLabel::Negative) - 0.025).abs() < 1e-9);
    }

    #[test]
    fn test_predictor_error_kind_labels() {
        assert_eq!(PredictorError::Request("x".into()).kind(), "request");
        assert_eq!(PredictorError::Unavailable("x".into()).kind(), "unavailable");
    }
}
