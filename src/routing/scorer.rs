//! Text complexity scoring.
//!
//! Analyses a text and produces a complexity score in the range
//! `0.0..=1.0` together with the names of the signals that fired.  The score
//! feeds the last escalation rule of the [`RoutingPolicy`](super::RoutingPolicy).
//!
//! ## Heuristics
//!
//! 1. **Length**: `min(len / max_fast_length, 1.0) * 0.3`
//! 2. **Word count**: more words than the threshold → +0.2
//! 3. **Special characters**: punctuation/symbol ratio above threshold → +0.2
//! 4. **Contrastive connectives**: any configured connective → +0.1
//! 5. **Mixed punctuation**: both `?` and `!` present → +0.2
//! 6. **Double negation**: any negation pattern matches → +0.1
//!
//! The raw sum is clamped to `[0.0, 1.0]`.  Lengths are counted in code
//! points.

use regex::RegexSet;
use serde::{Deserialize, Serialize};

use super::config::RoutingConfig;
use crate::config::ConfigError;

const LENGTH_WEIGHT: f64 = 0.3;
const WORD_COUNT_BONUS: f64 = 0.2;
const SPECIAL_CHAR_BONUS: f64 = 0.2;
const CONTRASTIVE_BONUS: f64 = 0.1;
const MIXED_PUNCTUATION_BONUS: f64 = 0.2;
const DOUBLE_NEGATION_BONUS: f64 = 0.1;

/// A named complexity signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexitySignal {
    /// Non-zero length contribution.
    Length,
    /// Word count above the configured threshold.
    WordCount,
    /// Special-character ratio above the configured threshold.
    SpecialCharRatio,
    /// A contrastive or hedging connective was found.
    ContrastiveConjunction,
    /// Both `?` and `!` appear in the text.
    MixedPunctuation,
    /// A double-negation pattern matched.
    DoubleNegation,
}

/// Complexity of one text: the clamped score and the signals that fired.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexityScore {
    /// Final clamped score in `[0.0, 1.0]`.
    pub value: f64,
    /// Signals that contributed, in heuristic order.
    pub signals: Vec<ComplexitySignal>,
}

impl ComplexityScore {
    /// The score of an empty text: `0.0` with no signals.
    pub fn zero() -> Self {
        Self {
            value: 0.0,
            signals: Vec::new(),
        }
    }

    /// Return `true` if `signal` contributed to this score.
    pub fn has_signal(&self, signal: ComplexitySignal) -> bool {
        self.signals.contains(&signal)
    }
}

/// Breakdown of individual complexity signal contributions.
///
/// Returned by [`ComplexityScorer::breakdown`] for observability.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScoreBreakdown {
    /// Contribution from text length (0.0 to 0.3).
    pub length: f64,
    /// Contribution from word count (0.0 or 0.2).
    pub word_count: f64,
    /// Contribution from the special-character ratio (0.0 or 0.2).
    pub special_chars: f64,
    /// Contribution from contrastive connectives (0.0 or 0.1).
    pub contrastive: f64,
    /// Contribution from mixed `?`/`!` punctuation (0.0 or 0.2).
    pub mixed_punctuation: f64,
    /// Contribution from double negation (0.0 or 0.1).
    pub double_negation: f64,
    /// Final clamped score in `[0.0, 1.0]`.
    pub total: f64,
}

impl ScoreBreakdown {
    /// Collapse the breakdown into a [`ComplexityScore`].
    pub fn into_score(self) -> ComplexityScore {
        let contributions = [
            (self.length, ComplexitySignal::Length),
            (self.word_count, ComplexitySignal::WordCount),
            (self.special_chars, ComplexitySignal::SpecialCharRatio),
            (self.contrastive, ComplexitySignal::ContrastiveConjunction),
            (self.mixed_punctuation, ComplexitySignal::MixedPunctuation),
            (self.double_negation, ComplexitySignal::DoubleNegation),
        ];
        ComplexityScore {
            value: self.total,
            signals: contributions
                .iter()
                .filter(|(v, _)| *v > 0.0)
                .map(|(_, s)| *s)
                .collect(),
        }
    }
}

/// A text complexity scorer.
///
/// Immutable after construction and safe to share across threads.
/// Scoring is O(n) in the text length.
///
/// # Panics
///
/// This type and its methods never panic.
#[derive(Debug, Clone)]
pub struct ComplexityScorer {
    max_fast_length: usize,
    word_count_threshold: usize,
    special_char_threshold: f64,
    contrastive_terms: Vec<String>,
    negation: RegexSet,
}

impl ComplexityScorer {
    /// Build a scorer from the routing configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPattern`] if a negation pattern does not
    /// compile.
    ///
    /// # Example
    ///
    /// ```rust
    /// use hybrid_sentiment_router::routing::{ComplexityScorer, RoutingConfig};
    /// let scorer = ComplexityScorer::new(&RoutingConfig::default()).unwrap();
    /// assert!(scorer.score("хороший товар").value < 0.1);
    /// ```
    pub fn new(config: &RoutingConfig) -> Result<Self, ConfigError> {
        let negation =
            RegexSet::new(&config.negation_patterns).map_err(|e| ConfigError::InvalidPattern {
                field: "routing.negation_patterns".to_string(),
                source: e,
            })?;

        Ok(Self {
            max_fast_length: config.max_fast_length.max(1),
            word_count_threshold: config.word_count_threshold,
            special_char_threshold: config.special_char_threshold,
            contrastive_terms: config.contrastive_terms.clone(),
            negation,
        })
    }

    /// Score a text for complexity.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub fn score(&self, text: &str) -> ComplexityScore {
        self.breakdown(text).into_score()
    }

    /// Provide a breakdown of individual signal contributions.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub fn breakdown(&self, text: &str) -> ScoreBreakdown {
        self.breakdown_lowered(text, &text.to_lowercase())
    }

    /// Score with a caller-supplied lower-cased copy of `text`, so the policy
    /// lower-cases each request once.
    pub(crate) fn score_lowered(&self, text: &str, lower: &str) -> ComplexityScore {
        self.breakdown_lowered(text, lower).into_score()
    }

    fn breakdown_lowered(&self, text: &str, lower: &str) -> ScoreBreakdown {
        if text.is_empty() {
            return ScoreBreakdown::default();
        }

        let length = self.length_signal(text);
        let word_count = self.word_count_signal(text);
        let special_chars = self.special_char_signal(text);
        let contrastive = self.contrastive_signal(lower);
        let mixed_punctuation = Self::mixed_punctuation_signal(text);
        let double_negation = self.double_negation_signal(lower);
        let total = clamp_score(
            length + word_count + special_chars + contrastive + mixed_punctuation + double_negation,
        );

        ScoreBreakdown {
            length,
            word_count,
            special_chars,
            contrastive,
            mixed_punctuation,
            double_negation,
            total,
        }
    }

    // ── Individual signals ─────────────────────────────────────────────

    fn length_signal(&self, text: &str) -> f64 {
        let len = text.chars().count() as f64;
        (len / self.max_fast_length as f64).min(1.0) * LENGTH_WEIGHT
    }

    fn word_count_signal(&self, text: &str) -> f64 {
        if text.split_whitespace().count() > self.word_count_threshold {
            WORD_COUNT_BONUS
        } else {
            0.0
        }
    }

    fn special_char_signal(&self, text: &str) -> f64 {
        if special_char_ratio(text) > self.special_char_threshold {
            SPECIAL_CHAR_BONUS
        } else {
            0.0
        }
    }

    /// Scored once no matter how many connectives match.
    fn contrastive_signal(&self, lower: &str) -> f64 {
        if self
            .contrastive_terms
            .iter()
            .any(|term| lower.contains(term.as_str()))
        {
            CONTRASTIVE_BONUS
        } else {
            0.0
        }
    }

    fn mixed_punctuation_signal(text: &str) -> f64 {
        if text.contains('?') && text.contains('!') {
            MIXED_PUNCTUATION_BONUS
        } else {
            0.0
        }
    }

    fn double_negation_signal(&self, lower: &str) -> f64 {
        if self.negation.is_match(lower) {
            DOUBLE_NEGATION_BONUS
        } else {
            0.0
        }
    }
}

/// Ratio of characters that are neither alphanumeric nor whitespace.
///
/// Returns `0.0` for empty text.
pub fn special_char_ratio(text: &str) -> f64 {
    let mut total = 0_usize;
    let mut special = 0_usize;
    for c in text.chars() {
        total += 1;
        if !c.is_alphanumeric() && !c.is_whitespace() {
            special += 1;
        }
    }
    if total == 0 {
        0.0
    } else {
        special as f64 / total as f64
    }
}

/// Clamp a raw score to the valid `[0.0, 1.0]` range.
fn clamp_score(raw: f64) -> f64 {
    raw.clamp(0.0, 1.0)
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn scorer() -> ComplexityScorer {
        ComplexityScorer::new(&RoutingConfig::default())
            .unwrap_or_else(|e| std::panic::panic_any(format!("test: scorer: {e}")))
    }

    // -- clamp -----------------------------------------------------------

    #[test]
    fn test_clamp_score_above_one_returns_one() {
        assert!((clamp_score(1.5) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_clamp_score_negative_returns_zero() {
        assert!(clamp_score(-0.1).abs() < f64::EPSILON);
    }

    // -- empty / simple --------------------------------------------------

    #[test]
    fn test_score_empty_text_returns_zero_without_signals() {
        let score = scorer().score("");
        assert_eq!(score, ComplexityScore::zero());
    }

    #[test]
    fn test_score_short_positive_review_is_low() {
        let score = scorer().score("хороший товар");
        // 13 chars / 200 * 0.3
        assert!((score.value - 0.0195).abs() < 1e-9, "got {}", score.value);
        assert_eq!(score.signals, vec![ComplexitySignal::Length]);
    }

    // -- length ----------------------------------------------------------

    #[test]
    fn test_length_signal_counts_code_points_not_bytes() {
        let bd = scorer().breakdown(&"я".repeat(100));
        // 100 code points (200 bytes) → half of the length weight
        assert!((bd.length - 0.15).abs() < 1e-9, "got {}", bd.length);
    }

    #[test]
    fn test_length_signal_saturates_at_max_fast_length() {
        let s = scorer();
        let at_limit = s.breakdown(&"a".repeat(200));
        let beyond = s.breakdown(&"a".repeat(900));
        assert!((at_limit.length - 0.3).abs() < 1e-9);
        assert!((beyond.length - 0.3).abs() < 1e-9);
    }

    // -- word count ------------------------------------------------------

    #[test]
    fn test_word_count_above_threshold_adds_0_2() {
        let text = vec!["слово"; 21].join(" ");
        let bd = scorer().breakdown(&text);
        assert!((bd.word_count - 0.2).abs() < f64::EPSILON);
    }

    #[test]
    fn test_word_count_at_threshold_adds_zero() {
        let text = vec!["слово"; 20].join(" ");
        let bd = scorer().breakdown(&text);
        assert!(bd.word_count.abs() < f64::EPSILON);
    }

    // -- special characters ----------------------------------------------

    #[test]
    fn test_special_char_ratio_empty_text_is_zero() {
        assert!(special_char_ratio("").abs() < f64::EPSILON);
    }

    #[test]
    fn test_special_char_ratio_ignores_whitespace() {
        // 2 specials out of 5 chars
        assert!((special_char_ratio("a ?!b") - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_special_chars_above_threshold_adds_0_2() {
        let bd = scorer().breakdown(":-) ;-)");
        assert!((bd.special_chars - 0.2).abs() < f64::EPSILON);
    }

    // -- contrastive -----------------------------------------------------

    #[test]
    fn test_contrastive_connective_adds_0_1_once() {
        let bd = scorer().breakdown("однако хорошо, хотя дорого, тем не менее беру");
        assert!((bd.contrastive - 0.1).abs() < f64::EPSILON);
    }

    #[test]
    fn test_contrastive_match_is_case_insensitive() {
        let bd = scorer().breakdown("ОДНАКО дорого");
        assert!((bd.contrastive - 0.1).abs() < f64::EPSILON);
    }

    // -- mixed punctuation -----------------------------------------------

    #[test]
    fn test_mixed_punctuation_requires_both_marks() {
        let s = scorer();
        assert!((s.breakdown("Правда?! Да").mixed_punctuation - 0.2).abs() < f64::EPSILON);
        assert!(s.breakdown("Правда??").mixed_punctuation.abs() < f64::EPSILON);
        assert!(s.breakdown("Ура!!").mixed_punctuation.abs() < f64::EPSILON);
    }

    // -- double negation -------------------------------------------------

    #[test]
    fn test_double_negation_pattern_adds_0_1() {
        let bd = scorer().breakdown("Не без оснований, не  не плохо");
        assert!((bd.double_negation - 0.1).abs() < f64::EPSILON);
    }

    #[test]
    fn test_single_negation_no_signal() {
        let bd = scorer().breakdown("не плохо");
        assert!(bd.double_negation.abs() < f64::EPSILON);
    }

    // -- combined --------------------------------------------------------

    #[test]
    fn test_all_signals_clamp_to_1_0() {
        let mut text = "Ни ни?! однако ".repeat(20);
        text.push_str(&"!?#%".repeat(200));
        let score = scorer().score(&text);
        assert!((score.value - 1.0).abs() < f64::EPSILON, "got {}", score.value);
        assert_eq!(score.signals.len(), 6);
    }

    #[test]
    fn test_breakdown_total_matches_score() {
        let s = scorer();
        let text = "Неплохо, но могло быть и лучше! А почему так дорого?";
        assert!((s.score(text).value - s.breakdown(text).total).abs() < f64::EPSILON);
    }

    #[test]
    fn test_custom_thresholds_are_respected() {
        let cfg = RoutingConfig {
            word_count_threshold: 1,
            max_fast_length: 10,
            ..RoutingConfig::default()
        };
        let s = ComplexityScorer::new(&cfg)
            .unwrap_or_else(|e| std::panic::panic_any(format!("test: scorer: {e}")));
        let bd = s.breakdown("два слова");
        assert!((bd.word_count - 0.2).abs() < f64::EPSILON);
        assert!((bd.length - 0.27).abs() < 1e-9);
    }

    #[test]
    fn test_new_rejects_invalid_negation_pattern() {
        let cfg = RoutingConfig {
            negation_patterns: vec!["(".to_string()],
            ..RoutingConfig::default()
        };
        assert!(matches!(
            ComplexityScorer::new(&cfg),
            Err(ConfigError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_has_signal_reports_fired_signals() {
        let score = scorer().score("Как так?!");
        assert!(score.has_signal(ComplexitySignal::MixedPunctuation));
        assert!(!score.has_signal(ComplexitySignal::DoubleNegation));
    }
}
